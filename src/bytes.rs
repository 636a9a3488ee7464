use crate::error::{IndexError, Result};

pub trait ByteLength {
    fn byte_len(&self) -> usize;
}

pub trait IntoBytes {
    fn into_bytes(self) -> Vec<u8>;
}

pub trait FromBytes: Sized {
    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}

pub fn read_i32_le(bytes: &[u8], at: usize) -> Result<i32> {
    let slice = bytes
        .get(at..at + 4)
        .ok_or_else(|| IndexError::Corrupt(format!("expected 4 bytes at offset {at}")))?;
    Ok(i32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Non negative 4 byte integer, anything negative is corruption
pub fn read_index_le(bytes: &[u8], at: usize) -> Result<u32> {
    let value = read_i32_le(bytes, at)?;
    u32::try_from(value)
        .map_err(|_| IndexError::Corrupt(format!("negative index {value} at offset {at}")))
}
