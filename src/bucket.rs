use tracing::trace;

use crate::bytes::*;
use crate::consts::*;
use crate::error::{IndexError, Result};
use crate::record::{Record, Value};
use crate::schema::RecordLayout;

/// Fixed size header at the start of every page
///
/// ## Binary layout
/// - i32 local depth
/// - i32 overflow page, -1 when the bucket ends its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketHeader {
    pub local_depth: u32,
    pub overflow_page: Option<u32>,
}

impl ByteLength for BucketHeader {
    fn byte_len(&self) -> usize {
        BUCKET_HEADER_SIZE
    }
}

impl IntoBytes for BucketHeader {
    fn into_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(BUCKET_HEADER_SIZE);
        let overflow = self.overflow_page.map_or(NO_OVERFLOW, |p| p as i32);
        bytes.extend((self.local_depth as i32).to_le_bytes());
        bytes.extend(overflow.to_le_bytes());
        bytes
    }
}

impl FromBytes for BucketHeader {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let local_depth = read_index_le(bytes, 0)?;
        let overflow = read_i32_le(bytes, 4)?;
        let overflow_page = match overflow {
            NO_OVERFLOW => None,
            p if p >= 0 => Some(p as u32),
            p => return Err(IndexError::Corrupt(format!("bad overflow pointer {p}"))),
        };
        Ok(BucketHeader {
            local_depth,
            overflow_page,
        })
    }
}

/// Rust representation of a bucket
///
/// Holds up to `capacity` records in insertion order. Buckets past the first
/// one in a chain are reached through `overflow_page`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub records: Vec<Record>,
    pub local_depth: u32,
    pub overflow_page: Option<u32>,
    capacity: usize,
}

impl Bucket {
    pub fn new(local_depth: u32, capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            local_depth,
            overflow_page: None,
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends the record, handing it back when the bucket is full
    pub fn put(&mut self, record: Record) -> std::result::Result<(), Record> {
        if self.is_full() {
            return Err(record);
        }
        self.records.push(record);
        Ok(())
    }

    pub fn find(&self, key: &Value, key_field: &str) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|r| r.matches(key_field, key))
            .collect()
    }

    /// Removes every record with a matching key, `None` if there were none
    pub fn remove(&mut self, key: &Value, key_field: &str) -> Option<Vec<Record>> {
        let (removed, kept) = std::mem::take(&mut self.records)
            .into_iter()
            .partition::<Vec<_>, _>(|r| r.matches(key_field, key));
        self.records = kept;
        if removed.is_empty() {
            None
        } else {
            Some(removed)
        }
    }

    pub fn header(&self) -> BucketHeader {
        BucketHeader {
            local_depth: self.local_depth,
            overflow_page: self.overflow_page,
        }
    }

    /// Packs the records into `capacity` slots, unused slots are zeroed
    pub fn encode(&self, layout: &RecordLayout) -> Result<Vec<u8>> {
        let mut bytes = vec![0_u8; self.capacity * layout.record_size];
        for (slot, record) in self.records.iter().take(self.capacity).enumerate() {
            let start = slot * layout.record_size;
            bytes[start..start + layout.record_size].copy_from_slice(&record.encode(layout)?);
        }
        Ok(bytes)
    }

    /// Unpacks record slots
    ///
    /// Zeroed slots are empty. A slot that fails to decode is treated as empty
    /// too, and soft-deleted records are dropped.
    pub fn decode(
        data: &[u8],
        header: BucketHeader,
        layout: &RecordLayout,
        capacity: usize,
    ) -> Self {
        let mut bucket = Bucket::new(header.local_depth, capacity);
        bucket.overflow_page = header.overflow_page;
        for chunk in data.chunks(layout.record_size).take(capacity) {
            if chunk.iter().all(|b| *b == 0) {
                continue;
            }
            match Record::decode(chunk, layout) {
                Ok(record) if !record.deleted => bucket.records.push(record),
                Ok(_) => {}
                Err(e) => trace!("skipping undecodable slot: {}", e),
            }
        }
        bucket
    }

    pub fn to_page_bytes(&self, layout: &RecordLayout) -> Result<Vec<u8>> {
        let mut bytes = self.header().into_bytes();
        bytes.extend(self.encode(layout)?);
        Ok(bytes)
    }

    pub fn from_page_bytes(bytes: &[u8], layout: &RecordLayout, capacity: usize) -> Result<Self> {
        let header = BucketHeader::from_bytes(bytes)?;
        Ok(Self::decode(
            &bytes[BUCKET_HEADER_SIZE..],
            header,
            layout,
            capacity,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn layout() -> RecordLayout {
        "id:int,name:str(4)".parse::<Schema>().unwrap().layout()
    }

    fn record(id: i64, name: &str) -> Record {
        Record::from_fields(crate::fields! {"id" => id, "name" => name}).unwrap()
    }

    #[test]
    fn put_stops_at_capacity() {
        let mut bucket = Bucket::new(1, 3);
        for i in 0..3 {
            assert!(bucket.put(record(i, "a")).is_ok());
        }
        assert!(bucket.is_full());
        let rejected = bucket.put(record(9, "z")).unwrap_err();
        assert_eq!(rejected, record(9, "z"));
        assert_eq!(bucket.records.len(), 3);
    }

    #[test]
    fn find_and_remove_handle_duplicate_keys() {
        let mut bucket = Bucket::new(1, 3);
        bucket.put(record(1, "a")).unwrap();
        bucket.put(record(2, "b")).unwrap();
        bucket.put(record(1, "c")).unwrap();

        assert_eq!(bucket.find(&Value::Int(1), "id").len(), 2);
        assert!(bucket.remove(&Value::Int(7), "id").is_none());

        let removed = bucket.remove(&Value::Int(1), "id").unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(bucket.records, vec![record(2, "b")]);
    }

    #[test]
    fn page_bytes_round_trip_with_padding() {
        let layout = layout();
        let mut bucket = Bucket::new(2, 3);
        bucket.overflow_page = Some(7);
        bucket.put(record(5, "five")).unwrap();

        let bytes = bucket.to_page_bytes(&layout).unwrap();
        assert_eq!(bytes.len(), BUCKET_HEADER_SIZE + 3 * layout.record_size);
        assert!(bytes[BUCKET_HEADER_SIZE + layout.record_size..]
            .iter()
            .all(|b| *b == 0));
        assert_eq!(Bucket::from_page_bytes(&bytes, &layout, 3).unwrap(), bucket);
    }

    #[test]
    fn decode_skips_garbage_and_soft_deleted_slots() {
        let layout = layout();
        let mut deleted = record(2, "gone");
        deleted.deleted = true;

        let mut data = record(1, "one").encode(&layout).unwrap();
        data.extend(vec![0xee; layout.record_size]);
        data.extend(deleted.encode(&layout).unwrap());

        let header = BucketHeader {
            local_depth: 1,
            overflow_page: None,
        };
        let bucket = Bucket::decode(&data, header, &layout, 3);
        assert_eq!(bucket.records, vec![record(1, "one")]);
    }

    #[test]
    fn header_encodes_missing_overflow_as_minus_one() {
        let header = BucketHeader {
            local_depth: 3,
            overflow_page: None,
        };
        let bytes = header.into_bytes();
        assert_eq!(bytes[4..], (-1_i32).to_le_bytes());
        assert_eq!(BucketHeader::from_bytes(&bytes).unwrap(), header);
    }
}
