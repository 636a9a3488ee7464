use twox_hash::XxHash64;

use crate::config::HashFunction;
use crate::record::Value;

/// Hashes a key to the integer whose low bits address the directory
///
/// The additive function sums character codes for strings and takes the
/// integer value of anything else. It collides easily, so nothing should
/// depend on where a key lands, only on finding it again.
pub fn hash_key(key: &Value, function: HashFunction) -> u64 {
    match function {
        HashFunction::Additive => match key {
            Value::Int(v) => *v as u64,
            Value::Float(v) => *v as i64 as u64,
            Value::Bool(v) => *v as u64,
            Value::Str(v) => v.chars().map(|c| c as u64).sum(),
        },
        HashFunction::XxHash => match key {
            Value::Int(v) => XxHash64::oneshot(0, &v.to_le_bytes()),
            Value::Float(v) => XxHash64::oneshot(0, &v.to_bits().to_le_bytes()),
            Value::Bool(v) => XxHash64::oneshot(0, &[*v as u8]),
            Value::Str(v) => XxHash64::oneshot(0, v.as_bytes()),
        },
    }
}

pub fn depth_mask(depth: u32) -> u64 {
    (1_u64 << depth) - 1
}

/// Low `depth` bits of a hash
pub fn prefix_at_depth(hash: u64, depth: u32) -> u64 {
    hash & depth_mask(depth)
}
