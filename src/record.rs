/// Records as seen by the index, and the fixed size codec used to put them in
/// bucket slots.
use std::collections::BTreeMap;
use std::fmt;

use crate::consts::DELETED_FIELD;
use crate::error::{IndexError, Result};
use crate::schema::{FieldType, RecordLayout};

const FLAG_OCCUPIED: u8 = 0b01;
const FLAG_DELETED: u8 = 0b10;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    /// Interprets shell text as a value of the given field type
    pub fn parse_as(ty: FieldType, text: &str) -> Result<Value> {
        let bad = || IndexError::Schema(format!("{text:?} is not a valid {ty:?}"));
        match ty {
            FieldType::Int => text.parse().map(Value::Int).map_err(|_| bad()),
            FieldType::Float => text.parse().map(Value::Float).map_err(|_| bad()),
            FieldType::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(bad()),
            },
            FieldType::Str { .. } => Ok(Value::Str(text.to_string())),
        }
    }

    /// Widens an integer given for a float field, leaves anything else alone
    pub fn coerce_to(self, ty: FieldType) -> Value {
        match (ty, self) {
            (FieldType::Float, Value::Int(v)) => Value::Float(v as f64),
            (_, value) => value,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Field name to value mapping handed in and out of the index
pub type Fields = BTreeMap<String, Value>;

/// A record stored in a bucket slot
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub fields: Fields,
    /// Soft-delete marker. Set upstream, never by the index.
    pub deleted: bool,
}

impl Record {
    /// Splits the reserved `deleted` entry out of the caller's fields
    pub fn from_fields(mut fields: Fields) -> Result<Self> {
        let deleted = match fields.remove(DELETED_FIELD) {
            None => false,
            Some(Value::Bool(deleted)) => deleted,
            Some(other) => {
                return Err(IndexError::Schema(format!(
                    "{DELETED_FIELD} must be a bool, got {other}"
                )))
            }
        };
        Ok(Record { fields, deleted })
    }

    pub fn key(&self, key_field: &str) -> Option<&Value> {
        self.fields.get(key_field)
    }

    pub fn matches(&self, key_field: &str, key: &Value) -> bool {
        self.key(key_field) == Some(key)
    }

    pub fn encode(&self, layout: &RecordLayout) -> Result<Vec<u8>> {
        if let Some(extra) = self
            .fields
            .keys()
            .find(|name| !layout.fields.iter().any(|slot| &slot.name == *name))
        {
            return Err(IndexError::Schema(format!("unknown field {extra}")));
        }

        let mut buf = vec![0_u8; layout.record_size];
        buf[0] = FLAG_OCCUPIED;
        if self.deleted {
            buf[0] |= FLAG_DELETED;
        }

        for slot in &layout.fields {
            let value = self
                .fields
                .get(&slot.name)
                .ok_or_else(|| IndexError::Schema(format!("missing field {}", slot.name)))?;
            let out = &mut buf[slot.offset..slot.offset + slot.ty.width()];
            match (slot.ty, value) {
                (FieldType::Int, Value::Int(v)) => out.copy_from_slice(&v.to_le_bytes()),
                (FieldType::Float, Value::Float(v)) => out.copy_from_slice(&v.to_le_bytes()),
                (FieldType::Bool, Value::Bool(v)) => out[0] = *v as u8,
                (FieldType::Str { len }, Value::Str(v)) => {
                    let bytes = v.as_bytes();
                    if bytes.len() > len {
                        return Err(IndexError::Schema(format!(
                            "{} is {} bytes, field {} holds {len}",
                            value,
                            bytes.len(),
                            slot.name
                        )));
                    }
                    out[..bytes.len()].copy_from_slice(bytes);
                }
                (ty, value) => {
                    return Err(IndexError::Schema(format!(
                        "field {} expects {ty:?}, got {value}",
                        slot.name
                    )))
                }
            }
        }
        Ok(buf)
    }

    pub fn decode(bytes: &[u8], layout: &RecordLayout) -> Result<Self> {
        if bytes.len() != layout.record_size {
            return Err(IndexError::Codec(format!(
                "slot is {} bytes, expected {}",
                bytes.len(),
                layout.record_size
            )));
        }
        let flags = bytes[0];
        if flags & FLAG_OCCUPIED == 0 || flags & !(FLAG_OCCUPIED | FLAG_DELETED) != 0 {
            return Err(IndexError::Codec(format!("bad record flags {flags:#04x}")));
        }

        let mut fields = Fields::new();
        for slot in &layout.fields {
            let raw = &bytes[slot.offset..slot.offset + slot.ty.width()];
            let value = match slot.ty {
                FieldType::Int => Value::Int(i64::from_le_bytes(
                    raw.try_into()
                        .map_err(|_| IndexError::Codec("short int field".into()))?,
                )),
                FieldType::Float => Value::Float(f64::from_le_bytes(
                    raw.try_into()
                        .map_err(|_| IndexError::Codec("short float field".into()))?,
                )),
                FieldType::Bool => match raw[0] {
                    0 => Value::Bool(false),
                    1 => Value::Bool(true),
                    other => {
                        return Err(IndexError::Codec(format!("bad bool byte {other}")));
                    }
                },
                FieldType::Str { .. } => {
                    let end = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
                    let text = std::str::from_utf8(&raw[..end])
                        .map_err(|e| IndexError::Codec(format!("field {}: {e}", slot.name)))?;
                    Value::Str(text.to_string())
                }
            };
            fields.insert(slot.name.clone(), value);
        }

        Ok(Record {
            fields,
            deleted: flags & FLAG_DELETED != 0,
        })
    }
}

/// Builds a [Fields] map from name/value pairs
#[macro_export]
macro_rules! fields {
    ($($name:expr => $value:expr),* $(,)?) => {{
        let mut fields = $crate::record::Fields::new();
        $(fields.insert($name.to_string(), $crate::record::Value::from($value));)*
        fields
    }};
}
