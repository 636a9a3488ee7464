/// Record schemas, the binary layout derived from them, and the schema blob
/// kept at the start of every index file.
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::str::FromStr;

use crate::config::IndexShape;
use crate::consts::*;
use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    Int,
    Float,
    Bool,
    /// Fixed width utf-8, zero padded
    Str { len: usize },
}

impl FieldType {
    pub fn width(&self) -> usize {
        match self {
            FieldType::Int | FieldType::Float => 8,
            FieldType::Bool => 1,
            FieldType::Str { len } => *len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(flatten)]
    pub ty: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<FieldDef>,
}

impl Schema {
    pub fn new(fields: Vec<FieldDef>) -> Result<Self> {
        let schema = Schema { fields };
        schema.validate()?;
        Ok(schema)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(IndexError::Schema("schema has no fields".into()));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(IndexError::Schema("empty field name".into()));
            }
            if field.name == DELETED_FIELD {
                return Err(IndexError::Schema(format!(
                    "field name {DELETED_FIELD:?} is reserved"
                )));
            }
            if let FieldType::Str { len: 0 } = field.ty {
                return Err(IndexError::Schema(format!(
                    "string field {} needs a positive width",
                    field.name
                )));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(IndexError::Schema(format!(
                    "duplicate field {}",
                    field.name
                )));
            }
        }
        Ok(())
    }

    /// Derives the fixed binary layout of one record slot
    pub fn layout(&self) -> RecordLayout {
        let mut offset = RECORD_FLAGS_SIZE;
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            fields.push(FieldSlot {
                name: field.name.clone(),
                ty: field.ty,
                offset,
            });
            offset += field.ty.width();
        }
        RecordLayout {
            fields,
            record_size: offset,
        }
    }
}

/// Parses `id:int,name:str(20),score:float,active:bool`
impl FromStr for Schema {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = vec![];
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, ty) = part
                .split_once(':')
                .ok_or_else(|| IndexError::Config(format!("expected name:type, got {part:?}")))?;
            let ty = match ty.trim().to_ascii_lowercase().as_str() {
                "int" => FieldType::Int,
                "float" => FieldType::Float,
                "bool" => FieldType::Bool,
                other => {
                    let len = other
                        .strip_prefix("str(")
                        .and_then(|rest| rest.strip_suffix(')'))
                        .and_then(|len| len.parse::<usize>().ok())
                        .ok_or_else(|| IndexError::Config(format!("unknown field type {other:?}")))?;
                    FieldType::Str { len }
                }
            };
            fields.push(FieldDef {
                name: name.trim().to_string(),
                ty,
            });
        }
        Schema::new(fields)
    }
}

/// Leading flag byte of every record slot
pub const RECORD_FLAGS_SIZE: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    pub name: String,
    pub ty: FieldType,
    pub offset: usize,
}

/// Fixed binary layout of a record slot
///
/// ## Binary layout
///
/// - First byte holds the flags, bit 0 set for any real record, bit 1 set when soft-deleted
/// - Followed by each field in schema order at its fixed width
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    pub fields: Vec<FieldSlot>,
    pub record_size: usize,
}

/// What an index file carries ahead of its header
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaBlob {
    pub schema: Schema,
    /// `None` for files written before the shape was kept alongside the schema
    pub shape: Option<IndexShape>,
    /// Length of the serialized blob, without its length prefix
    pub len: u64,
}

/// JSON form of the blob, the schema fields with the shape next to them
#[derive(Serialize, Deserialize)]
struct StoredBlob {
    #[serde(flatten)]
    schema: Schema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<IndexShape>,
}

/// Reads the schema blob from the front of an index file
///
/// Returns `None` if the file doesn't exist or doesn't start with a complete
/// blob.
pub fn read_schema_blob(path: &Path) -> Result<Option<SchemaBlob>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut len_buf = [0_u8; SCHEMA_LEN_PREFIX];
    if let Err(e) = file.read_exact(&mut len_buf) {
        if e.kind() == ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(e.into());
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len == 0 {
        return Ok(None);
    }

    let mut blob = vec![0; len];
    if let Err(e) = file.read_exact(&mut blob) {
        if e.kind() == ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(e.into());
    }

    let stored: StoredBlob = serde_json::from_slice(&blob)
        .map_err(|e| IndexError::Corrupt(format!("unreadable schema blob: {e}")))?;
    stored.schema.validate()?;
    Ok(Some(SchemaBlob {
        schema: stored.schema,
        shape: stored.index,
        len: len as u64,
    }))
}

/// The schema and blob length alone
pub fn read_schema(path: &Path) -> Result<Option<(Schema, u64)>> {
    Ok(read_schema_blob(path)?.map(|blob| (blob.schema, blob.len)))
}

/// Truncates the file and writes the schema blob, returning its length
pub fn write_schema(path: &Path, schema: &Schema, shape: &IndexShape) -> Result<u64> {
    let stored = StoredBlob {
        schema: schema.clone(),
        index: Some(shape.clone()),
    };
    let blob = serde_json::to_vec(&stored)
        .map_err(|e| IndexError::Schema(format!("schema not serializable: {e}")))?;
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(&(blob.len() as u32).to_le_bytes())?;
    file.write_all(&blob)?;
    Ok(blob.len() as u64)
}
