use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::consts::*;
use crate::error::{IndexError, Result};

/// Which function turns a key into the bits used for addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashFunction {
    /// Sum of character codes for strings, the integer value for everything else
    #[default]
    Additive,
    /// xxHash64 over the key's bytes
    XxHash,
}

/// What to do when the header or directory can't be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptionPolicy {
    /// Throw away whatever is there and start over with an empty structure
    #[default]
    Reinitialize,
    /// Surface [IndexError::Corrupt] to the caller
    Fail,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    pub bucket_capacity: usize,
    pub initial_max_chain: usize,
    /// Field every record is placed by. Fixed for the lifetime of a file,
    /// records are rehashed by it on split and merge.
    pub key_field: String,
    pub hash: HashFunction,
    pub on_corrupt: CorruptionPolicy,
    pub max_global_depth: u32,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            bucket_capacity: BUCKET_SIZE,
            initial_max_chain: INITIAL_MAX_CHAIN,
            key_field: DEFAULT_KEY_FIELD.to_string(),
            hash: HashFunction::Additive,
            on_corrupt: CorruptionPolicy::Reinitialize,
            max_global_depth: DEFAULT_MAX_GLOBAL_DEPTH,
        }
    }
}

/// The options a file is built with
///
/// Page size, record placement and the highest depth a directory may have
/// reached all follow from these, so they are saved next to the schema and
/// win over whatever a later open asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexShape {
    pub bucket_capacity: usize,
    pub initial_max_chain: usize,
    pub key_field: String,
    pub hash: HashFunction,
    pub max_global_depth: u32,
}

impl IndexOptions {
    /// Fails on a corrupt header instead of reinitializing
    pub fn strict() -> Self {
        Self {
            on_corrupt: CorruptionPolicy::Fail,
            ..Self::default()
        }
    }

    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self
    }

    pub fn with_hash(mut self, hash: HashFunction) -> Self {
        self.hash = hash;
        self
    }

    pub fn shape(&self) -> IndexShape {
        IndexShape {
            bucket_capacity: self.bucket_capacity,
            initial_max_chain: self.initial_max_chain,
            key_field: self.key_field.clone(),
            hash: self.hash,
            max_global_depth: self.max_global_depth,
        }
    }

    /// Replaces the file-shaping options, keeping the rest
    pub fn with_shape(self, shape: IndexShape) -> Self {
        Self {
            bucket_capacity: shape.bucket_capacity,
            initial_max_chain: shape.initial_max_chain,
            key_field: shape.key_field,
            hash: shape.hash,
            max_global_depth: shape.max_global_depth,
            ..self
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: Self = toml::from_str(text).map_err(|e| IndexError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket_capacity == 0 {
            return Err(IndexError::Config("bucket_capacity must be at least 1".into()));
        }
        if self.initial_max_chain == 0 {
            return Err(IndexError::Config(
                "initial_max_chain must be at least 1".into(),
            ));
        }
        if self.key_field.is_empty() || self.key_field == DELETED_FIELD {
            return Err(IndexError::Config(format!(
                "invalid key field {:?}",
                self.key_field
            )));
        }
        // Directory indices and page indices are stored as 4 byte signed integers
        if !(MIN_GLOBAL_DEPTH..=30).contains(&self.max_global_depth) {
            return Err(IndexError::Config(format!(
                "max_global_depth must be within {MIN_GLOBAL_DEPTH}..=30, got {}",
                self.max_global_depth
            )));
        }
        Ok(())
    }
}
