//! A disk backed extendible hash index.
//!
//! Records are grouped into fixed size bucket pages in a single file. A
//! directory of 2^global_depth page pointers addresses them by the low bits
//! of the key's hash, growing by doubling when a bucket's overflow chain gets
//! too long and shrinking again as emptied buckets merge back into their
//! buddies.

mod bucket;
mod bytes;
mod command;
mod config;
mod consts;
mod directory;
mod error;
mod execute;
mod hash_storage;
mod hashing;
mod layout;
mod logging;
mod parse;
pub mod record;
mod repl;
mod schema;
mod setup;
mod stdin;

pub use bucket::{Bucket, BucketHeader};
pub use command::*;
pub use config::{CorruptionPolicy, HashFunction, IndexOptions, IndexShape};
pub use consts::{BUCKET_SIZE, DEFAULT_KEY_FIELD, INITIAL_MAX_CHAIN};
pub use directory::Directory;
pub use error::{IndexError, Result};
pub use execute::execute_command;
pub use hash_storage::{HashStorage, IndexStats, VerifyReport};
pub use hashing::{hash_key, prefix_at_depth};
pub use layout::PageLayout;
pub use logging::init_logging;
pub use record::{Fields, Record, Value};
pub use repl::*;
pub use schema::{
    read_schema, read_schema_blob, FieldDef, FieldType, RecordLayout, Schema, SchemaBlob,
};
pub use setup::*;
pub use stdin::*;
