use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt index structure: {0}")]
    Corrupt(String),
    #[error("schema violation: {0}")]
    Schema(String),
    #[error("record codec error: {0}")]
    Codec(String),
    #[error("no schema stored in {}", .0.display())]
    MissingSchema(PathBuf),
    #[error("invalid configuration: {0}")]
    Config(String),
}
