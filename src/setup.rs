use clap::Parser;
use std::path::PathBuf;

use crate::config::IndexOptions;
use crate::consts::*;
use crate::error::Result;
use crate::hash_storage::HashStorage;
use crate::schema::Schema;

/// Disk backed extendible hash index shell
#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Index file, created when it doesn't exist yet
    #[arg(long, default_value = DEFAULT_HASH_DB_FILE)]
    pub file: PathBuf,

    /// Schema for a new file, e.g. `id:int,name:str(20)`. Ignored when the
    /// file already has one.
    #[arg(long, default_value = DEFAULT_SCHEMA)]
    pub schema: String,

    /// TOML file with index options
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Field records are indexed by, overrides the config file
    #[arg(long)]
    pub key: Option<String>,

    /// Interactive prompt instead of reading commands from stdin
    #[arg(long)]
    pub repl: bool,

    #[arg(long, env = "HASH_INDEX_LOG", default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    pub fn options(&self) -> Result<IndexOptions> {
        let mut options = match &self.config {
            Some(path) => IndexOptions::from_toml_file(path)?,
            None => IndexOptions::default(),
        };
        if let Some(key) = &self.key {
            options.key_field = key.clone();
        }
        options.validate()?;
        Ok(options)
    }
}

/// Opens the index described by the command line
pub fn setup_db(cli: &Cli) -> Result<HashStorage> {
    let schema: Schema = cli.schema.parse()?;
    HashStorage::open_or_create(&cli.file, &schema, cli.options()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashFunction;

    #[test]
    fn cli_builds_an_index_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cli.db");
        let config = dir.path().join("index.toml");
        std::fs::write(&config, "bucket_capacity = 4\nkey_field = \"id\"\n").unwrap();

        let cli = Cli::parse_from([
            "silly_hash_index",
            "--file",
            file.to_str().unwrap(),
            "--schema",
            "code:str(8),id:int",
            "--config",
            config.to_str().unwrap(),
            "--key",
            "code",
        ]);
        let storage = setup_db(&cli).unwrap();
        assert_eq!(storage.key_field(), "code");
        assert_eq!(storage.options().bucket_capacity, 4);
    }

    #[test]
    fn second_run_without_config_reuses_the_stored_options() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cli.db");
        let config = dir.path().join("index.toml");
        std::fs::write(&config, "bucket_capacity = 4\nhash = \"xxhash\"\n").unwrap();
        let file_arg = file.to_str().unwrap();

        let first = Cli::parse_from([
            "silly_hash_index",
            "--file",
            file_arg,
            "--config",
            config.to_str().unwrap(),
        ]);
        let mut storage = setup_db(&first).unwrap();
        for id in 0..12_i64 {
            storage
                .insert(crate::fields! {"id" => id, "value" => format!("v{id}")})
                .unwrap();
        }
        drop(storage);

        let second = Cli::parse_from(["silly_hash_index", "--file", file_arg]);
        let mut storage = setup_db(&second).unwrap();
        assert_eq!(storage.options().bucket_capacity, 4);
        assert_eq!(storage.options().hash, HashFunction::XxHash);
        assert_eq!(storage.all_records().unwrap().len(), 12);
        assert_eq!(storage.find(&crate::record::Value::Int(7)).unwrap().len(), 1);
    }

    #[test]
    fn unknown_key_field_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cli.db");
        let cli = Cli::parse_from([
            "silly_hash_index",
            "--file",
            file.to_str().unwrap(),
            "--key",
            "missing",
        ]);
        assert!(setup_db(&cli).is_err());
    }
}
