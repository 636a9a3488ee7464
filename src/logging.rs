use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{IndexError, Result};

/// Installs the global fmt subscriber, `level` is an env-filter directive
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| IndexError::Config(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| IndexError::Config("logging already initialized".into()))
}
