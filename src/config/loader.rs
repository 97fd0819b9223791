// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::RawConfigFile;
use crate::config::validate::BatchConfig;
use crate::errors::{BatchError, Result};

/// Batch file used when `--config` is not given, relative to the working
/// directory.
pub const DEFAULT_CONFIG_FILE: &str = "Batchrun.toml";

/// Read and deserialize a batch file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        BatchError::ConfigError(format!("reading config file at {path:?}: {e}"))
    })?;

    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(?path, runs = config.run.len(), "config file parsed");
    Ok(config)
}

/// Read, deserialize and validate a batch file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<BatchConfig> {
    BatchConfig::try_from(load_from_path(path)?)
}
