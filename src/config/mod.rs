// src/config/mod.rs

//! Batch file loading and validation.
//!
//! - `model.rs`: the raw TOML data model.
//! - `loader.rs`: reading a file from disk.
//! - `validate.rs`: turning the raw model into a [`BatchConfig`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_CONFIG_FILE, load_and_validate, load_from_path};
pub use model::{CommandSection, RawConfigFile};
pub use validate::BatchConfig;
