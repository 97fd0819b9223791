// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    /// Malformed run, parameters, template or config file. Always raised
    /// before any process is spawned.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The child executable is missing or could not be spawned.
    #[error("Launch error: executable '{program}' cannot be started: {source}")]
    LaunchError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A child exited with a nonzero code that is not the cancellation code.
    #[error("Run failure: '{label}' exited with {}, check its output", describe_code(.code))]
    RunFailure { label: String, code: Option<i32> },

    /// Admission was refused because the batch is being cancelled.
    #[error("Cancelled")]
    Cancelled,

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// A supervising task panicked or was aborted before reporting.
    #[error("Worker task failed: {0}")]
    WorkerPanic(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("return code {code}"),
        None => "no return code (terminated by signal)".to_string(),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_failure_message_mentions_code() {
        let err = BatchError::RunFailure {
            label: "{a: 1}_01".to_string(),
            code: Some(3),
        };
        assert!(err.to_string().contains("return code 3"));

        let err = BatchError::RunFailure {
            label: "x".to_string(),
            code: None,
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
