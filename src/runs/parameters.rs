// src/runs/parameters.rs

//! Shared, read-only batch configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use toml::Value;

use crate::errors::{BatchError, Result};

/// Default upper bound on concurrently running workers.
pub const DEFAULT_ASYNC_RUNS: usize = 1;

/// Exit code a child uses to report that it stopped because it was
/// interrupted (128 + SIGINT, as shells report it).
pub const DEFAULT_CANCEL_EXIT_CODE: i32 = 130;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_INTERRUPT_GRACE: Duration = Duration::from_secs(10);

/// Capability the registry and controller need from the batch configuration.
pub trait ParameterSource: Send + Sync {
    /// The keys every staged `Run` must supply, in order.
    fn run_args(&self) -> Result<Vec<String>>;

    /// The full parameter bag.
    fn parameters(&self) -> &Parameters;
}

/// Key/value configuration for one batch.
///
/// Keys are kept sorted. A handful of keys have meaning to the executor
/// (`run_args`, `flags`, `async_runs`, `output_dir`, `cancel_exit_code`,
/// `poll_interval_ms`, `interrupt_grace_ms`); everything else is free-form and
/// available to command builders.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    values: BTreeMap<String, Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `base` and overlay `overrides` on top of it. Later keys win.
    pub fn overlay<K, V, I>(base: &Parameters, overrides: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut values = base.values.clone();
        for (key, value) in overrides {
            values.insert(key.into(), value.into());
        }
        Self { values }
    }

    /// Builder-style insert, used when assembling parameters in code.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Render a scalar parameter as text, for templating.
    pub fn scalar(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(scalar_to_string)
    }

    /// Optional engine flags. Absent means no flags.
    pub fn flags(&self) -> Result<Vec<String>> {
        match self.values.get("flags") {
            None => Ok(Vec::new()),
            Some(value) => string_list(value, "flags"),
        }
    }

    /// Concurrency bound for one invocation.
    pub fn async_runs(&self) -> Result<usize> {
        match self.values.get("async_runs") {
            None => Ok(DEFAULT_ASYNC_RUNS),
            Some(Value::Integer(n)) if *n >= 1 => Ok(*n as usize),
            Some(other) => Err(BatchError::ConfigError(format!(
                "async_runs must be an integer >= 1 (got {other})"
            ))),
        }
    }

    /// Directory the default file sink writes into; `None` means the current
    /// working directory.
    pub fn output_dir(&self) -> Result<Option<PathBuf>> {
        match self.values.get("output_dir") {
            None => Ok(None),
            Some(Value::String(dir)) => Ok(Some(PathBuf::from(dir))),
            Some(other) => Err(BatchError::ConfigError(format!(
                "output_dir must be a string path (got {other})"
            ))),
        }
    }

    pub fn cancel_exit_code(&self) -> Result<i32> {
        match self.values.get("cancel_exit_code") {
            None => Ok(DEFAULT_CANCEL_EXIT_CODE),
            Some(Value::Integer(code)) => i32::try_from(*code).map_err(|_| {
                BatchError::ConfigError(format!("cancel_exit_code out of range: {code}"))
            }),
            Some(other) => Err(BatchError::ConfigError(format!(
                "cancel_exit_code must be an integer (got {other})"
            ))),
        }
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        self.millis("poll_interval_ms", DEFAULT_POLL_INTERVAL)
    }

    pub fn interrupt_grace(&self) -> Result<Duration> {
        self.millis("interrupt_grace_ms", DEFAULT_INTERRUPT_GRACE)
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration> {
        match self.values.get(key) {
            None => Ok(default),
            Some(Value::Integer(ms)) if *ms >= 0 => Ok(Duration::from_millis(*ms as u64)),
            Some(other) => Err(BatchError::ConfigError(format!(
                "{key} must be a non-negative integer (got {other})"
            ))),
        }
    }
}

impl ParameterSource for Parameters {
    fn run_args(&self) -> Result<Vec<String>> {
        match self.values.get("run_args") {
            Some(value) => string_list(value, "run_args"),
            None => Err(BatchError::ConfigError(
                "parameters do not define `run_args`; cannot validate runs".to_string(),
            )),
        }
    }

    fn parameters(&self) -> &Parameters {
        self
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Parameters::overlay(&Parameters::default(), iter)
    }
}

impl std::fmt::Display for Parameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        write!(f, "}}")
    }
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_list(value: &Value, key: &str) -> Result<Vec<String>> {
    let Value::Array(items) = value else {
        return Err(BatchError::ConfigError(format!(
            "{key} must be a list of strings (got {value})"
        )));
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(BatchError::ConfigError(format!(
                "{key} must only contain strings (found {other})"
            ))),
        })
        .collect()
}
