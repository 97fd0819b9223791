// src/config/validate.rs

use std::collections::BTreeSet;

use crate::config::model::RawConfigFile;
use crate::errors::{BatchError, Result};
use crate::exec::TemplateCommandBuilder;
use crate::runs::{ParameterSource, Parameters, Run};

/// A batch file that passed semantic validation.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub parameters: Parameters,
    pub command: TemplateCommandBuilder,
    pub runs: Vec<Run>,
}

impl TryFrom<RawConfigFile> for BatchConfig {
    type Error = BatchError;

    /// Checks:
    /// - `run_args` is present and a list of strings
    /// - `async_runs`, `flags`, `cancel_exit_code` and the millisecond
    ///   settings are well formed when present
    /// - `output_dir`, when set, exists
    /// - `command.program` is non-empty
    /// - every `[[run]]` supplies exactly the `run_args` keys
    fn try_from(raw: RawConfigFile) -> Result<Self> {
        let RawConfigFile {
            parameters,
            command,
            run,
        } = raw;

        let required = validate_parameters(&parameters)?;
        validate_runs(&run, &required)?;
        let command = TemplateCommandBuilder::new(command.program, command.args)?;

        Ok(BatchConfig {
            parameters,
            command,
            runs: run.iter().map(|r| r.ordered_by(&required)).collect(),
        })
    }
}

fn validate_parameters(parameters: &Parameters) -> Result<Vec<String>> {
    let required = parameters.run_args()?;
    if required.is_empty() {
        return Err(BatchError::ConfigError(
            "[parameters].run_args must name at least one key".to_string(),
        ));
    }

    parameters.async_runs()?;
    parameters.flags()?;
    parameters.cancel_exit_code()?;
    parameters.poll_interval()?;
    parameters.interrupt_grace()?;

    if let Some(dir) = parameters.output_dir()? {
        if !dir.is_dir() {
            return Err(BatchError::ConfigError(format!(
                "[parameters].output_dir {dir:?} does not exist"
            )));
        }
    }

    Ok(required)
}

fn validate_runs(runs: &[Run], required: &[String]) -> Result<()> {
    let required: BTreeSet<&str> = required.iter().map(String::as_str).collect();
    for (i, run) in runs.iter().enumerate() {
        let keys = run.key_set();
        if keys != required {
            let missing: Vec<_> = required.difference(&keys).collect();
            let unexpected: Vec<_> = keys.difference(&required).collect();
            return Err(BatchError::ConfigError(format!(
                "[[run]] #{} ({run}): missing {missing:?}, unexpected {unexpected:?}",
                i + 1
            )));
        }
    }
    Ok(())
}
