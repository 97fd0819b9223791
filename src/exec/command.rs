// src/exec/command.rs

//! Turning a (parameters, run, run number) triple into an argument vector.

use std::fmt::Debug;

use regex::Regex;

use crate::errors::{BatchError, Result};
use crate::runs::{Parameters, Run};

/// Builds the argument vector for one worker. `argv[0]` is the program.
///
/// Implementations must be pure: the controller calls this for every
/// planned worker before anything is spawned.
pub trait CommandBuilder: Send + Sync + Debug {
    fn build_command(
        &self,
        parameters: &Parameters,
        run: &Run,
        flags: &[String],
        run_number: Option<&str>,
    ) -> Result<Vec<String>>;
}

/// Template-driven builder.
///
/// `program` and each entry of `args` may contain `{key}` placeholders, which
/// resolve (in order) to the run's value for `key`, the run number for
/// `{run_number}` (empty when none), or a scalar parameter. Two whole-token
/// placeholders expand in place to zero or more arguments:
///
/// - `{flags}`: the batch flags
/// - `{run_args}`: the run as `-key value` pairs
#[derive(Debug, Clone)]
pub struct TemplateCommandBuilder {
    program: String,
    args: Vec<String>,
    placeholder: Regex,
}

impl TemplateCommandBuilder {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(BatchError::ConfigError(
                "command program must not be empty".to_string(),
            ));
        }

        let placeholder = Regex::new(r"\{([A-Za-z0-9_]+)\}")
            .map_err(|e| BatchError::Other(anyhow::Error::from(e)))?;

        Ok(Self {
            program,
            args,
            placeholder,
        })
    }

    fn render(
        &self,
        template: &str,
        parameters: &Parameters,
        run: &Run,
        run_number: Option<&str>,
    ) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;

        for caps in self.placeholder.captures_iter(template) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let key = key.as_str();

            let value = if let Some(v) = run.get(key) {
                v.to_string()
            } else if key == "run_number" {
                run_number.unwrap_or_default().to_string()
            } else if let Some(v) = parameters.scalar(key) {
                v
            } else {
                return Err(BatchError::ConfigError(format!(
                    "unknown placeholder '{{{key}}}' in command template '{template}'"
                )));
            };

            out.push_str(&template[last..whole.start()]);
            out.push_str(&value);
            last = whole.end();
        }

        out.push_str(&template[last..]);
        Ok(out)
    }
}

impl CommandBuilder for TemplateCommandBuilder {
    fn build_command(
        &self,
        parameters: &Parameters,
        run: &Run,
        flags: &[String],
        run_number: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut argv = vec![self.render(&self.program, parameters, run, run_number)?];

        for arg in &self.args {
            match arg.as_str() {
                "{flags}" => argv.extend(flags.iter().cloned()),
                "{run_args}" => argv.extend(run.to_args()),
                _ => argv.push(self.render(arg, parameters, run, run_number)?),
            }
        }

        Ok(argv)
    }
}
