// src/config/model.rs

use serde::Deserialize;

use crate::runs::{Parameters, Run};

/// Batch file as read from TOML, before validation.
///
/// ```toml
/// [parameters]
/// run_args = ["scenario", "event"]
/// async_runs = 2
/// flags = ["-b"]
/// exec_path = "/opt/engine"
///
/// [command]
/// program = "{exec_path}/engine"
/// args = ["{flags}", "{run_args}", "model_{run_number}.tcf"]
///
/// [[run]]
/// scenario = "DES"
/// event = "M60"
/// ```
///
/// `[parameters]` is free-form: any key is kept and may be referenced from
/// the command templates.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub parameters: Parameters,

    pub command: CommandSection,

    /// All `[[run]]` tables, in file order.
    #[serde(default)]
    pub run: Vec<Run>,
}

/// `[command]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSection {
    /// Executable to launch; may contain `{key}` placeholders.
    pub program: String,

    /// Argument templates. `"{flags}"` and `"{run_args}"` expand to zero or
    /// more arguments.
    #[serde(default = "default_command_args")]
    pub args: Vec<String>,
}

fn default_command_args() -> Vec<String> {
    vec!["{flags}".to_string(), "{run_args}".to_string()]
}
