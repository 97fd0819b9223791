use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use batchrun::errors::Result;
use batchrun::exec::CommandBuilder;
use batchrun::runs::{Parameters, Run};

/// A fake command builder that:
/// - runs a `sh -c` script chosen per run label (or a default script)
/// - records the label of every command it built, in order.
///
/// Unix only, since it shells out to `sh`.
#[derive(Debug, Clone)]
pub struct ScriptCommandBuilder {
    default_script: String,
    scripts: HashMap<String, String>,
    built: Arc<Mutex<Vec<String>>>,
}

impl ScriptCommandBuilder {
    pub fn new(default_script: &str) -> Self {
        Self {
            default_script: default_script.to_string(),
            scripts: HashMap::new(),
            built: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Use `script` for the worker labelled `label` (see `Run::label`).
    pub fn script_for(mut self, label: &str, script: &str) -> Self {
        self.scripts.insert(label.to_string(), script.to_string());
        self
    }

    /// Labels of all commands built so far.
    pub fn built(&self) -> Vec<String> {
        self.built.lock().unwrap().clone()
    }
}

impl CommandBuilder for ScriptCommandBuilder {
    fn build_command(
        &self,
        _parameters: &Parameters,
        run: &Run,
        _flags: &[String],
        run_number: Option<&str>,
    ) -> Result<Vec<String>> {
        let label = run.label(run_number);
        let script = self
            .scripts
            .get(&label)
            .unwrap_or(&self.default_script)
            .clone();
        self.built.lock().unwrap().push(label);
        Ok(vec!["sh".to_string(), "-c".to_string(), script])
    }
}
