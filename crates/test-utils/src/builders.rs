use std::path::Path;

use batchrun::runs::{Parameters, Run};

/// Builder for `Parameters` to simplify test setup.
pub struct ParametersBuilder {
    params: Parameters,
}

impl ParametersBuilder {
    /// Parameters requiring exactly `run_args` from every run.
    pub fn new(run_args: &[&str]) -> Self {
        Self {
            params: Parameters::new().with("run_args", run_args.to_vec()),
        }
    }

    pub fn async_runs(mut self, n: i64) -> Self {
        self.params = self.params.with("async_runs", n);
        self
    }

    pub fn flags(mut self, flags: &[&str]) -> Self {
        self.params = self.params.with("flags", flags.to_vec());
        self
    }

    pub fn output_dir(mut self, dir: &Path) -> Self {
        self.params = self
            .params
            .with("output_dir", dir.to_string_lossy().into_owned());
        self
    }

    pub fn cancel_exit_code(mut self, code: i64) -> Self {
        self.params = self.params.with("cancel_exit_code", code);
        self
    }

    pub fn poll_interval_ms(mut self, ms: i64) -> Self {
        self.params = self.params.with("poll_interval_ms", ms);
        self
    }

    pub fn interrupt_grace_ms(mut self, ms: i64) -> Self {
        self.params = self.params.with("interrupt_grace_ms", ms);
        self
    }

    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.params = self.params.with(key, value);
        self
    }

    pub fn build(self) -> Parameters {
        self.params
    }
}

/// `Run` from `(key, value)` pairs, in order.
pub fn run(pairs: &[(&str, &str)]) -> Run {
    pairs.iter().copied().collect()
}

/// The canonical `{a, b, c}` parameters used across tests.
pub fn abc_parameters() -> ParametersBuilder {
    ParametersBuilder::new(&["a", "b", "c"])
}

/// `{a: x, b: y, c: z}`.
pub fn run_abc(a: &str, b: &str, c: &str) -> Run {
    run(&[("a", a), ("b", b), ("c", c)])
}

/// Builder for batch file TOML text.
pub struct BatchFileBuilder {
    parameters: Vec<String>,
    program: String,
    args: Vec<String>,
    runs: Vec<Vec<(String, String)>>,
}

impl BatchFileBuilder {
    pub fn new(run_args: &[&str]) -> Self {
        Self {
            parameters: vec![format!("run_args = {}", toml_list(run_args))],
            program: "echo".to_string(),
            args: vec!["{run_args}".to_string()],
            runs: Vec::new(),
        }
    }

    /// Raw `key = value` line for `[parameters]`; `value` is TOML.
    pub fn parameter(mut self, key: &str, value: &str) -> Self {
        self.parameters.push(format!("{key} = {value}"));
        self
    }

    pub fn command(mut self, program: &str, args: &[&str]) -> Self {
        self.program = program.to_string();
        self.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn run(mut self, pairs: &[(&str, &str)]) -> Self {
        self.runs.push(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn build(self) -> String {
        let mut out = String::from("[parameters]\n");
        for line in &self.parameters {
            out.push_str(line);
            out.push('\n');
        }

        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        out.push_str("\n[command]\n");
        out.push_str(&format!("program = {:?}\n", self.program));
        out.push_str(&format!("args = {}\n", toml_list(&args)));

        for run in &self.runs {
            out.push_str("\n[[run]]\n");
            for (k, v) in run {
                out.push_str(&format!("{k} = {v:?}\n"));
            }
        }
        out
    }
}

fn toml_list(items: &[&str]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("{s:?}")).collect();
    format!("[{}]", quoted.join(", "))
}
