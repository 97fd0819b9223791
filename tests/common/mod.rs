#![allow(dead_code)]

use std::error::Error;

pub use batchrun_test_utils::builders::{
    BatchFileBuilder, ParametersBuilder, abc_parameters, run, run_abc,
};
pub use batchrun_test_utils::fake_command::ScriptCommandBuilder;
pub use batchrun_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;
