// src/runs/mod.rs

//! Run specification types.
//!
//! - [`parameters`] holds the shared batch configuration and the
//!   [`ParameterSource`] seam that tells the registry which keys a run needs.
//! - [`run`] is one concrete combination of values.
//! - [`registry`] owns the ordered, deduplicated set of staged runs.

pub mod parameters;
pub mod registry;
pub mod run;

pub use parameters::{ParameterSource, Parameters};
pub use registry::RunRegistry;
pub use run::Run;
