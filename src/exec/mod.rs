// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] defines the [`CommandBuilder`] seam that turns a run into an
//!   argument vector, plus a template-driven implementation.
//! - [`worker`] supervises one external process with `tokio::process`.
//! - [`queue`] admits up to N workers at a time, drains them, and terminates
//!   them on cancellation.

pub mod command;
pub mod queue;
pub mod worker;

pub use command::{CommandBuilder, TemplateCommandBuilder};
pub use queue::{ExecutionQueue, QueueReport};
pub use worker::{ExitPolicy, ProcessWorker, WorkerOutcome};
