// src/engine/mod.rs

//! Orchestration engine for batchrun.
//!
//! The [`ExecutionController`] owns the run registry, expands runs × run
//! numbers into workers, feeds them to an
//! [`ExecutionQueue`](crate::exec::ExecutionQueue) and tracks the batch state
//! machine:
//!
//! ```text
//! Idle -> Running -> (Cancelling) -> Idle
//! ```

pub mod controller;

pub use controller::{BatchHandle, ExecutionController, PlannedRun, StopHandle};

/// Lifecycle state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    /// No batch in flight. Initial and terminal state.
    #[default]
    Idle,
    /// A batch is admitting and/or draining workers.
    Running,
    /// Stop was requested; in-flight workers are being interrupted and
    /// drained.
    Cancelling,
}

/// Summary of a drained batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Workers planned (runs × run numbers).
    pub planned: usize,
    /// Workers that were admitted and started.
    pub admitted: usize,
    pub succeeded: usize,
    pub cancelled: usize,
}

impl BatchReport {
    /// Workers never admitted because the batch was stopped.
    pub fn skipped(&self) -> usize {
        self.planned - self.admitted
    }
}
