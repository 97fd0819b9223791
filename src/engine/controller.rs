// src/engine/controller.rs

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{BatchError, Result};
use crate::exec::{CommandBuilder, ExecutionQueue, ExitPolicy, ProcessWorker};
use crate::runs::{ParameterSource, Parameters, Run, RunRegistry};
use crate::sink::{FileSinkFactory, SinkFactory};

use super::{BatchReport, ControllerState};

/// One planned (run, run number) execution with its command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRun {
    pub label: String,
    pub run: Run,
    pub run_number: Option<String>,
    pub argv: Vec<String>,
}

/// State shared between the controller, its stop handles, and the
/// orchestration task of the current batch.
#[derive(Debug, Default)]
struct Shared {
    active: Mutex<Active>,
}

#[derive(Debug, Default)]
struct Active {
    state: ControllerState,
    cancel: Option<CancellationToken>,
    queue: Option<Arc<ExecutionQueue>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Active> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> ControllerState {
        self.lock().state
    }

    fn stop(&self) {
        let mut active = self.lock();
        if active.state != ControllerState::Running {
            debug!(state = ?active.state, "stop requested while not running; ignoring");
            return;
        }

        info!("stop requested; interrupting running workers");
        active.state = ControllerState::Cancelling;
        if let Some(cancel) = &active.cancel {
            cancel.cancel();
        }
        if let Some(queue) = &active.queue {
            queue.terminate();
        }
    }
}

/// Returns the controller to Idle when the batch ends, on every path
/// (drained, failed to plan, or orchestration task dropped).
struct IdleGuard {
    shared: Arc<Shared>,
}

impl Drop for IdleGuard {
    fn drop(&mut self) {
        let mut active = self.shared.lock();
        active.state = ControllerState::Idle;
        active.cancel = None;
        active.queue = None;
    }
}

/// Cloneable handle that can stop the controller's current batch from any
/// context (signal handler, UI, another task).
#[derive(Debug, Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn state(&self) -> ControllerState {
        self.shared.state()
    }
}

/// Joinable handle to a batch started with [`ExecutionController::start`].
#[derive(Debug)]
pub struct BatchHandle {
    handle: JoinHandle<Result<BatchReport>>,
}

impl BatchHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the batch to drain and surface its first error, if any.
    pub async fn wait(self) -> Result<BatchReport> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(BatchError::WorkerPanic(format!("batch task: {e}"))),
        }
    }
}

/// Owns a batch: its parameters, staged runs, command builder and sinks.
pub struct ExecutionController {
    source: Arc<dyn ParameterSource>,
    registry: RunRegistry,
    builder: Arc<dyn CommandBuilder>,
    sinks: Arc<dyn SinkFactory>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ExecutionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionController")
            .field("parameters", self.source.parameters())
            .field("runs", &self.registry.len())
            .field("sinks", &self.sinks)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ExecutionController {
    /// Create a controller writing one output file per run into the
    /// `output_dir` parameter (or the working directory).
    ///
    /// Fails if the configured output directory does not exist.
    pub fn new<P, B>(source: P, builder: B) -> Result<Self>
    where
        P: ParameterSource + 'static,
        B: CommandBuilder + 'static,
    {
        let sinks = FileSinkFactory::new(source.parameters().output_dir()?)?;
        Ok(Self {
            source: Arc::new(source),
            registry: RunRegistry::new(),
            builder: Arc::new(builder),
            sinks: Arc::new(sinks),
            shared: Arc::new(Shared::default()),
        })
    }

    /// Replace the output strategy.
    pub fn with_sinks(mut self, sinks: impl SinkFactory + 'static) -> Self {
        self.sinks = Arc::new(sinks);
        self
    }

    pub fn parameters(&self) -> &Parameters {
        self.source.parameters()
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Stage runs. Each must supply exactly the parameter source's run
    /// arguments; duplicates are ignored.
    pub fn stage<I>(&mut self, runs: I) -> Result<()>
    where
        I: IntoIterator<Item = Run>,
    {
        let required = self.source.run_args()?;
        self.registry.stage(runs, &required)
    }

    /// Stage every run of another registry.
    pub fn inherit(&mut self, other: &RunRegistry) -> Result<()> {
        let required = self.source.run_args()?;
        self.registry.absorb(other, &required)
    }

    pub fn get_runs<S: AsRef<str>>(&self, values: &[S], match_any: bool) -> Vec<&Run> {
        self.registry.get_runs(values, match_any)
    }

    pub fn remove_runs<'a, I>(&mut self, runs: I)
    where
        I: IntoIterator<Item = &'a Run>,
    {
        self.registry.remove_runs(runs)
    }

    pub fn state(&self) -> ControllerState {
        self.shared.state()
    }

    /// True when no batch is in flight.
    pub fn done(&self) -> bool {
        self.state() == ControllerState::Idle
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Request cancellation of the running batch. No-op when idle.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn pause(&self) -> Result<()> {
        Err(BatchError::NotImplemented("pause"))
    }

    pub fn resume(&self) -> Result<()> {
        Err(BatchError::NotImplemented("resume"))
    }

    /// Expand staged runs × run numbers into command lines, in admission
    /// order. With no run numbers, each run is planned once without one.
    pub fn plan<S: AsRef<str>>(&self, run_numbers: &[S]) -> Result<Vec<PlannedRun>> {
        let parameters = self.source.parameters();
        let flags = parameters.flags()?;

        let run_numbers: Vec<Option<String>> = if run_numbers.is_empty() {
            vec![None]
        } else {
            run_numbers
                .iter()
                .map(|rn| Some(rn.as_ref().to_string()))
                .collect()
        };

        let mut planned = Vec::with_capacity(self.registry.len() * run_numbers.len());
        for run in &self.registry {
            for rn in &run_numbers {
                let argv = self
                    .builder
                    .build_command(parameters, run, &flags, rn.as_deref())?;
                planned.push(PlannedRun {
                    label: run.label(rn.as_deref()),
                    run: run.clone(),
                    run_number: rn.clone(),
                    argv,
                });
            }
        }

        Ok(planned)
    }

    /// Run the batch and wait for it to drain.
    ///
    /// Returns `Ok(None)` without doing anything if a batch is already in
    /// flight. Otherwise returns the report, or the first worker error once
    /// every worker has been reaped.
    pub async fn run<S: AsRef<str>>(&self, run_numbers: &[S]) -> Result<Option<BatchReport>> {
        match self.start(run_numbers)? {
            Some(handle) => handle.wait().await.map(Some),
            None => Ok(None),
        }
    }

    /// Start the batch on a background task and return immediately.
    ///
    /// Every command line and output sink is created before the first
    /// process is spawned, so configuration problems are reported here.
    /// Returns `Ok(None)` if a batch is already in flight.
    pub fn start<S: AsRef<str>>(&self, run_numbers: &[S]) -> Result<Option<BatchHandle>> {
        let cancel = CancellationToken::new();
        {
            let mut active = self.shared.lock();
            if active.state != ControllerState::Idle {
                warn!(state = ?active.state, "batch already in flight; ignoring run request");
                return Ok(None);
            }
            active.state = ControllerState::Running;
            active.cancel = Some(cancel.clone());
            active.queue = None;
        }
        let idle = IdleGuard {
            shared: Arc::clone(&self.shared),
        };

        let parameters = self.source.parameters();
        let capacity = parameters.async_runs()?;
        let poll_interval = parameters.poll_interval()?;
        let policy = ExitPolicy {
            cancel_exit_code: parameters.cancel_exit_code()?,
            interrupt_grace: parameters.interrupt_grace()?,
        };

        let workers = self
            .plan(run_numbers)?
            .into_iter()
            .map(|p| {
                let sink = self.sinks.create(&p.run, p.run_number.as_deref())?;
                Ok(ProcessWorker::new(p.label, p.argv, sink, policy))
            })
            .collect::<Result<Vec<_>>>()?;

        let queue = Arc::new(ExecutionQueue::new(capacity, poll_interval, cancel));
        self.shared.lock().queue = Some(Arc::clone(&queue));

        let handle = tokio::spawn(orchestrate(workers, queue, idle));
        Ok(Some(BatchHandle { handle }))
    }
}

/// Feed every worker to the queue in order, then drain it.
///
/// Admission stops at the first cancellation; the queue is still drained
/// fully before the controller returns to Idle (when `idle` drops).
async fn orchestrate(
    workers: Vec<ProcessWorker>,
    queue: Arc<ExecutionQueue>,
    idle: IdleGuard,
) -> Result<BatchReport> {
    let planned = workers.len();
    info!(planned, capacity = queue.capacity(), "starting batch");

    let mut admission_error = None;
    for worker in workers {
        let label = worker.label().to_string();
        match queue.admit(worker).await {
            Ok(()) => info!(label = %label, "executing"),
            Err(BatchError::Cancelled) => {
                info!("batch cancelled; no further runs will be admitted");
                break;
            }
            Err(e) => {
                warn!(label = %label, error = %e, "failed to admit worker; stopping batch");
                queue.terminate();
                admission_error = Some(e);
                break;
            }
        }
    }

    let drained = queue.wait_all().await;
    drop(idle);

    let drained = drained?;
    if let Some(e) = admission_error {
        return Err(e);
    }

    let report = BatchReport {
        planned,
        admitted: drained.admitted,
        succeeded: drained.succeeded,
        cancelled: drained.cancelled,
    };
    info!(
        planned = report.planned,
        succeeded = report.succeeded,
        cancelled = report.cancelled,
        skipped = report.skipped(),
        "all runs complete"
    );
    Ok(report)
}
