// src/exec/worker.rs

//! Supervision of one external process.
//!
//! A [`ProcessWorker`] is created with a fixed argument vector and an output
//! sink. Once started it runs on its own Tokio task which:
//! - opens the sink, spawns the process, and streams stdout into the sink
//!   line by line (stderr is drained and logged at debug level)
//! - reacts to [`ProcessWorker::interrupt`] by sending SIGINT to the child's
//!   process group, then SIGKILL to the group once the grace period runs out
//! - classifies the exit status
//!
//! Errors are not raised on the worker's task. They become the task's result
//! and only surface when the worker is [joined](ProcessWorker::join).

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{BatchError, Result};
use crate::runs::parameters::{DEFAULT_CANCEL_EXIT_CODE, DEFAULT_INTERRUPT_GRACE};
use crate::sink::{OutputSink, SinkScope};

#[cfg(unix)]
const INTERRUPT_SIGNAL: i32 = libc::SIGINT;
#[cfg(not(unix))]
const INTERRUPT_SIGNAL: i32 = 2;

/// Terminal, non-error outcome of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Succeeded,
    Cancelled,
}

/// How exit statuses are classified and how long an interrupted child gets
/// before it is killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitPolicy {
    pub cancel_exit_code: i32,
    pub interrupt_grace: Duration,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            cancel_exit_code: DEFAULT_CANCEL_EXIT_CODE,
            interrupt_grace: DEFAULT_INTERRUPT_GRACE,
        }
    }
}

impl ExitPolicy {
    /// Classify a raw exit.
    ///
    /// - code 0: succeeded
    /// - the cancellation code, death by SIGINT, or any failure after we
    ///   delivered an interrupt: cancelled
    /// - anything else: `RunFailure`
    pub fn classify_exit(
        &self,
        label: &str,
        code: Option<i32>,
        signal: Option<i32>,
        interrupted: bool,
    ) -> Result<WorkerOutcome> {
        if code == Some(0) {
            return Ok(WorkerOutcome::Succeeded);
        }
        if code == Some(self.cancel_exit_code) || signal == Some(INTERRUPT_SIGNAL) || interrupted
        {
            return Ok(WorkerOutcome::Cancelled);
        }
        Err(BatchError::RunFailure {
            label: label.to_string(),
            code,
        })
    }

    fn classify(&self, label: &str, status: ExitStatus, interrupted: bool) -> Result<WorkerOutcome> {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        self.classify_exit(label, status.code(), signal, interrupted)
    }
}

/// One supervised external process.
pub struct ProcessWorker {
    label: String,
    argv: Vec<String>,
    sink: Option<Box<dyn OutputSink>>,
    policy: ExitPolicy,
    interrupt: CancellationToken,
    /// Set by the supervising task right before it signals the queue.
    finished: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<WorkerOutcome>>>,
}

impl fmt::Debug for ProcessWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessWorker")
            .field("label", &self.label)
            .field("argv", &self.argv)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl ProcessWorker {
    pub fn new(
        label: impl Into<String>,
        argv: Vec<String>,
        sink: Box<dyn OutputSink>,
        policy: ExitPolicy,
    ) -> Self {
        Self {
            label: label.into(),
            argv,
            sink: Some(sink),
            policy,
            interrupt: CancellationToken::new(),
            finished: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// Liveness check: true once the process has been reaped (or the
    /// supervising task died).
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
            || self.handle.as_ref().is_some_and(|h| h.is_finished())
    }

    /// Spawn the supervising task. `done` is notified when it completes.
    pub fn start(&mut self, done: Arc<Notify>) -> Result<()> {
        let Some(sink) = self.sink.take() else {
            return Err(BatchError::ConfigError(format!(
                "worker '{}' was already started",
                self.label
            )));
        };

        let label = self.label.clone();
        let argv = self.argv.clone();
        let policy = self.policy;
        let interrupt = self.interrupt.clone();
        let finished = Arc::clone(&self.finished);

        self.handle = Some(tokio::spawn(async move {
            let result = supervise(&label, &argv, sink, policy, interrupt).await;
            finished.store(true, Ordering::Release);
            done.notify_one();
            result
        }));

        Ok(())
    }

    /// Ask the process to stop. Returns immediately.
    pub fn interrupt(&self) {
        self.interrupt.cancel();
    }

    /// Wait for the worker and surface its deferred result.
    pub async fn join(mut self) -> Result<WorkerOutcome> {
        let Some(handle) = self.handle.take() else {
            return Err(BatchError::WorkerPanic(format!(
                "worker '{}' was never started",
                self.label
            )));
        };

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(BatchError::WorkerPanic(format!("worker '{}': {e}", self.label))),
        }
    }
}

async fn supervise(
    label: &str,
    argv: &[String],
    sink: Box<dyn OutputSink>,
    policy: ExitPolicy,
    interrupt: CancellationToken,
) -> Result<WorkerOutcome> {
    let Some((program, args)) = argv.split_first() else {
        return Err(BatchError::ConfigError(format!(
            "worker '{label}' has an empty command"
        )));
    };

    let mut scope = SinkScope::open(sink)?;

    if interrupt.is_cancelled() {
        debug!(label, "interrupted before launch; not spawning");
        scope.finish()?;
        return Ok(WorkerOutcome::Cancelled);
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group, so an interrupt reaches the whole process tree.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| BatchError::LaunchError {
        program: program.clone(),
        source,
    })?;

    debug!(label, pid = child.id(), ?argv, "process started");

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let label = label.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(label = %label, "stderr: {}", line);
            }
        });
    }

    let mut interrupted = false;
    let mut kill_at: Option<Instant> = None;

    if let Some(stdout) = child.stdout.take() {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();

        loop {
            tokio::select! {
                // Partial reads stay in `buf` if another branch wins.
                read = reader.read_until(b'\n', &mut buf) => {
                    if read? == 0 {
                        break;
                    }
                    scope.write(&String::from_utf8_lossy(&buf))?;
                    buf.clear();
                }
                _ = interrupt.cancelled(), if !interrupted => {
                    interrupted = true;
                    kill_at = Some(Instant::now() + policy.interrupt_grace);
                    send_interrupt(label, &mut child);
                }
                _ = deadline(kill_at) => {
                    kill_at = None;
                    force_kill(label, &mut child);
                }
            }
        }

        if !buf.is_empty() {
            scope.write(&String::from_utf8_lossy(&buf))?;
        }
    }

    let status = loop {
        tokio::select! {
            status = child.wait() => break status?,
            _ = interrupt.cancelled(), if !interrupted => {
                interrupted = true;
                kill_at = Some(Instant::now() + policy.interrupt_grace);
                send_interrupt(label, &mut child);
            }
            _ = deadline(kill_at) => {
                kill_at = None;
                force_kill(label, &mut child);
            }
        }
    };

    scope.finish()?;

    let outcome = policy.classify(label, status, interrupted);
    match &outcome {
        Ok(WorkerOutcome::Succeeded) => {
            info!(label, exit_code = ?status.code(), "process exited")
        }
        Ok(WorkerOutcome::Cancelled) => {
            info!(label, exit_code = ?status.code(), "process cancelled")
        }
        Err(e) => warn!(label, exit_code = ?status.code(), error = %e, "process failed"),
    }
    outcome
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
fn send_interrupt(label: &str, child: &mut Child) {
    let Some(pid) = child.id() else {
        debug!(label, "process already exited; nothing to interrupt");
        return;
    };

    // Negative pid addresses the process group the child leads.
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGINT) };
    if rc == 0 {
        info!(label, pid, "interrupt sent");
    } else {
        warn!(
            label,
            pid,
            error = %std::io::Error::last_os_error(),
            "failed to deliver interrupt"
        );
    }
}

#[cfg(not(unix))]
fn send_interrupt(label: &str, child: &mut Child) {
    // No process groups or SIGINT here; terminate the child directly.
    info!(label, pid = child.id(), "interrupt requested; terminating process");
    if let Err(e) = child.start_kill() {
        debug!(label, error = %e, "kill failed; process likely already exited");
    }
}

fn force_kill(label: &str, child: &mut Child) {
    warn!(label, "process did not stop after interrupt; killing");

    // Take down the whole group so no grandchild keeps stdout open.
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(label, error = %e, "kill failed; process likely already exited");
    }
}
