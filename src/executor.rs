use crate::errors::ExecutionError;
use crate::nmap::{self, ScanArguments};
use crate::types::{NormalizedTarget, ScanReport};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Executes one scan job. The trait seam exists so the scheduler can be
/// driven by a stub in tests; the production implementation is `NmapExecutor`.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run one scan to completion, deadline expiry, or cancellation.
    ///
    /// Exactly one child process per call. The result is returned to the
    /// caller; the executor mutates no shared state itself.
    async fn execute(
        &self,
        target: &NormalizedTarget,
        arguments: &ScanArguments,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ScanReport, ExecutionError>;
}

/// Drives the external nmap binary as an isolated child process.
pub struct NmapExecutor {
    nmap_path: String,
    kill_grace: Duration,
}

impl NmapExecutor {
    pub fn new(nmap_path: impl Into<String>, kill_grace: Duration) -> Self {
        Self {
            nmap_path: nmap_path.into(),
            kill_grace,
        }
    }
}

#[async_trait]
impl Executor for NmapExecutor {
    async fn execute(
        &self,
        target: &NormalizedTarget,
        arguments: &ScanArguments,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ScanReport, ExecutionError> {
        let argv = arguments.to_argv(target);
        debug!(program = %self.nmap_path, ?argv, "spawning scan process");
        let stdout = run_child(&self.nmap_path, &argv, deadline, self.kill_grace, cancel).await?;
        nmap::parse_output(&stdout)
    }
}

/// Spawn `program` with `argv` (never via a shell), collect stdout, and wait
/// for exit, deadline, or cancellation. On deadline/cancel the child is
/// killed and its exit is awaited within `kill_grace`.
pub(crate) async fn run_child(
    program: &str,
    argv: &[String],
    deadline: Duration,
    kill_grace: Duration,
    cancel: CancellationToken,
) -> Result<String, ExecutionError> {
    let mut child = Command::new(program)
        .args(argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    // Drain both pipes concurrently with the wait so the child never blocks
    // on a full pipe buffer.
    let stdout_task = tokio::spawn(slurp(child.stdout.take()));
    let stderr_task = tokio::spawn(slurp(child.stderr.take()));

    enum Outcome {
        Exited(std::process::ExitStatus),
        DeadlineExpired,
        Cancelled,
    }

    let outcome = tokio::select! {
        status = child.wait() => Outcome::Exited(status?),
        _ = time::sleep(deadline) => Outcome::DeadlineExpired,
        _ = cancel.cancelled() => Outcome::Cancelled,
    };

    match outcome {
        Outcome::Exited(status) => {
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            if status.success() {
                Ok(stdout)
            } else {
                Err(ExecutionError::ScanFailed {
                    code: status.code().unwrap_or(-1),
                    stderr: trim_diagnostic(&stderr),
                })
            }
        }
        Outcome::DeadlineExpired => {
            terminate(&mut child, kill_grace).await;
            Err(ExecutionError::TimedOut(deadline))
        }
        Outcome::Cancelled => {
            terminate(&mut child, kill_grace).await;
            Err(ExecutionError::Cancelled)
        }
    }
}

async fn slurp<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut r) = reader {
        let _ = r.read_to_string(&mut buf).await;
    }
    buf
}

/// Kill the child and confirm it is gone within the grace period.
/// `kill_on_drop` remains as the backstop if even that fails.
async fn terminate(child: &mut Child, kill_grace: Duration) {
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "failed to signal scan process");
    }
    if time::timeout(kill_grace, child.wait()).await.is_err() {
        warn!("scan process did not exit within the kill grace period");
    }
}

/// Keep error reasons human-readable: the first few non-empty stderr lines,
/// not the full dump.
fn trim_diagnostic(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(5)
        .collect();
    if lines.is_empty() {
        "no diagnostic output".to_string()
    } else {
        lines.join("; ")
    }
}
