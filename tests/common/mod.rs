#![allow(dead_code)]

use async_trait::async_trait;
use scan_orchestrator_rs::errors::ExecutionError;
use scan_orchestrator_rs::executor::Executor;
use scan_orchestrator_rs::nmap::ScanArguments;
use scan_orchestrator_rs::types::{NormalizedTarget, ScanReport, ScanRequest, ScanType};
use scan_orchestrator_rs::validate;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// What the stub reports for every execution that is not cancelled first.
#[derive(Debug, Clone, Copy)]
pub enum StubOutcome {
    Succeed,
    TimeOut,
}

/// In-process stand-in for the nmap executor. Sleeps for `delay` (honoring
/// cancellation) and records how many executions ran concurrently.
pub struct StubExecutor {
    delay: Duration,
    outcome: StubOutcome,
    running: AtomicUsize,
    max_running: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl StubExecutor {
    pub fn new(delay: Duration) -> Self {
        Self::with_outcome(delay, StubOutcome::Succeed)
    }

    pub fn timing_out(delay: Duration) -> Self {
        Self::with_outcome(delay, StubOutcome::TimeOut)
    }

    fn with_outcome(delay: Duration, outcome: StubOutcome) -> Self {
        Self {
            delay,
            outcome,
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    /// Highest number of concurrently running executions observed.
    pub fn max_observed(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Targets whose execution actually started, in start order.
    pub async fn started_targets(&self) -> Vec<String> {
        self.started.lock().await.clone()
    }
}

#[async_trait]
impl Executor for StubExecutor {
    async fn execute(
        &self,
        target: &NormalizedTarget,
        _arguments: &ScanArguments,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ScanReport, ExecutionError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        self.started.lock().await.push(target.to_string());

        let result = tokio::select! {
            _ = tokio::time::sleep(self.delay) => match self.outcome {
                StubOutcome::Succeed => Ok(ScanReport::default()),
                StubOutcome::TimeOut => Err(ExecutionError::TimedOut(deadline)),
            },
            _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Build the (request, target, arguments) triple for a quick scan of `target`.
pub fn quick_scan(target: &str) -> (ScanRequest, NormalizedTarget, ScanArguments) {
    let normalized = validate::validate_target(target).expect("valid test target");
    let arguments = ScanArguments::build(ScanType::Quick, None).expect("valid arguments");
    let request = ScanRequest {
        target: target.to_string(),
        scan_type: ScanType::Quick,
        ports: None,
    };
    (request, normalized, arguments)
}

/// Poll `condition` every 20ms until it holds, or panic after ~5s.
pub async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..250 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for: {what}");
}
