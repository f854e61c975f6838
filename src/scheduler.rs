use crate::executor::Executor;
use crate::registry::JobRegistry;
use crate::types::JobState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bounds concurrent scan executions and dispatches queued jobs in FIFO
/// order. One dispatcher task is the single serialized decision point for
/// "take next queued job, assign to a free slot".
pub struct Scheduler {
    queue_tx: mpsc::UnboundedSender<Uuid>,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Start the dispatcher with `workers` execution slots.
    pub fn spawn(
        workers: usize,
        job_timeout: Duration,
        shutdown_grace: Duration,
        registry: JobRegistry,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let dispatcher = tokio::spawn(dispatch_loop(
            queue_rx,
            workers.max(1),
            job_timeout,
            shutdown_grace,
            registry,
            executor,
            shutdown.clone(),
        ));
        Self {
            queue_tx,
            shutdown,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Admit a submitted job to the FIFO queue. Never blocks and never
    /// rejects for lack of capacity; returns `false` only once the scheduler
    /// is shutting down.
    pub fn enqueue(&self, id: Uuid) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        self.queue_tx.send(id).is_ok()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Graceful shutdown: stop admitting, mark still-queued jobs Cancelled,
    /// give in-flight scans the shutdown grace, then cancel whatever remains.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "dispatcher task failed during shutdown");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_loop(
    mut queue_rx: mpsc::UnboundedReceiver<Uuid>,
    workers: usize,
    job_timeout: Duration,
    shutdown_grace: Duration,
    registry: JobRegistry,
    executor: Arc<dyn Executor>,
    shutdown: CancellationToken,
) {
    let slots = Arc::new(Semaphore::new(workers));
    let mut running = JoinSet::new();
    info!(workers, "scan dispatcher started");

    loop {
        // Reap finished executor tasks so the JoinSet does not grow unbounded.
        while running.try_join_next().is_some() {}

        let id = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = queue_rx.recv() => match next {
                Some(id) => id,
                None => break,
            },
        };

        // Jobs cancelled (or evicted) while queued are skipped at dispatch.
        let job = match registry.get(id).await {
            Some(job) => job,
            None => {
                warn!(%id, "queued job vanished before dispatch");
                continue;
            }
        };
        if job.state != JobState::Queued {
            debug!(%id, state = %job.state, "skipping job no longer queued");
            continue;
        }

        // FIFO: the next queued job waits here for a free slot, staying
        // responsive to shutdown.
        let permit = tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = registry.cancel(id, "service shutting down").await;
                break;
            }
            permit = slots.clone().acquire_owned() => permit.expect("semaphore in scope"),
        };

        // Losing this race (e.g. cancelled between the check above and here)
        // is fine: the transition is rejected and the job is not executed.
        if let Err(e) = registry.transition(id, JobState::Running).await {
            debug!(%id, error = %e, "job not dispatched");
            continue;
        }
        let cancel = match registry.cancel_token(id).await {
            Some(token) => token,
            None => continue,
        };

        info!(%id, target = %job.target, scan_type = %job.request.scan_type, "dispatching scan");
        let registry = registry.clone();
        let executor = executor.clone();
        running.spawn(async move {
            let _permit = permit; // slot held until the scan finishes

            let outcome = executor
                .execute(&job.target, &job.arguments, job_timeout, cancel)
                .await;
            match &outcome {
                Ok(report) => info!(%id, hosts = report.hosts.len(), "scan succeeded"),
                Err(e) => info!(%id, reason = %e, "scan did not complete"),
            }
            if let Err(e) = registry.finish(id, outcome).await {
                warn!(%id, error = %e, "failed to record scan outcome");
            }
        });
    }

    // Shutdown: drain the queue, reporting still-queued jobs as Cancelled.
    queue_rx.close();
    let mut drained = 0usize;
    while let Ok(id) = queue_rx.try_recv() {
        if registry.cancel(id, "service shutting down").await.is_ok() {
            drained += 1;
        }
    }
    if drained > 0 {
        info!(drained, "cancelled still-queued jobs on shutdown");
    }

    // Let in-flight scans finish within the grace period, then cancel them.
    if !running.is_empty() {
        let graceful = tokio::time::timeout(shutdown_grace, async {
            while running.join_next().await.is_some() {}
        })
        .await;
        if graceful.is_err() {
            warn!("shutdown grace elapsed, cancelling in-flight scans");
            for job in registry.list(Some(JobState::Running)).await {
                if let Some(token) = registry.cancel_token(job.id).await {
                    token.cancel();
                }
            }
            while running.join_next().await.is_some() {}
        }
    }

    info!("scan dispatcher stopped");
}
