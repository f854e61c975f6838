use crate::errors::{ExecutionError, RegistryError};
use crate::nmap::ScanArguments;
use crate::types::{JobState, NormalizedTarget, ScanReport, ScanRequest};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One tracked scan job. Cloned out of the registry for readers; the
/// registry's copy is the single source of truth.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub id: Uuid,
    pub request: ScanRequest,
    pub target: NormalizedTarget,
    pub arguments: ScanArguments,
    pub state: JobState,
    pub result: Option<ScanReport>,
    pub error: Option<String>,
    pub submitted_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

struct Entry {
    job: ScanJob,
    cancel: CancellationToken,
}

/// Tracks all submitted jobs by id. The only shared mutable structure in the
/// system; every mutation goes through `transition`-style methods that hold
/// the write lock for a short critical section, which serializes concurrent
/// transitions on the same job.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a job in `Queued` state under a fresh id. Never blocks on scan
    /// work; the only wait is the registry lock itself.
    pub async fn submit(
        &self,
        request: ScanRequest,
        target: NormalizedTarget,
        arguments: ScanArguments,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let job = ScanJob {
            id,
            request,
            target,
            arguments,
            state: JobState::Queued,
            result: None,
            error: None,
            submitted_at: OffsetDateTime::now_utc(),
            started_at: None,
            completed_at: None,
        };
        let mut inner = self.inner.write().await;
        inner.insert(
            id,
            Entry {
                job,
                cancel: CancellationToken::new(),
            },
        );
        debug!(%id, "job submitted");
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<ScanJob> {
        self.inner.read().await.get(&id).map(|e| e.job.clone())
    }

    /// Jobs ordered by submission time, optionally filtered by state.
    pub async fn list(&self, state: Option<JobState>) -> Vec<ScanJob> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<ScanJob> = inner
            .values()
            .filter(|e| state.map_or(true, |s| e.job.state == s))
            .map(|e| e.job.clone())
            .collect();
        jobs.sort_by_key(|j| j.submitted_at);
        jobs
    }

    /// The cancellation token associated with a job, used by the scheduler to
    /// hand cancellation through to the executor.
    pub async fn cancel_token(&self, id: Uuid) -> Option<CancellationToken> {
        self.inner.read().await.get(&id).map(|e| e.cancel.clone())
    }

    /// Apply a plain state transition (no payload). Used by the scheduler to
    /// move a job to `Running` at dispatch.
    pub async fn transition(&self, id: Uuid, next: JobState) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        let entry = inner.get_mut(&id).ok_or(RegistryError::UnknownJob(id))?;
        apply(&mut entry.job, next, None, None)
    }

    /// Record an execution outcome as the job's terminal state.
    pub async fn finish(
        &self,
        id: Uuid,
        outcome: Result<ScanReport, ExecutionError>,
    ) -> Result<JobState, RegistryError> {
        let (next, result, error) = match outcome {
            Ok(report) => (JobState::Succeeded, Some(report), None),
            Err(e @ ExecutionError::TimedOut(_)) => (JobState::TimedOut, None, Some(e.to_string())),
            Err(e @ ExecutionError::Cancelled) => (JobState::Cancelled, None, Some(e.to_string())),
            Err(e) => (JobState::Failed, None, Some(e.to_string())),
        };
        let mut inner = self.inner.write().await;
        let entry = inner.get_mut(&id).ok_or(RegistryError::UnknownJob(id))?;
        apply(&mut entry.job, next, result, error)?;
        Ok(next)
    }

    /// Cancel a job. A `Queued` job goes straight to `Cancelled` without ever
    /// running; a `Running` job has its token fired and the executor records
    /// the terminal state. Returns the state observed at the time of the call.
    pub async fn cancel(&self, id: Uuid, reason: &str) -> Result<JobState, RegistryError> {
        let mut inner = self.inner.write().await;
        let entry = inner.get_mut(&id).ok_or(RegistryError::UnknownJob(id))?;
        match entry.job.state {
            JobState::Queued => {
                apply(
                    &mut entry.job,
                    JobState::Cancelled,
                    None,
                    Some(reason.to_string()),
                )?;
                info!(%id, reason, "queued job cancelled");
                Ok(JobState::Queued)
            }
            JobState::Running => {
                entry.cancel.cancel();
                info!(%id, reason, "cancellation signalled to running job");
                Ok(JobState::Running)
            }
            state => Err(RegistryError::IllegalTransition {
                from: state,
                to: JobState::Cancelled,
            }),
        }
    }

    /// Evict terminal jobs whose completion is older than `horizon`. Queued
    /// and Running jobs are never evicted. Returns the number removed.
    pub async fn evict_expired(&self, horizon: Duration) -> usize {
        let now = OffsetDateTime::now_utc();
        let horizon_secs = horizon.as_secs() as i64;
        let mut inner = self.inner.write().await;
        let before = inner.len();
        inner.retain(|_, e| {
            if !e.job.state.is_terminal() {
                return true;
            }
            match e.job.completed_at {
                Some(done) => (now - done).whole_seconds() < horizon_secs,
                None => true,
            }
        });
        before - inner.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// The single mutation path. Enforces the legal-transition table and stamps
/// timestamps; an illegal transition is logged and rejected untouched.
fn apply(
    job: &mut ScanJob,
    next: JobState,
    result: Option<ScanReport>,
    error: Option<String>,
) -> Result<(), RegistryError> {
    if !job.state.can_transition_to(next) {
        warn!(id = %job.id, from = %job.state, to = %next, "illegal job state transition rejected");
        return Err(RegistryError::IllegalTransition {
            from: job.state,
            to: next,
        });
    }
    let now = OffsetDateTime::now_utc();
    job.state = next;
    if next == JobState::Running {
        job.started_at = Some(now);
    }
    if next.is_terminal() {
        job.completed_at = Some(now);
        job.result = result;
        job.error = error;
    }
    Ok(())
}

/// Periodically evict expired jobs until shutdown.
pub fn spawn_retention_sweeper(
    registry: JobRegistry,
    horizon: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    let evicted = registry.evict_expired(horizon).await;
                    if evicted > 0 {
                        debug!(evicted, "retention sweep evicted finished jobs");
                    }
                }
            }
        }
    })
}
