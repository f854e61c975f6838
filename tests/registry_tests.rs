mod common;

use common::quick_scan;
use scan_orchestrator_rs::errors::{ExecutionError, RegistryError};
use scan_orchestrator_rs::registry::JobRegistry;
use scan_orchestrator_rs::types::{JobState, ScanReport};
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn submit_creates_queued_job() {
    let registry = JobRegistry::new();
    let (request, target, arguments) = quick_scan("10.0.0.1");
    let id = registry.submit(request, target, arguments).await;

    let job = registry.get(id).await.expect("job exists");
    assert_eq!(job.id, id);
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.request.target, "10.0.0.1");
    assert!(job.result.is_none());
    assert!(job.error.is_none());
    assert!(job.started_at.is_none());
    assert!(job.completed_at.is_none());
}

#[tokio::test]
async fn get_unknown_job_is_none() {
    let registry = JobRegistry::new();
    assert!(registry.get(Uuid::new_v4()).await.is_none());
}

#[tokio::test]
async fn successful_run_records_result_and_timestamps() {
    let registry = JobRegistry::new();
    let (request, target, arguments) = quick_scan("10.0.0.1");
    let id = registry.submit(request, target, arguments).await;

    registry.transition(id, JobState::Running).await.unwrap();
    let state = registry.finish(id, Ok(ScanReport::default())).await.unwrap();
    assert_eq!(state, JobState::Succeeded);

    let job = registry.get(id).await.unwrap();
    assert_eq!(job.state, JobState::Succeeded);
    assert!(job.result.is_some());
    assert!(job.error.is_none());
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn failure_and_timeout_record_reason_strings() {
    let registry = JobRegistry::new();

    let (request, target, arguments) = quick_scan("10.0.0.1");
    let failed = registry.submit(request, target, arguments).await;
    registry.transition(failed, JobState::Running).await.unwrap();
    registry
        .finish(
            failed,
            Err(ExecutionError::ScanFailed {
                code: 1,
                stderr: "host seems down".into(),
            }),
        )
        .await
        .unwrap();
    let job = registry.get(failed).await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(job.error.as_deref().unwrap().contains("host seems down"));

    let (request, target, arguments) = quick_scan("10.0.0.2");
    let timed_out = registry.submit(request, target, arguments).await;
    registry.transition(timed_out, JobState::Running).await.unwrap();
    registry
        .finish(timed_out, Err(ExecutionError::TimedOut(Duration::from_secs(5))))
        .await
        .unwrap();
    let job = registry.get(timed_out).await.unwrap();
    assert_eq!(job.state, JobState::TimedOut);
    assert!(job.error.is_some());
}

#[tokio::test]
async fn illegal_transitions_are_rejected_not_applied() {
    let registry = JobRegistry::new();
    let (request, target, arguments) = quick_scan("10.0.0.1");
    let id = registry.submit(request, target, arguments).await;

    // Queued cannot complete without running first.
    let err = registry.finish(id, Ok(ScanReport::default())).await.unwrap_err();
    assert!(matches!(err, RegistryError::IllegalTransition { .. }));
    assert_eq!(registry.get(id).await.unwrap().state, JobState::Queued);

    // Terminal states accept nothing further.
    registry.transition(id, JobState::Running).await.unwrap();
    registry.finish(id, Ok(ScanReport::default())).await.unwrap();
    let err = registry.transition(id, JobState::Running).await.unwrap_err();
    assert!(matches!(err, RegistryError::IllegalTransition { .. }));
    assert_eq!(registry.get(id).await.unwrap().state, JobState::Succeeded);
}

#[tokio::test]
async fn cancelling_a_queued_job_skips_running_entirely() {
    let registry = JobRegistry::new();
    let (request, target, arguments) = quick_scan("10.0.0.1");
    let id = registry.submit(request, target, arguments).await;

    let observed = registry.cancel(id, "cancelled by request").await.unwrap();
    assert_eq!(observed, JobState::Queued);

    let job = registry.get(id).await.unwrap();
    assert_eq!(job.state, JobState::Cancelled);
    assert!(job.started_at.is_none());
    assert!(job.error.as_deref().unwrap().contains("cancelled"));
}

#[tokio::test]
async fn cancelling_a_running_job_fires_its_token() {
    let registry = JobRegistry::new();
    let (request, target, arguments) = quick_scan("10.0.0.1");
    let id = registry.submit(request, target, arguments).await;
    registry.transition(id, JobState::Running).await.unwrap();

    let observed = registry.cancel(id, "cancelled by request").await.unwrap();
    assert_eq!(observed, JobState::Running);
    assert!(registry.cancel_token(id).await.unwrap().is_cancelled());

    // State is still Running until the executor reports back.
    assert_eq!(registry.get(id).await.unwrap().state, JobState::Running);
    registry.finish(id, Err(ExecutionError::Cancelled)).await.unwrap();
    assert_eq!(registry.get(id).await.unwrap().state, JobState::Cancelled);
}

#[tokio::test]
async fn cancelling_a_finished_job_is_a_conflict() {
    let registry = JobRegistry::new();
    let (request, target, arguments) = quick_scan("10.0.0.1");
    let id = registry.submit(request, target, arguments).await;
    registry.transition(id, JobState::Running).await.unwrap();
    registry.finish(id, Ok(ScanReport::default())).await.unwrap();

    let err = registry.cancel(id, "too late").await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::IllegalTransition {
            from: JobState::Succeeded,
            to: JobState::Cancelled
        }
    ));
}

#[tokio::test]
async fn list_filters_by_state() {
    let registry = JobRegistry::new();
    let (request, target, arguments) = quick_scan("10.0.0.1");
    let queued = registry.submit(request, target, arguments).await;
    let (request, target, arguments) = quick_scan("10.0.0.2");
    let running = registry.submit(request, target, arguments).await;
    registry.transition(running, JobState::Running).await.unwrap();

    let all = registry.list(None).await;
    assert_eq!(all.len(), 2);

    let queued_jobs = registry.list(Some(JobState::Queued)).await;
    assert_eq!(queued_jobs.len(), 1);
    assert_eq!(queued_jobs[0].id, queued);

    let running_jobs = registry.list(Some(JobState::Running)).await;
    assert_eq!(running_jobs.len(), 1);
    assert_eq!(running_jobs[0].id, running);
}

#[tokio::test]
async fn eviction_removes_only_expired_terminal_jobs() {
    let registry = JobRegistry::new();

    let (request, target, arguments) = quick_scan("10.0.0.1");
    let done = registry.submit(request, target, arguments).await;
    registry.transition(done, JobState::Running).await.unwrap();
    registry.finish(done, Ok(ScanReport::default())).await.unwrap();

    let (request, target, arguments) = quick_scan("10.0.0.2");
    let queued = registry.submit(request, target, arguments).await;

    let (request, target, arguments) = quick_scan("10.0.0.3");
    let running = registry.submit(request, target, arguments).await;
    registry.transition(running, JobState::Running).await.unwrap();

    // A generous horizon keeps the finished job around.
    assert_eq!(registry.evict_expired(Duration::from_secs(3600)).await, 0);
    assert_eq!(registry.len().await, 3);

    // A zero horizon evicts it immediately, but never touches live jobs.
    assert_eq!(registry.evict_expired(Duration::from_secs(0)).await, 1);
    assert!(registry.get(done).await.is_none());
    assert!(registry.get(queued).await.is_some());
    assert!(registry.get(running).await.is_some());
}
