use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    errors::RegistryError,
    nmap::ScanArguments,
    registry::{JobRegistry, ScanJob},
    scheduler::Scheduler,
    types::{JobState, ScanReport, ScanRequest, ScanType},
    validate,
};

/// Shared handler state: the registry plus the scheduler handle.
#[derive(Clone)]
pub struct AppState {
    pub registry: JobRegistry,
    pub scheduler: Arc<Scheduler>,
}

/// Submission body. `scan_type` stays a free string here so unrecognized
/// values can fall back to "quick" instead of failing deserialization.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub target: String,
    #[serde(default)]
    pub scan_type: Option<String>,
    #[serde(default)]
    pub ports: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    job_id: Uuid,
    state: JobState,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    state: Option<String>,
}

/// JSON view of one job. Timestamps are RFC3339 strings.
#[derive(Debug, Serialize)]
struct JobView {
    id: Uuid,
    target: String,
    scan_type: ScanType,
    #[serde(skip_serializing_if = "Option::is_none")]
    ports: Option<String>,
    args: String,
    state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ScanReport>,
    submitted_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<String>,
}

impl JobView {
    fn from_job(job: ScanJob) -> Self {
        Self {
            id: job.id,
            target: job.request.target,
            scan_type: job.request.scan_type,
            ports: job.request.ports,
            args: job.arguments.display(),
            state: job.state,
            error: job.error,
            result: job.result,
            submitted_at: rfc3339(job.submitted_at),
            started_at: job.started_at.map(rfc3339),
            completed_at: job.completed_at.map(rfc3339),
        }
    }
}

fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

/// Build the application router. Split out from `serve` so tests can drive
/// it in-process.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/scan", post(submit_scan))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .with_state(state);

    Router::new()
        .route("/", get(home))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API until the shutdown token fires.
pub async fn serve(bind: String, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "HTTP API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn home() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "scan orchestrator is running" }))
}

async fn submit_scan(
    State(app): State<AppState>,
    Json(body): Json<SubmitRequest>,
) -> impl IntoResponse {
    let target = match validate::validate_target(&body.target) {
        Ok(t) => t,
        Err(e) => return bad_request(e.to_string()),
    };

    // Fallback-to-quick policy for unrecognized scan types; logged, not silent.
    let scan_type = match body.scan_type.as_deref() {
        None => ScanType::Quick,
        Some(name) => ScanType::from_name(name).unwrap_or_else(|| {
            warn!(scan_type = name, "unrecognized scan type, falling back to quick");
            ScanType::Quick
        }),
    };

    let arguments = match ScanArguments::build(scan_type, body.ports.as_deref()) {
        Ok(a) => a,
        Err(e) => return bad_request(e.to_string()),
    };

    let request = ScanRequest {
        target: target.to_string(),
        scan_type,
        ports: body.ports,
    };
    let id = app.registry.submit(request, target, arguments).await;

    if !app.scheduler.enqueue(id) {
        let _ = app.registry.cancel(id, "service shutting down").await;
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error: "service is shutting down".into(),
            }),
        )
            .into_response();
    }

    (
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: id,
            state: JobState::Queued,
        }),
    )
        .into_response()
}

async fn get_job(State(app): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match app.registry.get(id).await {
        Some(job) => (StatusCode::OK, Json(JobView::from_job(job))).into_response(),
        None => not_found(id),
    }
}

async fn list_jobs(
    State(app): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let filter = match params.state.as_deref() {
        None => None,
        Some(name) => match JobState::from_name(name) {
            Some(state) => Some(state),
            None => return bad_request(format!("unknown job state: {name:?}")),
        },
    };
    let jobs: Vec<JobView> = app
        .registry
        .list(filter)
        .await
        .into_iter()
        .map(JobView::from_job)
        .collect();
    (StatusCode::OK, Json(jobs)).into_response()
}

async fn cancel_job(State(app): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match app.registry.cancel(id, "cancelled by request").await {
        Ok(_) => match app.registry.get(id).await {
            Some(job) => (StatusCode::ACCEPTED, Json(JobView::from_job(job))).into_response(),
            None => not_found(id),
        },
        Err(RegistryError::UnknownJob(_)) => not_found(id),
        Err(e @ RegistryError::IllegalTransition { .. }) => (
            StatusCode::CONFLICT,
            Json(ErrorBody {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

fn bad_request(error: String) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error })).into_response()
}

fn not_found(id: Uuid) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: format!("unknown job {id}"),
        }),
    )
        .into_response()
}
