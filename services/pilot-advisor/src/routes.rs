//! HTTP API: health, daily trigger, run queries.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::policy::load_policy;
use crate::runs::{RunReport, RunRequest, RunSummary};
use crate::AdvisorState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub app: String,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: &'static str,
    pub message: String,
    pub app: String,
    pub version: &'static str,
    pub run_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl ErrorResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}

/// Build the service router.
pub fn router(state: AdvisorState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run/daily", post(trigger_daily))
        .route("/runs", get(list_runs))
        .route("/runs/:run_id", get(get_run))
        .with_state(state)
}

async fn health(State(state): State<AdvisorState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: state.config.service.app_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Fire-and-forget daily trigger.
///
/// The policy file is the only pre-flight check: if it cannot be
/// loaded, the run is rejected here. Otherwise the run is enqueued and
/// 202 returned immediately; progress is queried via `/runs/{id}`.
async fn trigger_daily(State(state): State<AdvisorState>) -> Response {
    let policy = match load_policy(&state.config.policy.path) {
        Ok(policy) => policy,
        Err(e) => {
            warn!(error = %e, "Daily run rejected: policy pre-flight failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response();
        }
    };

    let run_id = Uuid::new_v4();
    state.registry.enqueue(run_id).await;

    let request = RunRequest {
        run_id,
        daily_message: policy.daily_workflow_message(),
    };
    if state.run_tx.try_send(request).is_err() {
        // The run never reached the worker; drop its registry entry so
        // it does not linger as Queued forever.
        state.registry.remove(run_id).await;
        warn!(run_id = %run_id, "Daily run rejected: run queue full");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("run queue is full, try again later")),
        )
            .into_response();
    }

    info!(run_id = %run_id, account_id = %policy.account_id(), "Daily run enqueued");
    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            status: "started",
            message: "daily workflow started in background".into(),
            app: state.config.service.app_name.clone(),
            version: env!("CARGO_PKG_VERSION"),
            run_id,
        }),
    )
        .into_response()
}

async fn get_run(
    State(state): State<AdvisorState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunReport>, Response> {
    match state.registry.get(run_id).await {
        Some(report) => Ok(Json(report)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("run {run_id} not found"))),
        )
            .into_response()),
    }
}

async fn list_runs(State(state): State<AdvisorState>) -> Json<Vec<RunSummary>> {
    Json(state.registry.recent().await)
}
