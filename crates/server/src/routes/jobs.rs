// crates/server/src/routes/jobs.rs
//! API routes for bulk delivery jobs.
//!
//! - POST /jobs - Submit rows + mapping, start a job
//! - GET /jobs - List retained jobs
//! - GET /jobs/{id} - Job status snapshot
//! - POST /jobs/{id}/stop - Request a cooperative stop
//! - GET /jobs/{id}/events - SSE stream of job events (history replayed first)

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use bulksend_jobs::{FieldMapping, JobId, JobSnapshot, Row};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Body of `POST /api/jobs`. Cell values may be any JSON scalar.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub rows: Vec<HashMap<String, serde_json::Value>>,
    pub mapping: FieldMapping,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub ok: bool,
}

/// Flatten a JSON row into text cells. Nulls become absent cells.
fn to_row(cells: HashMap<String, serde_json::Value>) -> Row {
    cells
        .into_iter()
        .filter_map(|(column, value)| {
            let text = match value {
                serde_json::Value::Null => return None,
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            Some((column, text))
        })
        .collect()
}

/// Unparseable ids can never name a job, so they are reported as not found.
fn parse_id(raw: &str) -> ApiResult<JobId> {
    raw.parse()
        .map_err(|_| ApiError::JobNotFound(raw.to_string()))
}

/// POST /api/jobs - Validate and start a delivery job.
async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let rows: Vec<Row> = request.rows.into_iter().map(to_row).collect();
    let job_id = state.jobs.submit(rows, request.mapping)?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

/// GET /api/jobs - Snapshots of all retained jobs, oldest first.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobSnapshot>> {
    Json(state.jobs.list())
}

/// GET /api/jobs/{id}
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    let id = parse_id(&id)?;
    Ok(Json(state.jobs.get(id)?))
}

/// POST /api/jobs/{id}/stop - Idempotent; the job stops before its next row.
async fn stop_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StopResponse>> {
    let id = parse_id(&id)?;
    state.jobs.request_stop(id)?;
    Ok(Json(StopResponse { ok: true }))
}

/// GET /api/jobs/{id}/events - SSE stream of job events.
///
/// A late subscriber first receives `connected`, the retained log, the
/// current progress and (if finished) the terminal event. The stream ends
/// after the terminal event or when the job is evicted.
async fn stream_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    let id = parse_id(&id)?;
    let subscription = state.jobs.subscribe(id)?;
    tracing::debug!(job_id = %id, subscriber = subscription.id(), "SSE subscriber attached");

    let stream = async_stream::stream! {
        let mut subscription = subscription;
        while let Some(event) = subscription.recv().await {
            let data = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Failed to serialize job event");
                    continue;
                }
            };
            yield Ok(Event::default().event(event.kind()).data(data));
            if event.is_terminal() {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/stop", post(stop_job))
        .route("/jobs/{id}/events", get(stream_events))
}
