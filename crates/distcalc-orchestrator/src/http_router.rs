//! HTTP Router for the Orchestrator
//!
//! Public API (authenticated when API keys are configured):
//! - `POST /api/v1/calculate` - submit `{id, expression}`
//! - `GET /api/v1/expressions` - list the caller's tasks
//! - `GET /api/v1/expressions/:id` - one task
//!
//! Worker API (unauthenticated, reached from inside the deployment):
//! - `GET /internal/task` - take a subtask, 404 when there is none
//! - `POST /internal/task` - report a result
//!
//! Errors are returned as `{"error": "..."}` with a status derived from the
//! [`DistcalcError`] variant.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    routing::post,
    Json, Router,
};
use distcalc_common::auth::{AuthConfig, API_KEY_HEADER};
use distcalc_common::protocol::{ResultReport, SubmitTask, SubtaskPayload, TaskId, TaskView};
use distcalc_common::{DistcalcError, Result};
use serde::de::DeserializeOwned;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, warn};

use crate::orchestrator::Orchestrator;

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub auth: Arc<AuthConfig>,
}

/// Builds the axum application with CORS support.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/calculate", post(submit_task))
        .route("/api/v1/expressions", get(list_tasks))
        .route("/api/v1/expressions/:id", get(get_task))
        .route("/internal/task", get(request_subtask).post(report_result))
        .route("/__health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A [`DistcalcError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub DistcalcError);

impl From<DistcalcError> for ApiError {
    fn from(err: DistcalcError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DistcalcError::Syntax(_) | DistcalcError::NotAnExpression => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            DistcalcError::Protocol(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DistcalcError::JsonSerialization(_) => StatusCode::BAD_REQUEST,
            DistcalcError::Conflict(_) => StatusCode::CONFLICT,
            DistcalcError::NotFound(_) => StatusCode::NOT_FOUND,
            DistcalcError::Unauthorized => StatusCode::UNAUTHORIZED,
            DistcalcError::Compute(_)
            | DistcalcError::Storage(_)
            | DistcalcError::MalformedResidual(_)
            | DistcalcError::Transport(_)
            | DistcalcError::Timeout(_)
            | DistcalcError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected ({}): {}", status, self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Decodes a JSON body.
///
/// Unparseable JSON is a [`DistcalcError::JsonSerialization`] error (400);
/// well-formed JSON of the wrong shape is a [`DistcalcError::Protocol`]
/// error (422).
fn decode_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        if e.is_data() {
            DistcalcError::Protocol(e.to_string())
        } else {
            DistcalcError::JsonSerialization(e)
        }
    })
}

/// Resolves the caller from the `X-API-Key` header.
fn authenticate(auth: &AuthConfig, headers: &HeaderMap) -> Result<Option<String>> {
    let key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    let caller = auth.authenticate(key);
    if caller.is_err() {
        warn!("Rejected request with missing or unknown API key");
    }
    caller
}

async fn submit_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let owner = authenticate(&state.auth, &headers)?;
    let request: SubmitTask = decode_json(&body)?;

    state.orchestrator.submit(request, owner).await?;
    Ok((StatusCode::CREATED, Json(json!({}))))
}

async fn list_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<TaskView>>> {
    let caller = authenticate(&state.auth, &headers)?;
    Ok(Json(state.orchestrator.tasks(caller.as_deref()).await?))
}

async fn get_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskView>> {
    let caller = authenticate(&state.auth, &headers)?;
    let id: TaskId = id
        .parse()
        .map_err(|_| DistcalcError::NotFound(format!("task {}", id)))?;
    Ok(Json(state.orchestrator.task(id, caller.as_deref()).await?))
}

async fn request_subtask(State(state): State<AppState>) -> ApiResult<Json<SubtaskPayload>> {
    match state.orchestrator.request_subtask().await? {
        Some(payload) => Ok(Json(payload)),
        None => Err(DistcalcError::NotFound("no subtask available".to_string()).into()),
    }
}

async fn report_result(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let report: ResultReport = decode_json(&body)?;
    state.orchestrator.report_result(report)?;
    Ok((StatusCode::OK, Json(json!({}))))
}

/// Handles health check GET requests.
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
