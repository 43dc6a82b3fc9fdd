//! HTTP transport
//!
//! `POST /request` takes `{query, token}` and answers
//! `{"result": ..., "status": "success"}` or `{"error": "..."}`.

use crate::command::Engine;
use crate::core::error::{ExecutionError, PipelineError};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RequestBody {
    pub query: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub result: Value,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/request", post(handle_request))
        .route("/healthz", get(healthz))
        .with_state(engine)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn handle_request(
    State(engine): State<Arc<Engine>>,
    body: Result<Json<RequestBody>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(body) = body.map_err(|rejection| {
        debug!(error = %rejection, "Rejected request body");
        json_error(StatusCode::BAD_REQUEST, "Invalid request body")
    })?;

    // Blank but non-empty values go on to the pipeline, which reports them
    // at the stage they belong to.
    let query = body
        .query
        .filter(|q| !q.is_empty())
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Query is required"))?;
    let token = body
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Token is required"))?;

    let execution = engine
        .process_request(&query, &token)
        .await
        .map_err(|e| json_error(status_for(&e), e.to_string()))?;

    Ok(Json(SuccessResponse {
        result: execution.value,
        status: "success",
    }))
}

/// Status code for a pipeline failure
pub fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Authentication(_) => StatusCode::UNAUTHORIZED,
        PipelineError::Parsing(_) => StatusCode::BAD_REQUEST,
        PipelineError::AccessDenied { .. } => StatusCode::FORBIDDEN,
        PipelineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Execution(e) => match e {
            ExecutionError::NotFound(_) => StatusCode::NOT_FOUND,
            ExecutionError::MissingField { .. }
            | ExecutionError::NotPositive { .. }
            | ExecutionError::MissingId { .. }
            | ExecutionError::InvalidId { .. }
            | ExecutionError::NoFieldsToUpdate => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn json_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}
