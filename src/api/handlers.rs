use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::monitor::{EndpointState, EndpointStatus, Monitor, MonitorError};
use crate::state::StatusSummary;

/// Application state shared across handlers
pub struct AppState {
    pub monitor: Arc<Monitor>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Status
// ============================================================================

#[derive(Serialize)]
pub struct StatusResponse {
    pub summary: StatusSummary,
    pub endpoints: Vec<EndpointStatus>,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        summary: state.monitor.summary(),
        endpoints: state.monitor.statuses(),
    })
}

// ============================================================================
// Check / Reset
// ============================================================================

#[derive(Deserialize)]
pub struct EndpointRequest {
    pub url: String,
}

#[derive(Serialize)]
pub struct CheckResponse {
    pub url: String,
    pub state: EndpointState,
}

pub async fn check(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EndpointRequest>,
) -> Result<Json<CheckResponse>, ApiError> {
    let endpoint_state = state.monitor.check_once(&request.url).await?;

    Ok(Json(CheckResponse {
        url: request.url,
        state: endpoint_state,
    }))
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub url: String,
    pub existed: bool,
}

pub async fn reset(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EndpointRequest>,
) -> Result<Json<ResetResponse>, ApiError> {
    let existed = state.monitor.reset(&request.url).await?;

    Ok(Json(ResetResponse {
        url: request.url,
        existed,
    }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::UnknownEndpoint(_) => ApiError::NotFound(err.to_string()),
            MonitorError::Persistence(_) | MonitorError::Notify(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
