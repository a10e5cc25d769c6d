//! Health, readiness, and statistics endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness; always 200 while the process serves requests
//! - `GET /ready` - Readiness; 503 until a token secret is configured
//! - `GET /stats` - Uptime, tracked rate windows, account count (authenticated)

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use tracing::instrument;

use crate::error::AppResult;
use crate::models::{HealthResponse, StatsResponse};
use crate::response::send_success;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint for load balancer and Kubernetes probes.
///
/// Not ready while the verifier has no secret: every authenticated route
/// would answer 500.
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if state.verifier.is_configured() {
        Ok(StatusCode::OK)
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Statistics endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "success": true,
///   "data": { "uptime_seconds": 3600, "tracked_windows": 12, "users_count": 1 }
/// }
/// ```
#[instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> AppResult<Response> {
    let users_count = state.users.count().await?;

    Ok(send_success(
        StatsResponse {
            uptime_seconds: state.uptime_seconds(),
            tracked_windows: state.registry.tracked_windows(),
            users_count,
        },
        StatusCode::OK,
    ))
}
