use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Public view of a user record.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub role: String,
}

/// Response after a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Signed bearer token
    pub token: String,
    /// Always "Bearer"
    pub token_type: &'static str,
    /// When the token stops being accepted
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

/// Identity the current bearer token resolves to.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub subject_id: String,
    pub email: String,
    pub role: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests
    pub status: String,
    /// Application version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

/// Service statistics response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Seconds since the process started
    pub uptime_seconds: u64,
    /// Rate limit windows currently held in memory
    pub tracked_windows: usize,
    /// Accounts known to the user repository
    pub users_count: usize,
}
