use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::response::send_error;

/// Failures produced while authenticating a request.
///
/// Every variant except [`AuthError::SecretUnavailable`] is client-correctable
/// and maps to a 4xx response. A missing secret is an operator fault: it is
/// logged at `error` level and surfaced as 500 so a misconfigured process
/// never silently accepts or rejects traffic as if the client were at fault.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header on the request.
    #[error("no credential provided")]
    NoCredential,

    /// Header present but not of the shape `Bearer <token>`.
    #[error("credential is not of the form 'Bearer <token>'")]
    Malformed,

    /// The verifier has no secret to check signatures against.
    #[error("token verification secret is not configured")]
    SecretUnavailable,

    /// Signature, expiry, or payload structure check failed.
    #[error("token is invalid")]
    Invalid,

    /// Verified payload lacks one of the required identity claims.
    #[error("token is missing required claims")]
    MissingClaims,

    /// An identity-keyed gate ran without an authenticated identity.
    #[error("no identity to rate-limit")]
    NoIdentity,
}

impl AuthError {
    /// HTTP status returned to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::NoCredential | AuthError::Invalid => StatusCode::UNAUTHORIZED,
            AuthError::Malformed | AuthError::MissingClaims | AuthError::NoIdentity => {
                StatusCode::BAD_REQUEST
            }
            AuthError::SecretUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Never reveals which check failed beyond the category.
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::NoCredential => "Access denied - no token provided",
            AuthError::Malformed => "Malformed authorization header",
            AuthError::SecretUnavailable => "Authentication is temporarily unavailable",
            AuthError::Invalid => "Invalid or expired token",
            AuthError::MissingClaims => "Token is missing required claims",
            AuthError::NoIdentity => "No identity to rate-limit",
        }
    }

    /// Short machine-friendly label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            AuthError::NoCredential => "no_credential",
            AuthError::Malformed => "malformed",
            AuthError::SecretUnavailable => "secret_unavailable",
            AuthError::Invalid => "invalid",
            AuthError::MissingClaims => "missing_claims",
            AuthError::NoIdentity => "no_identity",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        send_error(self.status(), self.client_message())
    }
}

/// Application-wide error types with appropriate HTTP status codes.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid credentials")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Auth(e) => return (*e).into_response(),
            AppError::SerializationError(e) => (StatusCode::BAD_REQUEST, sanitize_serde_error(e)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid email or password".to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred. Please contact support if the issue persists."
                    .to_string(),
            ),
            AppError::ConfigError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Service configuration error. Please contact support.".to_string(),
            ),
        };

        // Full details stay server-side; clients only see the sanitized message
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        send_error(status, &message)
    }
}

/// Sanitize serde error messages to avoid leaking internal type information.
///
/// Serde errors can contain internal struct/field names which shouldn't be
/// exposed to external clients. This function extracts the useful parts.
fn sanitize_serde_error(e: &serde_json::Error) -> String {
    let msg = e.to_string();

    if msg.contains("missing field")
        && let Some(start) = msg.find('`')
        && let Some(end) = msg[start + 1..].find('`')
    {
        let field = &msg[start + 1..start + 1 + end];
        return format!("Missing required field: {field}");
    }

    if msg.contains("unknown field")
        && let Some(start) = msg.find('`')
        && let Some(end) = msg[start + 1..].find('`')
    {
        let field = &msg[start + 1..start + 1 + end];
        return format!("Unknown field: {field}");
    }

    if msg.contains("invalid type") {
        return "Invalid data type in request body".to_string();
    }

    if msg.contains("EOF while parsing") || msg.contains("expected") {
        return "Malformed JSON in request body".to_string();
    }

    "Invalid request format".to_string()
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
