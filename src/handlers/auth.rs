//! Login and session endpoints.
//!
//! - `POST /auth/login` - Exchange email and password for a bearer token
//! - `GET /auth/session` - Echo the identity the presented token resolves to

use axum::Extension;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use tracing::{info, instrument, warn};

use crate::error::{AppError, AppResult, AuthError};
use crate::models::{Identity, LoginRequest, LoginResponse, SessionResponse};
use crate::response::send_success;
use crate::state::AppState;
use crate::token::BEARER_SCHEME;
use crate::validation::{validate_email, validate_password};

/// Issue a token for valid credentials.
///
/// The body is parsed by hand so malformed JSON yields the same sanitized
/// error envelope as every other failure.
///
/// # Errors
///
/// - 400 for an unparseable body or a failed field check
/// - 401 for an unknown email or wrong password (indistinguishable)
/// - 500 when no signing secret is configured
#[instrument(skip(state, body))]
pub async fn login(State(state): State<AppState>, body: Bytes) -> AppResult<Response> {
    let request: LoginRequest = serde_json::from_slice(&body)?;
    validate_email(&request.email)?;
    validate_password(&request.password)?;

    let issuer = state
        .issuer
        .as_ref()
        .ok_or(AuthError::SecretUnavailable)?;

    let user = match state.users.find_by_email(&request.email).await? {
        Some(user) if user.verify_password(&request.password) => user,
        _ => {
            warn!("Login rejected: unknown email or wrong password");
            return Err(AppError::Unauthorized);
        }
    };

    let issued = issuer.issue(&user.claims())?;
    info!(user_id = %user.id, "Login succeeded");

    Ok(send_success(
        LoginResponse {
            token: issued.token,
            token_type: BEARER_SCHEME,
            expires_at: issued.expires_at,
            user: user.profile(),
        },
        StatusCode::OK,
    ))
}

/// Return the identity attached by the authentication gate.
#[instrument(skip_all)]
pub async fn session(Extension(identity): Extension<Identity>) -> Response {
    send_success(
        SessionResponse {
            subject_id: identity.subject_id().to_string(),
            email: identity.email().to_string(),
            role: identity.role().to_string(),
        },
        StatusCode::OK,
    )
}
