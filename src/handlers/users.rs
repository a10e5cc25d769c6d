//! User profile endpoints behind the per-identity rate limit.
//!
//! - `GET /users/me` - Profile of the authenticated caller
//! - `GET /users/{id}` - Any profile for admins, otherwise only the caller's own

use axum::Extension;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};
use crate::models::Identity;
use crate::response::send_success;
use crate::state::AppState;
use crate::validation::validate_user_id;

/// Role allowed to read other users' profiles.
pub const ADMIN_ROLE: &str = "admin";

/// Profile of the caller.
///
/// A token can outlive its account, so a missing record is a 404 rather than
/// an internal error.
#[instrument(skip_all)]
pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Response> {
    let user = state
        .users
        .find_by_id(identity.subject_id())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(send_success(user.profile(), StatusCode::OK))
}

/// Profile by id.
///
/// Non-admin callers asking for someone else get the same 404 as for an
/// unknown id.
#[instrument(skip(state, identity))]
pub async fn get_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    validate_user_id(&id)?;

    if identity.subject_id() != id && identity.role() != ADMIN_ROLE {
        debug!(caller = identity.subject_id(), "Profile lookup outside caller's scope");
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let user = state
        .users
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(send_success(user.profile(), StatusCode::OK))
}
