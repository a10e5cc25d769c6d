use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for an email address (RFC 5321 path limit).
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Minimum password length accepted at login.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length accepted at login.
///
/// Bounds the hashing work a single request can cause.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum length for a user id path segment.
pub const MAX_USER_ID_LENGTH: usize = 64;

/// Validate the shape of an email address.
///
/// Rules:
/// - Non-empty and at most 254 bytes
/// - Exactly one `@`, with a non-empty local part and domain
/// - Domain contains a dot that is neither its first nor last character
/// - No whitespace or control characters
pub fn validate_email(email: &str) -> AppResult<()> {
    if email.is_empty() {
        return Err(AppError::BadRequest("Email cannot be empty".to_string()));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Email cannot exceed {MAX_EMAIL_LENGTH} characters"
        )));
    }

    if let Some(pos) = email
        .chars()
        .position(|c| c.is_whitespace() || c.is_control())
    {
        return Err(AppError::BadRequest(format!(
            "Email contains invalid character at position {pos}"
        )));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(AppError::BadRequest("Email must contain '@'".to_string()));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(AppError::BadRequest(
            "Email must have exactly one '@' between a local part and a domain".to_string(),
        ));
    }

    if domain.starts_with('.') || domain.ends_with('.') || !domain.contains('.') {
        return Err(AppError::BadRequest("Email domain is not valid".to_string()));
    }

    Ok(())
}

/// Validate a login password.
///
/// Only the length is checked; the value is never echoed back.
pub fn validate_password(password: &str) -> AppResult<()> {
    let len = password.chars().count();

    if len < MIN_PASSWORD_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    if len > MAX_PASSWORD_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Password cannot exceed {MAX_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Validate a user id taken from the request path.
///
/// Rules:
/// - Between 1 and 64 characters
/// - ASCII alphanumerics, `-` and `_` only
pub fn validate_user_id(id: &str) -> AppResult<()> {
    if id.is_empty() {
        return Err(AppError::BadRequest("User id cannot be empty".to_string()));
    }

    if id.len() > MAX_USER_ID_LENGTH {
        return Err(AppError::BadRequest(format!(
            "User id cannot exceed {MAX_USER_ID_LENGTH} characters"
        )));
    }

    if let Some((i, c)) = id
        .char_indices()
        .find(|(_, c)| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
    {
        return Err(AppError::BadRequest(format!(
            "User id contains invalid character '{c}' at position {i}"
        )));
    }

    Ok(())
}
