//! JSON response envelopes shared by handlers and gates.
//!
//! Gates never build response bodies themselves; they go through
//! [`send_error`] and [`send_success`] so every endpoint speaks the same
//! envelope:
//!
//! ```json
//! { "success": true,  "data": { ... } }
//! { "success": false, "message": "Invalid token" }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Serialize)]
struct SuccessEnvelope<T> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    success: bool,
    message: &'a str,
}

/// Build an error response with the given status and human-readable message.
pub fn send_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorEnvelope {
            success: false,
            message,
        }),
    )
        .into_response()
}

/// Build a success response wrapping `payload` in the `data` field.
pub fn send_success<T: Serialize>(payload: T, status: StatusCode) -> Response {
    (
        status,
        Json(SuccessEnvelope {
            success: true,
            data: payload,
        }),
    )
        .into_response()
}
