//! Application routing configuration with middleware stack.
//!
//! # Route Classes
//!
//! | Route                | Class         | Gates                                        |
//! |----------------------|---------------|----------------------------------------------|
//! | `GET /health`        | ungated       | none                                         |
//! | `GET /ready`         | ungated       | none                                         |
//! | `POST /auth/login`   | Public        | access log, address limit                    |
//! | `GET /auth/session`  | Authenticated | access log, authentication                   |
//! | `GET /stats`         | Authenticated | access log, authentication                   |
//! | `GET /users/me`      | Throttled     | access log, authentication, identity limit   |
//! | `GET /users/{id}`    | Throttled     | access log, authentication, identity limit   |
//!
//! # Router-wide Layers
//!
//! ```text
//! Request → Trace → CORS → Body Limit → [class gates] → Handler
//! ```

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::limiter::RateLimitError;
use crate::pipeline::RouteClass;
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// # Errors
///
/// Returns `RateLimitError` if a configured rate limit policy is invalid.
pub fn build_router(state: AppState) -> Result<Router, RateLimitError> {
    let config = &state.config;
    let pipeline = state.pipeline()?;

    // =========================================================================
    // Route Groups
    // =========================================================================
    let probes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check));

    let public = pipeline.apply(
        Router::new().route("/auth/login", post(handlers::login)),
        RouteClass::Public,
    );

    let authenticated = pipeline.apply(
        Router::new()
            .route("/auth/session", get(handlers::session))
            .route("/stats", get(handlers::stats)),
        RouteClass::Authenticated,
    );

    let throttled = pipeline.apply(
        Router::new()
            .route("/users/me", get(handlers::me))
            .route("/users/{id}", get(handlers::get_user)),
        RouteClass::Throttled,
    );

    info!(
        login_window_secs = pipeline.anonymous_policy().window().as_secs(),
        login_max = pipeline.anonymous_policy().max_admissions(),
        user_window_secs = pipeline.identity_policy().window().as_secs(),
        user_max = pipeline.identity_policy().max_admissions(),
        proxy_validation = config.proxy_validation_enabled(),
        failure_throttle = state.failure_throttle.is_some(),
        "Rate limiting configured"
    );

    let mut router = probes.merge(public).merge(authenticated).merge(throttled);

    // =========================================================================
    // Router-wide Middleware (applied bottom to top)
    // =========================================================================
    info!(
        max_size_kb = config.max_request_body_size / 1024,
        "Request body size limit configured"
    );
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));
    router = router.layer(build_cors_layer(&config.cors_allowed_origins));
    router = router.layer(TraceLayer::new_for_http());

    Ok(router.with_state(state))
}

/// Build CORS layer from configuration.
///
/// `["*"]` allows any origin; otherwise only the listed origins that parse as
/// header values.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
