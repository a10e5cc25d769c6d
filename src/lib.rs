//! # user_gate
//!
//! A user records API on Axum whose interesting part is the request gating in
//! front of the handlers:
//!
//! - **Authentication**: HS256 bearer tokens verified into a typed identity
//! - **Rate Limiting**: fixed-window quotas per client address (login) and per
//!   identity (user routes), with atomic per-key counting
//! - **Brute Force Protection**: per-address throttle on rejected credentials
//! - **Observability**: request IDs, structured logging, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Router-wide layers (Trace → CORS → Body Limit)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RequestPipeline per route class                            │
//! │    Access Log → [Auth] → [Rate Limit: address | identity]   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (auth, users, health)                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UserRepository (in-memory)                                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use user_gate::{AppState, Config, MemoryUserRepository, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config, Arc::new(MemoryUserRepository::new()));
//!     let app = build_router(state)?;
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```bash
//! JWT_SECRET=change-me USER_RATE_LIMIT_MAX=20 cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod response;
pub mod routes;
pub mod state;
pub mod token;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult, AuthError};
pub use limiter::{Decision, RateLimiterRegistry, WindowPolicy};
pub use pipeline::{RequestPipeline, RouteClass};
pub use repository::{MemoryUserRepository, UserRecord, UserRepository};
pub use routes::build_router;
pub use state::AppState;
pub use token::{TokenIssuer, TokenVerifier};
