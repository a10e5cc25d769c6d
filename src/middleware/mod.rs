//! HTTP middleware: the gates that make up a request pipeline.
//!
//! - **Access Log**: request ID propagation, one log entry and one duration
//!   sample per request
//! - **Authentication**: bearer token verification, identity attachment, and
//!   per-address brute force throttling
//! - **Rate Limiting**: fixed-window counting keyed by address or identity
//! - **Client Address**: forwarding header resolution with trusted proxy ranges
//!
//! # Architecture
//!
//! ```text
//! Public:    Access Log → Rate Limit (address)  → Handler
//! Throttled: Access Log → Auth → Rate Limit (identity) → Handler
//!                          ↓           ↓
//!                     400/401/500     429
//! ```
//!
//! Gates are composed per route class by [`crate::pipeline::RequestPipeline`].

pub mod access_log;
pub mod auth;
pub mod ip;
pub mod rate_limit;

pub use access_log::{AccessLogLayer, REQUEST_ID_HEADER};
pub use auth::{AuthFailureThrottle, AuthLayer, authenticate};
pub use ip::{TrustedProxyConfig, UNKNOWN_IP, extract_client_ip};
pub use rate_limit::{RATE_LIMITED_MESSAGE, RateLimitLayer};
