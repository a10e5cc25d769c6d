//! Fixed-window rate limit gate.
//!
//! One layer type serves both placements in the pipeline; the
//! [`WindowPolicy`] it carries decides where the key comes from:
//!
//! - [`KeySource::SourceAddress`]: the client address, so the gate can run on
//!   public routes ahead of any authentication (login).
//! - [`KeySource::Identity`]: the [`Identity`] the authentication gate attached.
//!   Placed without that gate in front, every request fails with
//!   [`AuthError::NoIdentity`] instead of being counted against a shared key.
//!
//! # Response Headers
//!
//! Every counted request gets `RateLimit-Limit`, `RateLimit-Remaining`, and
//! `RateLimit-Reset` (seconds until the window rolls over). Rejections add
//! `Retry-After` with the same value.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{error, info};

use super::ip::{TrustedProxyConfig, extract_client_ip};
use crate::error::AuthError;
use crate::limiter::{Decision, KeySource, RateLimiterRegistry, WindowPolicy};
use crate::metrics;
use crate::models::Identity;
use crate::response::send_error;

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Body message for requests over the ceiling.
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests - try again later";

/// Rate limit gate layer for Tower middleware stack.
#[derive(Clone)]
pub struct RateLimitLayer {
    registry: Arc<RateLimiterRegistry>,
    policy: Arc<WindowPolicy>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl RateLimitLayer {
    /// Create a gate enforcing `policy` against the shared `registry`.
    pub fn new(
        registry: Arc<RateLimiterRegistry>,
        policy: Arc<WindowPolicy>,
        trusted_proxies: Arc<TrustedProxyConfig>,
    ) -> Self {
        Self {
            registry,
            policy,
            trusted_proxies,
        }
    }

    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            registry: self.registry.clone(),
            policy: self.policy.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Rate limit gate service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    registry: Arc<RateLimiterRegistry>,
    policy: Arc<WindowPolicy>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let route = req.uri().path().to_owned();
        let policy = self.policy.clone();

        let key = match policy.key_source() {
            KeySource::SourceAddress => {
                Ok(extract_client_ip(&req, &self.trusted_proxies).into_owned())
            }
            KeySource::Identity => req
                .extensions()
                .get::<Identity>()
                .map(|identity| identity.rate_limit_key().to_owned())
                .ok_or(AuthError::NoIdentity),
        };

        // The decision is made before the first await; dropping the future
        // afterwards cannot leave the count half-applied.
        let outcome = key.map(|key| {
            let decision = self.registry.check(&key, &policy);
            (key, decision)
        });
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let (key, decision) = match outcome {
                Ok(checked) => checked,
                Err(err) => {
                    error!(
                        route = %route,
                        policy = policy.name(),
                        "Identity rate limit reached without an authenticated identity"
                    );
                    return Ok(err.into_response());
                }
            };

            metrics::record_rate_limit_decision(policy.name(), decision.is_admitted());

            if !decision.is_admitted() {
                error!(
                    route = %route,
                    policy = policy.name(),
                    key = %key,
                    retry_after_secs = decision.reset_after().as_secs(),
                    "Rate limit exceeded"
                );
                return Ok(rate_limited_response(&decision));
            }

            info!(
                route = %route,
                policy = policy.name(),
                key = %key,
                remaining = decision.remaining(),
                "Rate limit passed"
            );

            let mut response = inner.call(req).await?;
            insert_rate_limit_headers(response.headers_mut(), &decision);
            Ok(response)
        })
    }
}

/// Seconds until reset, rounded up so clients never retry early.
fn reset_secs(decision: &Decision) -> u64 {
    let reset = decision.reset_after();
    let secs = reset.as_secs();
    if reset.subsec_nanos() > 0 { secs + 1 } else { secs }
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit()));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining()));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(reset_secs(decision)));
}

/// Build the 429 response for a rejected decision.
fn rate_limited_response(decision: &Decision) -> Response<Body> {
    let mut response = send_error(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE);
    let headers = response.headers_mut();
    insert_rate_limit_headers(headers, decision);
    headers.insert(RETRY_AFTER, HeaderValue::from(reset_secs(decision).max(1)));
    response
}
