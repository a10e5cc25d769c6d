//! Bearer token authentication gate.
//!
//! Reads the `Authorization` header, verifies it with [`TokenVerifier`], and
//! attaches the resulting [`Identity`] to the request extensions for the
//! identity rate limit gate and handlers further down the pipeline. Any
//! failure short-circuits with the response for its [`AuthError`]; the inner
//! service is never called.
//!
//! # Logging
//!
//! Exactly one entry per request: `info` when the gate passes, `error` when it
//! refuses. Both carry the route and either the identity or the client address.
//!
//! # Brute Force Protection
//!
//! An optional [`AuthFailureThrottle`] counts bad credentials per client
//! address. Once an address exhausts its quota it is refused with 429 before
//! its credential is even looked at, until the quota replenishes.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, RETRY_AFTER};
use axum::http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tower::{Layer, Service};
use tracing::{error, info};

use super::ip::{TrustedProxyConfig, extract_client_ip};
use crate::error::AuthError;
use crate::metrics;
use crate::models::Identity;
use crate::response::send_error;
use crate::token::TokenVerifier;

/// Default burst capacity for auth failure rate limiting.
const DEFAULT_AUTH_FAILURE_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();

/// Shortest block handed out once an address exhausts its failure quota.
const MIN_BLOCK: Duration = Duration::from_secs(1);

/// Type alias for auth failure rate limiter (per-IP).
type AuthFailureLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Authenticate a request from its headers.
///
/// # Errors
///
/// - [`AuthError::NoCredential`] when there is no `Authorization` header
/// - [`AuthError::Malformed`] when the header is not valid visible ASCII
/// - anything [`TokenVerifier::verify`] returns
pub async fn authenticate(
    headers: &HeaderMap,
    verifier: &TokenVerifier,
) -> Result<Identity, AuthError> {
    let credential = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::NoCredential)?
        .to_str()
        .map_err(|_| AuthError::Malformed)?;

    let claims = verifier.verify(credential).await?;
    Ok(Identity::from(claims))
}

/// Per-address counter of rejected credentials.
///
/// Only failures consume quota, so clients presenting valid tokens are never
/// slowed down by it.
pub struct AuthFailureThrottle {
    limiter: AuthFailureLimiter,
    blocked: DashMap<String, Instant>,
}

impl fmt::Debug for AuthFailureThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthFailureThrottle")
            .field("blocked", &self.blocked.len())
            .finish_non_exhaustive()
    }
}

impl AuthFailureThrottle {
    /// Allow `per_minute` failures per address, with a burst of up to 5.
    ///
    /// Returns `None` when `per_minute` is 0, which disables the throttle.
    pub fn new(per_minute: u32) -> Option<Self> {
        let per_minute = NonZeroU32::new(per_minute)?;
        let quota =
            Quota::per_minute(per_minute).allow_burst(DEFAULT_AUTH_FAILURE_BURST.min(per_minute));

        Some(Self {
            limiter: RateLimiter::keyed(quota),
            blocked: DashMap::new(),
        })
    }

    /// Remaining block time for `client_ip`, if it is currently blocked.
    pub fn blocked_for(&self, client_ip: &str) -> Option<Duration> {
        let now = Instant::now();
        let until = *self.blocked.get(client_ip)?;

        if until > now {
            return Some(until - now);
        }

        self.blocked.remove_if(client_ip, |_, until| *until <= now);
        None
    }

    /// Count one failed attempt. Returns `true` if this failure exhausted the
    /// quota and the address is now blocked.
    pub fn record_failure(&self, client_ip: &str) -> bool {
        let key = client_ip.to_string();
        match self.limiter.check_key(&key) {
            Ok(()) => false,
            Err(not_until) => {
                let wait = not_until
                    .wait_time_from(DefaultClock::default().now())
                    .max(MIN_BLOCK);
                self.blocked.insert(key, Instant::now() + wait);
                true
            }
        }
    }

    /// Drop limiter state and blocks that no longer matter.
    pub fn sweep(&self) {
        self.limiter.retain_recent();
        let now = Instant::now();
        self.blocked.retain(|_, until| *until > now);
    }
}

/// Authentication gate layer.
#[derive(Clone)]
pub struct AuthLayer {
    verifier: Arc<TokenVerifier>,
    trusted_proxies: Arc<TrustedProxyConfig>,
    failure_throttle: Option<Arc<AuthFailureThrottle>>,
}

impl AuthLayer {
    pub fn new(verifier: Arc<TokenVerifier>, trusted_proxies: Arc<TrustedProxyConfig>) -> Self {
        Self {
            verifier,
            trusted_proxies,
            failure_throttle: None,
        }
    }

    /// Enable brute force protection with a shared throttle.
    pub fn with_failure_throttle(mut self, throttle: Option<Arc<AuthFailureThrottle>>) -> Self {
        self.failure_throttle = throttle;
        self
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            verifier: self.verifier.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
            failure_throttle: self.failure_throttle.clone(),
        }
    }
}

/// Authentication gate service wrapper.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    verifier: Arc<TokenVerifier>,
    trusted_proxies: Arc<TrustedProxyConfig>,
    failure_throttle: Option<Arc<AuthFailureThrottle>>,
}

impl<S> Service<Request<Body>> for AuthService<S>
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
        let verifier = self.verifier.clone();
        let failure_throttle = self.failure_throttle.clone();
        let route = req.uri().path().to_owned();
        let client_ip = extract_client_ip(&req, &self.trusted_proxies).into_owned();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if let Some(throttle) = &failure_throttle
                && let Some(remaining) = throttle.blocked_for(&client_ip)
            {
                let retry_after = remaining.as_secs().max(1);
                error!(
                    route = %route,
                    client_ip = %client_ip,
                    retry_after_secs = retry_after,
                    "Address blocked after repeated authentication failures"
                );
                metrics::record_auth_failure_block();
                return Ok(too_many_failures_response(retry_after));
            }

            // Only the head is borrowed across the await; the body is not Sync
            let (mut parts, body) = req.into_parts();

            match authenticate(&parts.headers, &verifier).await {
                Ok(identity) => {
                    info!(
                        route = %route,
                        identity = identity.subject_id(),
                        "Request authenticated"
                    );
                    metrics::record_auth_outcome("ok");
                    parts.extensions.insert(identity);
                    inner.call(Request::from_parts(parts, body)).await
                }
                Err(err) => {
                    if err == AuthError::SecretUnavailable {
                        error!(
                            route = %route,
                            client_ip = %client_ip,
                            "Token verification secret is not configured"
                        );
                    } else {
                        error!(
                            route = %route,
                            client_ip = %client_ip,
                            reason = err.label(),
                            "Authentication failed"
                        );
                    }
                    metrics::record_auth_outcome(err.label());

                    if let Some(throttle) = &failure_throttle
                        && counts_as_failure(err)
                    {
                        throttle.record_failure(&client_ip);
                    }

                    Ok(err.into_response())
                }
            }
        })
    }
}

/// Whether an error looks like a credential guess.
///
/// A missing header is not a guess, and a missing secret is not the client's doing.
fn counts_as_failure(err: AuthError) -> bool {
    matches!(
        err,
        AuthError::Malformed | AuthError::Invalid | AuthError::MissingClaims
    )
}

/// Build a rate limited (429) response for auth failures.
fn too_many_failures_response(retry_after: u64) -> Response<Body> {
    let mut response = send_error(
        StatusCode::TOO_MANY_REQUESTS,
        "Too many failed authentication attempts - try again later",
    );
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}
