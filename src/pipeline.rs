//! Per-route-class gate composition.
//!
//! ```text
//! Public:        access log → anonymous rate limit → handler
//! Authenticated: access log → authentication → handler
//! Throttled:     access log → authentication → identity rate limit → handler
//! ```
//!
//! Gates are attached with [`Router::route_layer`], so they only run for
//! requests that matched a route of that class; unknown paths fall through to
//! the router's 404 without being counted or authenticated.

use std::fmt;
use std::sync::Arc;

use axum::Router;
use tracing::debug;

use crate::limiter::{RateLimiterRegistry, WindowPolicy};
use crate::middleware::{
    AccessLogLayer, AuthFailureThrottle, AuthLayer, RateLimitLayer, TrustedProxyConfig,
};
use crate::token::TokenVerifier;

/// Which gates protect a group of routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// No credential required; limited per source address.
    Public,
    /// Bearer token required; no quota beyond authentication.
    Authenticated,
    /// Bearer token required and limited per identity.
    Throttled,
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteClass::Public => write!(f, "public"),
            RouteClass::Authenticated => write!(f, "authenticated"),
            RouteClass::Throttled => write!(f, "throttled"),
        }
    }
}

/// The gates shared by every route class.
///
/// All classes count against the same [`RateLimiterRegistry`]; policies keep
/// their windows apart by name.
#[derive(Clone)]
pub struct RequestPipeline {
    access_log: AccessLogLayer,
    auth: AuthLayer,
    anonymous_gate: RateLimitLayer,
    identity_gate: RateLimitLayer,
}

impl RequestPipeline {
    pub fn new(
        registry: Arc<RateLimiterRegistry>,
        verifier: Arc<TokenVerifier>,
        trusted_proxies: Arc<TrustedProxyConfig>,
        anonymous_policy: WindowPolicy,
        identity_policy: WindowPolicy,
    ) -> Self {
        Self {
            access_log: AccessLogLayer::new(trusted_proxies.clone()),
            auth: AuthLayer::new(verifier, trusted_proxies.clone()),
            anonymous_gate: RateLimitLayer::new(
                registry.clone(),
                Arc::new(anonymous_policy),
                trusted_proxies.clone(),
            ),
            identity_gate: RateLimitLayer::new(
                registry,
                Arc::new(identity_policy),
                trusted_proxies,
            ),
        }
    }

    /// Share a brute force throttle with the authentication gate.
    pub fn with_failure_throttle(mut self, throttle: Option<Arc<AuthFailureThrottle>>) -> Self {
        self.auth = self.auth.with_failure_throttle(throttle);
        self
    }

    /// Wrap every route currently on `router` in the gates for `class`.
    ///
    /// Layers added later run earlier, so they are added innermost first.
    pub fn apply<S>(&self, router: Router<S>, class: RouteClass) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let gated = match class {
            RouteClass::Public => router.route_layer(self.anonymous_gate.clone()),
            RouteClass::Authenticated => router.route_layer(self.auth.clone()),
            RouteClass::Throttled => router
                .route_layer(self.identity_gate.clone())
                .route_layer(self.auth.clone()),
        };

        debug!(class = %class, "Route class gates attached");
        gated.route_layer(self.access_log.clone())
    }

    pub fn anonymous_policy(&self) -> &WindowPolicy {
        self.anonymous_gate.policy()
    }

    pub fn identity_policy(&self) -> &WindowPolicy {
        self.identity_gate.policy()
    }
}
