//! Shared application state for Axum handlers and gates.
//!
//! Holds everything a request may touch: configuration, the token verifier
//! and issuer, the rate limiter registry, the brute force throttle, and the
//! user repository. All of it is behind `Arc`, so cloning per request is cheap.
//!
//! # Structured Concurrency
//!
//! The expired-window sweep runs as a background task managed with
//! `tokio_util::task::TaskTracker` and `CancellationToken`. Call `shutdown()`
//! to stop it before application exit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::config::Config;
use crate::limiter::{RateLimitError, RateLimiterRegistry};
use crate::metrics;
use crate::middleware::{AuthFailureThrottle, TrustedProxyConfig};
use crate::pipeline::RequestPipeline;
use crate::repository::UserRepository;
use crate::token::{TokenIssuer, TokenVerifier};

/// Shared application state.
///
/// # Lifecycle
///
/// The sweep task is spawned on creation, so this must be built inside a
/// Tokio runtime:
///
/// ```rust,ignore
/// let state = AppState::new(config, Arc::new(MemoryUserRepository::new()));
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Verifies bearer tokens for the authentication gate
    pub verifier: Arc<TokenVerifier>,
    /// Signs tokens at login; `None` when no secret is configured
    pub issuer: Option<Arc<TokenIssuer>>,
    /// Fixed-window counters shared by every rate limit gate
    pub registry: Arc<RateLimiterRegistry>,
    /// Account lookups
    pub users: Arc<dyn UserRepository>,
    /// Networks whose forwarding headers are believed
    pub trusted_proxies: Arc<TrustedProxyConfig>,
    /// Per-address bad credential counter (None = disabled)
    pub failure_throttle: Option<Arc<AuthFailureThrottle>>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create application state and start the sweep task.
    pub fn new(config: Config, users: Arc<dyn UserRepository>) -> Self {
        let secret = config.jwt_secret.as_deref();
        let verifier = Arc::new(TokenVerifier::new(secret));
        let issuer = secret
            .filter(|s| !s.is_empty())
            .map(|s| Arc::new(TokenIssuer::new(s, config.jwt_ttl)));

        let trusted_proxies = Arc::new(TrustedProxyConfig::new(&config.trusted_proxies));
        let failure_throttle =
            AuthFailureThrottle::new(config.auth_failure_limit_per_minute).map(Arc::new);

        let state = Self {
            config: Arc::new(config),
            verifier,
            issuer,
            registry: Arc::new(RateLimiterRegistry::new()),
            users,
            trusted_proxies,
            failure_throttle,
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_sweep_task();

        state
    }

    /// Assemble the gates from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError`] if a configured window or ceiling is zero.
    pub fn pipeline(&self) -> Result<RequestPipeline, RateLimitError> {
        let pipeline = RequestPipeline::new(
            self.registry.clone(),
            self.verifier.clone(),
            self.trusted_proxies.clone(),
            self.config.anonymous_policy()?,
            self.config.identity_policy()?,
        )
        .with_failure_throttle(self.failure_throttle.clone());

        Ok(pipeline)
    }

    /// Spawn the background task that drops expired rate windows.
    ///
    /// Clones only the registry and throttle rather than the whole state.
    fn spawn_sweep_task(&self) {
        let registry = self.registry.clone();
        let failure_throttle = self.failure_throttle.clone();
        // tokio's interval panics on a zero period
        let period = self
            .config
            .rate_limit_sweep_interval
            .max(Duration::from_millis(1));
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased; // Check cancellation first

                    _ = cancel.cancelled() => {
                        debug!("Window sweep task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = registry.sweep();
                        if let Some(throttle) = &failure_throttle {
                            throttle.sweep();
                        }

                        let tracked = registry.tracked_windows();
                        metrics::set_tracked_windows(tracked);
                        trace!(removed, tracked, "Swept expired rate windows");
                    }
                }
            }

            debug!("Window sweep task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// 1. Signals all tasks to stop via cancellation token
    /// 2. Closes the task tracker (prevents new tasks)
    /// 3. Waits for all tasks to complete
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
