//! Fixed-window request counting per key.
//!
//! # Algorithm
//!
//! Each (policy, key) pair owns one [`RateWindow`]. On every check:
//!
//! 1. No window, or the window has expired: open a new one with count 1 and admit.
//! 2. Otherwise increment the count; admit while `count <= max_admissions`.
//!
//! Rejected attempts still increment the count, so sustained excess traffic
//! keeps being rejected until the window rolls over.
//!
//! # Concurrency
//!
//! Windows live in a [`DashMap`]. A check holds the shard write lock through
//! the entry API while it reads, increments, and decides, so two racing
//! requests for the same key can never both observe `max - 1` and both be
//! admitted. Keys on different shards proceed in parallel.
//!
//! # Memory
//!
//! Expired windows are reset in place when their key is seen again. Keys that
//! are never seen again are removed by [`RateLimiterRegistry::sweep`], which
//! the application runs on a timer.
//!
//! State is per process. Running several replicas multiplies the effective
//! ceiling by the replica count.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tracing::trace;

/// Default window for both built-in policies (15 minutes).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Default ceiling for the anonymous (login) policy.
pub const DEFAULT_ANONYMOUS_MAX: u32 = 100;

/// Default ceiling for the per-identity policy.
pub const DEFAULT_IDENTITY_MAX: u32 = 20;

/// Error type for window policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limit window must be greater than 0")]
    ZeroWindow,
    #[error("rate limit ceiling must be greater than 0")]
    ZeroLimit,
}

/// Where a gate takes the rate-limit key from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Client source address; usable before authentication.
    SourceAddress,
    /// Authenticated identity; requires the authentication gate to run first.
    Identity,
}

/// A rate-limiting rule: window length, ceiling, and key derivation.
#[derive(Debug, Clone)]
pub struct WindowPolicy {
    name: Arc<str>,
    window: Duration,
    max_admissions: u32,
    key_source: KeySource,
}

impl WindowPolicy {
    /// Create a policy.
    ///
    /// `name` separates counters: the same key under two policies is tracked
    /// independently.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError`] if `window` or `max_admissions` is zero.
    pub fn new(
        name: &str,
        window: Duration,
        max_admissions: u32,
        key_source: KeySource,
    ) -> Result<Self, RateLimitError> {
        if window.is_zero() {
            return Err(RateLimitError::ZeroWindow);
        }
        if max_admissions == 0 {
            return Err(RateLimitError::ZeroLimit);
        }

        Ok(Self {
            name: Arc::from(name),
            window,
            max_admissions,
            key_source,
        })
    }

    /// Source-address policy for public endpoints such as login.
    pub fn anonymous(window: Duration, max_admissions: u32) -> Result<Self, RateLimitError> {
        Self::new("anonymous", window, max_admissions, KeySource::SourceAddress)
    }

    /// Identity-keyed policy applied after authentication.
    pub fn identity(window: Duration, max_admissions: u32) -> Result<Self, RateLimitError> {
        Self::new("identity", window, max_admissions, KeySource::Identity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_admissions(&self) -> u32 {
        self.max_admissions
    }

    pub fn key_source(&self) -> KeySource {
        self.key_source
    }

    fn decide(&self, window: &RateWindow, now: Instant) -> Decision {
        let reset_after = window.expires_at.saturating_duration_since(now);

        if window.count > self.max_admissions {
            Decision::Reject {
                limit: self.max_admissions,
                retry_after: reset_after,
            }
        } else {
            Decision::Admit {
                limit: self.max_admissions,
                remaining: self.max_admissions - window.count,
                reset_after,
            }
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit {
        limit: u32,
        remaining: u32,
        reset_after: Duration,
    },
    Reject {
        limit: u32,
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit { .. })
    }

    pub fn limit(&self) -> u32 {
        match self {
            Decision::Admit { limit, .. } | Decision::Reject { limit, .. } => *limit,
        }
    }

    pub fn remaining(&self) -> u32 {
        match self {
            Decision::Admit { remaining, .. } => *remaining,
            Decision::Reject { .. } => 0,
        }
    }

    /// Time until the current window closes.
    pub fn reset_after(&self) -> Duration {
        match self {
            Decision::Admit { reset_after, .. } => *reset_after,
            Decision::Reject { retry_after, .. } => *retry_after,
        }
    }
}

/// Counting record for one key under one policy.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    expires_at: Instant,
}

impl RateWindow {
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            expires_at: now + window,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    policy: Arc<str>,
    key: String,
}

/// Shared registry of rate windows.
///
/// Owned by application state and handed to gates by `Arc`, so tests can
/// build isolated registries.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    windows: DashMap<WindowKey, RateWindow>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request for `key` under `policy` and decide admit/reject.
    pub fn check(&self, key: &str, policy: &WindowPolicy) -> Decision {
        self.check_at(key, policy, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(&self, key: &str, policy: &WindowPolicy, now: Instant) -> Decision {
        let window_key = WindowKey {
            policy: Arc::clone(&policy.name),
            key: key.to_owned(),
        };

        // The entry guard holds the shard lock until the decision is made
        match self.windows.entry(window_key) {
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                if window.is_expired(now) {
                    trace!(policy = %policy.name, key, "Rate window rolled over");
                    *window = RateWindow::open(now, policy.window);
                } else {
                    window.count = window.count.saturating_add(1);
                }
                policy.decide(window, now)
            }
            Entry::Vacant(vacant) => {
                let window = vacant.insert(RateWindow::open(now, policy.window));
                policy.decide(&window, now)
            }
        }
    }

    /// Drop every expired window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// [`sweep`](Self::sweep) against an explicit clock reading.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_expired(now));
        before.saturating_sub(self.windows.len())
    }

    /// Number of windows currently held.
    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }
}
