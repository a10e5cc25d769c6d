//! Environment-driven configuration.
//!
//! Every value has a development default except `JWT_SECRET`, which has none:
//! [`Config::from_env`] fails without it, so a process that cannot verify
//! tokens never starts serving. A `.env` file in the working directory is read
//! first when present.
//!
//! # Tokens
//!
//! - `JWT_SECRET`: HMAC key for issuing and verifying bearer tokens (required)
//! - `JWT_TTL_SECS`: lifetime of issued tokens (3600)
//!
//! # Rate Limits
//!
//! - `LOGIN_RATE_LIMIT_WINDOW_SECS` / `LOGIN_RATE_LIMIT_MAX`: per-address login quota (900s / 100)
//! - `USER_RATE_LIMIT_WINDOW_SECS` / `USER_RATE_LIMIT_MAX`: per-identity quota (900s / 20)
//! - `AUTH_FAILURE_LIMIT_PER_MINUTE`: bad credentials per address before blocking (10, 0 = off)
//!
//! # Network
//!
//! - `TRUSTED_PROXIES`: CIDR ranges whose `X-Forwarded-For` headers are believed
//! - `CORS_ALLOWED_ORIGINS`: comma-separated origins, `*` for any (default `*`)

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::limiter::{
    DEFAULT_ANONYMOUS_MAX, DEFAULT_IDENTITY_MAX, DEFAULT_WINDOW, RateLimitError, WindowPolicy,
};

/// Account created in the in-memory repository at startup.
#[derive(Clone)]
pub struct SeedUser {
    pub email: String,
    pub password: String,
    pub role: String,
}

impl std::fmt::Debug for SeedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedUser")
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Process configuration. Build with [`Config::from_env`], or from
/// [`Config::default`] in tests.
#[derive(Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 64KB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Token Configuration
    // =========================================================================
    /// HMAC secret for bearer tokens. `from_env` refuses to return without one.
    pub jwt_secret: Option<String>,

    /// Lifetime of tokens issued by the login route (default: 1 hour)
    pub jwt_ttl: Duration,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Login window length (default: 15 minutes)
    pub login_rate_limit_window: Duration,

    /// Login attempts per address per window (default: 100)
    pub login_rate_limit_max: u32,

    /// Per-identity window length (default: 15 minutes)
    pub user_rate_limit_window: Duration,

    /// Requests per identity per window (default: 20)
    pub user_rate_limit_max: u32,

    /// How often expired windows are swept from memory (default: 60 seconds)
    pub rate_limit_sweep_interval: Duration,

    /// Failed authentications per address per minute before blocking
    /// (default: 10, 0 = disabled)
    pub auth_failure_limit_per_minute: u32,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Comma-separated list of allowed CORS origins
    /// Use "*" to allow all origins (not recommended for production)
    pub cors_allowed_origins: Vec<String>,

    /// Trusted proxy CIDR ranges for IP spoofing mitigation.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    /// Default: Empty (forwarding headers ignored, the socket peer is the key)
    pub trusted_proxies: Vec<String>,

    /// Bootstrap account, from `SEED_USER_EMAIL` / `SEED_USER_PASSWORD` /
    /// `SEED_USER_ROLE`
    pub seed_user: Option<SeedUser>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (default: 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if `JWT_SECRET` is missing or any value
    /// is invalid (e.g., non-numeric PORT, zero rate limit window).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 64 * 1024)?,

            // Tokens
            jwt_secret: env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
            jwt_ttl: Duration::from_secs(Self::parse_env("JWT_TTL_SECS", 3600)?),

            // Rate limiting
            login_rate_limit_window: Duration::from_secs(Self::parse_env(
                "LOGIN_RATE_LIMIT_WINDOW_SECS",
                DEFAULT_WINDOW.as_secs(),
            )?),
            login_rate_limit_max: Self::parse_env("LOGIN_RATE_LIMIT_MAX", DEFAULT_ANONYMOUS_MAX)?,
            user_rate_limit_window: Duration::from_secs(Self::parse_env(
                "USER_RATE_LIMIT_WINDOW_SECS",
                DEFAULT_WINDOW.as_secs(),
            )?),
            user_rate_limit_max: Self::parse_env("USER_RATE_LIMIT_MAX", DEFAULT_IDENTITY_MAX)?,
            rate_limit_sweep_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                60,
            )?),
            auth_failure_limit_per_minute: Self::parse_env("AUTH_FAILURE_LIMIT_PER_MINUTE", 10)?,

            // Security
            cors_allowed_origins: Self::parse_cors_origins(),
            trusted_proxies: Self::parse_trusted_proxies(),
            seed_user: Self::parse_seed_user(),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", 0)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.jwt_secret.is_none() {
            return Err(AppError::ConfigError(
                "JWT_SECRET must be set to a non-empty value".to_string(),
            ));
        }

        if self.jwt_ttl.is_zero() {
            return Err(AppError::ConfigError(
                "JWT_TTL_SECS must be greater than 0".to_string(),
            ));
        }

        self.anonymous_policy()
            .map_err(|e| AppError::ConfigError(format!("LOGIN_RATE_LIMIT_*: {e}")))?;
        self.identity_policy()
            .map_err(|e| AppError::ConfigError(format!("USER_RATE_LIMIT_*: {e}")))?;

        if self.rate_limit_sweep_interval.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-address policy for the login route.
    pub fn anonymous_policy(&self) -> Result<WindowPolicy, RateLimitError> {
        WindowPolicy::anonymous(self.login_rate_limit_window, self.login_rate_limit_max)
    }

    /// Per-identity policy for throttled routes.
    pub fn identity_policy(&self) -> Result<WindowPolicy, RateLimitError> {
        WindowPolicy::identity(self.user_rate_limit_window, self.user_rate_limit_max)
    }

    /// Check if trusted proxy validation is enabled.
    pub fn proxy_validation_enabled(&self) -> bool {
        !self.trusted_proxies.is_empty()
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr + ToString,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse CORS allowed origins from environment variable.
    fn parse_cors_origins() -> Vec<String> {
        env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Parse trusted proxy CIDR ranges from environment variable.
    fn parse_trusted_proxies() -> Vec<String> {
        env::var("TRUSTED_PROXIES")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Seed account, present only when both email and password are set.
    fn parse_seed_user() -> Option<SeedUser> {
        let email = env::var("SEED_USER_EMAIL").ok().filter(|s| !s.is_empty())?;
        let password = env::var("SEED_USER_PASSWORD").ok().filter(|s| !s.is_empty())?;
        let role = env::var("SEED_USER_ROLE").unwrap_or_else(|_| "staff".to_string());

        Some(SeedUser {
            email,
            password,
            role,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("jwt_ttl", &self.jwt_ttl)
            .field("login_rate_limit_window", &self.login_rate_limit_window)
            .field("login_rate_limit_max", &self.login_rate_limit_max)
            .field("user_rate_limit_window", &self.user_rate_limit_window)
            .field("user_rate_limit_max", &self.user_rate_limit_max)
            .field("trusted_proxies", &self.trusted_proxies)
            .field("seed_user", &self.seed_user)
            .field("metrics_port", &self.metrics_port)
            .finish_non_exhaustive()
    }
}

/// Development defaults, including a fixed signing secret. Tests only.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_request_body_size: 64 * 1024, // 64KB
            // Tokens
            jwt_secret: Some("development-secret".to_string()),
            jwt_ttl: Duration::from_secs(3600),
            // Rate limiting
            login_rate_limit_window: DEFAULT_WINDOW,
            login_rate_limit_max: DEFAULT_ANONYMOUS_MAX,
            user_rate_limit_window: DEFAULT_WINDOW,
            user_rate_limit_max: DEFAULT_IDENTITY_MAX,
            rate_limit_sweep_interval: Duration::from_secs(60),
            auth_failure_limit_per_minute: 10,
            // Security
            cors_allowed_origins: vec!["*".to_string()],
            trusted_proxies: vec![], // Empty = forwarding headers ignored
            seed_user: None,
            // Observability
            metrics_port: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.login_rate_limit_max, 100);
        assert_eq!(config.user_rate_limit_max, 20);
        assert_eq!(config.login_rate_limit_window, Duration::from_secs(900));
        assert!(!config.metrics_enabled());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "192.168.1.1".to_string(),
            port: 8080,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "192.168.1.1:8080");
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_missing_secret() {
        let config = Config {
            jwt_secret: None,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_validate_zero_login_limit() {
        let config = Config {
            login_rate_limit_max: 0,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("LOGIN_RATE_LIMIT"));
    }

    #[test]
    fn test_validate_zero_user_window() {
        let config = Config {
            user_rate_limit_window: Duration::ZERO,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("USER_RATE_LIMIT"));
    }

    #[test]
    fn test_policies_follow_config() {
        let config = Config {
            user_rate_limit_max: 5,
            ..Config::default()
        };

        let policy = config.identity_policy().unwrap();
        assert_eq!(policy.max_admissions(), 5);
        assert_eq!(policy.window(), DEFAULT_WINDOW);
    }

    #[test]
    fn test_metrics_addr() {
        let config = Config {
            metrics_port: 9090,
            ..Config::default()
        };
        assert_eq!(config.metrics_addr().unwrap().port(), 9090);
        assert!(Config::default().metrics_addr().is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", Config::default());
        assert!(!rendered.contains("development-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
