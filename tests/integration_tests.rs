//! End-to-end tests against a real listening server.
//!
//! Each test starts its own server on an ephemeral port with its own state,
//! so rate limit counters never leak between tests.
//!
//! Run with: `cargo test --test integration_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::time::sleep;

use user_gate::{AppState, Config, MemoryUserRepository, UserRecord, build_router};

const SEED_ID: &str = "user-1";
const SEED_EMAIL: &str = "alice@example.com";
const SEED_PASSWORD: &str = "correct horse battery";

const LOGIN_MAX: u32 = 5;
const USER_MAX: u32 = 3;

/// Find an available port for the test server
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to ephemeral port")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

/// Test fixture that manages the app server
struct TestFixture {
    base_url: String,
    client: Client,
}

impl TestFixture {
    async fn new() -> Self {
        let app_port = find_available_port();
        let base_url = format!("http://127.0.0.1:{}", app_port);

        // Use a channel to communicate server startup status
        let (tx, mut rx) = tokio::sync::oneshot::channel::<Result<(), String>>();

        tokio::spawn(async move {
            if let Err(e) = Self::start_server(app_port).await {
                let _ = tx.send(Err(e));
            }
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self::wait_for_server(&client, &base_url, &mut rx).await;

        Self { base_url, client }
    }

    /// Start the application server
    async fn start_server(port: u16) -> Result<(), String> {
        use tokio::net::TcpListener;

        let config = Config {
            host: "127.0.0.1".to_string(),
            port,
            jwt_secret: Some("integration-secret".to_string()),
            login_rate_limit_max: LOGIN_MAX,
            user_rate_limit_max: USER_MAX,
            // Brute force throttle off; the fixed-window gates are under test
            auth_failure_limit_per_minute: 0,
            ..Config::default()
        };

        let users = MemoryUserRepository::new().with_user(UserRecord::new(
            SEED_ID,
            SEED_EMAIL,
            "member",
            SEED_PASSWORD,
        ));

        let state = AppState::new(config, Arc::new(users));
        let app = build_router(state).map_err(|e| format!("Failed to build router: {}", e))?;

        let listener = TcpListener::bind(format!("127.0.0.1:{}", port))
            .await
            .map_err(|e| format!("Failed to bind server: {}", e))?;

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| format!("Server failed: {}", e))?;

        Ok(())
    }

    /// Wait for the server to become ready
    async fn wait_for_server(
        client: &Client,
        base_url: &str,
        error_rx: &mut tokio::sync::oneshot::Receiver<Result<(), String>>,
    ) {
        let health_url = format!("{}/health", base_url);
        let max_attempts = 50;

        for attempt in 1..=max_attempts {
            if let Ok(Err(e)) = error_rx.try_recv() {
                panic!("Server failed to start: {}", e);
            }

            match client.get(&health_url).send().await {
                Ok(response) if response.status().is_success() => return,
                _ if attempt == max_attempts => {
                    panic!("Server failed to respond after {} attempts", max_attempts)
                }
                _ => {}
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Login request failed")
    }

    /// Log in as the seeded user and return the bearer token.
    async fn token(&self) -> String {
        let response = self.login(SEED_EMAIL, SEED_PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.expect("Failed to parse response");
        body["data"]["token"]
            .as_str()
            .expect("token missing")
            .to_string()
    }
}

fn header_u64(response: &reqwest::Response, name: &str) -> u64 {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("{name} header missing"))
        .to_str()
        .unwrap()
        .parse()
        .unwrap()
}

// ============================================================================
// Probes
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .expect("Health request failed");

    assert!(response.status().is_success());
    assert!(response.headers().get("x-request-id").is_none());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
    assert!(body.get("version").is_some());
    assert!(body.get("timestamp").is_some());
}

#[tokio::test]
async fn test_readiness_endpoint() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .client
        .get(fixture.url("/ready"))
        .send()
        .await
        .expect("Readiness request failed");

    assert!(response.status().is_success());
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_success_returns_token_and_profile() {
    let fixture = TestFixture::new().await;

    let response = fixture.login(SEED_EMAIL, SEED_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());
    assert_eq!(header_u64(&response, "ratelimit-limit"), u64::from(LOGIN_MAX));
    assert_eq!(
        header_u64(&response, "ratelimit-remaining"),
        u64::from(LOGIN_MAX - 1)
    );

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["user"]["id"], SEED_ID);
    assert_eq!(body["data"]["user"]["email"], SEED_EMAIL);
    assert!(body["data"]["expires_at"].is_string());
}

#[tokio::test]
async fn test_login_wrong_password_is_401() {
    let fixture = TestFixture::new().await;

    let response = fixture.login(SEED_EMAIL, "wrong password!").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_login_unknown_email_matches_wrong_password() {
    let fixture = TestFixture::new().await;

    let unknown = fixture.login("nobody@example.com", SEED_PASSWORD).await;
    let unknown_status = unknown.status();
    let unknown_body: Value = unknown.json().await.unwrap();

    let wrong = fixture.login(SEED_EMAIL, "wrong password!").await;
    let wrong_status = wrong.status();
    let wrong_body: Value = wrong.json().await.unwrap();

    assert_eq!(unknown_status, wrong_status);
    assert_eq!(unknown_body, wrong_body);
}

#[tokio::test]
async fn test_login_invalid_email_is_400() {
    let fixture = TestFixture::new().await;

    let response = fixture.login("not-an-email", SEED_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_malformed_json_is_400() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .client
        .post(fixture.url("/auth/login"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_login_ceiling_per_address() {
    let fixture = TestFixture::new().await;

    // Failed attempts count against the same window as successful ones
    for _ in 0..LOGIN_MAX {
        let response = fixture.login(SEED_EMAIL, "wrong password!").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = fixture.login(SEED_EMAIL, SEED_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_u64(&response, "ratelimit-remaining"), 0);
    assert!(header_u64(&response, "retry-after") > 0);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Too many requests - try again later");
}

// ============================================================================
// Authenticated routes
// ============================================================================

#[tokio::test]
async fn test_session_requires_token() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .client
        .get(fixture.url("/auth/session"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Access denied - no token provided");
}

#[tokio::test]
async fn test_session_with_token() {
    let fixture = TestFixture::new().await;
    let token = fixture.token().await;

    let response = fixture
        .client
        .get(fixture.url("/auth/session"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["subject_id"], SEED_ID);
    assert_eq!(body["data"]["email"], SEED_EMAIL);
    assert_eq!(body["data"]["role"], "member");
}

#[tokio::test]
async fn test_tampered_token_is_401() {
    let fixture = TestFixture::new().await;
    let token = fixture.token().await;
    // Keep header and payload, swap in an all-zero signature
    let (signed, _) = token.rsplit_once('.').unwrap();
    let token = format!("{signed}.{}", "A".repeat(43));

    let response = fixture
        .client
        .get(fixture.url("/auth/session"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_scheme_is_400() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .client
        .get(fixture.url("/auth/session"))
        .header("authorization", "Basic dXNlcjpwYXNz")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let fixture = TestFixture::new().await;
    let token = fixture.token().await;

    let response = fixture
        .client
        .get(fixture.url("/stats"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["users_count"], 1);
    assert!(body["data"]["tracked_windows"].as_u64().unwrap() >= 1);
    assert!(body["data"].get("uptime_seconds").is_some());
}

// ============================================================================
// Throttled routes
// ============================================================================

#[tokio::test]
async fn test_users_me_returns_profile() {
    let fixture = TestFixture::new().await;
    let token = fixture.token().await;

    let response = fixture
        .client
        .get(fixture.url("/users/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_u64(&response, "ratelimit-limit"), u64::from(USER_MAX));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["id"], SEED_ID);
}

#[tokio::test]
async fn test_users_me_without_token_is_401() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .client
        .get(fixture.url("/users/me"))
        .send()
        .await
        .unwrap();

    // Authentication runs first, so no quota header is attached
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get("ratelimit-limit").is_none());
}

#[tokio::test]
async fn test_identity_ceiling() {
    let fixture = TestFixture::new().await;
    let token = fixture.token().await;

    for remaining in (0..USER_MAX).rev() {
        let response = fixture
            .client
            .get(fixture.url("/users/me"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            header_u64(&response, "ratelimit-remaining"),
            u64::from(remaining)
        );
    }

    let response = fixture
        .client
        .get(fixture.url(&format!("/users/{SEED_ID}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get("retry-after").is_some());
}

#[tokio::test]
async fn test_get_user_outside_scope_is_404() {
    let fixture = TestFixture::new().await;
    let token = fixture.token().await;

    let response = fixture
        .client
        .get(fixture.url("/users/someone-else"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_propagated() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .client
        .get(fixture.url("/auth/session"))
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "trace-me-123"
    );
}
