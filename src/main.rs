use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use user_gate::{
    AppState, Config, MemoryUserRepository, UserRecord, build_router, metrics, utils,
};

#[tokio::main]
async fn main() -> ExitCode {
    // .env is read again by Config::from_env; loading it here lets it set LOG_FORMAT
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true);
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting user_gate v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // A missing JWT_SECRET is caught here, before any request is served
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        login_max = config.login_rate_limit_max,
        user_max = config.user_rate_limit_max,
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    // Seed the in-memory repository
    let users = MemoryUserRepository::new();
    match &config.seed_user {
        Some(seed) => {
            let id = Uuid::new_v4().to_string();
            users.insert(UserRecord::new(&id, &seed.email, &seed.role, &seed.password));
            info!(user_id = %id, email = %seed.email, role = %seed.role, "Seed user created");
        }
        None => warn!("No SEED_USER_EMAIL/SEED_USER_PASSWORD set; no account can log in"),
    }

    // Build application state and router
    let state = AppState::new(config.clone(), Arc::new(users));
    let app = build_router(state.clone()).map_err(|e| {
        error!("Failed to build router: {e}");
        exitcode::CONFIG
    })?;

    // Start server
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /health        - Health check");
    info!("  GET  /ready         - Readiness check");
    info!("  POST /auth/login    - Exchange credentials for a token");
    info!("  GET  /auth/session  - Current token identity");
    info!("  GET  /users/me      - Caller profile");
    info!("  GET  /users/{{id}}    - Profile by id");
    info!("  GET  /stats         - Service statistics");

    // Peer addresses feed the address-keyed gates
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
