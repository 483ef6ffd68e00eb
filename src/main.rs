//! Workspace Hub - multi-tenant workspace backend
//!
//! Serves the REST API for users, workspaces, memberships, subscriptions,
//! guest access and audit events.

use std::env;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{http::HeaderValue, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    prelude::*,
    EnvFilter, Layer, Registry,
};

use config::{LogFormat, LogTarget, LoggingConfig};
use workspace_hub::{
    api, config, db,
    middleware::{rate_limit_middleware, spawn_rate_limit_cleanup, RateLimitState},
    services::WorkspaceService,
    AppConfig, AppState,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("Workspace Hub {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration first (before logging, so we know log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs get flushed
    let _log_guard = init_logging(&config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Workspace Hub starting up");

    ensure_data_directory(&config)?;

    info!("Initializing database connection");
    let db = db::init_pool(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to initialize database")?;

    if args.iter().any(|arg| arg == "--migrate") {
        info!("Migrations applied, exiting");
        return Ok(());
    }

    WorkspaceService::new(db.clone())
        .ensure_guest_workspace(&config.guest.workspace_id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to ensure guest workspace: {}", e))?;

    let state = AppState::new(config.clone(), db).context("Failed to initialize identity verifier")?;

    let app = create_router(state);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("Invalid server address configuration")?;

    info!("Starting HTTP server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Peer addresses feed the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    info!("Server stopped");
    Ok(())
}

/// Initialize logging based on configuration
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(log_config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_config.level));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if matches!(log_config.target, LogTarget::Console | LogTarget::Both) {
        layers.push(format_layer(&log_config.format, std::io::stdout, true));
    }
    if matches!(log_config.target, LogTarget::File | LogTarget::Both) {
        let (writer, file_guard) = create_file_writer(log_config);
        layers.push(format_layer(&log_config.format, writer, false));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    guard
}

fn format_layer<W>(format: &LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    }
}

fn create_file_writer(log_config: &LoggingConfig) -> (NonBlocking, WorkerGuard) {
    if let Err(e) = std::fs::create_dir_all(&log_config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_config.log_dir, e
        );
    }

    let rotation = if log_config.daily_rotation {
        Rotation::DAILY
    } else {
        Rotation::NEVER
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation.clone())
        .filename_prefix(&log_config.log_prefix);
    // 0 keeps every file
    if log_config.max_log_files > 0 {
        builder = builder.max_log_files(log_config.max_log_files);
    }

    let appender = builder.build(&log_config.log_dir).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to configure log rotation: {}", e);
        RollingFileAppender::new(rotation, &log_config.log_dir, &log_config.log_prefix)
    });

    tracing_appender::non_blocking(appender)
}

/// Ensure the directory of a file-backed SQLite database exists
fn ensure_data_directory(config: &AppConfig) -> Result<()> {
    let path = config
        .database
        .url
        .strip_prefix("sqlite://")
        .or_else(|| config.database.url.strip_prefix("sqlite:"));

    if let Some(path) = path.map(|p| p.split('?').next().unwrap_or(p)) {
        if path == ":memory:" {
            return Ok(());
        }
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
                info!("Created data directory: {:?}", parent);
            }
        }
    }
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(allowed)
}

fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let cors = cors_layer(&state.config.server.cors_origins);

    // Only the unauthenticated routes are rate limited
    let mut public = api::public_routes();
    if state.config.rate_limit.enabled {
        let rate_limit = RateLimitState::new(&state.config.rate_limit);
        spawn_rate_limit_cleanup(rate_limit.clone());
        public = public.layer(axum::middleware::from_fn_with_state(
            rate_limit,
            rate_limit_middleware,
        ));
    }

    Router::new()
        .nest("/api/v1", public)
        .nest("/api/v1", api::protected_routes(&state))
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(trace_layer)
        .layer(cors)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn print_help() {
    println!(
        r#"Workspace Hub {}

USAGE:
    workspace-hub [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --migrate               Apply database migrations and exit

ENVIRONMENT:
    WORKSPACE_HUB_CONFIG    Path to configuration file (default: config.yaml)
    DATABASE_URL            SQLite database URL
    CLERK_JWT_KEY           PEM public key for member tokens
    CLERK_JWKS_URL          JWKS endpoint for member tokens
    CLERK_WEBHOOK_SECRET    Signing secret for identity-provider webhooks
    GUEST_TOKEN_SECRET      Signing secret for guest tokens
    GUEST_WORKSPACE_ID      Workspace guest tokens are scoped to
    RUST_LOG                Log filter (overrides logging.level)

CONFIGURATION:
    The application looks for configuration files in the following order:
    1. Path specified by WORKSPACE_HUB_CONFIG environment variable
    2. ./config.yaml
    3. ./config/config.yaml
    4. /etc/workspace-hub/config.yaml
    5. <user config dir>/workspace-hub/config.yaml"#,
        env!("CARGO_PKG_VERSION")
    );
}
