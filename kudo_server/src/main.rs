//! # Kudo Server
//!
//! The Kudo engagement service.
//!
//! Provides:
//! - REST API (Axum) for toggling likes, per-actor status, and count queries
//! - Collaborator hooks for the content store (subject registry + purge) and
//!   the identity provider (actor edge purge)
//! - Middleware: auth, metrics, CORS, request tracing
//!
//! # Configuration
//!
//! Pass `--config kudo.toml` or set `KUDO_CONFIG`, or use defaults. The
//! server binds to the configured `host:port` (default `0.0.0.0:8620`).
//!
//! # CLI Usage
//!
//! ```bash
//! # Start server with default config
//! kudo_server
//!
//! # Start server with custom config file
//! kudo_server --config kudo.toml
//!
//! # Generate example config file with inline documentation
//! kudo_server --init-config
//!
//! # Override specific settings via env vars
//! KUDO_SERVER_PORT=9000 kudo_server
//! ```

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use kudo_config::KudoConfig;
use kudo_core::StoreRegistry;
use kudo_lmdb::LmdbStore;
use kudo_server::openapi::ApiDoc;
use kudo_server::state::AppState;
use kudo_server::{auth, handlers, metrics};

/// Kudo engagement service.
#[derive(Parser, Debug)]
#[command(name = "kudo_server")]
#[command(about = "Kudo engagement service — toggle likes, status, and count queries over REST")]
#[command(version)]
struct Cli {
    /// Path to kudo.toml config file.
    /// Can also be set via the KUDO_CONFIG env var.
    #[arg(short, long, env = "KUDO_CONFIG")]
    config: Option<String>,

    /// Generate an example kudo.toml config file with documentation and exit.
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle --init-config: print example config and exit.
    if cli.init_config {
        print!("{}", KudoConfig::example_toml());
        return Ok(());
    }

    // Load configuration from file or defaults, then apply env var overrides.
    let config = if let Some(path) = &cli.config {
        KudoConfig::from_file(path)?
    } else {
        let mut cfg = KudoConfig::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        cfg
    };

    init_tracing(&config);

    tracing::info!(
        "Kudo server starting on {}:{}",
        config.server.host,
        config.server.port
    );
    tracing::info!(
        "Storage: lmdb at {} ({} MiB map), auth {}",
        config.storage.data_dir,
        config.storage.map_size_mb,
        if config.auth.enabled { "enabled" } else { "disabled (dev mode)" }
    );

    // Open the LMDB store; one environment backs both the edge relation and
    // the subject registry.
    let store = Arc::new(LmdbStore::open(
        &config.storage.data_dir,
        config.storage.map_size_bytes(),
    )?);
    let registry = StoreRegistry::new(store.clone(), store);

    let state = Arc::new(AppState::new(registry, config.clone()));

    let app = build_router(state);

    // Bind and serve.
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Build the Axum router with all routes and middleware.
fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & Metrics
        .route("/api/v1/health", get(handlers::health_handler))
        .route("/api/v1/metrics", get(handlers::metrics_handler))
        // Engagement. The count route is registered before the bare
        // {subject_id} route; axum matches the literal segment first.
        .route("/api/v1/likes/count/{subject_id}", get(handlers::count_handler))
        .route("/api/v1/likes/counts", post(handlers::counts_handler))
        .route("/api/v1/likes/{subject_id}", post(handlers::toggle_handler))
        .route("/api/v1/likes/{subject_id}", get(handlers::status_handler))
        // Collaborator hooks
        .route(
            "/api/v1/subjects/{subject_id}",
            put(handlers::register_subject_handler),
        )
        .route(
            "/api/v1/subjects/{subject_id}",
            delete(handlers::unregister_subject_handler),
        )
        .route(
            "/api/v1/actors/{actor_id}/likes",
            delete(handlers::purge_actor_handler),
        )
        // Audit
        .route("/api/v1/audit", get(handlers::audit_handler))
        // Prometheus metrics (text exposition format)
        .route("/metrics", get(metrics::metrics_text_handler))
        // Swagger UI for interactive API exploration
        .merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics::track_metrics,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Initialize the tracing subscriber from config (text or JSON format).
fn init_tracing(config: &KudoConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone()));

    if config.server.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Resolve on SIGINT (ctrl-c) or SIGTERM so LMDB commits cleanly.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
