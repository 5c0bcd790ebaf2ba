//! agente - economy control-loop engine over HTTP/WebSocket.
//!
//! A host submits economy snapshots per tick; the engine observes metrics,
//! diagnoses principle violations, Monte-Carlo-simulates candidate fixes,
//! applies at most one rate-limited parameter adjustment per cycle, and
//! watches every applied adjustment for rollback.

use agente_engine::api::{routes, ws, AppState};
use agente_engine::config::Config;
use agente_engine::engine::Engine;
use agente_engine::middleware::logging::request_logging;
use agente_engine::registry::ParameterRegistry;
use agente_engine::thresholds::Thresholds;
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Request bodies above this size are rejected at the transport.
const MAX_BODY_BYTES: usize = 1024 * 1024;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agente_engine=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/tick", post(routes::post_tick))
        .route("/health", get(routes::get_health))
        .route("/decisions", get(routes::get_decisions))
        .route("/config", post(routes::post_config))
        .route("/principles", get(routes::get_principles))
        .route("/diagnose", post(routes::post_diagnose))
        .route("/ws", get(ws::websocket_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_logging))
}

async fn run() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = Config::parse();
    info!(
        host = %config.host,
        port = config.port,
        mode = config.mode.as_str(),
        "starting economy control engine"
    );

    let engine = Engine::new(config.mode, Thresholds::default(), ParameterRegistry::new());
    let state = AppState::new(engine);
    let app = build_router(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr} (HTTP + WebSocket upgrade on /ws)");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("startup failed: {e:#}");
        std::process::exit(1);
    }
}
