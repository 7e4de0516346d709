//! Book Ingest - Level-2 Order Book Ingestion Engine
//!
//! Replays a venue level-2 feed into the state store and serves health,
//! metrics and book queries over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use prometheus::{Encoder, Registry, TextEncoder};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use book_ingest::auth::SubscribeRequest;
use book_ingest::{BookQuery, Config, IngestMetrics, Ingestor, MemoryStore, Publisher, ReplayFeed, Side};

/// State shared with the HTTP handlers
struct AppState {
    query: BookQuery<Arc<MemoryStore>>,
    registry: Registry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Book Ingest");

    let config = Config::load()?;
    info!(
        products = ?config.product_ids,
        rate = %config.conversion_rate,
        orphans = ?config.orphan_policy,
        require_snapshot = config.require_snapshot,
        "Configuration loaded"
    );

    if config.api_key.is_some() {
        let credentials = config.credentials()?;
        let request = SubscribeRequest::signed(
            &credentials,
            &config.product_ids,
            &config.channels,
            chrono::Utc::now().timestamp(),
            &config.signature_path,
        )?;
        info!(
            endpoint = %config.feed_endpoint,
            key = %request.key,
            channels = ?request.channels,
            "Signed subscription request prepared"
        );
    }

    let store = Arc::new(MemoryStore::new());
    let registry = Registry::new();

    let mut ingestor = Ingestor::from_config(store.clone(), &config)?
        .with_metrics(IngestMetrics::register(&registry)?);
    if let Some(path) = &config.audit_socket_path {
        ingestor = ingestor.with_publisher(Publisher::new(path).await);
    }

    let state = Arc::new(AppState {
        query: BookQuery::new(store.clone()),
        registry,
    });

    let port = config.http_port;
    tokio::spawn(async move {
        if let Err(e) = start_http_server(state, port).await {
            warn!(error = %e, "HTTP server error");
        }
    });

    let stats = match &config.feed_file {
        Some(path) => ingestor.run(ReplayFeed::open(path).await?).await?,
        None => ingestor.run(ReplayFeed::stdin()).await?,
    };

    info!(
        events = stats.events,
        records = store.record_count(),
        "Replay complete, serving queries until interrupted"
    );
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Start HTTP server for health checks, metrics and book queries
async fn start_http_server(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/book/:instrument", get(book_summary))
        .route("/book/:instrument/:side", get(book_side))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "book-ingest",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    match String::from_utf8(buffer) {
        Ok(body) => body.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn book_summary(State(state): State<Arc<AppState>>, Path(instrument): Path<String>) -> Response {
    match state.query.summary(&instrument) {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

async fn book_side(
    State(state): State<Arc<AppState>>,
    Path((instrument, side)): Path<(String, String)>,
) -> Response {
    let Some(side) = Side::from_token(&side) else {
        return (StatusCode::BAD_REQUEST, format!("unknown side {:?}", side)).into_response();
    };
    match state.query.levels(&instrument, side) {
        Ok(levels) => Json(levels).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}
