// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::compression::predicate::{DefaultPredicate, NotForContentType, Predicate};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::application::chart_service::ChartService;
use crate::application::streaming_service::StreamingChartService;
use crate::application::topology_service::TopologyService;
use crate::infrastructure::chunked_json::NDJSON_CONTENT_TYPE;
use crate::infrastructure::config::{load_dashboard_config, load_influx_config};
use crate::infrastructure::influx_repository::InfluxRepository;
use crate::infrastructure::logging;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    health_check, list_metrics, live_chart, load_charts, topology, update_chart,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let influx_config = load_influx_config()?;
    let dashboard_config = load_dashboard_config()?;

    logging::init(&dashboard_config.logging);

    // Create repository (infrastructure layer)
    let repository = Arc::new(InfluxRepository::new(
        influx_config.influx.host,
        influx_config.influx.token,
        influx_config.influx.database,
        influx_config.influx.retention_policy,
        dashboard_config.topology.measurement.clone(),
    ));

    // Create services (application layer)
    let chart_service = ChartService::new(repository.clone(), dashboard_config.metrics.clone());
    let streaming_service = StreamingChartService::new(chart_service.clone(), &dashboard_config.live);
    let topology_service = TopologyService::new(repository);

    let state = Arc::new(AppState {
        chart_service,
        streaming_service,
        topology_service,
    });

    // Live charts are flushed line by line, so they skip compression
    let compression = CompressionLayer::new().compress_when(
        DefaultPredicate::new().and(NotForContentType::const_new(NDJSON_CONTENT_TYPE)),
    );

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/metrics", get(list_metrics))
        .route("/charts", get(load_charts))
        .route("/charts/:metric/update", post(update_chart))
        .route("/charts/:metric/live", get(live_chart))
        .route("/topology", get(topology))
        .layer(compression)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = dashboard_config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", dashboard_config.server.bind))?;
    tracing::info!(
        "Starting pipeline-telemetry on {} with {} metrics",
        addr,
        dashboard_config.metrics.len()
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
