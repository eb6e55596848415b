// HTTP request handlers
use crate::application::chart_service::MetricChart;
use crate::domain::interval::{TimeRange, MAX_TICKS};
use crate::domain::series::Accumulator;
use crate::domain::topology::TopologyGraph;
use crate::infrastructure::chunked_json::stream_from_receiver;
use crate::infrastructure::config::MetricConfig;
use crate::presentation::app_state::AppState;
use crate::presentation::error::ApiError;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_LIVE_WINDOW_MS: i64 = 5 * 60 * 1000;
const DEFAULT_LIVE_ACCURACY_MS: i64 = 1000;

#[derive(Deserialize)]
pub struct ChartsQuery {
    /// Comma separated metric names
    pub metrics: String,
    pub from: i64,
    pub to: i64,
    pub accuracy: i64,
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    pub from: i64,
    pub to: i64,
    pub accuracy: i64,
    #[serde(default)]
    pub accumulator: Option<Accumulator>,
    #[serde(default)]
    pub last_tick: Option<f64>,
}

#[derive(Deserialize)]
pub struct LiveQuery {
    pub window: Option<i64>,
    pub accuracy: Option<i64>,
}

#[derive(Deserialize)]
pub struct TopologyQuery {
    pub from: i64,
    pub to: i64,
}

fn parse_metric_list(metrics: &str) -> Vec<String> {
    metrics
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// Reject ranges the chart code would refuse to build.
fn check_range(range: &TimeRange) -> Result<(), ApiError> {
    if range.accuracy <= 0 {
        return Err(ApiError::BadRequest(format!(
            "accuracy must be positive, got {}",
            range.accuracy
        )));
    }
    match range.tick_count() {
        Some(ticks) if ticks <= MAX_TICKS => Ok(()),
        _ => Err(ApiError::BadRequest(format!(
            "range {}..{} at accuracy {} exceeds {} points",
            range.from, range.to, range.accuracy, MAX_TICKS
        ))),
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List configured metrics
pub async fn list_metrics(State(state): State<Arc<AppState>>) -> Json<Vec<MetricConfig>> {
    Json(state.chart_service.metrics().to_vec())
}

/// Full reload of a batch of charts
pub async fn load_charts(
    Query(query): Query<ChartsQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MetricChart>>, ApiError> {
    let names = parse_metric_list(&query.metrics);
    let range = TimeRange::new(query.from, query.to, query.accuracy);
    check_range(&range)?;

    let charts = state.chart_service.load_charts(&names, range).await?;
    Ok(Json(charts))
}

/// Incremental update of one chart from a caller-held accumulator
pub async fn update_chart(
    Path(metric): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<MetricChart>, ApiError> {
    let range = TimeRange::new(request.from, request.to, request.accuracy);
    check_range(&range)?;

    let chart = state
        .chart_service
        .update_chart(&metric, range, request.accumulator, request.last_tick)
        .await?;
    Ok(Json(chart))
}

/// Live chart as newline-delimited JSON
pub async fn live_chart(
    Path(metric): Path<String>,
    Query(query): Query<LiveQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let window = query.window.unwrap_or(DEFAULT_LIVE_WINDOW_MS);
    let accuracy = query.accuracy.unwrap_or(DEFAULT_LIVE_ACCURACY_MS);
    check_range(&TimeRange::new(0, window, accuracy))?;

    let rx = state
        .streaming_service
        .subscribe(&metric, window, accuracy)
        .await?;
    Ok(stream_from_receiver(rx))
}

/// Pipeline topology graph
pub async fn topology(
    Query(query): Query<TopologyQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<TopologyGraph>, ApiError> {
    let graph = state
        .topology_service
        .topology(query.from, query.to)
        .await?;
    Ok(Json(graph))
}
