// Chart service - Use case for loading and incrementally updating metric charts
use crate::application::metrics_repository::MetricsRepository;
use crate::domain::chart::ChartData;
use crate::domain::interval::TimeRange;
use crate::domain::measurement::{group_by_path, retain_window, MeasurementRow};
use crate::domain::series::{Accumulator, SeriesError};
use crate::infrastructure::config::MetricConfig;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("unknown metric: {0}")]
    UnknownMetric(String),
    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// One metric's chart plus what the caller needs to continue it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricChart {
    pub metric: String,
    pub chart: ChartData,
    pub paths: Vec<String>,
    pub accumulator: Accumulator,
    /// Start (seconds) of the last closed bucket, pass it back to continue.
    pub last_tick: Option<f64>,
}

#[derive(Clone)]
pub struct ChartService {
    repository: Arc<dyn MetricsRepository>,
    metrics: Vec<MetricConfig>,
}

impl ChartService {
    pub fn new(repository: Arc<dyn MetricsRepository>, metrics: Vec<MetricConfig>) -> Self {
        Self {
            repository,
            metrics,
        }
    }

    pub fn metrics(&self) -> &[MetricConfig] {
        &self.metrics
    }

    fn metric(&self, name: &str) -> Result<&MetricConfig, ChartError> {
        self.metrics
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| ChartError::UnknownMetric(name.to_string()))
    }

    /// Full reload for a batch of metrics. A failing query only empties its own chart.
    pub async fn load_charts(
        &self,
        names: &[String],
        range: TimeRange,
    ) -> Result<Vec<MetricChart>, ChartError> {
        let metrics = names
            .iter()
            .map(|name| self.metric(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut charts = Vec::with_capacity(metrics.len());
        for metric in metrics {
            charts.push(self.chart(metric, range, None, None).await?);
        }
        Ok(charts)
    }

    /// Continue a chart from a carried accumulator, skipping ticks up to `last_tick`.
    pub async fn update_chart(
        &self,
        name: &str,
        range: TimeRange,
        accumulator: Option<Accumulator>,
        last_tick: Option<f64>,
    ) -> Result<MetricChart, ChartError> {
        let metric = self.metric(name)?;
        self.chart(metric, range, accumulator, last_tick).await
    }

    async fn chart(
        &self,
        metric: &MetricConfig,
        range: TimeRange,
        accumulator: Option<Accumulator>,
        last_tick: Option<f64>,
    ) -> Result<MetricChart, ChartError> {
        match self.repository.fetch_measurements(metric, range).await {
            Ok(rows) => {
                tracing::debug!("Fetched {} rows for metric {}", rows.len(), metric.name);
                Ok(build_chart(metric, range, rows, accumulator, last_tick)?)
            }
            Err(e) => {
                tracing::error!("Error fetching metric {}: {:#}", metric.name, e);
                Ok(MetricChart {
                    metric: metric.name.clone(),
                    chart: ChartData::empty(),
                    paths: Vec::new(),
                    accumulator: accumulator.unwrap_or_else(|| Accumulator::empty(metric.kind)),
                    last_tick,
                })
            }
        }
    }
}

/// Group, trim and process rows into a chart.
///
/// Rows and ticks at or before `last_tick` were already delivered. Stateful kinds
/// also hold back buckets that are still filling, so the returned accumulator
/// only ever absorbs closed buckets and the next update can pick them up again.
fn build_chart(
    metric: &MetricConfig,
    range: TimeRange,
    rows: Vec<MeasurementRow>,
    accumulator: Option<Accumulator>,
    last_tick: Option<f64>,
) -> Result<MetricChart, SeriesError> {
    let closed = range.last_closed_tick();
    let through = if metric.kind.is_stateful() { closed } else { None };

    let mut grouped = group_by_path(rows);
    retain_window(&mut grouped, last_tick, through);

    let interval = match last_tick {
        Some(tick) => range.interval().after(tick),
        None => range.interval(),
    };

    let mut output = metric.kind.process(&interval, &grouped, accumulator)?;
    if let Some(closed) = through {
        output.accumulator.expire(closed);
    }
    let chart = ChartData::assemble(&interval, output.series);

    Ok(MetricChart {
        metric: metric.name.clone(),
        paths: chart.paths(),
        chart,
        accumulator: output.accumulator,
        last_tick: match (last_tick, closed) {
            (Some(held), Some(closed)) => Some(held.max(closed)),
            (held, closed) => closed.or(held),
        },
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::liveness::Liveness;
    use crate::domain::series::SeriesKind;
    use crate::domain::topology::LinkRecord;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    /// Repository serving fixed rows per metric; metrics named `broken` fail.
    pub(crate) struct StaticRepository {
        pub rows: Vec<(&'static str, MeasurementRow)>,
        pub links: Vec<LinkRecord>,
        pub liveness: Liveness,
    }

    #[async_trait]
    impl MetricsRepository for StaticRepository {
        async fn fetch_measurements(
            &self,
            metric: &MetricConfig,
            range: TimeRange,
        ) -> anyhow::Result<Vec<MeasurementRow>> {
            if metric.name == "broken" {
                anyhow::bail!("database unavailable");
            }
            Ok(self
                .rows
                .iter()
                .filter(|(name, row)| {
                    *name == metric.name
                        && row.time * 1000.0 >= range.from as f64
                        && row.time * 1000.0 <= range.to as f64
                })
                .map(|(_, row)| row.clone())
                .collect())
        }

        async fn fetch_links(&self, _from_ms: i64, _to_ms: i64) -> anyhow::Result<Vec<LinkRecord>> {
            Ok(self.links.clone())
        }

        async fn fetch_liveness(&self, _from_ms: i64, _to_ms: i64) -> anyhow::Result<Liveness> {
            Ok(self.liveness.clone())
        }
    }

    pub(crate) fn metric(name: &str, kind: SeriesKind) -> MetricConfig {
        MetricConfig {
            name: name.to_string(),
            title: name.to_string(),
            kind,
            query: String::new(),
        }
    }

    fn service() -> ChartService {
        let repository = StaticRepository {
            rows: vec![
                ("level", MeasurementRow::new(1.0, "pipeline0/queue0", 4.0)),
                ("level", MeasurementRow::new(1.0, "pipeline0/queue1", 2.0)),
                ("level", MeasurementRow::new(2.0, "pipeline0/queue2", 7.0)),
                ("bytes", MeasurementRow::new(1.0, "pipeline0/sink", 3.0)),
                ("bytes", MeasurementRow::new(2.0, "pipeline0/sink", 2.0)),
            ],
            links: Vec::new(),
            liveness: Liveness::default(),
        };
        ChartService::new(
            Arc::new(repository),
            vec![
                metric("level", SeriesKind::Simple),
                metric("bytes", SeriesKind::Cumulative),
                metric("broken", SeriesKind::Simple),
            ],
        )
    }

    #[tokio::test]
    async fn test_failing_metric_does_not_abort_batch() {
        let names = vec!["broken".to_string(), "level".to_string()];
        let charts = service()
            .load_charts(&names, TimeRange::new(0, 2000, 1000))
            .await
            .unwrap();

        assert_eq!(charts.len(), 2);
        assert_eq!(charts[0].chart, ChartData::empty());
        assert!(charts[0].paths.is_empty());
        assert_eq!(charts[1].paths.len(), 3);
    }

    #[tokio::test]
    async fn test_labels_match_rows_for_three_paths() {
        let charts = service()
            .load_charts(&["level".to_string()], TimeRange::new(0, 2000, 1000))
            .await
            .unwrap();
        let chart = &charts[0].chart;

        assert_eq!(charts[0].paths, vec!["pipeline0/queue0", "pipeline0/queue1", "pipeline0/queue2"]);
        assert_eq!(chart.data[0], vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert_eq!(chart.data[1], vec![Some(4.0), None, None]);
        assert_eq!(chart.data[2], vec![Some(2.0), None, None]);
        assert_eq!(chart.data[3], vec![None, Some(7.0), None]);
    }

    #[tokio::test]
    async fn test_unknown_metric_is_an_error() {
        let err = service()
            .load_charts(&["nope".to_string()], TimeRange::new(0, 1000, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, ChartError::UnknownMetric(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_update_continues_cumulative_series() {
        let service = service();
        let first = service
            .update_chart("bytes", TimeRange::new(0, 1999, 1000), None, None)
            .await
            .unwrap();
        assert_eq!(first.chart.data[0], vec![Some(1.0), Some(2.0)]);
        assert_eq!(first.chart.data[1], vec![Some(3.0), None]);
        assert_eq!(first.last_tick, Some(1.0));

        let second = service
            .update_chart(
                "bytes",
                TimeRange::new(1000, 2999, 1000),
                Some(first.accumulator),
                first.last_tick,
            )
            .await
            .unwrap();
        assert_eq!(second.chart.data[0], vec![Some(2.0), Some(3.0)]);
        assert_eq!(second.chart.data[1], vec![Some(5.0), None]);
        assert_eq!(second.last_tick, Some(2.0));
        assert_eq!(
            second.accumulator,
            Accumulator::Cumulative(BTreeMap::from([("pipeline0/sink".to_string(), 5.0)]))
        );
    }

    #[tokio::test]
    async fn test_filling_bucket_is_held_back_until_closed() {
        let service = service();
        // Bucket 2.0 has data but is still open at to = 2000.
        let first = service
            .update_chart("bytes", TimeRange::new(0, 2000, 1000), None, None)
            .await
            .unwrap();
        assert_eq!(first.chart.data[1], vec![Some(3.0), None, None]);
        assert_eq!(first.last_tick, Some(1.0));

        let second = service
            .update_chart(
                "bytes",
                TimeRange::new(1000, 2999, 1000),
                Some(first.accumulator),
                first.last_tick,
            )
            .await
            .unwrap();
        assert_eq!(second.chart.data[1], vec![Some(5.0), None]);
    }

    #[tokio::test]
    async fn test_snapshot_shows_filling_bucket() {
        let charts = service()
            .load_charts(&["level".to_string()], TimeRange::new(0, 2000, 1000))
            .await
            .unwrap();
        assert_eq!(charts[0].chart.data[3], vec![None, Some(7.0), None]);
        assert_eq!(charts[0].last_tick, Some(1.0));
    }

    #[tokio::test]
    async fn test_vanished_path_leaves_rate_accumulator() {
        let repository = StaticRepository {
            rows: vec![
                ("rate", MeasurementRow::new(1.0, "pipeline0/old", 1.0)),
                ("rate", MeasurementRow::new(5.0, "pipeline0/new", 1.0)),
            ],
            links: Vec::new(),
            liveness: Liveness::default(),
        };
        let service = ChartService::new(
            Arc::new(repository),
            vec![metric("rate", SeriesKind::ChangesPerSecond)],
        );

        let first = service
            .update_chart("rate", TimeRange::new(0, 1999, 1000), None, None)
            .await
            .unwrap();
        let second = service
            .update_chart(
                "rate",
                TimeRange::new(1000, 5999, 1000),
                Some(first.accumulator),
                first.last_tick,
            )
            .await
            .unwrap();

        let Accumulator::ChangesPerSecond(windows) = second.accumulator else {
            panic!("expected a rate accumulator");
        };
        assert_eq!(windows.keys().collect::<Vec<_>>(), vec!["pipeline0/new"]);
    }

    #[tokio::test]
    async fn test_update_rejects_foreign_accumulator() {
        let err = service()
            .update_chart("bytes", TimeRange::new(0, 1000, 1000), Some(Accumulator::Simple), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChartError::Series(_)));
    }
}
