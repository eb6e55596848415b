// Repository trait for pipeline metrics and topology access
use crate::domain::interval::TimeRange;
use crate::domain::liveness::Liveness;
use crate::domain::measurement::MeasurementRow;
use crate::domain::topology::LinkRecord;
use crate::infrastructure::config::MetricConfig;
use async_trait::async_trait;

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// Rows for one metric, bucketed by `range.accuracy` and sorted by time within each path
    async fn fetch_measurements(
        &self,
        metric: &MetricConfig,
        range: TimeRange,
    ) -> anyhow::Result<Vec<MeasurementRow>>;

    /// Distinct link records observed between `from_ms` and `to_ms`
    async fn fetch_links(&self, from_ms: i64, to_ms: i64) -> anyhow::Result<Vec<LinkRecord>>;

    /// Liveness of scope paths in `[from_ms, to_ms]` relative to the window before it
    async fn fetch_liveness(&self, from_ms: i64, to_ms: i64) -> anyhow::Result<Liveness>;
}
