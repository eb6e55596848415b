// Streaming chart service - Live subscriptions that keep their own accumulator
use crate::application::chart_service::{ChartError, ChartService, MetricChart};
use crate::domain::interval::{time_key, TimeRange};
use crate::infrastructure::config::LiveSettings;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Whole window, sent once when the subscription starts.
    Full(MetricChart),
    /// Ticks after the previous message's `last_tick`.
    Update(MetricChart),
}

#[derive(Clone)]
pub struct StreamingChartService {
    charts: ChartService,
    poll_interval: Duration,
    channel_capacity: usize,
}

impl StreamingChartService {
    pub fn new(charts: ChartService, settings: &LiveSettings) -> Self {
        Self {
            charts,
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            channel_capacity: settings.channel_capacity.max(1),
        }
    }

    /// Start a live chart for `metric` covering the last `window_ms`.
    ///
    /// The spawned task is the only writer of this subscription's accumulator and
    /// stops once the receiver is dropped.
    pub async fn subscribe(
        &self,
        metric: &str,
        window_ms: i64,
        accuracy_ms: i64,
    ) -> Result<mpsc::Receiver<LiveMessage>, ChartError> {
        let now = chrono::Utc::now().timestamp_millis();
        let start = now.saturating_sub(window_ms);
        let first = self
            .charts
            .update_chart(metric, TimeRange::new(start, now, accuracy_ms), None, None)
            .await?;

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let charts = self.charts.clone();
        let poll_interval = self.poll_interval;
        let metric = metric.to_string();

        tokio::spawn(async move {
            let mut accumulator = Some(first.accumulator.clone());
            let mut last_tick = first.last_tick;
            let mut from = start;

            if tx.send(LiveMessage::Full(first)).await.is_err() {
                return;
            }

            let mut ticker = tokio::time::interval(poll_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;

                // Restart from the last closed bucket so open buckets are fetched again.
                if let Some(tick) = last_tick {
                    from = time_key(tick);
                }
                let now = chrono::Utc::now().timestamp_millis();
                let range = TimeRange::new(from, now, accuracy_ms);

                let update = match charts
                    .update_chart(&metric, range, accumulator.take(), last_tick)
                    .await
                {
                    Ok(update) => update,
                    Err(e) => {
                        tracing::error!("Live chart {} stopped: {}", metric, e);
                        break;
                    }
                };
                accumulator = Some(update.accumulator.clone());
                last_tick = update.last_tick;

                if tx.send(LiveMessage::Update(update)).await.is_err() {
                    tracing::debug!("Live chart {} subscriber went away", metric);
                    break;
                }
            }
        });

        Ok(rx)
    }
}
