// InfluxDB repository implementation
use crate::application::metrics_repository::MetricsRepository;
use crate::domain::interval::TimeRange;
use crate::domain::liveness::Liveness;
use crate::domain::measurement::MeasurementRow;
use crate::domain::topology::LinkRecord;
use crate::infrastructure::config::{prepare_query, MetricConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

const PATH_TAG: &str = "path";
const PARENT_PATH_TAG: &str = "parent_path";
const LINK_TAGS: [&str; 5] = ["parent_path", "from", "to", "pad_from", "pad_to"];

#[derive(Debug, Clone)]
pub struct InfluxRepository {
    client: reqwest::Client,
    host: String,
    token: String,
    database: String,
    retention_policy: String,
    links_measurement: String,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    name: String,
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
}

impl InfluxQLResponse {
    fn series(&self) -> impl Iterator<Item = &InfluxQLSeries> {
        self.results
            .iter()
            .filter_map(|r| r.series.as_ref())
            .flatten()
    }

    fn tag_sets(&self) -> impl Iterator<Item = &HashMap<String, String>> {
        self.series().filter_map(|s| s.tags.as_ref())
    }
}

impl InfluxRepository {
    pub fn new(
        host: String,
        token: String,
        database: String,
        retention_policy: String,
        links_measurement: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
            token,
            database,
            retention_policy,
            links_measurement,
        }
    }

    fn build_query_url(&self, query: &str) -> String {
        let encoded_query = urlencoding::encode(query);
        format!(
            "{}/query?db={}&rp={}&q={}",
            self.host, self.database, self.retention_policy, encoded_query
        )
    }

    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse> {
        tracing::debug!("Executing InfluxQL query: {}", query);
        let url = self.build_query_url(query);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB query failed with status {}: {}", status, body);
        }

        let data = response
            .json::<InfluxQLResponse>()
            .await
            .context("Failed to parse InfluxDB response")?;

        if let Some(error) = data.results.iter().find_map(|r| r.error.as_ref()) {
            anyhow::bail!("InfluxDB query error: {}", error);
        }

        Ok(data)
    }

    fn links_query(&self, from_ms: i64, to_ms: i64) -> String {
        let group_by = LINK_TAGS
            .iter()
            .map(|tag| format!("\"{}\"", tag))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT last(\"value\") FROM \"{}\" WHERE time >= {}ms AND time <= {}ms GROUP BY {}",
            self.links_measurement, from_ms, to_ms, group_by
        )
    }

    fn scopes_query(&self, from_ms: i64, to_ms: i64) -> String {
        format!(
            "SELECT last(\"value\") FROM \"{}\" WHERE time >= {}ms AND time < {}ms GROUP BY \"{}\"",
            self.links_measurement, from_ms, to_ms, PARENT_PATH_TAG
        )
    }

    async fn scope_paths(&self, from_ms: i64, to_ms: i64) -> Result<HashSet<String>> {
        let response = self.execute_query(&self.scopes_query(from_ms, to_ms)).await?;
        Ok(response
            .tag_sets()
            .filter_map(|tags| tags.get(PARENT_PATH_TAG).cloned())
            .collect())
    }
}

fn rows_from_response(response: &InfluxQLResponse) -> Vec<MeasurementRow> {
    let mut rows = Vec::new();
    for s in response.series() {
        let Some(path) = s.tags.as_ref().and_then(|tags| tags.get(PATH_TAG)) else {
            tracing::warn!("Skipping series without a {} tag: {}", PATH_TAG, s.name);
            continue;
        };
        let time_idx = s.columns.iter().position(|c| c == "time").unwrap_or(0);
        let value_idx = s
            .columns
            .iter()
            .position(|c| c != "time")
            .unwrap_or(1);

        for value_row in &s.values {
            let (Some(time), Some(value)) = (
                value_row.get(time_idx).and_then(|v| v.as_str()),
                value_row.get(value_idx).and_then(|v| v.as_f64()),
            ) else {
                continue;
            };
            if let Ok(time) = chrono::DateTime::parse_from_rfc3339(time) {
                rows.push(MeasurementRow::new(
                    time.timestamp_millis() as f64 / 1000.0,
                    path.clone(),
                    value,
                ));
            }
        }
    }
    rows
}

fn links_from_response(response: &InfluxQLResponse) -> Vec<LinkRecord> {
    response
        .tag_sets()
        .filter_map(|tags| {
            let tag = |name: &str| tags.get(name).cloned();
            Some(LinkRecord {
                parent_path: tag("parent_path")?,
                from: tag("from")?,
                to: tag("to")?,
                pad_from: tag("pad_from")?,
                pad_to: tag("pad_to")?,
            })
        })
        .collect()
}

#[async_trait]
impl MetricsRepository for InfluxRepository {
    async fn fetch_measurements(
        &self,
        metric: &MetricConfig,
        range: TimeRange,
    ) -> Result<Vec<MeasurementRow>> {
        let vars = HashMap::from([
            ("from".to_string(), range.from.to_string()),
            ("to".to_string(), range.to.to_string()),
            ("accuracy".to_string(), range.accuracy.to_string()),
        ]);
        let query = prepare_query(&metric.query, &vars);
        let response = self.execute_query(&query).await?;

        let rows = rows_from_response(&response);
        tracing::debug!("Got {} rows for metric {}", rows.len(), metric.name);
        Ok(rows)
    }

    async fn fetch_links(&self, from_ms: i64, to_ms: i64) -> Result<Vec<LinkRecord>> {
        let response = self.execute_query(&self.links_query(from_ms, to_ms)).await?;
        Ok(links_from_response(&response))
    }

    async fn fetch_liveness(&self, from_ms: i64, to_ms: i64) -> Result<Liveness> {
        // The previous snapshot is the equally long window just before `from_ms`.
        let span = (to_ms - from_ms).max(0);
        let (previous, current) = tokio::try_join!(
            self.scope_paths(from_ms - span, from_ms),
            self.scope_paths(from_ms, to_ms + 1),
        )?;
        Ok(Liveness::between(&previous, &current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> InfluxRepository {
        InfluxRepository::new(
            "http://influx:8086/".to_string(),
            "token".to_string(),
            "pipelines".to_string(),
            "autogen".to_string(),
            "links".to_string(),
        )
    }

    fn parse(json: &str) -> InfluxQLResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_build_query_url() {
        let url = repository().build_query_url("SELECT 1");
        assert_eq!(
            url,
            "http://influx:8086/query?db=pipelines&rp=autogen&q=SELECT%201"
        );
    }

    #[test]
    fn test_rows_from_response() {
        let response = parse(
            r#"{"results":[{"statement_id":0,"series":[
                {"name":"queue_level","tags":{"path":"pipeline0/queue0"},"columns":["time","max"],
                 "values":[["1970-01-01T00:00:01Z",4],["1970-01-01T00:00:01.5Z",null],["1970-01-01T00:00:02Z",6.5]]},
                {"name":"queue_level","columns":["time","max"],"values":[["1970-01-01T00:00:01Z",1]]}
            ]}]}"#,
        );

        assert_eq!(
            rows_from_response(&response),
            vec![
                MeasurementRow::new(1.0, "pipeline0/queue0", 4.0),
                MeasurementRow::new(2.0, "pipeline0/queue0", 6.5),
            ]
        );
    }

    #[test]
    fn test_links_from_response() {
        let response = parse(
            r#"{"results":[{"series":[
                {"name":"links","tags":{"parent_path":"pipeline0","from":"src","to":"sink","pad_from":"src","pad_to":"sink"},
                 "columns":["time","last"],"values":[["1970-01-01T00:00:00Z",1]]},
                {"name":"links","tags":{"parent_path":"pipeline0"},"columns":["time","last"],"values":[]}
            ]}]}"#,
        );

        assert_eq!(
            links_from_response(&response),
            vec![LinkRecord {
                parent_path: "pipeline0".to_string(),
                from: "src".to_string(),
                to: "sink".to_string(),
                pad_from: "src".to_string(),
                pad_to: "sink".to_string(),
            }]
        );
    }

    #[test]
    fn test_links_query_groups_by_every_link_tag() {
        let query = repository().links_query(1000, 2000);
        assert_eq!(
            query,
            "SELECT last(\"value\") FROM \"links\" WHERE time >= 1000ms AND time <= 2000ms \
             GROUP BY \"parent_path\", \"from\", \"to\", \"pad_from\", \"pad_to\""
        );
    }

    #[test]
    fn test_empty_result_has_no_rows() {
        let response = parse(r#"{"results":[{"statement_id":0}]}"#);
        assert!(rows_from_response(&response).is_empty());
        assert!(links_from_response(&response).is_empty());
    }
}
