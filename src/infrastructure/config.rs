use crate::domain::series::SeriesKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const ENV_PREFIX: &str = "PIPELINE_TELEMETRY";

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxConfig {
    pub influx: InfluxSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub topology: TopologySettings,
    #[serde(default)]
    pub live: LiveSettings,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Where link records live. Tags: parent_path, from, to, pad_from, pad_to.
#[derive(Debug, Deserialize, Clone)]
pub struct TopologySettings {
    pub measurement: String,
}

impl Default for TopologySettings {
    fn default() -> Self {
        Self {
            measurement: "links".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LiveSettings {
    pub poll_interval_ms: u64,
    pub channel_capacity: usize,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            channel_capacity: 64,
        }
    }
}

/// A chartable metric. `query` is an InfluxQL template using
/// `${from}`, `${to}` and `${accuracy}` (milliseconds), grouped by the `path` tag.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricConfig {
    pub name: String,
    pub title: String,
    pub kind: SeriesKind,
    #[serde(skip_serializing)]
    pub query: String,
}

fn load<T: serde::de::DeserializeOwned>(file: &str) -> anyhow::Result<T> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(file))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_influx_config() -> anyhow::Result<InfluxConfig> {
    load("config/influx")
}

pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    load("config/dashboard")
}

/// Replace template variables in a query string
pub fn prepare_query(query: &str, vars: &HashMap<String, String>) -> String {
    let mut result = query.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> DashboardConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_prepare_query() {
        let mut vars = HashMap::new();
        vars.insert("from".to_string(), "1000".to_string());
        vars.insert("to".to_string(), "5000".to_string());
        vars.insert("accuracy".to_string(), "250".to_string());

        let query = "SELECT sum(\"value\") FROM \"bitrate\" WHERE time >= ${from}ms AND time <= ${to}ms GROUP BY time(${accuracy}ms), \"path\"";
        let result = prepare_query(query, &vars);

        assert_eq!(
            result,
            "SELECT sum(\"value\") FROM \"bitrate\" WHERE time >= 1000ms AND time <= 5000ms GROUP BY time(250ms), \"path\""
        );
    }

    #[test]
    fn test_dashboard_defaults() {
        let config = parse("");
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.topology.measurement, "links");
        assert_eq!(config.live.poll_interval_ms, 1000);
        assert!(config.metrics.is_empty());
    }

    #[test]
    fn test_metric_kinds() {
        let config = parse(
            r#"
            [logging]
            level = "debug"
            format = "json"

            [[metrics]]
            name = "queue_level"
            title = "Queue level"
            kind = "simple"
            query = "SELECT max(value) FROM queue_level"

            [[metrics]]
            name = "buffers"
            title = "Buffers per second"
            kind = "changes_per_second"
            query = "SELECT sum(value) FROM buffers"
            "#,
        );

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.metrics.len(), 2);
        assert_eq!(config.metrics[0].kind, SeriesKind::Simple);
        assert_eq!(config.metrics[1].kind, SeriesKind::ChangesPerSecond);
    }
}
