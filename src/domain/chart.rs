// Chart data domain model - column oriented data handed to the charting widget
use crate::domain::interval::Interval;
use crate::domain::series::PathSeries;
use serde::{Deserialize, Serialize};

pub const TIME_LABEL: &str = "time";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesLabel {
    pub label: String,
}

/// `series[i]` labels `data[i]`. The first row is always the interval itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub series: Vec<SeriesLabel>,
    pub data: Vec<Vec<Option<f64>>>,
}

impl ChartData {
    /// Chart returned for a metric whose query failed.
    pub fn empty() -> Self {
        Self {
            series: Vec::new(),
            data: vec![Vec::new()],
        }
    }

    pub fn assemble(interval: &Interval, path_series: PathSeries) -> Self {
        let mut series = Vec::with_capacity(path_series.len() + 1);
        let mut data = Vec::with_capacity(path_series.len() + 1);

        series.push(SeriesLabel {
            label: TIME_LABEL.to_string(),
        });
        data.push(interval.seconds().into_iter().map(Some).collect());

        for (path, values) in path_series {
            series.push(SeriesLabel { label: path });
            data.push(values);
        }

        Self { series, data }
    }

    /// Labels of the path rows, without the leading time row.
    pub fn paths(&self) -> Vec<String> {
        self.series
            .iter()
            .skip(1)
            .map(|s| s.label.clone())
            .collect()
    }
}
