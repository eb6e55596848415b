// Measurement rows as returned by the query collaborator, grouped per path
use crate::domain::interval::time_key;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One observed value for one element path at one (pre-bucketed) timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRow {
    pub time: f64,
    pub path: String,
    pub value: f64,
}

impl MeasurementRow {
    pub fn new(time: f64, path: impl Into<String>, value: f64) -> Self {
        Self {
            time,
            path: path.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// Samples per path, paths in order of first appearance.
pub type GroupedRows = IndexMap<String, Vec<Sample>>;

/// Group rows by path, each path's samples in ascending time order.
///
/// The sort is stable, rows sharing a timestamp keep their relative order.
pub fn group_by_path(rows: Vec<MeasurementRow>) -> GroupedRows {
    let mut grouped = GroupedRows::new();
    for row in rows {
        grouped
            .entry(row.path)
            .or_default()
            .push(Sample::new(row.time, row.value));
    }
    for samples in grouped.values_mut() {
        samples.sort_by_key(|s| time_key(s.time));
    }
    grouped
}

/// Keep samples in `(after, through]`; paths left without samples disappear.
pub fn retain_window(grouped: &mut GroupedRows, after: Option<f64>, through: Option<f64>) {
    let after = after.map(time_key).unwrap_or(i64::MIN);
    let through = through.map(time_key).unwrap_or(i64::MAX);
    grouped.retain(|_, samples| {
        samples.retain(|s| (after.saturating_add(1)..=through).contains(&time_key(s.time)));
        !samples.is_empty()
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Snapshot semantics, an empty bucket reduces to 0.
    Max,
    /// Additive semantics.
    Sum,
}

impl Reducer {
    fn reduce(self, values: impl Iterator<Item = f64>) -> f64 {
        match self {
            Reducer::Max => values.fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |m| m.max(v)))
            })
            .unwrap_or(0.0),
            Reducer::Sum => values.sum(),
        }
    }
}

/// Collapse consecutive samples sharing a timestamp into one sample.
///
/// Input is expected in ascending time order, as produced by [`group_by_path`].
pub fn reduce_buckets(samples: &[Sample], reducer: Reducer) -> Vec<Sample> {
    samples
        .chunk_by(|a, b| time_key(a.time) == time_key(b.time))
        .map(|bucket| {
            Sample::new(
                bucket[0].time,
                reducer.reduce(bucket.iter().map(|s| s.value)),
            )
        })
        .collect()
}
