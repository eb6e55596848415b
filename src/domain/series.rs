// Series processors - turn grouped rows into dense series aligned to an interval
use crate::domain::interval::{time_key, Interval};
use crate::domain::measurement::{reduce_buckets, GroupedRows, Reducer, Sample};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;

/// Width (ms) of the trailing window used by the changes-per-second processor.
const RATE_WINDOW_MS: i64 = 1000;

/// One dense, interval-aligned series per path. `None` marks a missing value.
pub type PathSeries = IndexMap<String, Vec<Option<f64>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    /// Max of each bucket, no state across calls.
    Simple,
    /// Running total of bucket sums.
    Cumulative,
    /// Sum of bucket sums over the trailing second.
    ChangesPerSecond,
}

/// Running sum and the samples still inside the trailing one-second window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateWindow {
    pub sum: f64,
    pub window: VecDeque<Sample>,
}

impl RateWindow {
    /// Drop samples a second or more older than `time`.
    fn evict(&mut self, time: f64) {
        let now = time_key(time);
        while let Some(oldest) = self.window.front() {
            if now.saturating_sub(time_key(oldest.time)) < RATE_WINDOW_MS {
                break;
            }
            self.sum -= oldest.value;
            self.window.pop_front();
        }
        if self.window.is_empty() {
            self.sum = 0.0;
        }
    }

    /// Evict samples a second or more older than `sample`, then add it.
    /// Returns the window sum including the new sample.
    pub fn push(&mut self, sample: Sample) -> f64 {
        self.evict(sample.time);
        self.sum += sample.value;
        self.window.push_back(sample);
        self.sum
    }
}

/// State a caller keeps between an initial load and its incremental updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "paths", rename_all = "snake_case")]
pub enum Accumulator {
    Simple,
    Cumulative(BTreeMap<String, f64>),
    ChangesPerSecond(BTreeMap<String, RateWindow>),
}

impl Accumulator {
    pub fn empty(kind: SeriesKind) -> Self {
        match kind {
            SeriesKind::Simple => Accumulator::Simple,
            SeriesKind::Cumulative => Accumulator::Cumulative(BTreeMap::new()),
            SeriesKind::ChangesPerSecond => Accumulator::ChangesPerSecond(BTreeMap::new()),
        }
    }

    pub fn kind(&self) -> SeriesKind {
        match self {
            Accumulator::Simple => SeriesKind::Simple,
            Accumulator::Cumulative(_) => SeriesKind::Cumulative,
            Accumulator::ChangesPerSecond(_) => SeriesKind::ChangesPerSecond,
        }
    }

    /// Forget rate windows that no sample after `closed_tick` can reach.
    ///
    /// Later samples are all newer than `closed_tick`, so entries a second older
    /// than it would be evicted on the next push anyway. Paths whose window ends
    /// up empty are dropped. Running totals are kept, an idle path may resume.
    pub fn expire(&mut self, closed_tick: f64) {
        if let Accumulator::ChangesPerSecond(windows) = self {
            windows.retain(|_, window| {
                window.evict(closed_tick);
                !window.window.is_empty()
            });
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("cannot continue a {expected:?} series with a {found:?} accumulator")]
    AccumulatorMismatch {
        expected: SeriesKind,
        found: SeriesKind,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesOutput {
    pub series: PathSeries,
    pub accumulator: Accumulator,
}

impl SeriesKind {
    /// Whether values depend on state carried across calls.
    pub fn is_stateful(self) -> bool {
        !matches!(self, SeriesKind::Simple)
    }

    /// Run the processor for this kind.
    ///
    /// A missing accumulator starts from the zero state. Simple series accept and
    /// ignore whatever is carried in.
    pub fn process(
        self,
        interval: &Interval,
        grouped: &GroupedRows,
        carried: Option<Accumulator>,
    ) -> Result<SeriesOutput, SeriesError> {
        let carried = carried.unwrap_or_else(|| Accumulator::empty(self));

        match (self, carried) {
            (SeriesKind::Simple, _) => Ok(SeriesOutput {
                series: simple_series(interval, grouped),
                accumulator: Accumulator::Simple,
            }),
            (SeriesKind::Cumulative, Accumulator::Cumulative(sums)) => {
                let (series, sums) = cumulative_series(interval, grouped, sums);
                Ok(SeriesOutput {
                    series,
                    accumulator: Accumulator::Cumulative(sums),
                })
            }
            (SeriesKind::ChangesPerSecond, Accumulator::ChangesPerSecond(windows)) => {
                let (series, windows) = changes_per_second_series(interval, grouped, windows);
                Ok(SeriesOutput {
                    series,
                    accumulator: Accumulator::ChangesPerSecond(windows),
                })
            }
            (expected, other) => Err(SeriesError::AccumulatorMismatch {
                expected,
                found: other.kind(),
            }),
        }
    }
}

fn by_time(samples: &[Sample]) -> HashMap<i64, f64> {
    samples.iter().map(|s| (time_key(s.time), s.value)).collect()
}

fn dense_fill(interval: &Interval, values: &HashMap<i64, f64>) -> Vec<Option<f64>> {
    interval.keys().map(|key| values.get(&key).copied()).collect()
}

/// Max of each bucket at the matching tick, `None` elsewhere. Nothing carries over gaps.
pub fn simple_series(interval: &Interval, grouped: &GroupedRows) -> PathSeries {
    grouped
        .iter()
        .map(|(path, samples)| {
            let values = by_time(&reduce_buckets(samples, Reducer::Max));
            (path.clone(), dense_fill(interval, &values))
        })
        .collect()
}

/// Running total seeded from `sums`; ticks without a value emit `None` and keep the total.
pub fn cumulative_series(
    interval: &Interval,
    grouped: &GroupedRows,
    mut sums: BTreeMap<String, f64>,
) -> (PathSeries, BTreeMap<String, f64>) {
    let mut series = PathSeries::with_capacity(grouped.len());

    for (path, samples) in grouped {
        let values = by_time(&reduce_buckets(samples, Reducer::Sum));
        let total = sums.entry(path.clone()).or_insert(0.0);

        let dense = interval
            .keys()
            .map(|key| {
                values.get(&key).map(|value| {
                    *total += value;
                    *total
                })
            })
            .collect();
        series.insert(path.clone(), dense);
    }

    (series, sums)
}

/// Trailing one-second sum, sampled only at ticks where a bucket landed.
pub fn changes_per_second_series(
    interval: &Interval,
    grouped: &GroupedRows,
    mut windows: BTreeMap<String, RateWindow>,
) -> (PathSeries, BTreeMap<String, RateWindow>) {
    let mut series = PathSeries::with_capacity(grouped.len());

    for (path, samples) in grouped {
        let window = windows.entry(path.clone()).or_default();
        let sums: HashMap<i64, f64> = reduce_buckets(samples, Reducer::Sum)
            .into_iter()
            .map(|sample| (time_key(sample.time), window.push(sample)))
            .collect();
        series.insert(path.clone(), dense_fill(interval, &sums));
    }

    (series, windows)
}
