// Interval domain model - the fixed-step timestamps a chart must have values for
use serde::Deserialize;

/// Key used to match row timestamps against interval ticks.
///
/// Timestamps travel as seconds (`f64`) but are compared as whole milliseconds,
/// so a bucket computed by the database and a tick computed here land on the
/// same key even when their floating point representations differ slightly.
pub fn time_key(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

/// Time window requested by a chart, all values in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
    pub accuracy: i64,
}

impl TimeRange {
    pub fn new(from: i64, to: i64, accuracy: i64) -> Self {
        Self { from, to, accuracy }
    }

    pub fn interval(&self) -> Interval {
        Interval::generate(self.from, self.to, self.accuracy)
    }

    /// Number of ticks `interval()` would hold, `None` when it does not fit in an `i64`.
    pub fn tick_count(&self) -> Option<i64> {
        tick_count(self.from, self.to, self.accuracy)
    }

    /// Start (seconds) of the last bucket that ends inside `[from, to]`.
    ///
    /// Buckets after it are still filling when the range is queried.
    pub fn last_closed_tick(&self) -> Option<f64> {
        if self.accuracy <= 0 {
            return None;
        }
        let end = quantize(self.to.checked_add(1)?, self.accuracy)?;
        Some(end.checked_sub(self.accuracy)? as f64 / 1000.0)
    }
}

/// Largest interval built from a request; longer ranges produce no ticks.
pub const MAX_TICKS: i64 = 100_000;

/// Floor `t` onto the `accuracy` grid.
fn quantize(t: i64, accuracy: i64) -> Option<i64> {
    t.div_euclid(accuracy).checked_mul(accuracy)
}

fn tick_count(from: i64, to: i64, accuracy: i64) -> Option<i64> {
    if accuracy <= 0 {
        return Some(0);
    }
    let span = quantize(to, accuracy)?.checked_sub(quantize(from, accuracy)?)?;
    Some((span.div_euclid(accuracy) + 1).max(0))
}

/// Ordered, strictly increasing timestamps (seconds) spaced by one accuracy step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Interval {
    ticks_ms: Vec<i64>,
}

impl Interval {
    /// Build the interval for `[time_from, time_to]` with `accuracy` spacing.
    ///
    /// Both bounds are floored onto the accuracy grid. The first tick is one step
    /// after the quantized `time_from`, and there are
    /// `(q(time_to) - q(time_from)) / accuracy + 1` ticks in total. Inverted
    /// bounds, a non-positive accuracy and more than [`MAX_TICKS`] ticks give an
    /// empty interval.
    pub fn generate(time_from: i64, time_to: i64, accuracy: i64) -> Self {
        let Some(size) = tick_count(time_from, time_to, accuracy) else {
            return Self::default();
        };
        if size <= 0 || size > MAX_TICKS {
            return Self::default();
        }
        let Some(start) = quantize(time_from, accuracy) else {
            return Self::default();
        };

        // The last tick is q(time_to) + accuracy, which may not fit.
        let ticks_ms = (1..=size)
            .map_while(|k| k.checked_mul(accuracy).and_then(|step| start.checked_add(step)))
            .collect();
        Self { ticks_ms }
    }

    /// Interval made of explicit timestamps in seconds.
    pub fn from_seconds(ticks: &[f64]) -> Self {
        Self {
            ticks_ms: ticks.iter().copied().map(time_key).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ticks_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks_ms.is_empty()
    }

    /// Tick keys in milliseconds, see [`time_key`].
    pub fn keys(&self) -> impl Iterator<Item = i64> + '_ {
        self.ticks_ms.iter().copied()
    }

    pub fn seconds(&self) -> Vec<f64> {
        self.ticks_ms.iter().map(|&ms| ms as f64 / 1000.0).collect()
    }

    pub fn last(&self) -> Option<f64> {
        self.ticks_ms.last().map(|&ms| ms as f64 / 1000.0)
    }

    /// Drop every tick at or before `last_tick` (seconds).
    pub fn after(mut self, last_tick: f64) -> Self {
        let cutoff = time_key(last_tick);
        self.ticks_ms.retain(|&ms| ms > cutoff);
        self
    }
}
