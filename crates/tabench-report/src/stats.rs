//! Descriptive statistics over report columns

use serde::Serialize;
use std::fmt;

/// Count, mean, median and range of a column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    /// Values summarized
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Median; mean of the middle pair for even counts
    pub median: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
}

impl Summary {
    /// Summarize `values`; `None` when empty
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        let count = sorted.len();
        let mid = count / 2;
        let median = if count % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };
        Some(Self {
            count,
            mean: sorted.iter().sum::<f64>() / count as f64,
            median,
            min: sorted[0],
            max: sorted[count - 1],
        })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} mean={:.3} median={:.3} min={:.3} max={:.3}",
            self.count, self.mean, self.median, self.min, self.max
        )
    }
}

/// `count / seconds`, zero when no time elapsed
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn per_second(count: u64, seconds: f64) -> f64 {
    if seconds > 0.0 && seconds.is_finite() {
        count as f64 / seconds
    } else {
        0.0
    }
}
