// warden-core/src/domain/quality/zscore.rs

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ZScoreError {
    #[error(
        "Z-Score anomaly on '{metric}': score {z_score:.2} exceeds threshold {threshold:.2} (mean {mean:.4}, stddev {stddev:.4}, current {current:.4})"
    )]
    AnomalyDetected {
        metric: String,
        z_score: f64,
        threshold: f64,
        current: f64,
        mean: f64,
        stddev: f64,
    },
    #[error("Not enough history for '{metric}': {count} prior values, need {required}")]
    NotEnoughHistory {
        metric: String,
        count: u64,
        required: u64,
    },
}

/// Running population mean/variance of a metric.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct MetricState {
    pub mean: f64,
    pub variance: f64,
    pub count: u64,
}

impl MetricState {
    /// Welford's online update.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.mean = value;
            self.variance = 0.0;
            return;
        }
        let old_mean = self.mean;
        self.mean += (value - old_mean) / self.count as f64;
        // M2_new = M2_old + (x - old_mean) * (x - new_mean)
        let prev_m2 = self.variance * (self.count - 1) as f64;
        let new_m2 = prev_m2 + (value - old_mean) * (value - self.mean);
        self.variance = new_m2 / self.count as f64;
    }

    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut state = Self::default();
        for v in values {
            state.push(v);
        }
        state
    }

    pub fn stddev(&self) -> f64 {
        self.variance.sqrt()
    }

    pub fn z_score(&self, value: f64) -> Option<f64> {
        let stddev = self.stddev();
        (stddev > 1e-9).then(|| ((value - self.mean) / stddev).abs())
    }
}

pub struct ZScoreCheck;

impl ZScoreCheck {
    /// Checks a new value against the historical distribution. Does not modify state.
    /// A flat history (zero variance) accepts any value equal to its mean and rejects others.
    pub fn validate(
        metric: &str,
        current: f64,
        state: &MetricState,
        threshold: f64,
        min_history: u64,
    ) -> Result<f64, ZScoreError> {
        if state.count < min_history {
            return Err(ZScoreError::NotEnoughHistory {
                metric: metric.to_string(),
                count: state.count,
                required: min_history,
            });
        }

        let z_score = match state.z_score(current) {
            Some(z) => z,
            None if (current - state.mean).abs() <= 1e-9 => 0.0,
            None => f64::INFINITY,
        };

        if z_score > threshold {
            return Err(ZScoreError::AnomalyDetected {
                metric: metric.to_string(),
                z_score,
                threshold,
                current,
                mean: state.mean,
                stddev: state.stddev(),
            });
        }
        Ok(z_score)
    }
}
