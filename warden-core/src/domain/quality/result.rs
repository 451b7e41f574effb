// warden-core/src/domain/quality/result.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Passed,
    Failed,
    Error,
    Skipped,
    Timeout,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Skipped => "skipped",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only record of one rule execution.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QualityResult {
    pub id: Uuid,
    pub rule_id: String,
    pub asset_id: String,
    pub status: ResultStatus,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub message: Option<String>,
    pub execution_time_ms: u64,
    pub executed_at: DateTime<Utc>,
}

impl QualityResult {
    pub fn new(rule_id: &str, asset_id: &str, status: ResultStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id: rule_id.to_string(),
            asset_id: asset_id.to_string(),
            status,
            metrics: BTreeMap::new(),
            message: None,
            execution_time_ms: 0,
            executed_at: Utc::now(),
        }
    }

    /// Non-finite values are dropped: they do not survive a JSON round trip.
    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        if value.is_finite() {
            self.metrics.insert(name.to_string(), value);
        }
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn observed(&self) -> Option<f64> {
        self.metrics.get("observed").copied()
    }

    /// The result carries a value usable as anomaly history.
    pub fn is_baseline(&self) -> bool {
        match self.status {
            ResultStatus::Passed => true,
            ResultStatus::Skipped => self.metrics.contains_key("baseline"),
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ScanAggregate {
    pub executed: usize,
    pub passed: usize,
    pub failed: usize,
    pub error: usize,
    pub skipped: usize,
    pub timeout: usize,
    pub duration_ms: u64,
}

impl ScanAggregate {
    pub fn record(&mut self, status: ResultStatus) {
        self.executed += 1;
        match status {
            ResultStatus::Passed => self.passed += 1,
            ResultStatus::Failed => self.failed += 1,
            ResultStatus::Error => self.error += 1,
            ResultStatus::Skipped => self.skipped += 1,
            ResultStatus::Timeout => self.timeout += 1,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ScanReport {
    pub results: Vec<QualityResult>,
    pub aggregate: ScanAggregate,
}

impl ScanReport {
    pub fn from_results(results: Vec<QualityResult>, duration_ms: u64) -> Self {
        let mut aggregate = ScanAggregate::default();
        for r in &results {
            aggregate.record(r.status);
        }
        aggregate.duration_ms = duration_ms;
        Self { results, aggregate }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_counts_every_status() {
        let results = vec![
            QualityResult::new("a", "main.t", ResultStatus::Passed),
            QualityResult::new("b", "main.t", ResultStatus::Failed),
            QualityResult::new("c", "main.t", ResultStatus::Timeout),
            QualityResult::new("d", "main.t", ResultStatus::Skipped),
        ];
        let report = ScanReport::from_results(results, 12);
        assert_eq!(report.aggregate.executed, 4);
        assert_eq!(report.aggregate.passed, 1);
        assert_eq!(report.aggregate.failed, 1);
        assert_eq!(report.aggregate.timeout, 1);
        assert_eq!(report.aggregate.skipped, 1);
        assert_eq!(report.aggregate.duration_ms, 12);
    }

    #[test]
    fn test_baseline_results() {
        let warmup = QualityResult::new("a", "main.t", ResultStatus::Skipped)
            .with_metric("observed", 4.0)
            .with_metric("baseline", 1.0);
        assert!(warmup.is_baseline());
        assert!(!QualityResult::new("a", "main.t", ResultStatus::Skipped).is_baseline());
        assert!(!QualityResult::new("a", "main.t", ResultStatus::Failed).is_baseline());
    }
}
