// warden-core/src/domain/quality/rule.rs

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::catalog::quote_ident;
use crate::domain::error::DomainError;
use crate::domain::quality::condition::Condition;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Completeness,
    Accuracy,
    Consistency,
    Validity,
    Freshness,
    Uniqueness,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completeness => "completeness",
            Self::Accuracy => "accuracy",
            Self::Consistency => "consistency",
            Self::Validity => "validity",
            Self::Freshness => "freshness",
            Self::Uniqueness => "uniqueness",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "completeness" => Ok(Self::Completeness),
            "accuracy" => Ok(Self::Accuracy),
            "consistency" => Ok(Self::Consistency),
            "validity" => Ok(Self::Validity),
            "freshness" => Ok(Self::Freshness),
            "uniqueness" => Ok(Self::Uniqueness),
            _ => Err(format!("Unknown dimension: {}", s)),
        }
    }
}

/// Aggregate computable in a single pass over a table.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    NullRate,
    UniqueRate,
    RowCount,
    DistinctCount,
    NullCount,
    Min,
    Max,
    Mean,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NullRate => "null_rate",
            Self::UniqueRate => "unique_rate",
            Self::RowCount => "row_count",
            Self::DistinctCount => "distinct_count",
            Self::NullCount => "null_count",
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
        }
    }

    pub fn requires_column(&self) -> bool {
        !matches!(self, Self::RowCount)
    }

    /// SQL aggregate expression. `column` must already be quoted.
    pub fn aggregate_sql(&self, column: Option<&str>) -> String {
        let col = column.unwrap_or("*");
        match self {
            Self::RowCount => "COUNT(*)".to_string(),
            Self::NullCount => format!("COUNT(*) - COUNT({col})"),
            Self::NullRate => format!(
                "CASE WHEN COUNT(*) = 0 THEN 0.0 ELSE CAST(COUNT(*) - COUNT({col}) AS DOUBLE) / COUNT(*) END"
            ),
            Self::DistinctCount => format!("COUNT(DISTINCT {col})"),
            Self::UniqueRate => format!(
                "CASE WHEN COUNT(*) = 0 THEN 0.0 ELSE CAST(COUNT(DISTINCT {col}) AS DOUBLE) / COUNT(*) END"
            ),
            Self::Min => format!("MIN(CAST({col} AS DOUBLE))"),
            Self::Max => format!("MAX(CAST({col} AS DOUBLE))"),
            Self::Mean => format!("AVG(CAST({col} AS DOUBLE))"),
        }
    }

    /// `SELECT <metric> AS value, COUNT(*) AS row_count FROM <table>`.
    pub fn query(&self, table_sql: &str, column: Option<&str>) -> String {
        let quoted = column.map(quote_ident);
        format!(
            "SELECT {} AS value, COUNT(*) AS row_count FROM {}",
            self.aggregate_sql(quoted.as_deref()),
            table_sql
        )
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_true() -> bool {
    true
}

fn default_min_match_rate() -> f64 {
    0.95
}

fn default_sample_size() -> usize {
    100
}

fn default_z_threshold() -> f64 {
    3.0
}

fn default_min_history() -> usize {
    2
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCheck {
    Threshold {
        metric: Metric,
        condition: Condition,
    },
    Sql {
        query: String,
    },
    Pattern {
        regex: String,
        #[serde(default = "default_min_match_rate")]
        min_match_rate: f64,
        #[serde(default = "default_sample_size")]
        sample_size: usize,
    },
    Freshness {
        timestamp_column: String,
        max_age_secs: u64,
    },
    Comparison {
        reference_asset: String,
        #[serde(default)]
        reference_column: Option<String>,
        metric: Metric,
        tolerance: f64,
    },
    Anomaly {
        metric: Metric,
        #[serde(default = "default_z_threshold")]
        z_threshold: f64,
        #[serde(default = "default_min_history")]
        min_history: usize,
    },
}

impl RuleCheck {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Threshold { .. } => "threshold",
            Self::Sql { .. } => "sql",
            Self::Pattern { .. } => "pattern",
            Self::Freshness { .. } => "freshness",
            Self::Comparison { .. } => "comparison",
            Self::Anomaly { .. } => "anomaly",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QualityRule {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub asset_id: String,
    #[serde(default)]
    pub column: Option<String>,
    pub dimension: Dimension,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Filled from the project source when omitted.
    #[serde(default)]
    pub source_id: String,
    #[serde(flatten)]
    pub check: RuleCheck,
}

impl QualityRule {
    pub fn kind(&self) -> &'static str {
        self.check.kind()
    }

    pub fn title(&self) -> String {
        match &self.column {
            Some(col) => {
                format!("{} check '{}' on {}.{}", self.kind(), self.id, self.asset_id, col)
            }
            None => format!("{} check '{}' on {}", self.kind(), self.id, self.asset_id),
        }
    }

    /// Structural checks run on every create/update before the rule reaches the store.
    pub fn validate(&self) -> Result<(), DomainError> {
        let invalid = |reason: &str| DomainError::InvalidRule {
            rule: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.asset_id.trim().is_empty() {
            return Err(invalid("asset_id must not be empty"));
        }

        match &self.check {
            RuleCheck::Threshold { metric, .. } | RuleCheck::Anomaly { metric, .. }
                if metric.requires_column() && self.column.is_none() =>
            {
                Err(invalid(&format!("metric '{}' needs a column", metric)))
            }
            RuleCheck::Anomaly {
                z_threshold,
                min_history,
                ..
            } => {
                if *z_threshold <= 0.0 || !z_threshold.is_finite() {
                    return Err(invalid("z_threshold must be a positive number"));
                }
                if *min_history < 2 {
                    return Err(invalid("min_history must be at least 2"));
                }
                Ok(())
            }
            RuleCheck::Threshold { .. } => Ok(()),
            RuleCheck::Sql { query } if query.trim().is_empty() => {
                Err(invalid("query must not be empty"))
            }
            RuleCheck::Sql { .. } => Ok(()),
            RuleCheck::Pattern {
                regex,
                min_match_rate,
                sample_size,
            } => {
                if self.column.is_none() {
                    return Err(invalid("pattern rules need a column"));
                }
                if !(0.0..=1.0).contains(min_match_rate) {
                    return Err(invalid("min_match_rate must be within 0..=1"));
                }
                if *sample_size == 0 {
                    return Err(invalid("sample_size must be at least 1"));
                }
                Regex::new(regex).map_err(|e| DomainError::InvalidRegex {
                    rule: self.id.clone(),
                    reason: e.to_string(),
                })?;
                Ok(())
            }
            RuleCheck::Freshness {
                timestamp_column,
                max_age_secs,
            } => {
                if timestamp_column.trim().is_empty() {
                    return Err(invalid("timestamp_column must not be empty"));
                }
                if *max_age_secs == 0 {
                    return Err(invalid("max_age_secs must be positive"));
                }
                Ok(())
            }
            RuleCheck::Comparison {
                metric,
                tolerance,
                reference_asset,
                reference_column,
            } => {
                if reference_asset.trim().is_empty() {
                    return Err(invalid("reference_asset must not be empty"));
                }
                if metric.requires_column() && self.column.is_none() {
                    return Err(invalid(&format!("metric '{}' needs a column", metric)));
                }
                if metric.requires_column()
                    && reference_column.is_none()
                    && self.column.is_none()
                {
                    return Err(invalid("reference_column is required"));
                }
                if *tolerance < 0.0 || !tolerance.is_finite() {
                    return Err(invalid("tolerance must be a non-negative number"));
                }
                Ok(())
            }
        }
    }
}
