// warden-core/src/domain/quality/profile.rs

// Pure profiling logic: statistics come in, flags, scores and suggestions go out.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::governance::tokens::tokenize;
use crate::domain::project::ProfilingConfig;
use crate::domain::quality::rule::Dimension;
use crate::domain::quality::zscore::MetricState;

const IDENTIFIER_TOKENS: &[&str] = &["id", "uuid", "key", "code"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub column: String,
    pub data_type: String,
    pub row_count: u64,
    pub null_count: u64,
    pub null_rate: f64,
    pub distinct_count: u64,
    pub unique_rate: f64,
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub max: Option<String>,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub stddev: Option<f64>,
    #[serde(default)]
    pub sample_values: Vec<String>,
    pub is_numeric: bool,
    pub is_temporal: bool,
}

impl ColumnStats {
    pub fn min_f64(&self) -> Option<f64> {
        self.min.as_deref().and_then(|v| v.trim().parse().ok())
    }

    pub fn max_f64(&self) -> Option<f64> {
        self.max.as_deref().and_then(|v| v.trim().parse().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    HighNullRate,
    LowUniqueness,
    VarianceOutlier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub column: String,
    pub kind: AnomalyKind,
    pub observed: f64,
    pub threshold: f64,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub validity: f64,
    pub freshness: f64,
    pub uniqueness: f64,
    pub overall: f64,
}

/// Advisory threshold rule. Never created automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSuggestion {
    pub asset_id: String,
    pub column: String,
    pub dimension: Dimension,
    pub expression: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProfile {
    pub asset_id: String,
    pub row_count: u64,
    pub columns: Vec<ColumnStats>,
    pub scores: DimensionScores,
    pub anomalies: Vec<AnomalyFlag>,
    pub profiled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedAsset {
    pub asset_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub assets_profiled: usize,
    pub assets_skipped: Vec<SkippedAsset>,
    pub profiles: Vec<DataProfile>,
    pub suggestions: Vec<RuleSuggestion>,
    pub duration_ms: u64,
}

/// Whole tokens `id`, `uuid`, `key`, `code`, or a trailing `_id`.
pub fn is_identifier_name(name: &str) -> bool {
    name.to_lowercase().ends_with("_id")
        || tokenize(name)
            .iter()
            .any(|t| IDENTIFIER_TOKENS.contains(&t.as_str()))
}

/// Accepts RFC 3339 and the text forms DuckDB produces for DATE and TIMESTAMP.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn variance_outlier(stats: &ColumnStats, config: &ProfilingConfig) -> Option<AnomalyFlag> {
    let (mean, stddev) = (stats.mean?, stats.stddev?);
    if mean.abs() > f64::EPSILON {
        let cv = stddev / mean.abs();
        if cv > config.cv_threshold {
            return Some(AnomalyFlag {
                column: stats.column.clone(),
                kind: AnomalyKind::VarianceOutlier,
                observed: cv,
                threshold: config.cv_threshold,
                detail: format!(
                    "coefficient of variation {:.2} above {:.2}",
                    cv, config.cv_threshold
                ),
            });
        }
    }

    let state = MetricState {
        mean,
        variance: stddev * stddev,
        count: stats.row_count - stats.null_count,
    };
    [stats.min_f64(), stats.max_f64()]
        .into_iter()
        .flatten()
        .filter_map(|v| state.z_score(v).map(|z| (v, z)))
        .find(|(_, z)| *z > config.z_threshold)
        .map(|(value, z)| AnomalyFlag {
            column: stats.column.clone(),
            kind: AnomalyKind::VarianceOutlier,
            observed: z,
            threshold: config.z_threshold,
            detail: format!(
                "value {} is {:.1} standard deviations from mean {:.2}",
                value, z, mean
            ),
        })
}

pub fn detect_anomalies(columns: &[ColumnStats], config: &ProfilingConfig) -> Vec<AnomalyFlag> {
    let mut flags = Vec::new();
    for stats in columns {
        if stats.row_count == 0 {
            continue;
        }
        if stats.null_rate > config.null_rate_threshold {
            flags.push(AnomalyFlag {
                column: stats.column.clone(),
                kind: AnomalyKind::HighNullRate,
                observed: stats.null_rate,
                threshold: config.null_rate_threshold,
                detail: format!(
                    "{:.1}% nulls, above {:.1}%",
                    stats.null_rate * 100.0,
                    config.null_rate_threshold * 100.0
                ),
            });
        }
        if is_identifier_name(&stats.column) && stats.unique_rate < config.identifier_unique_min {
            flags.push(AnomalyFlag {
                column: stats.column.clone(),
                kind: AnomalyKind::LowUniqueness,
                observed: stats.unique_rate,
                threshold: config.identifier_unique_min,
                detail: format!(
                    "identifier-like column only {:.1}% unique",
                    stats.unique_rate * 100.0
                ),
            });
        }
        if stats.is_numeric {
            flags.extend(variance_outlier(stats, config));
        }
    }
    flags
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

pub fn score(
    columns: &[ColumnStats],
    anomalies: &[AnomalyFlag],
    config: &ProfilingConfig,
    now: DateTime<Utc>,
) -> DimensionScores {
    let flagged = |col: &str| anomalies.iter().any(|a| a.column == col);
    let outlier = |col: &str| {
        anomalies
            .iter()
            .any(|a| a.column == col && a.kind == AnomalyKind::VarianceOutlier)
    };

    let completeness = mean(columns.iter().map(|c| 1.0 - c.null_rate)).unwrap_or(1.0);
    let uniqueness = mean(
        columns
            .iter()
            .filter(|c| is_identifier_name(&c.column))
            .map(|c| c.unique_rate),
    )
    .unwrap_or(1.0);
    let validity = mean(
        columns
            .iter()
            .map(|c| if flagged(&c.column) { 0.0 } else { 1.0 }),
    )
    .unwrap_or(1.0);
    let consistency = mean(
        columns
            .iter()
            .filter(|c| c.is_numeric)
            .map(|c| if outlier(&c.column) { 0.0 } else { 1.0 }),
    )
    .unwrap_or(1.0);
    let accuracy = (validity + consistency) / 2.0;

    let max_age = i64::try_from(config.freshness_max_age_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX);
    let stale = columns
        .iter()
        .filter(|c| c.is_temporal)
        .filter_map(|c| c.max.as_deref().and_then(parse_timestamp))
        .any(|latest| now - latest > max_age);
    let freshness = if stale { 0.0 } else { 1.0 };

    let w = &config.weights;
    let total_weight =
        w.completeness + w.uniqueness + w.validity + w.consistency + w.accuracy + w.freshness;
    let weighted = w.completeness * completeness
        + w.uniqueness * uniqueness
        + w.validity * validity
        + w.consistency * consistency
        + w.accuracy * accuracy
        + w.freshness * freshness;
    let overall = if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    };

    DimensionScores {
        completeness,
        accuracy,
        consistency,
        validity,
        freshness,
        uniqueness,
        overall,
    }
}

pub fn suggest(
    asset_id: &str,
    anomalies: &[AnomalyFlag],
    columns: &[ColumnStats],
) -> Vec<RuleSuggestion> {
    anomalies
        .iter()
        .filter_map(|flag| {
            let (dimension, expression) = match flag.kind {
                AnomalyKind::HighNullRate => (
                    Dimension::Completeness,
                    format!("null_rate < {}", flag.threshold),
                ),
                AnomalyKind::LowUniqueness => (
                    Dimension::Uniqueness,
                    format!("unique_rate >= {}", flag.threshold),
                ),
                AnomalyKind::VarianceOutlier => {
                    let stats = columns.iter().find(|c| c.column == flag.column)?;
                    let bound = stats.mean? + 3.0 * stats.stddev?;
                    (Dimension::Accuracy, format!("max <= {:.4}", bound))
                }
            };
            Some(RuleSuggestion {
                asset_id: asset_id.to_string(),
                column: flag.column.clone(),
                dimension,
                expression,
                reason: flag.detail.clone(),
            })
        })
        .collect()
}

/// Assembles one asset's profile and the rules it suggests.
pub fn build_profile(
    asset_id: &str,
    columns: Vec<ColumnStats>,
    config: &ProfilingConfig,
    now: DateTime<Utc>,
) -> (DataProfile, Vec<RuleSuggestion>) {
    let anomalies = detect_anomalies(&columns, config);
    let scores = score(&columns, &anomalies, config, now);
    let suggestions = suggest(asset_id, &anomalies, &columns);
    let row_count = columns.first().map(|c| c.row_count).unwrap_or(0);
    (
        DataProfile {
            asset_id: asset_id.to_string(),
            row_count,
            columns,
            scores,
            anomalies,
            profiled_at: now,
        },
        suggestions,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(column: &str, rows: u64, nulls: u64, distinct: u64) -> ColumnStats {
        ColumnStats {
            column: column.to_string(),
            data_type: "VARCHAR".to_string(),
            row_count: rows,
            null_count: nulls,
            null_rate: nulls as f64 / rows as f64,
            distinct_count: distinct,
            unique_rate: distinct as f64 / rows as f64,
            min: None,
            max: None,
            mean: None,
            stddev: None,
            sample_values: vec![],
            is_numeric: false,
            is_temporal: false,
        }
    }

    #[test]
    fn test_identifier_names() {
        assert!(is_identifier_name("customer_id"));
        assert!(is_identifier_name("orderKey"));
        assert!(is_identifier_name("uuid"));
        assert!(!is_identifier_name("valid_from"));
        assert!(!is_identifier_name("idle"));
    }

    #[test]
    fn test_high_null_rate_flag_and_suggestion() {
        let columns = vec![stats("email", 10, 5, 5)];
        let config = ProfilingConfig::default();
        let (profile, suggestions) = build_profile("main.customers", columns, &config, Utc::now());

        assert_eq!(profile.anomalies.len(), 1);
        assert_eq!(profile.anomalies[0].kind, AnomalyKind::HighNullRate);
        assert!((profile.scores.completeness - 0.5).abs() < 1e-9);
        assert_eq!(profile.scores.validity, 0.0);

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].column, "email");
        assert_eq!(suggestions[0].dimension, Dimension::Completeness);
        assert_eq!(suggestions[0].expression, "null_rate < 0.2");
    }

    #[test]
    fn test_low_uniqueness_on_identifier() {
        let config = ProfilingConfig::default();
        let flags = detect_anomalies(&[stats("customer_id", 100, 0, 40)], &config);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].kind, AnomalyKind::LowUniqueness);
        assert!(detect_anomalies(&[stats("city", 100, 0, 4)], &config).is_empty());
    }

    #[test]
    fn test_variance_outlier() {
        let mut total = stats("total", 100, 0, 100);
        total.is_numeric = true;
        total.mean = Some(10.0);
        total.stddev = Some(2.0);
        total.min = Some("5".to_string());
        total.max = Some("50".to_string());

        let flags = detect_anomalies(&[total.clone()], &ProfilingConfig::default());
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].kind, AnomalyKind::VarianceOutlier);

        let scores = score(&[total], &flags, &ProfilingConfig::default(), Utc::now());
        assert_eq!(scores.consistency, 0.0);
        assert_eq!(scores.accuracy, 0.0);
    }

    #[test]
    fn test_freshness_and_empty_asset() {
        let mut updated = stats("updated_at", 10, 0, 10);
        updated.is_temporal = true;
        updated.max = Some("2020-01-01 00:00:00".to_string());
        let scores = score(&[updated], &[], &ProfilingConfig::default(), Utc::now());
        assert_eq!(scores.freshness, 0.0);

        let empty = score(&[], &[], &ProfilingConfig::default(), Utc::now());
        assert_eq!(empty.overall, 1.0);
    }

    #[test]
    fn test_unbounded_max_age_never_goes_stale() {
        let mut updated = stats("updated_at", 10, 0, 10);
        updated.is_temporal = true;
        updated.max = Some("2020-01-01 00:00:00".to_string());
        let config = ProfilingConfig {
            freshness_max_age_secs: u64::MAX,
            ..ProfilingConfig::default()
        };
        assert_eq!(score(&[updated], &[], &config, Utc::now()).freshness, 1.0);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-05-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2024-05-01 10:00:00").is_some());
        assert!(parse_timestamp("2024-05-01 10:00:00.123456").is_some());
        assert!(parse_timestamp("2024-05-01 10:00:00+02").is_some());
        assert!(parse_timestamp("2024-05-01").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
