// warden-core/src/application/rule_engine.rs

use chrono::Utc;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::application::ports::TemplateEngine;
use crate::domain::catalog::{Asset, quote_ident};
use crate::domain::compiler::sql_guard::{ensure_read_only, has_unresolved_placeholder};
use crate::domain::error::DomainError;
use crate::domain::quality::condition::Condition;
use crate::domain::quality::profile::parse_timestamp;
use crate::domain::quality::result::{QualityResult, ResultStatus};
use crate::domain::quality::rule::{Metric, QualityRule, RuleCheck};
use crate::domain::quality::zscore::{MetricState, ZScoreCheck, ZScoreError};
use crate::error::{Result, WardenError};
use crate::ports::catalog::CatalogSource;
use crate::ports::connector::{ConnectorError, DataSourceConnector};
use crate::ports::store::ResultStore;

/// Denominator floor for relative differences against a zero reference.
const RELATIVE_EPSILON: f64 = 1e-9;

/// Runs one declared rule against a live source and reports a status. Per-rule failures
/// become `error`/`timeout` results; only systemic source failures surface as `Err`.
pub struct QualityRuleEngine {
    catalog: Arc<dyn CatalogSource>,
    results: Arc<dyn ResultStore>,
    templates: Arc<dyn TemplateEngine>,
    budget: Duration,
}

impl QualityRuleEngine {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        results: Arc<dyn ResultStore>,
        templates: Arc<dyn TemplateEngine>,
        budget: Duration,
    ) -> Self {
        Self {
            catalog,
            results,
            templates,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    #[instrument(skip_all, fields(rule = %rule.id, kind = rule.kind()))]
    pub async fn execute(
        &self,
        rule: &QualityRule,
        connector: &dyn DataSourceConnector,
    ) -> Result<QualityResult> {
        let started = Instant::now();

        let outcome = if rule.enabled {
            self.evaluate(rule, connector).await
        } else {
            Ok(QualityResult::new(&rule.id, &rule.asset_id, ResultStatus::Skipped)
                .with_message("rule is disabled"))
        };

        let mut result = match outcome {
            Ok(result) => result,
            Err(e) if e.is_systemic() => return Err(e),
            Err(WardenError::Connector(ConnectorError::Timeout(budget))) => {
                warn!(budget = ?budget, "Rule timed out");
                Self::timed_out(rule, budget)
            }
            Err(e) => {
                warn!(error = %e, "Rule errored");
                QualityResult::new(&rule.id, &rule.asset_id, ResultStatus::Error)
                    .with_message(e.to_string())
            }
        };
        result.execution_time_ms = started.elapsed().as_millis() as u64;
        debug!(status = %result.status, ms = result.execution_time_ms, "Rule finished");
        Ok(result)
    }

    pub fn timed_out(rule: &QualityRule, budget: Duration) -> QualityResult {
        QualityResult::new(&rule.id, &rule.asset_id, ResultStatus::Timeout)
            .with_message(format!("rule exceeded its {:?} budget", budget))
    }

    async fn evaluate(
        &self,
        rule: &QualityRule,
        connector: &dyn DataSourceConnector,
    ) -> Result<QualityResult> {
        // Template rules are reported before touching the catalog
        if let RuleCheck::Sql { query } = &rule.check {
            if has_unresolved_placeholder(query) {
                return Ok(QualityResult::new(&rule.id, &rule.asset_id, ResultStatus::Skipped)
                    .with_message("template rule: query has unresolved ${...} placeholders"));
            }
        }

        let asset = self.asset(&rule.asset_id).await?;
        match &rule.check {
            RuleCheck::Threshold { metric, condition } => {
                self.threshold(rule, &asset, *metric, condition, connector).await
            }
            RuleCheck::Sql { query } => self.sql(rule, &asset, query, connector).await,
            RuleCheck::Pattern {
                regex,
                min_match_rate,
                sample_size,
            } => {
                self.pattern(rule, &asset, regex, *min_match_rate, *sample_size, connector)
                    .await
            }
            RuleCheck::Freshness {
                timestamp_column,
                max_age_secs,
            } => {
                self.freshness(rule, &asset, timestamp_column, *max_age_secs, connector)
                    .await
            }
            RuleCheck::Comparison {
                reference_asset,
                reference_column,
                metric,
                tolerance,
            } => {
                let reference = self.asset(reference_asset).await?;
                let reference_column = reference_column.as_deref().or(rule.column.as_deref());
                self.comparison(
                    rule,
                    &asset,
                    &reference,
                    reference_column,
                    *metric,
                    *tolerance,
                    connector,
                )
                .await
            }
            RuleCheck::Anomaly {
                metric,
                z_threshold,
                min_history,
            } => {
                self.anomaly(rule, &asset, *metric, *z_threshold, *min_history, connector)
                    .await
            }
        }
    }

    async fn asset(&self, asset_id: &str) -> Result<Asset> {
        self.catalog
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| DomainError::AssetNotFound(asset_id.to_string()).into())
    }

    /// `(value, row_count)` of one metric. `value` is `None` for MIN/MAX/AVG over no rows.
    async fn measure(
        &self,
        asset: &Asset,
        column: Option<&str>,
        metric: Metric,
        connector: &dyn DataSourceConnector,
    ) -> Result<(Option<f64>, f64)> {
        let query = metric.query(&asset.table_sql(), column);
        let result = connector.execute(&query, self.budget).await?;
        Ok((result.first_f64("value"), result.first_f64("row_count").unwrap_or(0.0)))
    }

    async fn threshold(
        &self,
        rule: &QualityRule,
        asset: &Asset,
        metric: Metric,
        condition: &Condition,
        connector: &dyn DataSourceConnector,
    ) -> Result<QualityResult> {
        let (value, rows) = self.measure(asset, rule.column.as_deref(), metric, connector).await?;
        let Some(observed) = value else {
            return Ok(QualityResult::new(&rule.id, &rule.asset_id, ResultStatus::Failed)
                .with_metric("row_count", rows)
                .with_message(format!("{} has no value over {} rows", metric, rows)));
        };

        let status = if condition.holds(observed) {
            ResultStatus::Passed
        } else {
            ResultStatus::Failed
        };
        let mut result = QualityResult::new(&rule.id, &rule.asset_id, status)
            .with_metric("observed", observed)
            .with_metric("expected", condition.value)
            .with_metric("row_count", rows);
        if status == ResultStatus::Failed {
            result = result.with_message(format!(
                "{} = {:.4}, expected {}",
                metric, observed, condition
            ));
        }
        Ok(result)
    }

    async fn sql(
        &self,
        rule: &QualityRule,
        asset: &Asset,
        query: &str,
        connector: &dyn DataSourceConnector,
    ) -> Result<QualityResult> {
        let mut context = json!({
            "table": asset.table_sql(),
            "schema": quote_ident(&asset.schema),
            "asset": asset.id,
        });
        if let (Some(column), Some(map)) = (&rule.column, context.as_object_mut()) {
            map.insert("column".to_string(), json!(quote_ident(column)));
        }

        let sql = self.templates.render(query, &context)?;
        ensure_read_only(&sql)?;

        let result = connector.execute(&sql, self.budget).await?;
        let failing = result.scalar_f64().ok_or_else(|| {
            ConnectorError::Query("query must return a single failing-row count".to_string())
        })?;

        let status = if failing > 0.0 {
            ResultStatus::Failed
        } else {
            ResultStatus::Passed
        };
        let mut out = QualityResult::new(&rule.id, &rule.asset_id, status)
            .with_metric("observed", failing)
            .with_metric("failing_rows", failing)
            .with_metric("expected", 0.0);
        if status == ResultStatus::Failed {
            out = out.with_message(format!("{} failing rows", failing));
        }
        Ok(out)
    }

    async fn pattern(
        &self,
        rule: &QualityRule,
        asset: &Asset,
        pattern: &str,
        min_match_rate: f64,
        sample_size: usize,
        connector: &dyn DataSourceConnector,
    ) -> Result<QualityResult> {
        let regex = Regex::new(pattern).map_err(|e| DomainError::InvalidRegex {
            rule: rule.id.clone(),
            reason: e.to_string(),
        })?;
        let column = rule.column.as_deref().ok_or_else(|| DomainError::InvalidRule {
            rule: rule.id.clone(),
            reason: "pattern rules need a column".to_string(),
        })?;

        let samples = connector
            .sample(&asset.column(column), sample_size, self.budget)
            .await?;
        if samples.is_empty() {
            return Ok(QualityResult::new(&rule.id, &rule.asset_id, ResultStatus::Skipped)
                .with_metric("sampled", 0.0)
                .with_message("no non-null values to sample"));
        }

        let matched = samples.iter().filter(|v| regex.is_match(v)).count();
        let rate = matched as f64 / samples.len() as f64;
        let status = if rate >= min_match_rate {
            ResultStatus::Passed
        } else {
            ResultStatus::Failed
        };
        let mut result = QualityResult::new(&rule.id, &rule.asset_id, status)
            .with_metric("observed", rate)
            .with_metric("expected", min_match_rate)
            .with_metric("sampled", samples.len() as f64);
        if status == ResultStatus::Failed {
            result = result.with_message(format!(
                "{}/{} sampled values match, below {:.0}%",
                matched,
                samples.len(),
                min_match_rate * 100.0
            ));
        }
        Ok(result)
    }

    async fn freshness(
        &self,
        rule: &QualityRule,
        asset: &Asset,
        timestamp_column: &str,
        max_age_secs: u64,
        connector: &dyn DataSourceConnector,
    ) -> Result<QualityResult> {
        let query = format!(
            "SELECT CAST(MAX({col}) AS VARCHAR) AS value, COUNT(*) AS row_count FROM {table}",
            col = quote_ident(timestamp_column),
            table = asset.table_sql(),
        );
        let result = connector.execute(&query, self.budget).await?;
        let rows = result.first_f64("row_count").unwrap_or(0.0);
        let failed = |message: &str| {
            QualityResult::new(&rule.id, &rule.asset_id, ResultStatus::Failed)
                .with_metric("row_count", rows)
                .with_metric("expected", max_age_secs as f64)
                .with_message(message)
        };

        if rows == 0.0 {
            return Ok(failed("no rows"));
        }
        let Some(raw) = result.first_text("value") else {
            return Ok(failed("no timestamps"));
        };
        let latest = parse_timestamp(&raw).ok_or_else(|| {
            ConnectorError::Query(format!(
                "cannot read '{}' in {} as a timestamp",
                raw, timestamp_column
            ))
        })?;

        let age = (Utc::now() - latest).num_seconds().max(0) as f64;
        let status = if age <= max_age_secs as f64 {
            ResultStatus::Passed
        } else {
            ResultStatus::Failed
        };
        let mut out = QualityResult::new(&rule.id, &rule.asset_id, status)
            .with_metric("observed", age)
            .with_metric("expected", max_age_secs as f64)
            .with_metric("row_count", rows);
        if status == ResultStatus::Failed {
            out = out.with_message(format!(
                "latest {} is {}s old, allowed {}s",
                timestamp_column, age, max_age_secs
            ));
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    async fn comparison(
        &self,
        rule: &QualityRule,
        asset: &Asset,
        reference: &Asset,
        reference_column: Option<&str>,
        metric: Metric,
        tolerance: f64,
        connector: &dyn DataSourceConnector,
    ) -> Result<QualityResult> {
        let (own, _) = self.measure(asset, rule.column.as_deref(), metric, connector).await?;
        let (other, _) = self.measure(reference, reference_column, metric, connector).await?;

        let (Some(a), Some(b)) = (own, other) else {
            return Ok(QualityResult::new(&rule.id, &rule.asset_id, ResultStatus::Failed)
                .with_message(format!("{} is missing on one side of the comparison", metric)));
        };

        let diff = (a - b).abs() / b.abs().max(RELATIVE_EPSILON);
        let status = if diff > tolerance {
            ResultStatus::Failed
        } else {
            ResultStatus::Passed
        };
        let mut result = QualityResult::new(&rule.id, &rule.asset_id, status)
            .with_metric("observed", a)
            .with_metric("reference", b)
            .with_metric("relative_diff", diff)
            .with_metric("expected", tolerance);
        if status == ResultStatus::Failed {
            result = result.with_message(format!(
                "{} differs from {} by {:.2}% (tolerance {:.2}%)",
                metric,
                reference.id,
                diff * 100.0,
                tolerance * 100.0
            ));
        }
        Ok(result)
    }

    async fn anomaly(
        &self,
        rule: &QualityRule,
        asset: &Asset,
        metric: Metric,
        z_threshold: f64,
        min_history: usize,
        connector: &dyn DataSourceConnector,
    ) -> Result<QualityResult> {
        let (value, rows) = self.measure(asset, rule.column.as_deref(), metric, connector).await?;
        let Some(current) = value else {
            return Ok(QualityResult::new(&rule.id, &rule.asset_id, ResultStatus::Skipped)
                .with_metric("row_count", rows)
                .with_message(format!("{} has no value over {} rows", metric, rows)));
        };

        let history = self.results.history(&rule.id).await?;
        let state = MetricState::from_values(
            history
                .iter()
                .filter(|r| r.is_baseline())
                .filter_map(QualityResult::observed),
        );

        let base = |status| {
            QualityResult::new(&rule.id, &rule.asset_id, status)
                .with_metric("observed", current)
                .with_metric("row_count", rows)
                .with_metric("history", state.count as f64)
        };

        let result = match ZScoreCheck::validate(
            metric.as_str(),
            current,
            &state,
            z_threshold,
            min_history as u64,
        ) {
            Ok(z) => base(ResultStatus::Passed)
                .with_metric("z_score", z)
                .with_metric("mean", state.mean)
                .with_metric("stddev", state.stddev()),
            Err(e @ ZScoreError::NotEnoughHistory { .. }) => base(ResultStatus::Skipped)
                .with_metric("baseline", current)
                .with_message(e.to_string()),
            Err(e @ ZScoreError::AnomalyDetected { z_score, .. }) => base(ResultStatus::Failed)
                .with_metric("z_score", z_score)
                .with_metric("mean", state.mean)
                .with_metric("stddev", state.stddev())
                .with_message(e.to_string()),
        };
        Ok(result)
    }
}
