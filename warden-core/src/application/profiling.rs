// warden-core/src/application/profiling.rs

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::catalog::{Asset, Column, quote_ident};
use crate::domain::project::ProfilingConfig;
use crate::domain::quality::profile::{ColumnStats, DataProfile, RuleSuggestion, build_profile};
use crate::error::Result;
use crate::ports::catalog::CatalogSource;
use crate::ports::connector::DataSourceConnector;

/// Aggregate-only statistics per column. Rows are never materialized, apart from a few samples.
pub struct ProfilingEngine {
    catalog: Arc<dyn CatalogSource>,
    config: ProfilingConfig,
    budget: Duration,
}

impl ProfilingEngine {
    pub fn new(catalog: Arc<dyn CatalogSource>, config: ProfilingConfig, budget: Duration) -> Self {
        Self {
            catalog,
            config,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    #[instrument(skip_all, fields(asset = %asset.id))]
    pub async fn profile_asset(
        &self,
        asset: &Asset,
        connector: &dyn DataSourceConnector,
    ) -> Result<(DataProfile, Vec<RuleSuggestion>)> {
        let columns = self.catalog.list_columns(&asset.id).await?;
        let mut stats = Vec::with_capacity(columns.len());
        for column in &columns {
            stats.push(self.column_stats(asset, column, connector).await?);
        }
        let (profile, suggestions) = build_profile(&asset.id, stats, &self.config, Utc::now());
        debug!(
            columns = profile.columns.len(),
            anomalies = profile.anomalies.len(),
            overall = profile.scores.overall,
            "Asset profiled"
        );
        Ok((profile, suggestions))
    }

    async fn column_stats(
        &self,
        asset: &Asset,
        column: &Column,
        connector: &dyn DataSourceConnector,
    ) -> Result<ColumnStats> {
        let query = stats_query(asset, column);
        let result = connector.execute(&query, self.budget).await?;

        let rows = result.first_f64("row_count").unwrap_or(0.0) as u64;
        let non_null = result.first_f64("non_null").unwrap_or(0.0) as u64;
        let distinct = result.first_f64("distinct_count").unwrap_or(0.0) as u64;
        let rate = |n: u64| if rows == 0 { 0.0 } else { n as f64 / rows as f64 };

        let sample_values = if self.config.sample_values > 0 {
            connector
                .sample(&asset.column(&column.name), self.config.sample_values, self.budget)
                .await?
        } else {
            vec![]
        };

        Ok(ColumnStats {
            column: column.name.clone(),
            data_type: column.data_type.clone(),
            row_count: rows,
            null_count: rows.saturating_sub(non_null),
            null_rate: rate(rows.saturating_sub(non_null)),
            distinct_count: distinct,
            unique_rate: rate(distinct),
            min: result.first_text("min_value"),
            max: result.first_text("max_value"),
            mean: result.first_f64("mean"),
            stddev: result.first_f64("stddev"),
            sample_values,
            is_numeric: column.is_numeric(),
            is_temporal: column.is_temporal(),
        })
    }
}

fn stats_query(asset: &Asset, column: &Column) -> String {
    let col = quote_ident(&column.name);
    let numeric = if column.is_numeric() {
        format!(
            ", AVG(CAST({col} AS DOUBLE)) AS mean, STDDEV_POP(CAST({col} AS DOUBLE)) AS stddev"
        )
    } else {
        String::new()
    };
    format!(
        "SELECT COUNT(*) AS row_count, COUNT({col}) AS non_null, COUNT(DISTINCT {col}) AS distinct_count, \
         CAST(MIN({col}) AS VARCHAR) AS min_value, CAST(MAX({col}) AS VARCHAR) AS max_value{numeric} \
         FROM {table}",
        table = asset.table_sql(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::AssetType;
    use crate::domain::quality::profile::AnomalyKind;
    use crate::infrastructure::adapters::DuckDbConnector;
    use anyhow::Result;

    fn engine(db: Arc<DuckDbConnector>) -> ProfilingEngine {
        ProfilingEngine::new(db, ProfilingConfig::default(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_profile_computes_rates_and_flags() -> Result<()> {
        let db = Arc::new(DuckDbConnector::in_memory("warehouse")?);
        db.execute_batch(
            "CREATE TABLE customers (customer_id INTEGER, email VARCHAR, total DOUBLE);
             INSERT INTO customers VALUES
               (1, 'a@x.io', 10), (1, NULL, 11), (2, NULL, 12), (3, 'd@x.io', 13);",
        )?;
        let asset = Asset::new("warehouse", "main", "customers", AssetType::Table);
        let (profile, suggestions) = engine(db.clone()).profile_asset(&asset, db.as_ref()).await?;

        assert_eq!(profile.row_count, 4);
        let email = profile
            .columns
            .iter()
            .find(|c| c.column == "email")
            .ok_or_else(|| anyhow::anyhow!("email stats missing"))?;
        assert_eq!(email.null_rate, 0.5);
        assert_eq!(email.sample_values.len(), 2);

        let id = profile
            .columns
            .iter()
            .find(|c| c.column == "customer_id")
            .ok_or_else(|| anyhow::anyhow!("id stats missing"))?;
        assert_eq!(id.unique_rate, 0.75);
        assert!(id.mean.is_some());

        let kinds: Vec<AnomalyKind> = profile.anomalies.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&AnomalyKind::HighNullRate));
        assert!(kinds.contains(&AnomalyKind::LowUniqueness));
        assert!(suggestions.iter().any(|s| s.expression.starts_with("null_rate")));
        assert!(suggestions.iter().any(|s| s.expression.starts_with("unique_rate")));
        Ok(())
    }

    #[tokio::test]
    async fn test_interval_column_is_profiled_without_mean() -> Result<()> {
        let db = Arc::new(DuckDbConnector::in_memory("warehouse")?);
        db.execute_batch(
            "CREATE TABLE sessions (id INTEGER, duration INTERVAL);
             INSERT INTO sessions VALUES (1, INTERVAL 5 MINUTE), (2, INTERVAL 2 HOUR);",
        )?;
        let asset = Asset::new("warehouse", "main", "sessions", AssetType::Table);
        let (profile, _) = engine(db.clone()).profile_asset(&asset, db.as_ref()).await?;

        let duration = profile
            .columns
            .iter()
            .find(|c| c.column == "duration")
            .ok_or_else(|| anyhow::anyhow!("duration stats missing"))?;
        assert!(!duration.is_numeric);
        assert_eq!(duration.mean, None);
        assert_eq!(duration.distinct_count, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_table_profiles_to_zero_rates() -> Result<()> {
        let db = Arc::new(DuckDbConnector::in_memory("warehouse")?);
        db.execute_batch("CREATE TABLE empty_t (id INTEGER);")?;
        let asset = Asset::new("warehouse", "main", "empty_t", AssetType::Table);
        let (profile, _) = engine(db.clone()).profile_asset(&asset, db.as_ref()).await?;
        assert_eq!(profile.row_count, 0);
        assert_eq!(profile.columns[0].null_rate, 0.0);
        Ok(())
    }
}
