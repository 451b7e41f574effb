// warden-core/src/ports/connector.rs

// What the engine needs from a data source, without knowing which engine answers.
// Every call carries its own time budget: a hung query must only cost its own unit.

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::domain::catalog::ColumnRef;

#[derive(Error, Debug, Diagnostic)]
pub enum ConnectorError {
    #[error("Source '{source_id}' unreachable: {message}")]
    #[diagnostic(code(warden::connector::connection))]
    Connection { source_id: String, message: String },

    #[error("Query syntax error: {0}")]
    #[diagnostic(
        code(warden::connector::syntax),
        help("The rule stays enabled. Fix its expression and re-run the scan.")
    )]
    QuerySyntax(String),

    #[error("Query failed: {0}")]
    #[diagnostic(code(warden::connector::query))]
    Query(String),

    #[error("Query exceeded its {0:?} budget")]
    #[diagnostic(code(warden::connector::timeout))]
    Timeout(Duration),

    #[error("Credentials rejected by source '{0}'")]
    #[diagnostic(code(warden::connector::authentication))]
    Authentication(String),
}

impl ConnectorError {
    /// Only credential failures invalidate a whole source.
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

/// Tabular answer of a query. Cells are JSON values so every engine maps onto the same shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    pub fn scalar_f64(&self) -> Option<f64> {
        self.scalar().and_then(value_as_f64)
    }

    /// Cell of the first row by column name.
    pub fn first(&self, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c.eq_ignore_ascii_case(column))?;
        self.rows.first().and_then(|row| row.get(idx))
    }

    pub fn first_f64(&self, column: &str) -> Option<f64> {
        self.first(column).and_then(value_as_f64)
    }

    pub fn first_text(&self, column: &str) -> Option<String> {
        self.first(column).and_then(value_as_text)
    }
}

pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
pub trait DataSourceConnector: Send + Sync {
    fn source_id(&self) -> &str;

    fn engine_name(&self) -> &str;

    /// Safe number of concurrent outbound queries for this source.
    fn max_connections(&self) -> usize {
        4
    }

    async fn execute(&self, query: &str, timeout: Duration) -> Result<QueryResult, ConnectorError>;

    /// Up to `n` non-null values of a column, rendered as text.
    async fn sample(
        &self,
        column: &ColumnRef,
        n: usize,
        timeout: Duration,
    ) -> Result<Vec<String>, ConnectorError> {
        let col = column.column_sql();
        let query = format!(
            "SELECT CAST({col} AS VARCHAR) FROM {table} WHERE {col} IS NOT NULL LIMIT {n}",
            table = column.table_sql(),
        );
        let result = self.execute(&query, timeout).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(value_as_text))
            .collect())
    }
}
