// warden-core/src/infrastructure/adapters/duckdb.rs

use async_trait::async_trait;
use duckdb::types::Value as DuckValue;
use duckdb::{Config, Connection, InterruptHandle};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::domain::catalog::{
    Asset, AssetFilter, AssetType, Column, ColumnClassification, ColumnRef,
};
use crate::error::{Result, WardenError};
use crate::infrastructure::error::InfrastructureError;
use crate::ports::catalog::CatalogSource;
use crate::ports::connector::{ConnectorError, DataSourceConnector, QueryResult};

const SYSTEM_SCHEMAS: &str = "'information_schema', 'pg_catalog'";

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::from(i),
        DuckValue::SmallInt(i) => Value::from(i),
        DuckValue::Int(i) => Value::from(i),
        DuckValue::BigInt(i) => Value::from(i),
        DuckValue::HugeInt(i) => i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(i.to_string())),
        DuckValue::UTinyInt(i) => Value::from(i),
        DuckValue::USmallInt(i) => Value::from(i),
        DuckValue::UInt(i) => Value::from(i),
        DuckValue::UBigInt(i) => Value::from(i),
        DuckValue::Float(f) => Number::from_f64(f as f64).map(Value::Number).unwrap_or(Value::Null),
        DuckValue::Double(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        DuckValue::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        DuckValue::Text(s) => Value::String(s),
        DuckValue::Enum(s) => Value::String(s),
        other => Value::String(format!("{:?}", other)),
    }
}

fn map_error(source_id: &str, err: duckdb::Error) -> ConnectorError {
    let message = err.to_string();
    if message.contains("Parser Error") || message.contains("Binder Error") {
        ConnectorError::QuerySyntax(message)
    } else if message.contains("IO Error") && message.contains("Permission") {
        ConnectorError::Authentication(source_id.to_string())
    } else {
        ConnectorError::Query(message)
    }
}

fn run_query(conn: &Connection, query: &str) -> std::result::Result<QueryResult, duckdb::Error> {
    let mut stmt = conn.prepare(query)?;
    let mut rows = stmt.query([])?;
    let columns: Vec<String> = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            cells.push(to_json(row.get::<_, DuckValue>(idx)?));
        }
        out.push(cells);
    }
    Ok(QueryResult { columns, rows: out })
}

struct InterruptOnDrop(Option<Arc<InterruptHandle>>);

impl InterruptOnDrop {
    fn interrupt(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.interrupt();
        }
    }

    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        self.interrupt();
    }
}

/// DuckDB-backed data source. Also answers catalog questions from `information_schema`.
pub struct DuckDbConnector {
    source_id: String,
    conn: Arc<Mutex<Connection>>,
    max_connections: usize,
    classifications: RwLock<HashMap<ColumnRef, ColumnClassification>>,
}

impl DuckDbConnector {
    pub fn open(
        source_id: &str,
        db_path: &str,
        max_connections: usize,
    ) -> Result<Self, InfrastructureError> {
        let config = Config::default();
        let conn = if db_path == ":memory:" {
            Connection::open_in_memory_with_flags(config)?
        } else {
            Connection::open_with_flags(db_path, config)?
        };
        debug!(source = source_id, path = db_path, "DuckDB source opened");

        Ok(Self {
            source_id: source_id.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            max_connections: max_connections.max(1),
            classifications: RwLock::new(HashMap::new()),
        })
    }

    pub fn in_memory(source_id: &str) -> Result<Self, InfrastructureError> {
        Self::open(source_id, ":memory:", 4)
    }

    /// Runs DDL/DML, e.g. seeding a database. Not part of the read-only connector port.
    pub fn execute_batch(&self, sql: &str) -> Result<(), InfrastructureError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn classifications(&self) -> Vec<(ColumnRef, ColumnClassification)> {
        self.classifications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn restore_classifications(&self, entries: Vec<(ColumnRef, ColumnClassification)>) {
        let mut map = self.classifications.write().unwrap_or_else(PoisonError::into_inner);
        map.extend(entries);
    }

    fn connection(&self) -> std::result::Result<Connection, ConnectorError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.try_clone().map_err(|e| ConnectorError::Connection {
            source_id: self.source_id.clone(),
            message: e.to_string(),
        })
    }

    async fn query_catalog(&self, query: String) -> Result<QueryResult> {
        Ok(self.execute(&query, Duration::from_secs(30)).await?)
    }
}

#[async_trait]
impl DataSourceConnector for DuckDbConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn engine_name(&self) -> &str {
        "duckdb"
    }

    fn max_connections(&self) -> usize {
        self.max_connections
    }

    async fn execute(
        &self,
        query: &str,
        timeout: Duration,
    ) -> std::result::Result<QueryResult, ConnectorError> {
        let conn = self.connection()?;
        let sql = query.to_string();
        let source_id = self.source_id.clone();

        // Armed until the query returns. Dropping this future (an outer budget ran out) stops
        // the query inside DuckDB instead of leaving it on a blocking thread.
        let mut guard = InterruptOnDrop(Some(conn.interrupt_handle()));
        let mut task = tokio::task::spawn_blocking(move || run_query(&conn, &sql));

        let joined = match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                guard.interrupt();
                // Hold the caller's permit until DuckDB has actually stopped.
                let _ = task.await;
                debug!(source = %source_id, ?timeout, "Query interrupted");
                return Err(ConnectorError::Timeout(timeout));
            }
        };
        guard.disarm();
        match joined {
            Err(join) => Err(ConnectorError::Query(join.to_string())),
            Ok(result) => result.map_err(|e| map_error(&source_id, e)),
        }
    }
}

#[async_trait]
impl CatalogSource for DuckDbConnector {
    async fn list_assets(&self, source_id: &str, filter: &AssetFilter) -> Result<Vec<Asset>> {
        if source_id != self.source_id {
            return Ok(vec![]);
        }
        let result = self
            .query_catalog(format!(
                "SELECT table_schema, table_name, table_type FROM information_schema.tables \
                 WHERE table_schema NOT IN ({SYSTEM_SCHEMAS}) ORDER BY table_schema, table_name"
            ))
            .await?;

        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let schema = row.first()?.as_str()?;
                let name = row.get(1)?.as_str()?;
                let asset_type = row
                    .get(2)
                    .and_then(|v| v.as_str())
                    .and_then(|t| t.parse::<AssetType>().ok())
                    .unwrap_or_default();
                Some(Asset::new(&self.source_id, schema, name, asset_type))
            })
            .filter(|asset| filter.matches(asset))
            .collect())
    }

    async fn get_asset(&self, asset_id: &str) -> Result<Option<Asset>> {
        let Some((schema, name)) = asset_id.split_once('.') else {
            return Ok(None);
        };
        let result = self
            .query_catalog(format!(
                "SELECT table_type FROM information_schema.tables \
                 WHERE table_schema = {} AND table_name = {}",
                quote_literal(schema),
                quote_literal(name)
            ))
            .await?;

        Ok(result.rows.first().map(|row| {
            let asset_type = row
                .first()
                .and_then(|v| v.as_str())
                .and_then(|t| t.parse::<AssetType>().ok())
                .unwrap_or_default();
            Asset::new(&self.source_id, schema, name, asset_type)
        }))
    }

    async fn list_columns(&self, asset_id: &str) -> Result<Vec<Column>> {
        let (schema, name) = asset_id.split_once('.').ok_or_else(|| {
            WardenError::InternalError(format!("Malformed asset id '{}'", asset_id))
        })?;
        let result = self
            .query_catalog(format!(
                "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
                 WHERE table_schema = {} AND table_name = {} ORDER BY ordinal_position",
                quote_literal(schema),
                quote_literal(name)
            ))
            .await?;

        let classifications = self.classifications.read().unwrap_or_else(PoisonError::into_inner);
        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                let column_name = row.first()?.as_str()?;
                let data_type = row.get(1)?.as_str()?;
                let nullable = row.get(2).and_then(|v| v.as_str()).is_none_or(|v| v == "YES");
                let mut column = Column::new(column_name, data_type, nullable);

                let key = ColumnRef {
                    asset_id: asset_id.to_string(),
                    schema: schema.to_string(),
                    table: name.to_string(),
                    column: column_name.to_string(),
                };
                if let Some(c) = classifications.get(&key) {
                    column.pii_type = c.pii_type.clone();
                    column.is_sensitive = c.is_sensitive;
                }
                Some(column)
            })
            .collect())
    }

    async fn update_column_classification(
        &self,
        column: &ColumnRef,
        classification: ColumnClassification,
    ) -> Result<()> {
        self.classifications
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(column.clone(), classification);
        Ok(())
    }
}
