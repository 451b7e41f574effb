// warden-core/src/domain/catalog.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const NUMERIC_TYPES: &[&str] = &[
    "TINYINT", "SMALLINT", "INTEGER", "INT", "BIGINT", "HUGEINT", "UTINYINT", "USMALLINT",
    "UINTEGER", "UBIGINT", "UHUGEINT", "INT1", "INT2", "INT4", "INT8", "DECIMAL", "NUMERIC",
    "DOUBLE", "DOUBLE PRECISION", "FLOAT", "FLOAT4", "FLOAT8", "REAL",
];

/// Double-quotes an identifier, escaping embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    #[default]
    Table,
    View,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "base table" => Ok(Self::Table),
            "view" => Ok(Self::View),
            _ => Err(format!("Unknown asset type: {}", s)),
        }
    }
}

/// A table or view known to the catalog. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub schema: String,
    pub name: String,
    pub asset_type: AssetType,
    pub source_id: String,
}

impl Asset {
    pub fn new(source_id: &str, schema: &str, name: &str, asset_type: AssetType) -> Self {
        Self {
            id: format!("{}.{}", schema, name),
            schema: schema.to_string(),
            name: name.to_string(),
            asset_type,
            source_id: source_id.to_string(),
        }
    }

    pub fn table_sql(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }

    pub fn column(&self, column: &str) -> ColumnRef {
        ColumnRef {
            asset_id: self.id.clone(),
            schema: self.schema.clone(),
            table: self.name.clone(),
            column: column.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub pii_type: Option<String>,
    #[serde(default)]
    pub is_sensitive: bool,
}

impl Column {
    pub fn new(name: &str, data_type: &str, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
            pii_type: None,
            is_sensitive: false,
        }
    }

    /// Base type name, without precision or length: `DECIMAL(10,2)` is `DECIMAL`.
    fn base_type(&self) -> String {
        let t = self.data_type.trim().to_uppercase();
        match t.find('(') {
            Some(idx) => t[..idx].trim_end().to_string(),
            None => t,
        }
    }

    pub fn is_numeric(&self) -> bool {
        NUMERIC_TYPES.contains(&self.base_type().as_str())
    }

    pub fn is_temporal(&self) -> bool {
        let t = self.data_type.to_uppercase();
        t.contains("TIMESTAMP") || t == "DATE" || t.starts_with("DATETIME")
    }
}

/// Fully-qualified pointer to one column of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub asset_id: String,
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn table_sql(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    pub fn column_sql(&self) -> String {
        quote_ident(&self.column)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.asset_id, self.column)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFilter {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub asset_type: Option<AssetType>,
}

impl AssetFilter {
    pub fn matches(&self, asset: &Asset) -> bool {
        self.schema
            .as_deref()
            .is_none_or(|s| s.eq_ignore_ascii_case(&asset.schema))
            && self.asset_type.is_none_or(|t| t == asset.asset_type)
    }
}

/// Outcome of the last PII classification of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnClassification {
    pub pii_type: Option<String>,
    pub is_sensitive: bool,
    pub confidence: f64,
    pub classified_at: DateTime<Utc>,
}
