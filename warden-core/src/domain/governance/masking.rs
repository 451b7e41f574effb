// warden-core/src/domain/governance/masking.rs

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a masked view hides a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaskingStrategy {
    Hash,
    #[default]
    Redact,
    Nullify,
    Partial,
    MaskEmail,
}

impl MaskingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Redact => "redact",
            Self::Nullify => "nullify",
            Self::Partial => "partial",
            Self::MaskEmail => "mask_email",
        }
    }

    /// SQL expression masking an already-quoted column.
    pub fn sql_expression(&self, column: &str) -> String {
        match self {
            Self::Hash => format!("sha256(CAST({column} AS VARCHAR))"),
            Self::Redact => "'***'".to_string(),
            Self::Nullify => "NULL".to_string(),
            Self::Partial => format!(
                "CONCAT(LEFT(CAST({column} AS VARCHAR), 2), '****', RIGHT(CAST({column} AS VARCHAR), 2))"
            ),
            Self::MaskEmail => format!(
                "REGEXP_REPLACE(CAST({column} AS VARCHAR), '^[^@]+', '****')"
            ),
        }
    }
}

impl FromStr for MaskingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "redact" => Ok(Self::Redact),
            "nullify" => Ok(Self::Nullify),
            "partial" => Ok(Self::Partial),
            "mask_email" => Ok(Self::MaskEmail),
            _ => Err(format!("Unknown masking strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for MaskingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
