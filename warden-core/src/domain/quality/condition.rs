// warden-core/src/domain/quality/condition.rs

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::DomainError;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    /// Longest symbols first so "<=" is never read as "<".
    const SYMBOLS: [(&'static str, Operator); 8] = [
        ("<=", Operator::Le),
        (">=", Operator::Ge),
        ("==", Operator::Eq),
        ("!=", Operator::Ne),
        ("<>", Operator::Ne),
        ("<", Operator::Lt),
        (">", Operator::Gt),
        ("=", Operator::Eq),
    ];
}

/// `operator value`, e.g. `< 0.05`. The rule passes when the observed metric satisfies it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Condition {
    pub operator: Operator,
    pub value: f64,
}

impl Condition {
    pub fn new(operator: Operator, value: f64) -> Self {
        Self { operator, value }
    }

    pub fn holds(&self, observed: f64) -> bool {
        match self.operator {
            Operator::Lt => observed < self.value,
            Operator::Le => observed <= self.value + EPSILON,
            Operator::Gt => observed > self.value,
            Operator::Ge => observed + EPSILON >= self.value,
            Operator::Eq => (observed - self.value).abs() <= EPSILON,
            Operator::Ne => (observed - self.value).abs() > EPSILON,
        }
    }
}

impl FromStr for Condition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (operator, rest) = Operator::SYMBOLS
            .iter()
            .find_map(|(sym, op)| trimmed.strip_prefix(sym).map(|rest| (*op, rest)))
            .ok_or_else(|| DomainError::InvalidCondition(s.to_string()))?;

        let value = rest
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| DomainError::InvalidCondition(s.to_string()))?;

        Ok(Self { operator, value })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operator.as_str(), self.value)
    }
}

impl Serialize for Condition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Condition::from_str(&s).map_err(de::Error::custom)
    }
}
