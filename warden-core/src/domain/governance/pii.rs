// warden-core/src/domain/governance/pii.rs

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::DomainError;
use crate::domain::governance::masking::MaskingStrategy;
use crate::domain::quality::rule::Severity;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl SensitivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Confidence granted by a name-hint match before any data evidence.
    pub fn base_confidence(&self) -> f64 {
        match self {
            Self::Critical => 99.0,
            Self::High => 90.0,
            Self::Medium => 75.0,
            Self::Low => 60.0,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Low => Severity::Low,
            Self::Medium => Severity::Medium,
            Self::High => Severity::High,
            Self::Critical => Severity::Critical,
        }
    }
}

impl fmt::Display for SensitivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SensitivityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown sensitivity level: {}", s)),
        }
    }
}

/// What a detected column must look like before it counts as safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtectionRequirement {
    pub encryption: bool,
    pub masking: bool,
}

impl ProtectionRequirement {
    /// Monitoring mode: classify only, never raise issues.
    pub fn is_monitoring(&self) -> bool {
        !self.encryption && !self.masking
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PiiRuleDefinition {
    pub pii_type: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub sensitivity: SensitivityLevel,
    #[serde(default)]
    pub requires_encryption: bool,
    #[serde(default)]
    pub requires_masking: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub masking_strategy: MaskingStrategy,
}

impl PiiRuleDefinition {
    pub fn protection(&self) -> ProtectionRequirement {
        ProtectionRequirement {
            encryption: self.requires_encryption,
            masking: self.requires_masking,
        }
    }

    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.pii_type
        } else {
            &self.display_name
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.pii_type.trim().is_empty() {
            return Err(DomainError::InvalidRule {
                rule: "<pii>".to_string(),
                reason: "pii_type must not be empty".to_string(),
            });
        }
        if self.hints.iter().all(|h| h.trim().is_empty()) {
            return Err(DomainError::InvalidRule {
                rule: self.pii_type.clone(),
                reason: "at least one column-name hint is required".to_string(),
            });
        }
        if let Some(pattern) = &self.regex {
            Regex::new(pattern).map_err(|e| DomainError::InvalidRegex {
                rule: self.pii_type.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Rules used when a project declares none.
    pub fn builtin() -> Vec<PiiRuleDefinition> {
        let rule = |pii_type: &str,
                    display_name: &str,
                    hints: &[&str],
                    regex: Option<&str>,
                    sensitivity: SensitivityLevel,
                    masking_strategy: MaskingStrategy| PiiRuleDefinition {
            pii_type: pii_type.to_string(),
            display_name: display_name.to_string(),
            hints: hints.iter().map(|h| h.to_string()).collect(),
            regex: regex.map(str::to_string),
            sensitivity,
            requires_encryption: false,
            requires_masking: false,
            enabled: true,
            masking_strategy,
        };

        vec![
            rule(
                "email",
                "Email address",
                &["email", "e_mail", "mail"],
                Some(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$"),
                SensitivityLevel::High,
                MaskingStrategy::MaskEmail,
            ),
            rule(
                "ssn",
                "Social security number",
                &["ssn", "social_security", "social_security_number"],
                Some(r"^\d{3}-?\d{2}-?\d{4}$"),
                SensitivityLevel::Critical,
                MaskingStrategy::Partial,
            ),
            rule(
                "phone",
                "Phone number",
                &["phone", "phone_number", "mobile", "telephone"],
                Some(r"^\+?[\d\s().\-]{7,20}$"),
                SensitivityLevel::Medium,
                MaskingStrategy::Partial,
            ),
            rule(
                "credit_card",
                "Credit card number",
                &["credit_card", "card_number", "cc_number", "pan"],
                Some(r"^(?:\d[ \-]?){13,19}$"),
                SensitivityLevel::Critical,
                MaskingStrategy::Partial,
            ),
            rule(
                "name",
                "Person name",
                &["name", "first_name", "last_name", "full_name", "surname"],
                None,
                SensitivityLevel::Medium,
                MaskingStrategy::Redact,
            ),
            rule(
                "ip_address",
                "IP address",
                &["ip", "ip_address", "ip_addr"],
                Some(r"^(?:\d{1,3}\.){3}\d{1,3}$"),
                SensitivityLevel::Medium,
                MaskingStrategy::Hash,
            ),
            rule(
                "date_of_birth",
                "Date of birth",
                &["dob", "date_of_birth", "birth_date", "birthdate"],
                Some(r"^\d{4}-\d{2}-\d{2}"),
                SensitivityLevel::High,
                MaskingStrategy::Nullify,
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_sensitivity_ordering_and_base() {
        assert!(SensitivityLevel::Low < SensitivityLevel::Critical);
        assert_eq!(SensitivityLevel::Critical.base_confidence(), 99.0);
        assert_eq!(SensitivityLevel::Low.base_confidence(), 60.0);
        assert_eq!(SensitivityLevel::High.severity(), Severity::High);
    }

    #[test]
    fn test_yaml_definition_defaults() -> Result<()> {
        let yaml = r#"
pii_type: iban
hints: [iban]
regex: "^[A-Z]{2}\\d{2}"
sensitivity: high
requires_encryption: true
"#;
        let def: PiiRuleDefinition = serde_yaml::from_str(yaml)?;
        assert!(def.enabled);
        assert_eq!(def.label(), "iban");
        assert!(!def.protection().is_monitoring());
        def.validate()?;
        Ok(())
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let mut def = PiiRuleDefinition::builtin().remove(0);
        def.regex = Some("([".to_string());
        assert!(matches!(def.validate(), Err(DomainError::InvalidRegex { .. })));
    }

    #[test]
    fn test_builtins_are_valid_monitoring_rules() {
        let rules = PiiRuleDefinition::builtin();
        assert_eq!(rules.len(), 7);
        for rule in &rules {
            assert!(rule.validate().is_ok(), "{} should validate", rule.pii_type);
            assert!(rule.protection().is_monitoring());
        }
    }
}
