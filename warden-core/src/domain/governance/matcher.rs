// warden-core/src/domain/governance/matcher.rs

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::governance::pii::{PiiRuleDefinition, SensitivityLevel};
use crate::domain::governance::tokens::{NameHint, tokenize};
use crate::domain::project::PolicyConfig;

/// Below this match rate, data evidence argues against the name hint.
const LOW_MATCH_RATE: f64 = 0.3;
const LOW_RATE_CAP: f64 = 50.0;

/// A PII rule ready for the hot path: hints parsed and regex compiled once.
#[derive(Debug, Clone)]
pub struct CompiledPiiRule {
    pub definition: PiiRuleDefinition,
    hints: Vec<NameHint>,
    regex: Option<Regex>,
}

impl CompiledPiiRule {
    pub fn compile(definition: PiiRuleDefinition) -> Result<Self, regex::Error> {
        let regex = definition.regex.as_deref().map(Regex::new).transpose()?;
        let hints = definition
            .hints
            .iter()
            .filter_map(|h| NameHint::parse(h))
            .collect();
        Ok(Self {
            definition,
            hints,
            regex,
        })
    }

    pub fn pii_type(&self) -> &str {
        &self.definition.pii_type
    }

    pub fn has_regex(&self) -> bool {
        self.regex.is_some()
    }

    pub fn matches_name(&self, column_tokens: &[String]) -> bool {
        self.hints.iter().any(|h| h.matches(column_tokens))
    }

    /// `None` without a regex or without usable samples. Empty values do not count.
    pub fn match_rate(&self, samples: &[String]) -> Option<f64> {
        let regex = self.regex.as_ref()?;
        let values: Vec<&str> = samples
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if values.is_empty() {
            return None;
        }
        let matched = values.iter().filter(|v| regex.is_match(v)).count();
        Some(matched as f64 / values.len() as f64)
    }
}

/// Enabled rules in priority order: sensitivity descending, then pii_type ascending.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledPiiRule>,
}

impl RuleSet {
    pub fn compile(definitions: Vec<PiiRuleDefinition>) -> Self {
        let mut rules: Vec<CompiledPiiRule> = definitions
            .into_iter()
            .filter(|d| d.enabled)
            .filter_map(|d| {
                let pii_type = d.pii_type.clone();
                match CompiledPiiRule::compile(d) {
                    Ok(rule) => Some(rule),
                    Err(e) => {
                        warn!(
                            pii_type = %pii_type,
                            error = %e,
                            "Skipping PII rule with invalid regex"
                        );
                        None
                    }
                }
            })
            .collect();

        rules.sort_by(|a, b| {
            b.definition
                .sensitivity
                .cmp(&a.definition.sensitivity)
                .then_with(|| a.pii_type().cmp(b.pii_type()))
        });
        Self { rules }
    }

    pub fn rules(&self) -> &[CompiledPiiRule] {
        &self.rules
    }

    pub fn get(&self, pii_type: &str) -> Option<&CompiledPiiRule> {
        self.rules.iter().find(|r| r.pii_type() == pii_type)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules whose hints match the column name, in priority order.
    pub fn candidates(&self, column_name: &str) -> Vec<&CompiledPiiRule> {
        let tokens = tokenize(column_name);
        self.rules.iter().filter(|r| r.matches_name(&tokens)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatcherConfig {
    pub min_confidence: f64,
    pub boost_k: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_confidence: 70.0,
            boost_k: 10.0,
        }
    }
}

impl From<&PolicyConfig> for MatcherConfig {
    fn from(policy: &PolicyConfig) -> Self {
        Self {
            min_confidence: policy.min_confidence,
            boost_k: policy.boost_k,
        }
    }
}

/// Name-hint confidence adjusted by data evidence. Monotonic in `match_rate`, bounded to 0..=100.
pub fn confidence(sensitivity: SensitivityLevel, match_rate: Option<f64>, boost_k: f64) -> f64 {
    let base = sensitivity.base_confidence();
    match match_rate {
        None => base,
        Some(rate) => {
            let rate = rate.clamp(0.0, 1.0);
            if rate >= LOW_MATCH_RATE {
                (base + boost_k * (rate - LOW_MATCH_RATE) / (1.0 - LOW_MATCH_RATE)).min(100.0)
            } else {
                (base * rate / LOW_MATCH_RATE).min(LOW_RATE_CAP)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub column: String,
    pub pii_type: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub match_rate: Option<f64>,
    pub reason: String,
}

impl Classification {
    pub fn is_pii(&self) -> bool {
        self.pii_type.is_some()
    }
}

/// First rule in priority order whose confidence clears the cut-off wins.
pub fn classify(
    rules: &RuleSet,
    column_name: &str,
    samples: &[String],
    config: &MatcherConfig,
) -> Classification {
    let candidates = rules.candidates(column_name);
    if candidates.is_empty() {
        return Classification {
            column: column_name.to_string(),
            pii_type: None,
            confidence: 0.0,
            match_rate: None,
            reason: "no name hint matched".to_string(),
        };
    }

    let mut best_rejected: Option<(f64, String, Option<f64>)> = None;
    for rule in candidates {
        let match_rate = rule.match_rate(samples);
        let score = confidence(rule.definition.sensitivity, match_rate, config.boost_k);
        if score >= config.min_confidence {
            let reason = match match_rate {
                Some(rate) => format!(
                    "name hint for '{}' matched; {:.0}% of samples match its pattern",
                    rule.pii_type(),
                    rate * 100.0
                ),
                None => format!("name hint for '{}' matched", rule.pii_type()),
            };
            return Classification {
                column: column_name.to_string(),
                pii_type: Some(rule.pii_type().to_string()),
                confidence: score,
                match_rate,
                reason,
            };
        }
        if best_rejected.as_ref().is_none_or(|(s, _, _)| score > *s) {
            best_rejected = Some((score, rule.pii_type().to_string(), match_rate));
        }
    }

    let (score, pii_type, match_rate) = best_rejected.unwrap_or_default();
    Classification {
        column: column_name.to_string(),
        pii_type: None,
        confidence: score,
        match_rate,
        reason: format!(
            "name hint for '{}' matched but confidence {:.1} is below {:.1}",
            pii_type, score, config.min_confidence
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::governance::masking::MaskingStrategy;

    fn definition(
        pii_type: &str,
        hints: &[&str],
        regex: Option<&str>,
        level: SensitivityLevel,
    ) -> PiiRuleDefinition {
        PiiRuleDefinition {
            pii_type: pii_type.to_string(),
            display_name: String::new(),
            hints: hints.iter().map(|h| h.to_string()).collect(),
            regex: regex.map(str::to_string),
            sensitivity: level,
            requires_encryption: false,
            requires_masking: false,
            enabled: true,
            masking_strategy: MaskingStrategy::Redact,
        }
    }

    fn samples(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_confidence_formula() {
        assert_eq!(confidence(SensitivityLevel::High, None, 10.0), 90.0);
        assert!((confidence(SensitivityLevel::High, Some(1.0), 10.0) - 100.0).abs() < 1e-9);
        assert!((confidence(SensitivityLevel::High, Some(0.3), 10.0) - 90.0).abs() < 1e-9);
        assert!((confidence(SensitivityLevel::High, Some(0.15), 10.0) - 45.0).abs() < 1e-9);
        assert!(confidence(SensitivityLevel::Critical, Some(0.29), 10.0) <= 50.0);
        assert_eq!(confidence(SensitivityLevel::Low, Some(0.0), 10.0), 0.0);
    }

    #[test]
    fn test_confidence_is_monotonic() {
        let mut last = -1.0;
        for step in 0..=100 {
            let c = confidence(SensitivityLevel::Medium, Some(step as f64 / 100.0), 10.0);
            assert!(c >= last, "confidence dropped at {}", step);
            assert!((0.0..=100.0).contains(&c));
            last = c;
        }
    }

    #[test]
    fn test_email_with_nine_of_ten_valid() {
        let rules = RuleSet::compile(vec![definition(
            "email",
            &["email"],
            Some(r"^[^@\s]+@[^@\s]+\.[a-z]{2,}$"),
            SensitivityLevel::High,
        )]);
        let mut values: Vec<String> = (0..9).map(|i| format!("user{}@example.com", i)).collect();
        values.push("not-an-email".to_string());

        let c = classify(&rules, "customer_email", &values, &MatcherConfig::default());
        assert_eq!(c.pii_type.as_deref(), Some("email"));
        assert!((c.match_rate.unwrap_or_default() - 0.9).abs() < 1e-9);
        assert!(c.confidence >= 70.0);
    }

    #[test]
    fn test_low_match_rate_rejects() {
        let rules = RuleSet::compile(vec![definition(
            "ssn",
            &["ssn"],
            Some(r"^\d{3}-\d{2}-\d{4}$"),
            SensitivityLevel::Critical,
        )]);
        let c = classify(
            &rules,
            "ssn",
            &samples(&["abc", "def", "ghi", "123-45-6789"]),
            &MatcherConfig::default(),
        );
        assert!(!c.is_pii());
        assert!(c.confidence <= 50.0);
    }

    #[test]
    fn test_schema_name_is_not_pii() {
        let rules =
            RuleSet::compile(vec![definition("name", &["name"], None, SensitivityLevel::Medium)]);
        let config = MatcherConfig::default();
        assert!(!classify(&rules, "schema_name", &[], &config).is_pii());
        assert_eq!(
            classify(&rules, "first_name", &[], &config).pii_type.as_deref(),
            Some("name")
        );
    }

    #[test]
    fn test_priority_order_and_disabled_rules() {
        let mut disabled = definition("contact", &["email"], None, SensitivityLevel::Critical);
        disabled.enabled = false;
        let rules = RuleSet::compile(vec![
            definition("b_mail", &["email"], None, SensitivityLevel::High),
            definition("a_mail", &["email"], None, SensitivityLevel::High),
            definition("low_mail", &["email"], None, SensitivityLevel::Low),
            disabled,
        ]);
        assert_eq!(rules.len(), 3);
        let c = classify(&rules, "email", &[], &MatcherConfig::default());
        assert_eq!(c.pii_type.as_deref(), Some("a_mail"));
    }

    #[test]
    fn test_invalid_regex_skipped_not_fatal() {
        let rules = RuleSet::compile(vec![
            definition("broken", &["email"], Some("(["), SensitivityLevel::Critical),
            definition("email", &["email"], None, SensitivityLevel::High),
        ]);
        assert_eq!(rules.len(), 1);
        assert!(rules.get("broken").is_none());
    }

    #[test]
    fn test_empty_samples_excluded_from_rate() {
        let rule = CompiledPiiRule::compile(definition(
            "email",
            &["email"],
            Some(r"@"),
            SensitivityLevel::High,
        ))
        .unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(rule.match_rate(&samples(&["a@b.c", "", "  "])), Some(1.0));
        assert_eq!(rule.match_rate(&samples(&["", ""])), None);
    }
}
