// warden-core/src/domain/governance/remediation.rs

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use crate::domain::catalog::{ColumnRef, quote_ident};
use crate::domain::governance::pii::PiiRuleDefinition;

/// Scalar function the operator's warehouse exposes for column encryption.
pub const ENCRYPT_FUNCTION: &str = "encrypt";

pub const ENCRYPT_TEMPLATE: &str =
    "UPDATE {{ table }} SET {{ column }} = {{ encrypt_fn }}({{ column }}) WHERE {{ column }} IS NOT NULL;";

pub const MASK_VIEW_TEMPLATE: &str = "CREATE OR REPLACE VIEW {{ view }} AS SELECT * EXCLUDE ({{ column }}), {{ mask_expr }} AS {{ column }} FROM {{ table }};";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    Encrypt,
    MaskView,
}

impl RemediationAction {
    pub fn template(&self) -> &'static str {
        match self {
            Self::Encrypt => ENCRYPT_TEMPLATE,
            Self::MaskView => MASK_VIEW_TEMPLATE,
        }
    }
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encrypt => write!(f, "encrypt"),
            Self::MaskView => write!(f, "mask_view"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationStep {
    pub action: RemediationAction,
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Remediation {
    pub steps: Vec<RemediationStep>,
}

/// Steps a rule's flags call for: encrypt first, then mask. Empty in monitoring mode.
pub fn planned_actions(rule: &PiiRuleDefinition) -> Vec<RemediationAction> {
    let mut actions = Vec::with_capacity(2);
    if rule.requires_encryption {
        actions.push(RemediationAction::Encrypt);
    }
    if rule.requires_masking {
        actions.push(RemediationAction::MaskView);
    }
    actions
}

/// Variables the remediation templates can reference.
pub fn template_context(column: &ColumnRef, rule: &PiiRuleDefinition) -> serde_json::Value {
    let quoted = column.column_sql();
    json!({
        "table": column.table_sql(),
        "column": quoted,
        "view": format!(
            "{}.{}",
            quote_ident(&column.schema),
            quote_ident(&format!("{}_masked", column.table))
        ),
        "encrypt_fn": ENCRYPT_FUNCTION,
        "mask_expr": rule.masking_strategy.sql_expression(&quoted),
        "pii_type": rule.pii_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{Asset, AssetType};

    fn rule(encrypt: bool, mask: bool) -> PiiRuleDefinition {
        let mut rule = PiiRuleDefinition::builtin().remove(1);
        rule.requires_encryption = encrypt;
        rule.requires_masking = mask;
        rule
    }

    #[test]
    fn test_planned_actions_follow_flags() {
        assert_eq!(
            planned_actions(&rule(true, true)),
            vec![RemediationAction::Encrypt, RemediationAction::MaskView]
        );
        assert_eq!(planned_actions(&rule(false, true)), vec![RemediationAction::MaskView]);
        assert!(planned_actions(&rule(false, false)).is_empty());
    }

    #[test]
    fn test_context_quotes_identifiers() {
        let column = Asset::new("warehouse", "main", "customers", AssetType::Table).column("ssn");
        let ctx = template_context(&column, &rule(true, true));
        assert_eq!(ctx["table"], "\"main\".\"customers\"");
        assert_eq!(ctx["view"], "\"main\".\"customers_masked\"");
        assert_eq!(ctx["column"], "\"ssn\"");
    }
}
