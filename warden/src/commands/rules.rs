// warden/src/commands/rules.rs
//
// USE CASE: Inspect and toggle rules. Disabling resolves the issues a rule raised.

use anyhow::Result;
use comfy_table::Table;

use super::{Outcome, print_json};
use crate::cli::RulesCommand;
use crate::session::Session;

pub async fn execute(session: &Session, command: RulesCommand, json: bool) -> Result<Outcome> {
    let (id, pii, enabled) = match command {
        RulesCommand::List => return list(session, json).await,
        RulesCommand::Enable { id, pii } => (id, pii, true),
        RulesCommand::Disable { id, pii } => (id, pii, false),
    };

    let transitions = if pii {
        session.service.set_pii_rule_enabled(&id, enabled).await?
    } else {
        session.service.set_quality_rule_enabled(&id, enabled).await?
    };

    if json {
        print_json(&transitions)?;
        return Ok(Outcome::Clean);
    }
    println!("📜 Rule '{}' {}", id, if enabled { "enabled" } else { "disabled" });
    for t in transitions.iter().filter(|t| t.kind.writes()) {
        let key = t.key.as_ref().map(|k| k.to_string()).unwrap_or_default();
        println!("   🎫 {} {}", t.kind, key);
    }
    Ok(Outcome::Clean)
}

async fn list(session: &Session, json: bool) -> Result<Outcome> {
    let quality = session.service.quality_rules().await?;
    let pii = session.service.pii_rules().await?;

    if json {
        print_json(&serde_json::json!({ "quality_rules": quality, "pii_rules": pii }))?;
        return Ok(Outcome::Clean);
    }

    let mut table = Table::new();
    table.set_header(vec!["Rule", "Kind", "Asset", "Column", "Dimension", "Severity", "Enabled"]);
    for rule in &quality {
        table.add_row(vec![
            rule.id.clone(),
            rule.kind().to_string(),
            rule.asset_id.clone(),
            rule.column.clone().unwrap_or_default(),
            rule.dimension.to_string(),
            rule.severity.to_string(),
            rule.enabled.to_string(),
        ]);
    }
    println!("{table}");

    let mut table = Table::new();
    table.set_header(vec!["PII type", "Sensitivity", "Hints", "Regex", "Mode", "Enabled"]);
    for rule in &pii {
        let mode = match (rule.requires_encryption, rule.requires_masking) {
            (false, false) => "monitoring",
            (true, false) => "encrypt",
            (false, true) => "mask",
            (true, true) => "encrypt+mask",
        };
        table.add_row(vec![
            rule.pii_type.clone(),
            rule.sensitivity.to_string(),
            rule.hints.join(", "),
            if rule.regex.is_some() { "yes" } else { "no" }.to_string(),
            mode.to_string(),
            rule.enabled.to_string(),
        ]);
    }
    println!("{table}");
    Ok(Outcome::Clean)
}
