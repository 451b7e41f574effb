// warden/src/commands/scan.rs
//
// USE CASE: Run quality rules. Failed rules open issues; passing ones clear them.

use anyhow::Result;
use comfy_table::Table;
use warden_core::application::Target;
use warden_core::domain::quality::result::ResultStatus;

use super::{Outcome, format_metric, print_json};
use crate::session::Session;

pub async fn execute(
    session: &Session,
    asset: Option<String>,
    rules: Vec<String>,
    json: bool,
) -> Result<Outcome> {
    let target = asset.map(Target::Asset);
    let rule_ids = if rules.is_empty() { None } else { Some(rules.as_slice()) };
    let report = session.service.scan(target.as_ref(), rule_ids).await?;

    let outcome = if report.aggregate.failed > 0 {
        Outcome::Findings
    } else {
        Outcome::Clean
    };

    if json {
        print_json(&report)?;
        return Ok(outcome);
    }

    let mut table = Table::new();
    table.set_header(vec!["Rule", "Asset", "Status", "Observed", "ms", "Message"]);
    for result in &report.results {
        let status = match result.status {
            ResultStatus::Passed => "✅ passed".to_string(),
            ResultStatus::Failed => "❌ failed".to_string(),
            other => other.to_string(),
        };
        table.add_row(vec![
            result.rule_id.clone(),
            result.asset_id.clone(),
            status,
            format_metric(result.observed()),
            result.execution_time_ms.to_string(),
            result.message.clone().unwrap_or_default(),
        ]);
    }
    println!("{table}");

    let a = &report.aggregate;
    println!(
        "\n📊 {} executed: {} passed, {} failed, {} error, {} timeout, {} skipped ({} ms)",
        a.executed, a.passed, a.failed, a.error, a.timeout, a.skipped, a.duration_ms
    );
    Ok(outcome)
}
