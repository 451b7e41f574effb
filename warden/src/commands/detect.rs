// warden/src/commands/detect.rs
//
// USE CASE: Classify columns, validate protection, keep PII issues in step with the data.

use anyhow::Result;
use comfy_table::Table;
use warden_core::application::DetectionOutcome;

use super::{Outcome, print_json, target};
use crate::cli::TargetArgs;
use crate::session::Session;

pub async fn execute(session: &Session, args: &TargetArgs, json: bool) -> Result<Outcome> {
    let report = session
        .service
        .detect_pii(&target(args, &session.config.source_id))
        .await?;

    let outcome = if report
        .detections()
        .any(|c| c.outcome == DetectionOutcome::Unprotected)
    {
        Outcome::Findings
    } else {
        Outcome::Clean
    };

    if json {
        print_json(&report)?;
        return Ok(outcome);
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Column",
        "PII type",
        "Confidence",
        "Match rate",
        "Protection",
        "Reason",
    ]);
    for detection in report.detections() {
        let c = &detection.classification;
        table.add_row(vec![
            format!("{}.{}", detection.asset_id, c.column),
            c.pii_type.clone().unwrap_or_default(),
            format!("{:.1}", c.confidence),
            c.match_rate
                .map(|r| format!("{:.0}%", r * 100.0))
                .unwrap_or_else(|| "-".to_string()),
            detection.outcome.as_str().to_string(),
            detection
                .verdict
                .as_ref()
                .map(|v| v.reason.clone())
                .unwrap_or_else(|| c.reason.clone()),
        ]);
    }
    println!("{table}");

    for t in &report.transitions {
        let key = t.key.as_ref().map(|k| k.to_string()).unwrap_or_default();
        println!("   🎫 {} {} ({} -> {})", t.kind, key, t.from, t.to);
    }
    for skipped in &report.assets_skipped {
        eprintln!("   ⏭️  {} skipped: {}", skipped.asset_id, skipped.reason);
    }
    println!(
        "\n🕵️  {} column(s) in {} asset(s), {} PII ({} ms)",
        report.columns_scanned,
        report.assets_scanned,
        report.detections().count(),
        report.duration_ms
    );
    Ok(outcome)
}
