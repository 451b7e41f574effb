// warden/src/commands/profile.rs
//
// USE CASE: Profile assets and suggest rules from what the data looks like.

use anyhow::Result;
use comfy_table::Table;

use super::{Outcome, print_json, target};
use crate::cli::TargetArgs;
use crate::session::Session;

pub async fn execute(session: &Session, args: &TargetArgs, json: bool) -> Result<Outcome> {
    let summary = session
        .service
        .profile(&target(args, &session.config.source_id))
        .await?;

    if json {
        print_json(&summary)?;
        return Ok(Outcome::Clean);
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Asset",
        "Rows",
        "Overall",
        "Completeness",
        "Uniqueness",
        "Validity",
        "Consistency",
        "Anomalies",
    ]);
    for profile in &summary.profiles {
        let s = &profile.scores;
        table.add_row(vec![
            profile.asset_id.clone(),
            profile.row_count.to_string(),
            format!("{:.1}", s.overall),
            format!("{:.1}", s.completeness),
            format!("{:.1}", s.uniqueness),
            format!("{:.1}", s.validity),
            format!("{:.1}", s.consistency),
            profile.anomalies.len().to_string(),
        ]);
    }
    println!("{table}");

    for profile in &summary.profiles {
        for anomaly in &profile.anomalies {
            println!("   ⚠️  {}.{}: {}", profile.asset_id, anomaly.column, anomaly.detail);
        }
    }

    if !summary.suggestions.is_empty() {
        println!("\n💡 Suggested rules:");
        for suggestion in &summary.suggestions {
            println!(
                "   {} on {}.{}: {} ({})",
                suggestion.dimension,
                suggestion.asset_id,
                suggestion.column,
                suggestion.expression,
                suggestion.reason
            );
        }
    }

    for skipped in &summary.assets_skipped {
        eprintln!("   ⏭️  {} skipped: {}", skipped.asset_id, skipped.reason);
    }
    println!(
        "\n✨ Profiled {} asset(s) in {} ms",
        summary.assets_profiled, summary.duration_ms
    );
    Ok(Outcome::Clean)
}
