// warden/src/commands/issues.rs
//
// USE CASE: Issue triage. Listing filters; ack and resolve go through the lifecycle manager.

use anyhow::Result;
use comfy_table::Table;
use uuid::Uuid;
use warden_core::application::Transition;
use warden_core::domain::issue::IssueFilter;

use super::{Outcome, print_json};
use crate::cli::IssuesCommand;
use crate::session::Session;

pub async fn execute(session: &Session, command: IssuesCommand, json: bool) -> Result<Outcome> {
    match command {
        IssuesCommand::List {
            status,
            severity,
            asset,
            pii_only,
        } => {
            let filter = IssueFilter {
                asset_id: asset,
                severity,
                status,
                dimension: None,
                pii_only,
            };
            list(session, &filter, json).await
        }
        IssuesCommand::Ack { id } => {
            let transition = session.service.acknowledge_issue(id).await?;
            report(id, &transition, json)
        }
        IssuesCommand::Resolve { id } => {
            // A rejected resolve comes back as an error after the rejection note is stored
            let transition = session.service.resolve_issue(id).await?;
            report(id, &transition, json)
        }
    }
}

async fn list(session: &Session, filter: &IssueFilter, json: bool) -> Result<Outcome> {
    let issues = session.service.query_issues(filter).await?;
    if json {
        print_json(&issues)?;
        return Ok(Outcome::Clean);
    }

    let mut table = Table::new();
    table.set_header(vec![
        "ID", "Severity", "Status", "Asset", "Column", "Origin", "Seen", "Title",
    ]);
    for issue in &issues {
        table.add_row(vec![
            issue.id.to_string(),
            issue.severity.to_string(),
            issue.status.to_string(),
            issue.asset_id.clone(),
            issue.column.clone().unwrap_or_default(),
            issue.origin.to_string(),
            issue.occurrences.to_string(),
            issue.title.clone(),
        ]);
    }
    println!("{table}");
    println!("\n🎫 {} issue(s)", issues.len());
    Ok(Outcome::Clean)
}

fn report(id: Uuid, transition: &Transition, json: bool) -> Result<Outcome> {
    if json {
        print_json(transition)?;
    } else {
        println!(
            "🎫 Issue {}: {} ({} -> {})",
            id, transition.kind, transition.from, transition.to
        );
        if !transition.note.is_empty() {
            println!("   {}", transition.note);
        }
    }
    Ok(Outcome::Clean)
}
