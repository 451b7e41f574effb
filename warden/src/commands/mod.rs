// warden/src/commands/mod.rs

pub mod detect;
pub mod issues;
pub mod profile;
pub mod rules;
pub mod scan;

use anyhow::Result;
use serde::Serialize;
use warden_core::application::Target;
use warden_core::domain::catalog::AssetFilter;

use crate::cli::TargetArgs;

/// Whether a command found something CI should fail on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Clean,
    Findings,
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn target(args: &TargetArgs, source_id: &str) -> Target {
    match &args.asset {
        Some(asset) => Target::Asset(asset.clone()),
        None => Target::Source {
            source_id: source_id.to_string(),
            filter: AssetFilter {
                schema: args.schema.clone(),
                asset_type: args.asset_type,
            },
        },
    }
}

fn format_metric(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(v) => format!("{:.4}", v),
        None => "-".to_string(),
    }
}
