// warden/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;
use warden_core::domain::catalog::AssetType;
use warden_core::domain::issue::IssueStatus;
use warden_core::domain::quality::rule::Severity;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Data quality rules, PII detection and protection validation", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project directory (holds warden.yaml)
    #[arg(long, global = true, default_value = ".", env = "WARDEN_PROJECT_DIR")]
    pub project_dir: PathBuf,

    /// More logs (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

/// Which assets a profile or detection pass covers.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// A single asset id (ex: "main.customers")
    #[arg(long, conflicts_with_all = ["schema", "asset_type"])]
    pub asset: Option<String>,

    /// Only assets in this schema
    #[arg(long)]
    pub schema: Option<String>,

    /// Only tables or only views
    #[arg(long = "type")]
    pub asset_type: Option<AssetType>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 📊 Profiles assets: column statistics, anomalies, quality scores, rule suggestions
    Profile {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// ✅ Runs quality rules and opens/resolves issues from their results
    Scan {
        /// Only rules on this asset
        #[arg(long)]
        asset: Option<String>,

        /// Run these rules (repeatable). Default: every enabled rule
        #[arg(long = "rule")]
        rules: Vec<String>,
    },

    /// 🕵️ Classifies columns as PII and validates their protection
    Detect {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// 🎫 Lists and triages quality issues
    Issues {
        #[command(subcommand)]
        command: IssuesCommand,
    },

    /// 📜 Lists and toggles quality and PII rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
}

#[derive(Subcommand)]
pub enum IssuesCommand {
    List {
        #[arg(long)]
        status: Option<IssueStatus>,

        #[arg(long)]
        severity: Option<Severity>,

        #[arg(long)]
        asset: Option<String>,

        #[arg(long)]
        pii_only: bool,
    },

    /// Marks an open issue as seen
    Ack { id: Uuid },

    /// Resolves an issue after re-validating the data behind it
    Resolve { id: Uuid },
}

#[derive(Subcommand)]
pub enum RulesCommand {
    List,

    Enable {
        id: String,

        /// `id` is a PII type, not a quality rule id
        #[arg(long)]
        pii: bool,
    },

    Disable {
        id: String,

        #[arg(long)]
        pii: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use clap::Parser;

    #[test]
    fn test_cli_parse_defaults() -> Result<()> {
        let args = Cli::parse_from(["warden", "scan"]);
        assert_eq!(args.project_dir.to_string_lossy(), ".");
        assert_eq!(args.verbose, 0);
        match args.command {
            Commands::Scan { asset, rules } => {
                assert_eq!(asset, None);
                assert!(rules.is_empty());
                Ok(())
            }
            _ => bail!("Expected Scan command"),
        }
    }

    #[test]
    fn test_cli_parse_repeated_rules() -> Result<()> {
        let args = Cli::parse_from(["warden", "scan", "--rule", "a", "--rule", "b", "-vv"]);
        assert_eq!(args.verbose, 2);
        match args.command {
            Commands::Scan { rules, .. } => {
                assert_eq!(rules, vec!["a".to_string(), "b".to_string()]);
                Ok(())
            }
            _ => bail!("Expected Scan command"),
        }
    }

    #[test]
    fn test_cli_parse_profile_filters() -> Result<()> {
        let args = Cli::parse_from(["warden", "profile", "--schema", "main", "--type", "view"]);
        match args.command {
            Commands::Profile { target } => {
                assert_eq!(target.schema.as_deref(), Some("main"));
                assert_eq!(target.asset_type, Some(AssetType::View));
                Ok(())
            }
            _ => bail!("Expected Profile command"),
        }
    }

    #[test]
    fn test_cli_parse_issue_filters() -> Result<()> {
        let args = Cli::parse_from([
            "warden",
            "issues",
            "list",
            "--status",
            "open",
            "--severity",
            "high",
            "--pii-only",
        ]);
        match args.command {
            Commands::Issues {
                command:
                    IssuesCommand::List {
                        status,
                        severity,
                        pii_only,
                        ..
                    },
            } => {
                assert_eq!(status, Some(IssueStatus::Open));
                assert_eq!(severity, Some(Severity::High));
                assert!(pii_only);
                Ok(())
            }
            _ => bail!("Expected Issues List command"),
        }
    }

    #[test]
    fn test_cli_rejects_bad_issue_id() {
        assert!(Cli::try_parse_from(["warden", "issues", "ack", "not-a-uuid"]).is_err());
    }

    #[test]
    fn test_cli_asset_conflicts_with_schema() {
        let args = ["warden", "detect", "--asset", "main.t", "--schema", "main"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
