// warden/src/main.rs

mod cli;
mod commands;
mod logging;
mod session;

use clap::Parser;
use tracing::debug;

use cli::{Cli, Commands};
use commands::Outcome;
use session::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let session = Session::open(&cli.project_dir).await?;
    debug!(project = %session.config.name, "Project loaded");

    let json = cli.json;
    let outcome = match cli.command {
        Commands::Profile { target } => commands::profile::execute(&session, &target, json).await,
        Commands::Scan { asset, rules } => {
            commands::scan::execute(&session, asset, rules, json).await
        }
        Commands::Detect { target } => commands::detect::execute(&session, &target, json).await,
        Commands::Issues { command } => commands::issues::execute(&session, command, json).await,
        Commands::Rules { command } => commands::rules::execute(&session, command, json).await,
    };

    // State is kept even when the command failed part-way (e.g. a rejected resolve)
    session.save().await?;

    match outcome? {
        Outcome::Clean => Ok(()),
        // Exit with error code for CI/CD
        Outcome::Findings => std::process::exit(1),
    }
}
