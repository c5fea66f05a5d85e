pub mod aggregate;
pub mod config;
pub mod fetcher;
pub mod github;
pub mod merge;
pub mod metrics;
pub mod output;
pub mod types;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Daily issue trends for a GitHub repository.
#[derive(Debug, Parser)]
#[command(name = "issueflow", version, about)]
pub struct Cli {
    /// Dotenv file with GH_ISSUES_* / GH_MERGE_* settings (defaults to ./.env when present)
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download all issues and write the daily created/closed/open CSV
    Issues,
    /// Join an external date-keyed CSV with a previously written issues CSV
    Merge,
}

/// Loads configuration for the chosen command and runs it.
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    config::load_env_file(cli.env_file.as_deref())?;

    match cli.command {
        Command::Issues => {
            let config = config::IssuesConfig::from_env()?;
            fetcher::run_issues(&config)?;
        }
        Command::Merge => {
            let config = config::MergeConfig::from_env()?;
            fetcher::run_merge(&config)?;
        }
    }
    Ok(())
}
