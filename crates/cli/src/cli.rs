use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

/// Scheduled SQL rule monitor.
///
/// Runs operator-defined SQL rules against configured database servers,
/// on demand or on cron schedules, and keeps a durable history of every run.
#[derive(Parser, Debug)]
#[command(name = "dataspy", version, about = "Scheduled SQL rule monitor")]
pub struct CliArgs {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "DATASPY_CONFIG", default_value = "dataspy.toml")]
    pub config: PathBuf,

    /// History database path (overrides `storage.path` from the config)
    #[arg(long, global = true, env = "DATASPY_DB")]
    pub db_path: Option<PathBuf>,

    /// `.env` file to load (default: ./.env when present)
    #[arg(long, global = true)]
    pub env: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one rule, or every rule, once
    Run(RunArgs),
    /// Run the scheduler until SIGINT/SIGTERM
    Daemon,
    /// Show recorded executions
    History(HistoryArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["rule", "all"])))]
pub struct RunArgs {
    /// Name of the rule to run
    #[arg(long)]
    pub rule: Option<String>,

    /// Run every configured rule
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Only show runs of this rule (all of them unless --limit is given)
    #[arg(long)]
    pub rule: Option<String>,

    /// Maximum number of records to show [default: 20 without --rule]
    #[arg(long)]
    pub limit: Option<usize>,
}
