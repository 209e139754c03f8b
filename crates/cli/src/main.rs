mod cli;
mod commands;
mod console;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use dataspy_core::{load_dotenv, Config};
use tracing::debug;

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    if let Some(path) = load_dotenv(args.env.as_deref()).context("failed to load .env")? {
        debug!(path = %path.display(), "environment loaded");
    }

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    if let Some(db_path) = args.db_path {
        config.storage.path = db_path;
    }

    match args.command {
        Command::Run(run) => commands::run(&config, run).await,
        Command::Daemon => commands::daemon(&config).await,
        Command::History(history) => commands::history(&config, history).await,
    }
}
