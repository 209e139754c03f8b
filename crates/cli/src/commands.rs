//! Subcommand implementations.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use dataspy_connector::QueryExecutor;
use dataspy_core::Config;
use dataspy_rules::Scheduler;
use dataspy_storage::HistoryStore;
use tracing::info;

use crate::cli::{HistoryArgs, RunArgs};
use crate::console::{self, ConsoleSink};

const DEFAULT_HISTORY_LIMIT: usize = 20;

async fn open_store(config: &Config) -> Result<Arc<HistoryStore>> {
    let store = HistoryStore::open(&config.storage.path, config.storage.lock_timeout())
        .await
        .with_context(|| {
            format!(
                "failed to open history store {}",
                config.storage.path.display()
            )
        })?;
    Ok(Arc::new(store))
}

fn build_scheduler(config: &Config, store: Arc<HistoryStore>) -> Scheduler {
    Scheduler::new(
        config,
        store,
        QueryExecutor::with_default_backends(),
        Arc::new(ConsoleSink::new()),
    )
}

/// `dataspy run`: one rule (non-zero exit on failure) or all rules (tally).
pub async fn run(config: &Config, args: RunArgs) -> Result<ExitCode> {
    let store = open_store(config).await?;
    let scheduler = build_scheduler(config, Arc::clone(&store));

    let code = match args.rule {
        Some(name) if !args.all => match scheduler.execute_rule_by_name(&name).await {
            Ok(result) => {
                console::print_result(&name, &result)?;
                ExitCode::SUCCESS
            }
            Err(e) => {
                console::print_error(&format!("error executing rule {name}: {e}"))?;
                ExitCode::FAILURE
            }
        },
        _ => {
            let tally = scheduler.execute_all_rules().await;
            console::print_tally(&tally)?;
            ExitCode::SUCCESS
        }
    };

    store.close().await;
    Ok(code)
}

/// `dataspy daemon`: start every schedule and block until SIGINT/SIGTERM.
pub async fn daemon(config: &Config) -> Result<ExitCode> {
    config.log_summary();
    let store = open_store(config).await?;
    let scheduler = build_scheduler(config, Arc::clone(&store));

    let timers = scheduler.start().context("failed to start scheduler")?;
    info!(timers, "daemon running, press Ctrl+C to stop");

    shutdown_signal()
        .await
        .context("failed to listen for shutdown signals")?;
    info!("shutdown signal received");

    scheduler.shutdown().await;
    store.close().await;
    Ok(ExitCode::SUCCESS)
}

/// `dataspy history`: latest records, or every record of one rule.
pub async fn history(config: &Config, args: HistoryArgs) -> Result<ExitCode> {
    let store = open_store(config).await?;

    let records = match &args.rule {
        Some(rule) => {
            let mut records = store
                .get_executions_by_rule(rule)
                .await
                .with_context(|| format!("failed to read history for rule {rule}"))?;
            if let Some(limit) = args.limit {
                let skip = records.len().saturating_sub(limit);
                records.drain(..skip);
            }
            records
        }
        None => store
            .get_latest_executions(args.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
            .await
            .context("failed to read history")?,
    };

    console::print_records(&records)?;
    store.close().await;
    Ok(ExitCode::SUCCESS)
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res,
            _ = sigterm.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
