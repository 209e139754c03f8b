//! [`Scheduler`] owns the loaded configuration and the cron timers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dataspy_connector::{EventLevel, EventSink, ExecutionResult, LogEvent, QueryExecutor};
use dataspy_core::{Config, OverlapPolicy, Schedule};
use dataspy_storage::HistoryStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::error::{RunError, SchedulerError};

use super::cron::parse_cron;
use super::runner::{RunTally, Runner};

/// Runs rules on demand and on their cron schedules.
///
/// Rules, servers and schedules are fixed at construction. [`start`](Self::start)
/// registers one timer per schedule; calling it again registers another full,
/// independent set. [`shutdown`](Self::shutdown) stops every timer and cancels
/// in-flight queries.
pub struct Scheduler {
    runner: Runner,
    schedules: Arc<[Schedule]>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    /// Spawned scheduled runs.
    runs: TaskTracker,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        store: Arc<HistoryStore>,
        executor: QueryExecutor,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            runner: Runner {
                rules: config.rules.clone().into(),
                servers: config.servers.clone().into(),
                store,
                executor,
                sink,
                overlap: config.execution.overlap,
                query_timeout: config.execution.query_timeout(),
                in_flight: Arc::new(Mutex::new(HashSet::new())),
                shutdown: CancellationToken::new(),
            },
            schedules: config.schedules.clone().into(),
            timers: Mutex::new(Vec::new()),
            runs: TaskTracker::new(),
        }
    }

    /// Override the overlap policy taken from the config.
    pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.runner.overlap = overlap;
        self
    }

    /// Override the default query deadline taken from the config.
    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.runner.query_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.runner.store
    }

    /// Register a timer for every schedule.
    ///
    /// All cron expressions are parsed first; if any is invalid nothing is
    /// registered. Returns the number of timers added by this call.
    pub fn start(&self) -> Result<usize, SchedulerError> {
        let mut parsed = Vec::with_capacity(self.schedules.len());
        for schedule in self.schedules.iter() {
            let cron = parse_cron(&schedule.cron).map_err(|source| SchedulerError::InvalidCron {
                rule: schedule.rule.clone(),
                cron: schedule.cron.clone(),
                source,
            })?;
            parsed.push((schedule, cron));
        }

        for (schedule, _) in &parsed {
            self.check_schedule(schedule);
        }

        let mut timers = self.timers.lock().expect("timer list lock poisoned");
        for (schedule, cron) in parsed {
            info!(
                rule = %schedule.rule,
                server = %schedule.server,
                cron = %schedule.cron,
                "adding task"
            );
            if let Some(next) = cron.upcoming(Utc).next() {
                debug!(rule = %schedule.rule, next = %next, "next run");
            }
            let handle = tokio::spawn(run_timer(
                self.runner.clone(),
                self.runs.clone(),
                schedule.rule.clone(),
                cron,
            ));
            timers.push(handle);
        }

        info!(timers = timers.len(), "scheduler started");
        Ok(self.schedules.len())
    }

    /// Number of registered timers.
    pub fn timer_count(&self) -> usize {
        self.timers.lock().expect("timer list lock poisoned").len()
    }

    /// Run the rule named `name` once. Exactly one execution record is
    /// written, whatever the outcome.
    pub async fn execute_rule_by_name(&self, name: &str) -> Result<ExecutionResult, RunError> {
        self.runner.run(name).await
    }

    /// Run `name` the way a timer firing does: subject to the overlap policy.
    /// Returns `None` when the firing was skipped.
    pub async fn run_scheduled(&self, name: &str) -> Option<Result<ExecutionResult, RunError>> {
        self.runner.run_scheduled(name).await
    }

    /// Run every rule once, in order. One failure never stops the rest.
    pub async fn execute_all_rules(&self) -> RunTally {
        let mut tally = RunTally::default();
        for rule in self.runner.rules.iter() {
            match self.runner.run(&rule.name).await {
                Ok(_) => tally.succeeded += 1,
                Err(_) => tally.failed += 1,
            }
        }
        info!(
            succeeded = tally.succeeded,
            failed = tally.failed,
            "all rules executed"
        );
        tally
    }

    /// Stop all timers, cancel in-flight queries and wait for scheduled runs
    /// to record their outcome.
    pub async fn shutdown(&self) {
        info!("scheduler shutdown requested");
        self.runner.shutdown.cancel();

        let timers = std::mem::take(&mut *self.timers.lock().expect("timer list lock poisoned"));
        for timer in timers {
            let _ = timer.await;
        }

        self.runs.close();
        self.runs.wait().await;
        info!("scheduler stopped");
    }

    /// Warn about schedules whose informational `server` disagrees with the
    /// server that type-based resolution will actually pick.
    fn check_schedule(&self, schedule: &Schedule) {
        let Some(rule) = self.runner.find_rule(&schedule.rule) else {
            self.runner.emit(
                LogEvent::new(EventLevel::Warn, "Schedule references an unknown rule")
                    .with_field("rule", schedule.rule.as_str()),
            );
            return;
        };
        if schedule.server.is_empty() {
            return;
        }

        match self.runner.servers.iter().find(|s| s.name == schedule.server) {
            None => self.runner.emit(
                LogEvent::new(EventLevel::Warn, "Schedule references an unknown server")
                    .with_field("rule", rule.name.as_str())
                    .with_field("server", schedule.server.as_str()),
            ),
            Some(server) if server.server_type != rule.db_type => self.runner.emit(
                LogEvent::new(
                    EventLevel::Warn,
                    "Schedule server type differs from rule db_type; resolving by db_type",
                )
                .with_field("rule", rule.name.as_str())
                .with_field("server", schedule.server.as_str())
                .with_field("server_type", server.server_type.as_str())
                .with_field("db_type", rule.db_type.as_str()),
            ),
            Some(_) => {}
        }
    }
}

/// Sleep until each upcoming tick, then spawn the run. Exits on shutdown or
/// when the schedule has no further ticks.
async fn run_timer(runner: Runner, runs: TaskTracker, rule: String, cron: ::cron::Schedule) {
    loop {
        let Some(next) = cron.upcoming(Utc).next() else {
            debug!(rule = %rule, "schedule has no further ticks");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = runner.shutdown.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        info!(rule = %rule, at = %Utc::now().to_rfc3339(), "triggering scheduled task");
        let runner = runner.clone();
        let rule = rule.clone();
        runs.spawn(async move {
            let _ = runner.run_scheduled(&rule).await;
        });
    }
}
