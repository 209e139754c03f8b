//! Single rule runs: resolution, execution, event relay and recording.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dataspy_connector::{
    EventLevel, EventSink, ExecuteOptions, ExecutionResult, LogEvent, QueryExecutor,
};
use dataspy_core::{OverlapPolicy, Rule, Server};
use dataspy_storage::{ExecutionRecord, HistoryStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::RunError;

/// Outcome counts of [`Scheduler::execute_all_rules`](super::Scheduler::execute_all_rules).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunTally {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Everything a run needs, cheap to clone into spawned tasks.
#[derive(Clone)]
pub(crate) struct Runner {
    pub(crate) rules: Arc<[Rule]>,
    pub(crate) servers: Arc<[Server]>,
    pub(crate) store: Arc<HistoryStore>,
    pub(crate) executor: QueryExecutor,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) overlap: OverlapPolicy,
    pub(crate) query_timeout: Option<Duration>,
    pub(crate) in_flight: Arc<Mutex<HashSet<String>>>,
    pub(crate) shutdown: CancellationToken,
}

impl Runner {
    pub(crate) fn find_rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub(crate) fn find_server(&self, db_type: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.server_type == db_type)
    }

    /// Run `name` once and write exactly one execution record.
    pub(crate) async fn run(&self, name: &str) -> Result<ExecutionResult, RunError> {
        let start = Utc::now();

        let Some(rule) = self.find_rule(name) else {
            let err = RunError::RuleNotFound(name.to_string());
            self.emit(
                LogEvent::new(EventLevel::Error, "Rule not found")
                    .with_field("rule", name)
                    .with_error(&err),
            );
            let record = ExecutionRecord::failure(name, "", start, Utc::now(), err.to_string());
            self.record(&record).await;
            return Err(err);
        };

        let Some(server) = self.find_server(&rule.db_type) else {
            let err = RunError::ServerNotFound {
                rule: rule.name.clone(),
                db_type: rule.db_type.clone(),
            };
            self.emit(
                LogEvent::new(EventLevel::Error, "Server not found")
                    .with_field("rule", rule.name.as_str())
                    .with_field("db_type", rule.db_type.as_str())
                    .with_error(&err),
            );
            let record =
                ExecutionRecord::failure(&rule.name, "", start, Utc::now(), err.to_string())
                    .with_description(&rule.description);
            self.record(&record).await;
            return Err(err);
        };

        let options = ExecuteOptions {
            timeout: rule.timeout(self.query_timeout),
            cancel: self.shutdown.child_token(),
        };

        match self.executor.execute(server, rule, &options).await {
            Ok(result) => {
                self.relay(&result.events);
                let record = ExecutionRecord::success(
                    &rule.name,
                    &server.name,
                    start,
                    Utc::now(),
                    &result.results,
                    result.row_count,
                )
                .with_description(&rule.description);
                self.record(&record).await;
                info!(
                    rule = %rule.name,
                    server = %server.name,
                    rows = result.row_count,
                    "rule executed"
                );
                Ok(result)
            }
            Err(failure) => {
                self.relay(&failure.events);
                let record = ExecutionRecord::failure(
                    &rule.name,
                    &server.name,
                    start,
                    Utc::now(),
                    failure.to_string(),
                )
                .with_description(&rule.description);
                self.record(&record).await;
                warn!(
                    rule = %rule.name,
                    server = %server.name,
                    kind = %failure.kind(),
                    error = %failure,
                    "rule execution failed"
                );
                Err(RunError::Execution(failure))
            }
        }
    }

    /// Scheduled firing. Under [`OverlapPolicy::Skip`] a firing for a rule
    /// that is still running is dropped and `None` is returned.
    pub(crate) async fn run_scheduled(
        &self,
        name: &str,
    ) -> Option<Result<ExecutionResult, RunError>> {
        let _guard = match self.overlap {
            OverlapPolicy::Allow => None,
            OverlapPolicy::Skip => match InFlightGuard::acquire(&self.in_flight, name) {
                Some(guard) => Some(guard),
                None => {
                    warn!(rule = %name, "previous run still in flight, skipping");
                    self.emit(
                        LogEvent::new(
                            EventLevel::Warn,
                            "Skipping run: previous run still in progress",
                        )
                        .with_field("rule", name),
                    );
                    return None;
                }
            },
        };
        Some(self.run(name).await)
    }

    pub(crate) fn emit(&self, event: LogEvent) {
        self.sink.emit(&event);
    }

    fn relay(&self, events: &[LogEvent]) {
        for event in events {
            self.sink.emit(event);
        }
    }

    /// Persist a record. A failed write is reported but never changes the
    /// outcome of the run.
    async fn record(&self, record: &ExecutionRecord) {
        if let Err(e) = self.store.save_execution_record(record).await {
            error!(
                rule = %record.rule_name,
                server = %record.server_name,
                error = %e,
                "failed to save execution record"
            );
            self.emit(
                LogEvent::new(EventLevel::Warn, "Failed to save execution record")
                    .with_field("rule", record.rule_name.as_str())
                    .with_error(&e),
            );
        }
    }
}

/// Marks a rule as running until dropped.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, name: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .expect("in-flight lock poisoned")
            .insert(name.to_string());
        inserted.then(|| Self {
            set: Arc::clone(set),
            name: name.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.name);
        }
    }
}
