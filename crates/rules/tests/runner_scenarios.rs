//! End-to-end runner scenarios against a scripted backend and a real
//! history store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dataspy_connector::{
    Backend, BackendError, BackendRegistry, Cell, CollectingSink, Connection, EventLevel,
    QueryExecutor,
};
use dataspy_core::{Config, ErrorKind, Rule, Server};
use dataspy_rules::{RunError, RunTally, Scheduler};
use dataspy_storage::{HistoryStore, RunStatus};
use tempfile::TempDir;

/// Returns the configured rows for every query; queries containing `FAIL`
/// are rejected by the "database".
struct ScriptedBackend {
    rows: Vec<Vec<Cell>>,
}

struct ScriptedConnection {
    rows: Vec<Vec<Cell>>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn ping(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Vec<Cell>>, BackendError> {
        if sql.contains("FAIL") {
            return Err(BackendError::Query(format!("syntax error near {sql:?}")));
        }
        Ok(self.rows.clone())
    }

    async fn close(self: Box<Self>) -> Result<(), BackendError> {
        Ok(())
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn open(&self, _conn_str: &str) -> Result<Box<dyn Connection>, BackendError> {
        Ok(Box::new(ScriptedConnection {
            rows: self.rows.clone(),
        }))
    }
}

fn rule(name: &str, db_type: &str, query: &str) -> Rule {
    Rule {
        name: name.into(),
        description: format!("{name} description"),
        db_type: db_type.into(),
        query: query.into(),
        timeout_secs: None,
    }
}

fn server(name: &str, server_type: &str, var: &str) -> Server {
    Server {
        name: name.into(),
        server_type: server_type.into(),
        conn_string_var: var.into(),
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<HistoryStore>,
    sink: Arc<CollectingSink>,
    scheduler: Scheduler,
}

async fn harness(config: Config, rows: Vec<Vec<Cell>>) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        HistoryStore::open(&dir.path().join("data/history.db"), Duration::from_millis(200))
            .await
            .unwrap(),
    );

    let mut registry = BackendRegistry::new();
    registry.register("postgres", Arc::new(ScriptedBackend { rows }));
    let executor = QueryExecutor::new(Arc::new(registry));

    let sink = Arc::new(CollectingSink::new());
    let scheduler = Scheduler::new(&config, Arc::clone(&store), executor, sink.clone());
    Harness {
        _dir: dir,
        store,
        sink,
        scheduler,
    }
}

#[tokio::test]
async fn select_one_writes_success_record() {
    std::env::set_var("DATASPY_IT_RUNNER_S1", "postgres://fake/db");
    let config = Config {
        servers: vec![server("s1", "postgres", "DATASPY_IT_RUNNER_S1")],
        rules: vec![rule("r1", "postgres", "SELECT 1")],
        ..Config::default()
    };
    let h = harness(config, vec![vec![Cell::Int(1)]]).await;

    let result = h.scheduler.execute_rule_by_name("r1").await.unwrap();
    assert_eq!(result.row_count, 1);

    let records = h.store.get_latest_executions(10).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, RunStatus::Success);
    assert_eq!(record.rule_name, "r1");
    assert_eq!(record.server_name, "s1");
    assert_eq!(record.rows_affected, 1);
    assert_eq!(record.result, "Found 1 rows:\nRow 1: 1\n");
    assert!(record.error.is_empty());
    assert_eq!(record.description, "r1 description");
    assert!(record.end_time >= record.start_time);

    // Every executor event reaches the sink, in order.
    let levels: Vec<EventLevel> = h.sink.events().iter().map(|e| e.level).collect();
    assert_eq!(
        levels,
        vec![
            EventLevel::Task,
            EventLevel::Db,
            EventLevel::Rule,
            EventLevel::Success
        ]
    );
}

#[tokio::test]
async fn missing_rule_is_not_found_and_recorded() {
    let h = harness(Config::default(), vec![]).await;

    let err = h.scheduler.execute_rule_by_name("missing").await.unwrap_err();
    assert!(matches!(err, RunError::RuleNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let records = h.store.get_latest_executions(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].rule_name, "missing");
    assert_eq!(records[0].status, RunStatus::Error);
    assert_eq!(records[0].server_name, "");
    assert_eq!(records[0].error, "rule not found: missing");
    assert!(records[0].result.is_empty());
    assert_eq!(h.sink.count(EventLevel::Error), 1);
}

#[tokio::test]
async fn missing_server_type_is_not_found_and_recorded() {
    let config = Config {
        servers: vec![server("m1", "mysql", "DATASPY_IT_RUNNER_UNUSED")],
        rules: vec![rule("r1", "postgres", "SELECT 1")],
        ..Config::default()
    };
    let h = harness(config, vec![]).await;

    let err = h.scheduler.execute_rule_by_name("r1").await.unwrap_err();
    assert!(matches!(err, RunError::ServerNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let records = h.store.get_executions_by_rule("r1").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error, "server not found for db type: postgres");
    assert_eq!(records[0].description, "r1 description");
}

#[tokio::test]
async fn unset_env_var_fails_before_connecting() {
    std::env::remove_var("DATASPY_IT_RUNNER_UNSET");
    let config = Config {
        servers: vec![server("s1", "postgres", "DATASPY_IT_RUNNER_UNSET")],
        rules: vec![rule("r1", "postgres", "SELECT 1")],
        ..Config::default()
    };
    let h = harness(config, vec![vec![Cell::Int(1)]]).await;

    let err = h.scheduler.execute_rule_by_name("r1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let records = h.store.get_latest_executions(10).await.unwrap();
    assert_eq!(records[0].status, RunStatus::Error);
    assert_eq!(records[0].rows_affected, 0);
    assert!(records[0].result.is_empty());
    assert!(records[0]
        .error
        .starts_with("failed to get connection string for server s1"));
    assert_eq!(h.sink.count(EventLevel::Db), 0);
}

#[tokio::test]
async fn first_matching_rule_and_server_win() {
    std::env::set_var("DATASPY_IT_RUNNER_FIRST", "postgres://fake/db");
    let config = Config {
        servers: vec![
            server("first-pg", "postgres", "DATASPY_IT_RUNNER_FIRST"),
            server("second-pg", "postgres", "DATASPY_IT_RUNNER_FIRST"),
        ],
        rules: vec![
            rule("dup", "postgres", "SELECT 1"),
            rule("dup", "postgres", "FAIL"),
        ],
        ..Config::default()
    };
    let h = harness(config, vec![vec![Cell::Int(1)]]).await;

    h.scheduler.execute_rule_by_name("dup").await.unwrap();
    let records = h.store.get_latest_executions(1).await.unwrap();
    assert_eq!(records[0].server_name, "first-pg");
    assert_eq!(records[0].status, RunStatus::Success);
}

#[tokio::test]
async fn execute_all_tallies_without_stopping() {
    std::env::set_var("DATASPY_IT_RUNNER_ALL", "postgres://fake/db");
    let config = Config {
        servers: vec![server("s1", "postgres", "DATASPY_IT_RUNNER_ALL")],
        rules: vec![
            rule("broken", "postgres", "FAIL please"),
            rule("ok-1", "postgres", "SELECT 1"),
            rule("orphan", "oracle", "SELECT 1"),
            rule("ok-2", "postgres", "SELECT 2"),
        ],
        ..Config::default()
    };
    let h = harness(config, vec![]).await;

    let tally = h.scheduler.execute_all_rules().await;
    assert_eq!(
        tally,
        RunTally {
            succeeded: 2,
            failed: 2
        }
    );
    assert_eq!(tally.total(), 4);

    // One record per rule, each with exactly one of result / error.
    let records = h.store.get_latest_executions(usize::MAX).await.unwrap();
    assert_eq!(records.len(), 4);
    for record in &records {
        assert_ne!(record.result.is_empty(), record.error.is_empty());
    }
    let ok = h.store.get_executions_by_rule("ok-1").await.unwrap();
    assert_eq!(ok[0].result, "Query completed successfully (0 rows)");

    let starts: Vec<_> = records.iter().map(|r| r.start_time).collect();
    assert!(starts.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn failed_save_keeps_run_outcome() {
    std::env::set_var("DATASPY_IT_RUNNER_SAVE", "postgres://fake/db");
    let config = Config {
        servers: vec![server("s1", "postgres", "DATASPY_IT_RUNNER_SAVE")],
        rules: vec![rule("r1", "postgres", "SELECT 1")],
        ..Config::default()
    };
    let h = harness(config, vec![vec![Cell::Int(1)]]).await;
    h.store.close().await;

    let result = h.scheduler.execute_rule_by_name("r1").await.unwrap();
    assert_eq!(result.row_count, 1);

    let warnings: Vec<_> = h
        .sink
        .events()
        .into_iter()
        .filter(|e| e.level == EventLevel::Warn)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message, "Failed to save execution record");
}
