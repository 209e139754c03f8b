//! End-to-end runs through the real SQLite backend.

use dataspy_connector::{EventLevel, ExecuteOptions, ExecutorError, QueryExecutor};
use dataspy_core::{ErrorKind, Rule, Server};

fn sqlite_server(var: &str, conn: &str) -> Server {
    std::env::set_var(var, conn);
    Server {
        name: "local-sqlite".into(),
        server_type: "sqlite".into(),
        conn_string_var: var.into(),
    }
}

fn rule(query: &str) -> Rule {
    Rule {
        name: "probe".into(),
        description: String::new(),
        db_type: "sqlite".into(),
        query: query.into(),
        timeout_secs: None,
    }
}

#[tokio::test]
async fn select_one() {
    let server = sqlite_server("DATASPY_IT_SQLITE_ONE", "sqlite::memory:");
    let executor = QueryExecutor::with_default_backends();

    let result = executor
        .execute(&server, &rule("SELECT 1"), &ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.row_count, 1);
    assert_eq!(result.results, "Found 1 rows:\nRow 1: 1\n");
    assert_eq!(result.events.last().unwrap().level, EventLevel::Success);
}

#[tokio::test]
async fn mixed_value_types() {
    let server = sqlite_server("DATASPY_IT_SQLITE_MIXED", "sqlite::memory:");
    let executor = QueryExecutor::with_default_backends();

    let result = executor
        .execute(
            &server,
            &rule("SELECT 7, NULL, 'bob', CAST('raw' AS BLOB), 1.5"),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.results, "Found 1 rows:\nRow 1: 7 NULL bob raw 1.5\n");
}

#[tokio::test]
async fn statements_run_verbatim() {
    let server = sqlite_server("DATASPY_IT_SQLITE_MULTI", "sqlite::memory:");
    let executor = QueryExecutor::with_default_backends();
    let query = "CREATE TABLE t (id INTEGER, name TEXT); \
                 INSERT INTO t VALUES (1, 'a'), (2, 'b'); \
                 SELECT id, name FROM t ORDER BY id";

    let result = executor
        .execute(&server, &rule(query), &ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.row_count, 2);
    assert_eq!(result.results, "Found 2 rows:\nRow 1: 1 a\nRow 2: 2 b\n");
}

#[tokio::test]
async fn empty_result() {
    let server = sqlite_server("DATASPY_IT_SQLITE_EMPTY", "sqlite::memory:");
    let executor = QueryExecutor::with_default_backends();

    let result = executor
        .execute(&server, &rule("SELECT 1 WHERE 1 = 0"), &ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.row_count, 0);
    assert_eq!(result.results, "Query completed successfully (0 rows)");
}

#[tokio::test]
async fn invalid_sql_is_a_query_error() {
    let server = sqlite_server("DATASPY_IT_SQLITE_BAD", "sqlite::memory:");
    let executor = QueryExecutor::with_default_backends();

    let failure = executor
        .execute(&server, &rule("SELEC nonsense"), &ExecuteOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, ExecutorError::Query(_)));
    assert_eq!(failure.kind(), ErrorKind::Query);
}

#[tokio::test]
async fn missing_database_file_fails_to_open() {
    let dir = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("absent/none.db").display());
    let server = sqlite_server("DATASPY_IT_SQLITE_MISSING", &url);
    let executor = QueryExecutor::with_default_backends();

    let failure = executor
        .execute(&server, &rule("SELECT 1"), &ExecuteOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, ExecutorError::Open(_)));
    assert_eq!(failure.kind(), ErrorKind::Connectivity);
}
