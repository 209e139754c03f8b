use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::model::{Rule, Schedule, Server};

/// Load environment variables from a `.env` file.
///
/// An explicit `path` must exist. Without one, `./.env` in the working
/// directory is loaded when present; parent directories are not searched.
/// Only a missing default file is skipped, so a malformed one is an error.
/// Returns the file that was loaded, if any.
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    match path {
        Some(p) => load_env_file(p).map(|_| Some(p.to_path_buf())),
        None => load_optional_env_file(Path::new(".env")),
    }
}

fn load_optional_env_file(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
    match load_env_file(path) {
        Ok(()) => Ok(Some(path.to_path_buf())),
        Err(ConfigError::Env {
            source: dotenvy::Error::Io(e),
            ..
        }) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no .env file, skipping");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn load_env_file(path: &Path) -> Result<(), ConfigError> {
    dotenvy::from_path(path).map_err(|source| ConfigError::Env {
        path: path.to_path_buf(),
        source,
    })
}

// ── Top-level config ──────────────────────────────────────────

/// Everything the daemon needs: where history lives, how runs behave, and
/// the servers, rules and schedules themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub servers: Vec<Server>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

impl Config {
    /// Read and parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading config");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.warn_duplicates();
        Ok(config)
    }

    /// Rule and server names that appear more than once. Lookups take the
    /// first match, so later duplicates are unreachable.
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut dups = Vec::new();
        for name in self.rules.iter().map(|r| format!("rule:{}", r.name)).chain(
            self.servers
                .iter()
                .map(|s| format!("server:{}", s.name)),
        ) {
            if !seen.insert(name.clone()) {
                dups.push(name);
            }
        }
        dups
    }

    fn warn_duplicates(&self) {
        for name in self.duplicate_names() {
            warn!(name = %name, "duplicate name in config; only the first entry is used");
        }
    }

    /// Print a short summary for startup logs. Connection strings are never
    /// part of the config, so nothing needs redacting.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  storage:    path={}", self.storage.path.display());
        tracing::info!(
            "  execution:  query_timeout_secs={}, overlap={:?}",
            self.execution.query_timeout_secs,
            self.execution.overlap
        );
        tracing::info!(
            "  servers={}, rules={}, schedules={}",
            self.servers.len(),
            self.rules.len(),
            self.schedules.len()
        );
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// How long to wait for another process to release the database lock.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

impl StorageConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/dataspy.db")
}

fn default_lock_timeout_secs() -> u64 {
    1
}

// ── Execution ─────────────────────────────────────────────────

/// What to do when a schedule fires while the previous run of the same rule
/// is still in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Drop the new firing.
    #[default]
    Skip,
    /// Run concurrently.
    Allow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Default query deadline in seconds; `0` disables it.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default)]
    pub overlap: OverlapPolicy,
}

impl ExecutionConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_secs > 0).then(|| Duration::from_secs(self.query_timeout_secs))
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: default_query_timeout_secs(),
            overlap: OverlapPolicy::default(),
        }
    }
}

fn default_query_timeout_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
[storage]
path = "/var/lib/dataspy/history.db"
lock_timeout_secs = 3

[execution]
query_timeout_secs = 60
overlap = "allow"

[[servers]]
name = "main-pg"
type = "postgres"
conn_string_var = "PG_CONN"

[[rules]]
name = "orphan-orders"
description = "orders without customers"
db_type = "postgres"
query = "SELECT id FROM orders WHERE customer_id IS NULL"
timeout_secs = 30

[[schedules]]
server = "main-pg"
rule = "orphan-orders"
cron = "0 */5 * * * *"
"#;

    #[test]
    fn parse_full_config() {
        let config = Config::from_toml_str(FULL_CONFIG).unwrap();

        assert_eq!(config.storage.path, PathBuf::from("/var/lib/dataspy/history.db"));
        assert_eq!(config.storage.lock_timeout(), Duration::from_secs(3));
        assert_eq!(config.execution.query_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.execution.overlap, OverlapPolicy::Allow);

        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].server_type, "postgres");
        assert_eq!(config.servers[0].conn_string_var, "PG_CONN");

        assert_eq!(config.rules[0].name, "orphan-orders");
        assert_eq!(config.rules[0].timeout_secs, Some(30));

        assert_eq!(config.schedules[0].rule, "orphan-orders");
        assert_eq!(config.schedules[0].cron, "0 */5 * * * *");
    }

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config = Config::from_toml_str("").unwrap();

        assert_eq!(config.storage.path, PathBuf::from("data/dataspy.db"));
        assert_eq!(config.storage.lock_timeout(), Duration::from_secs(1));
        assert_eq!(config.execution.query_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.execution.overlap, OverlapPolicy::Skip);
        assert!(config.rules.is_empty());
    }

    #[test]
    fn zero_query_timeout_disables_deadline() {
        let config = Config::from_toml_str("[execution]\nquery_timeout_secs = 0\n").unwrap();
        assert_eq!(config.execution.query_timeout(), None);
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let legacy = r#"
[[servers]]
Name = "legacy-mysql"
Type = "mysql"
ConnStringVar = "MYSQL_CONN"

[[rules]]
Name = "stale-sessions"
Description = "sessions older than a day"
DbType = "mysql"
Query = "SELECT 1"

[[schedules]]
Server = "legacy-mysql"
Rule = "stale-sessions"
CronStr = "*/30 * * * * *"
"#;
        let config = Config::from_toml_str(legacy).unwrap();
        assert_eq!(config.servers[0].server_type, "mysql");
        assert_eq!(config.rules[0].db_type, "mysql");
        assert_eq!(config.rules[0].description, "sessions older than a day");
        assert_eq!(config.schedules[0].cron, "*/30 * * * * *");
    }

    #[test]
    fn duplicate_names_are_reported() {
        let dup = r#"
[[servers]]
name = "a"
type = "postgres"
conn_string_var = "A"

[[servers]]
name = "a"
type = "mysql"
conn_string_var = "B"

[[rules]]
name = "r"
db_type = "postgres"
query = "SELECT 1"
"#;
        let config = Config::from_toml_str(dup).unwrap();
        assert_eq!(config.duplicate_names(), vec!["server:a".to_string()]);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = Config::from_toml_str("[[rules]\nname = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Config::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dataspy.toml");
        std::fs::write(&path, FULL_CONFIG).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.rules.len(), 1);
    }

    #[test]
    fn shipped_example_config_parses() {
        let example = include_str!("../../../dataspy.example.toml");
        let config = Config::from_toml_str(example).unwrap();

        assert!(config.duplicate_names().is_empty());
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.rules.len(), 2);
        assert!(config
            .schedules
            .iter()
            .all(|s| config.rules.iter().any(|r| r.name == s.rule)));
    }

    #[test]
    fn explicit_env_file_must_exist() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_dotenv(Some(&dir.path().join("missing.env"))).unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn explicit_env_file_is_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("test.env");
        std::fs::write(&path, "DATASPY_CORE_TEST_DOTENV=loaded\n").unwrap();

        let loaded = load_dotenv(Some(&path)).unwrap();
        assert_eq!(loaded, Some(path));
        assert_eq!(
            std::env::var("DATASPY_CORE_TEST_DOTENV").as_deref(),
            Ok("loaded")
        );
    }

    #[test]
    fn missing_default_env_file_is_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let loaded = load_optional_env_file(&dir.path().join(".env")).unwrap();
        assert_eq!(loaded, None);
    }

    #[test]
    fn malformed_default_env_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "this is not a dotenv line\nDATASPY_CORE_TEST_AFTER_BAD=1\n").unwrap();

        let err = load_optional_env_file(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Env {
                source: dotenvy::Error::LineParse(..),
                ..
            }
        ));
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn parent_directory_env_file_is_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(".env"), "DATASPY_CORE_TEST_PARENT=yes\n").unwrap();
        let child = dir.path().join("child");
        std::fs::create_dir(&child).unwrap();

        let loaded = load_optional_env_file(&child.join(".env")).unwrap();
        assert_eq!(loaded, None);
        assert!(std::env::var("DATASPY_CORE_TEST_PARENT").is_err());
    }
}
