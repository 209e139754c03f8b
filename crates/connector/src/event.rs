//! Structured outcome events emitted while a rule executes.
//!
//! Events are ephemeral: they are relayed to an [`EventSink`] for a
//! human-facing presentation layer and never persisted.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity / category of an outcome event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Error,
    Success,
    Warn,
    /// A unit of work is starting (rule on server).
    Task,
    /// Rule-level progress.
    Rule,
    /// Database-level progress.
    Db,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventLevel::Info => "info",
            EventLevel::Error => "error",
            EventLevel::Success => "success",
            EventLevel::Warn => "warn",
            EventLevel::Task => "task",
            EventLevel::Rule => "rule",
            EventLevel::Db => "db",
        };
        f.write_str(s)
    }
}

/// A single step of an execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub message: String,
    /// Context such as `rule`, `server`, `rows`.
    pub fields: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEvent {
    pub fn new(level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields: BTreeMap::new(),
            error: None,
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_error(mut self, error: &dyn fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// String value of a field, if present and a string.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Receiver for outcome events. Injected into the scheduler and CLI so the
/// presentation layer is chosen by the caller, not by a process-wide global.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LogEvent);
}

/// Relays events into `tracing` with their fields attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &LogEvent) {
        let fields = fields_to_string(&event.fields);
        let error = event.error.as_deref().unwrap_or("");
        match event.level {
            EventLevel::Error => tracing::error!(
                kind = %event.level, fields = %fields, error = %error, "{}", event.message
            ),
            EventLevel::Warn => tracing::warn!(
                kind = %event.level, fields = %fields, error = %error, "{}", event.message
            ),
            _ => tracing::info!(kind = %event.level, fields = %fields, "{}", event.message),
        }
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &LogEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: RwLock<Vec<LogEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.read().expect("event sink lock poisoned").clone()
    }

    /// Drain collected events.
    pub fn take(&self) -> Vec<LogEvent> {
        std::mem::take(&mut *self.events.write().expect("event sink lock poisoned"))
    }

    pub fn count(&self, level: EventLevel) -> usize {
        self.events
            .read()
            .expect("event sink lock poisoned")
            .iter()
            .filter(|e| e.level == level)
            .count()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &LogEvent) {
        self.events
            .write()
            .expect("event sink lock poisoned")
            .push(event.clone());
    }
}

/// `key=value` pairs, strings unquoted.
pub fn fields_to_string(fields: &BTreeMap<String, Value>) -> String {
    fields
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}={s}"),
            other => format!("{k}={other}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields_and_error() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let event = LogEvent::new(EventLevel::Error, "Failed to ping database")
            .with_field("server", "pg")
            .with_field("rows", 3)
            .with_error(&err);

        assert_eq!(event.level, EventLevel::Error);
        assert_eq!(event.field_str("server"), Some("pg"));
        assert_eq!(event.fields["rows"], Value::from(3));
        assert_eq!(event.error.as_deref(), Some("boom"));
    }

    #[test]
    fn level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&EventLevel::Db).unwrap(), "\"db\"");
        assert_eq!(EventLevel::Success.to_string(), "success");
    }

    #[test]
    fn collecting_sink_keeps_order_and_drains() {
        let sink = CollectingSink::new();
        sink.emit(&LogEvent::new(EventLevel::Task, "one"));
        sink.emit(&LogEvent::new(EventLevel::Success, "two"));

        assert_eq!(sink.count(EventLevel::Task), 1);
        let events = sink.take();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "one");
        assert_eq!(events[1].message, "two");
        assert!(sink.events().is_empty());
    }

    #[test]
    fn fields_render_as_key_value_pairs() {
        let event = LogEvent::new(EventLevel::Success, "done")
            .with_field("rule", "r1")
            .with_field("rows", 2);
        assert_eq!(fields_to_string(&event.fields), "rows=2 rule=r1");
    }
}
