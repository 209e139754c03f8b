use std::io::{self, Write};

use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use dataspy_connector::event::fields_to_string;
use dataspy_connector::{EventLevel, EventSink, ExecutionResult, LogEvent};
use dataspy_rules::RunTally;
use dataspy_storage::{ExecutionRecord, RunStatus};
use tracing::debug;

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const INFO: Color = Color::White;
    const ERROR: Color = Color::Red;
    const SUCCESS: Color = Color::Green;
    const WARN: Color = Color::Yellow;
    const TASK: Color = Color::Magenta;
    const RULE: Color = Color::Cyan;
    const DB: Color = Color::Blue;
    const DIM: Color = Color::DarkGrey;

    fn for_level(level: EventLevel) -> Color {
        match level {
            EventLevel::Info => Self::INFO,
            EventLevel::Error => Self::ERROR,
            EventLevel::Success => Self::SUCCESS,
            EventLevel::Warn => Self::WARN,
            EventLevel::Task => Self::TASK,
            EventLevel::Rule => Self::RULE,
            EventLevel::Db => Self::DB,
        }
    }
}

/// Prints execution events to stdout, colored by level.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: &LogEvent) {
        if let Err(e) = print_event(event) {
            debug!(error = %e, "failed to write event to console");
        }
    }
}

fn print_event(event: &LogEvent) -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(
        stdout,
        SetForegroundColor(Colors::for_level(event.level)),
        Print(format!("[{:<7}] ", event.level.to_string().to_uppercase())),
        ResetColor,
        Print(event_line(event)),
        Print("\n"),
    )?;
    stdout.flush()
}

/// `message key=value ... error=...` without colors.
pub fn event_line(event: &LogEvent) -> String {
    let mut line = event.message.clone();
    if !event.fields.is_empty() {
        line.push(' ');
        line.push_str(&fields_to_string(&event.fields));
    }
    if let Some(error) = &event.error {
        line.push_str(&format!(" error={error}"));
    }
    line
}

/// Print the rendered rows of a successful single-rule run.
pub fn print_result(rule: &str, result: &ExecutionResult) -> Result<()> {
    let mut stdout = io::stdout();
    execute!(
        stdout,
        SetForegroundColor(Colors::DIM),
        Print(format!("Results for {rule}:\n")),
        ResetColor,
        Print(&result.results),
        Print(if result.results.ends_with('\n') { "" } else { "\n" }),
    )?;
    stdout.flush()?;
    Ok(())
}

pub fn print_tally(tally: &RunTally) -> Result<()> {
    let mut stdout = io::stdout();
    execute!(
        stdout,
        Print(format!("Executed {} rules: ", tally.total())),
        SetForegroundColor(Colors::SUCCESS),
        Print(format!("{} succeeded", tally.succeeded)),
        ResetColor,
        Print(", "),
        SetForegroundColor(if tally.failed > 0 { Colors::ERROR } else { Colors::DIM }),
        Print(format!("{} failed", tally.failed)),
        ResetColor,
        Print("\n"),
    )?;
    stdout.flush()?;
    Ok(())
}

pub fn print_error(message: &str) -> Result<()> {
    let mut stderr = io::stderr();
    execute!(
        stderr,
        SetForegroundColor(Colors::ERROR),
        Print(format!("error: {message}\n")),
        ResetColor,
    )?;
    stderr.flush()?;
    Ok(())
}

/// Print execution records, one header line each plus the result or error.
pub fn print_records(records: &[ExecutionRecord]) -> Result<()> {
    let mut stdout = io::stdout();
    if records.is_empty() {
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print("No executions recorded.\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        return Ok(());
    }

    for record in records {
        let color = match record.status {
            RunStatus::Success => Colors::SUCCESS,
            RunStatus::Error => Colors::ERROR,
        };
        execute!(
            stdout,
            SetForegroundColor(color),
            Print(format!("[{}] ", record.status)),
            ResetColor,
            Print(record_header(record)),
            Print("\n"),
            SetForegroundColor(Colors::DIM),
            Print(indent(record_body(record))),
            ResetColor,
        )?;
    }
    stdout.flush()?;
    Ok(())
}

pub fn record_header(record: &ExecutionRecord) -> String {
    let server = if record.server_name.is_empty() {
        "-"
    } else {
        record.server_name.as_str()
    };
    format!(
        "{} {} on {} ({} ms, {} rows)",
        record.start_time.format("%Y-%m-%d %H:%M:%S%.3f UTC"),
        record.rule_name,
        server,
        record.duration_ms,
        record.rows_affected,
    )
}

fn record_body(record: &ExecutionRecord) -> &str {
    match record.status {
        RunStatus::Success => &record.result,
        RunStatus::Error => &record.error,
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("    {l}\n")).collect()
}
