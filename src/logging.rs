// src/logging.rs

//! Diagnostics for `taskdock`.
//!
//! Two separate concerns live here:
//!
//! - [`init_logging`]: the `tracing` setup for human-readable diagnostics
//!   on STDERR (STDOUT stays reserved for container output).
//! - [`StructuredLogWriter`]: machine-readable JSON lines written to the
//!   `--log-file` stream, consumed by the execution manager for scheduling
//!   diagnostics. [`open_structured_log`] opens that stream.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::cli::LogLevel;

/// Environment variable consulted for the log level when `--log-level` is
/// not given. Accepts anything `tracing::Level` can parse ("warn", "2", …).
const LEVEL_ENV_VAR: &str = "TASKDOCK_LOG";

/// Install the global tracing subscriber.
///
/// The level is the first of: the `--log-level` flag, a parseable
/// [`LEVEL_ENV_VAR`], `info`. Fails if a subscriber is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let level = cli_level
        .map(LogLevel::tracing_level)
        .or_else(level_from_environment)
        .unwrap_or(tracing::Level::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("installing the global tracing subscriber")?;

    Ok(())
}

fn level_from_environment() -> Option<tracing::Level> {
    let value = std::env::var(LEVEL_ENV_VAR).ok()?;

    match value.trim().parse() {
        Ok(level) => Some(level),
        Err(_) => {
            eprintln!(
                "taskdock: ignoring unparseable {LEVEL_ENV_VAR} value '{}'",
                value.trim()
            );
            None
        }
    }
}

/// Open the structured JSON diagnostics stream for `--log-file`.
pub fn open_structured_log(path: impl AsRef<Path>) -> crate::errors::Result<StructuredLogWriter> {
    let file = File::create(path)?;
    Ok(StructuredLogWriter::new(Box::new(file)))
}

/// Severity of a structured log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    fn name(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Writes JSON log lines of the shape
/// `{"@timestamp": ..., "@severity": ..., "@message": ..., ...extras}`.
///
/// The timestamp is UTC with exactly six fractional digits
/// (`YYYY-MM-DDTHH:MM:SS.ffffffZ`). Each line is flushed as it is written
/// and terminated with a newline; the underlying stream is never closed by
/// the writer.
pub struct StructuredLogWriter {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for StructuredLogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredLogWriter").finish_non_exhaustive()
    }
}

impl StructuredLogWriter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    /// Write one line stamped with the current time.
    pub fn log(&self, severity: Severity, message: &str, extras: &[(&str, Value)]) {
        self.log_at(Utc::now(), severity, message, extras);
    }

    /// Write one line with an explicit timestamp.
    pub fn log_at(
        &self,
        timestamp: DateTime<Utc>,
        severity: Severity,
        message: &str,
        extras: &[(&str, Value)],
    ) {
        let mut fields = Map::new();
        fields.insert(
            "@timestamp".to_string(),
            Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        fields.insert(
            "@severity".to_string(),
            Value::String(severity.name().to_string()),
        );
        fields.insert("@message".to_string(), Value::String(message.to_string()));

        for (key, value) in extras {
            fields.insert((*key).to_string(), value.clone());
        }

        let line = Value::Object(fields).to_string();

        let mut sink = match self.sink.lock() {
            Ok(sink) => sink,
            Err(_) => return,
        };

        // A diagnostics failure must never take the task down with it.
        if writeln!(sink, "{line}").and_then(|()| sink.flush()).is_err() {
            tracing::debug!("failed to write structured log line");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    /// A writable buffer the test keeps a handle to after handing it to the
    /// writer.
    #[derive(Clone, Default)]
    struct SharedBuffer {
        contents: Arc<Mutex<Vec<u8>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            assert!(!*self.closed.lock().unwrap(), "write after close");
            self.contents.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_exactly_the_standard_fields_plus_extras() {
        let buffer = SharedBuffer::default();
        let writer = StructuredLogWriter::new(Box::new(buffer.clone()));

        let timestamp = Utc
            .with_ymd_and_hms(2017, 9, 25, 11, 55, 13)
            .unwrap()
            .checked_add_signed(chrono::Duration::microseconds(1234))
            .unwrap();

        writer.log_at(
            timestamp,
            Severity::Info,
            "This is the message",
            &[
                ("some-text", json!("This is some text")),
                ("some-int", json!(123)),
            ],
        );

        let contents = buffer.contents.lock().unwrap().clone();
        let text = String::from_utf8(contents).unwrap();

        assert!(text.ends_with('\n'), "line must end with a newline");

        let parsed: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        let object = parsed.as_object().unwrap();

        assert_eq!(object.len(), 5, "no fields beyond the standard three plus extras");
        assert_eq!(object["@timestamp"], json!("2017-09-25T11:55:13.001234Z"));
        assert_eq!(object["@severity"], json!("info"));
        assert_eq!(object["@message"], json!("This is the message"));
        assert_eq!(object["some-text"], json!("This is some text"));
        assert_eq!(object["some-int"], json!(123));
    }

    #[test]
    fn leaves_the_stream_open_between_lines() {
        let buffer = SharedBuffer::default();
        let writer = StructuredLogWriter::new(Box::new(buffer.clone()));

        writer.log_at(Utc::now(), Severity::Debug, "first", &[]);
        writer.log_at(Utc::now(), Severity::Debug, "second", &[]);

        let contents = buffer.contents.lock().unwrap().clone();
        let text = String::from_utf8(contents).unwrap();

        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn timestamps_always_carry_six_fractional_digits() {
        let timestamp = Utc.with_ymd_and_hms(2017, 9, 25, 11, 55, 13).unwrap();

        assert_eq!(
            timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            "2017-09-25T11:55:13.000000Z"
        );
    }
}
