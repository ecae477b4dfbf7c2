//! Run log: console, per-run log file and Server-Sent Events.
//!
//! Every pipeline message goes through the global [`LOG_BROADCASTER`].
//! Entries may carry a [`LogContext`] so failures reach the sink as
//! structured data (file, failure kind, offending cell/field), not only prose.

use chrono::Local;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::error::FailureKind;

/// Log level, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info | Self::Success => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Debug,
            1 => Self::Info,
            2 => Self::Success,
            3 => Self::Warning,
            _ => Self::Error,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    /// Accepts the level names used in config files (`INFO`, `warning`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "SUCCESS" => Ok(Self::Success),
            "WARN" | "WARNING" => Ok(Self::Warning),
            "ERROR" | "CRITICAL" => Ok(Self::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Structured detail attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    /// Offending sheet, cell, column or field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Optional indentation level (for nested logs)
    #[serde(default)]
    pub indent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<LogContext>,
}

impl LogEntry {
    fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            indent: 0,
            context: None,
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_context(mut self, context: LogContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Global log broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Fans log entries out to stdout, the run log file and SSE subscribers.
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
    min_level: AtomicU8,
    file: Mutex<Option<File>>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self {
            sender,
            min_level: AtomicU8::new(LogLevel::Info as u8),
            file: Mutex::new(None),
        }
    }

    pub fn set_level(&self, level: LogLevel) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.min_level.load(Ordering::Relaxed))
    }

    /// Whether an entry of `level` passes the filter.
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level()
    }

    /// Append every following entry to `path` as well.
    pub fn attach_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if let Ok(mut slot) = self.file.lock() {
            *slot = Some(file);
        }
        Ok(())
    }

    /// Send a log entry to all sinks
    pub fn log(&self, entry: LogEntry) {
        if !self.enabled(entry.level) {
            return;
        }

        let prefix = match entry.level {
            LogLevel::Debug => "   ·",
            LogLevel::Info => "   ",
            LogLevel::Success => "   ✓",
            LogLevel::Warning => "   ⚠️",
            LogLevel::Error => "   ❌",
        };
        let indent = "   ".repeat(entry.indent as usize);
        println!("{}{} {}", indent, prefix, entry.message);

        if let Ok(mut slot) = self.file.lock() {
            if let Some(file) = slot.as_mut() {
                let _ = writeln!(file, "{}", file_line(&entry));
            }
        }

        // Broadcast to SSE clients (ignore if no receivers)
        let _ = self.sender.send(entry);
    }

    /// Get a receiver for SSE streaming
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// `{time} - {LEVEL} - {message}`, context appended as JSON.
fn file_line(entry: &LogEntry) -> String {
    let time = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let mut line = format!("{} - {} - {}", time, entry.level.label(), entry.message);
    if let Some(ctx) = &entry.context {
        if let Ok(json) = serde_json::to_string(ctx) {
            line.push(' ');
            line.push_str(&json);
        }
    }
    line
}

/// Convenient logging functions
pub fn log_info(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::info(msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::success(msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::warning(msg));
}

pub fn log_error(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::error(msg));
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    LOG_BROADCASTER.log(LogEntry::info(msg).with_indent(indent));
}

/// Error entry carrying structured failure detail.
pub fn log_failure(msg: impl Into<String>, context: LogContext) {
    LOG_BROADCASTER.log(LogEntry::error(msg).with_context(context));
}

/// Warning entry pointing at a row or field that was left out.
pub fn log_skip(msg: impl Into<String>, context: LogContext) {
    LOG_BROADCASTER.log(LogEntry::warning(msg).with_context(context));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!("INFO".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!("CRITICAL".parse::<LogLevel>(), Ok(LogLevel::Error));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_filter() {
        let logs = LogBroadcaster::new();
        assert!(!logs.enabled(LogLevel::Debug));
        assert!(logs.enabled(LogLevel::Warning));
        logs.set_level(LogLevel::Error);
        assert_eq!(logs.level(), LogLevel::Error);
        assert!(!logs.enabled(LogLevel::Warning));
    }

    #[test]
    fn test_entries_reach_subscribers() {
        let logs = LogBroadcaster::new();
        let mut rx = logs.subscribe();
        logs.log(LogEntry::debug("hidden"));
        logs.log(LogEntry::warning("shown").with_indent(1));
        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.message, "shown");
        assert_eq!(entry.indent, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_file_sink_writes_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("execution.log");
        let logs = LogBroadcaster::new();
        logs.attach_file(&path).unwrap();
        logs.log(LogEntry::error("Column mismatch").with_context(LogContext {
            file_id: Some("2".into()),
            kind: Some(FailureKind::ColumnMismatch),
            location: Some("C".into()),
        }));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(" - ERROR - Column mismatch"));
        assert!(content.contains("\"kind\":\"columnMismatch\""));
        assert!(content.contains("\"location\":\"C\""));
    }
}
