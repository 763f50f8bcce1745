//! Logging setup and the in-memory recent-log buffer.
//!
//! `init_logging` installs the global subscriber: an `EnvFilter` (RUST_LOG
//! wins over the configured level), a stderr layer, an optional file layer
//! and a `LogBuffer` layer that keeps the last 1000 events for a health view.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;
use uuid::Uuid;

use crate::config::LoggingConfig;

/// Events kept by the buffer
pub const LOG_BUFFER_CAPACITY: usize = 1000;

/// Format timestamps using the system's local time via chrono
struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Per-level totals of buffered entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LogCounts {
    pub error: usize,
    pub warn: usize,
    pub info: usize,
    pub debug: usize,
    pub trace: usize,
}

/// Bounded ring of recent log events, cheap to clone and share
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(LOG_BUFFER_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, entry: LogEntry) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Newest first, at most `limit` entries
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn counts(&self) -> LogCounts {
        let mut counts = LogCounts::default();
        for entry in self.entries.lock().iter() {
            match entry.level.as_str() {
                "ERROR" => counts.error += 1,
                "WARN" => counts.warn += 1,
                "INFO" => counts.info += 1,
                "DEBUG" => counts.debug += 1,
                _ => counts.trace += 1,
            }
        }
        counts
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// A tracing layer that feeds this buffer
    pub fn layer(&self) -> LogBufferLayer {
        LogBufferLayer {
            buffer: self.clone(),
        }
    }
}

/// Collects the `message` field plus any extra fields as `key=value`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

pub struct LogBufferLayer {
    buffer: LogBuffer,
}

impl<S: Subscriber> Layer<S> for LogBufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        self.buffer.push(LogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level: level_name(metadata.level()).to_string(),
            target: metadata.target().to_string(),
            message: visitor.message + &visitor.fields,
        });
    }
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

/// Directory for log files (~/.noisemap/logs)
pub fn get_log_directory() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".noisemap").join("logs"))
}

fn open_log_file() -> Option<std::fs::File> {
    let dir = get_log_directory()?;
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("Could not create log directory {:?}: {}", dir, e);
        return None;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("noisemap.log"))
        .ok()
}

/// Installs the global subscriber and returns the buffer it feeds.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<LogBuffer, tracing_subscriber::util::TryInitError> {
    let buffer = LogBuffer::default();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    // stderr keeps command output on stdout clean
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTimer);

    let file_layer = if config.log_to_file {
        open_log_file().map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_timer(LocalTimer)
                .with_ansi(false)
        })
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .with(buffer.layer())
        .try_init()?;

    Ok(buffer)
}
