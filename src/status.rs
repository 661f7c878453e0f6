use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info, warn};

/// The kind of a status message. Each kind renders with a fixed marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Progress,
    Success,
    Warning,
    Error,
}

impl StatusLevel {
    pub fn marker(&self) -> &'static str {
        match self {
            StatusLevel::Info => "🔍",
            StatusLevel::Progress => "⏳",
            StatusLevel::Success => "✅",
            StatusLevel::Warning => "⚠️",
            StatusLevel::Error => "❌",
        }
    }
}

/// A human-readable progress or outcome message.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Status {
    pub fn new(level: StatusLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(StatusLevel::Info, message)
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Self::new(StatusLevel::Progress, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(StatusLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(StatusLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StatusLevel::Error, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.level.marker(), self.message)
    }
}

/// Receives status messages from the fetcher, the writer and the session.
pub trait StatusSink: Send + Sync {
    fn notify(&self, status: Status);
}

/// Drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl StatusSink for NoopSink {
    fn notify(&self, _status: Status) {}
}

/// Forwards messages to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn notify(&self, status: Status) {
        log_status(&status);
    }
}

fn log_status(status: &Status) {
    match status.level {
        StatusLevel::Error => error!("{}", status.message),
        StatusLevel::Warning => warn!("{}", status.message),
        _ => info!("{}", status.message),
    }
}

/// Caller-owned in-memory message log.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Mutex<Vec<Status>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every message received so far.
    pub fn snapshot(&self) -> Vec<Status> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Status>> {
        // A panic while pushing cannot leave the vector half-written.
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StatusSink for MessageLog {
    fn notify(&self, status: Status) {
        self.lock().push(status);
    }
}

/// Shows the latest message on a terminal spinner and logs it.
pub struct ProgressSink {
    spinner: ProgressBar,
}

impl ProgressSink {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        Self { spinner }
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for ProgressSink {
    fn notify(&self, status: Status) {
        self.spinner.set_message(status.to_string());
        log_status(&status);
    }
}
