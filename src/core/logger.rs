//! Per-task job logger.
//!
//! Jobs write their output exclusively through a [`TaskLogger`]. Thread
//! workers point it at `<logsPath>/<taskId>.log`; process workers point it at
//! stdout, which the parent has redirected to the same file.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::util::clock::now_ms;

/// Severity of a job log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal progress.
    Info,
    /// Recoverable problems.
    Warn,
    /// Failures.
    Error,
    /// Failures that end the job.
    Fatal,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        };
        f.pad(label)
    }
}

impl LogLevel {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARN" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            "FATAL" => Some(Self::Fatal),
            _ => None,
        }
    }
}

/// Split a line written by [`TaskLogger`] into its level and message.
///
/// Returns `None` for anything else a job printed to stdout or stderr.
#[must_use]
pub fn parse_log_line(line: &str) -> Option<(LogLevel, &str)> {
    let (timestamp, rest) = line.split_once(' ')?;
    if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (label, message) = rest.split_once(' ').unwrap_or((rest, ""));
    let level = LogLevel::from_label(label)?;
    Some((level, message.trim_start()))
}

/// Message of the last `ERROR` or `FATAL` line in a task log.
#[must_use]
pub fn last_failure(log: &str) -> Option<&str> {
    log.lines()
        .rev()
        .filter_map(parse_log_line)
        .find(|(level, message)| *level >= LogLevel::Error && !message.is_empty())
        .map(|(_, message)| message)
}

/// Leveled, line-oriented logger handed to job bodies. Cheap to clone.
#[derive(Clone)]
pub struct TaskLogger {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl fmt::Debug for TaskLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskLogger").finish_non_exhaustive()
    }
}

impl TaskLogger {
    /// Logger writing to an arbitrary sink.
    #[must_use]
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Logger writing to an open file.
    #[must_use]
    pub fn to_file(file: std::fs::File) -> Self {
        Self::new(Box::new(std::io::LineWriter::new(file)))
    }

    /// Logger writing to the process's stdout.
    #[must_use]
    pub fn to_stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Write one line at `level`.
    pub fn log(&self, level: LogLevel, message: impl fmt::Display) {
        let line = format!("{} {level:<5} {message}\n", now_ms());
        let mut sink = self.sink.lock();
        if let Err(e) = sink.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, "failed to write job log line");
        }
    }

    /// Log at debug level.
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(LogLevel::Debug, message);
    }

    /// Log at info level.
    pub fn info(&self, message: impl fmt::Display) {
        self.log(LogLevel::Info, message);
    }

    /// Log at warn level.
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(LogLevel::Warn, message);
    }

    /// Log at error level.
    pub fn error(&self, message: impl fmt::Display) {
        self.log(LogLevel::Error, message);
    }

    /// Log at fatal level.
    pub fn fatal(&self, message: impl fmt::Display) {
        self.log(LogLevel::Fatal, message);
    }

    /// Flush buffered output.
    pub fn close(&self) {
        if let Err(e) = self.sink.lock().flush() {
            tracing::warn!(error = %e, "failed to flush job log");
        }
    }
}
