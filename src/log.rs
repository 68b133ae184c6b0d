//! Leveled activity logging for strata.
//!
//! Each day's activity is appended to its own file under
//! `~/.strata/logs/` (`strata-YYYYMMDD.log`). Files are never
//! truncated, so one day of planning, runs, and resumes reads as a
//! single continuous trail — the same accumulate-only policy the
//! session store applies to its decision and checkpoint logs.
//!
//! Verbosity, highest precedence first:
//! - `STRATA_LOG=<error|warn|info|debug|trace>` picks an exact level
//! - `STRATA_DEBUG=1` or the CLI `--debug` flag raise Info to Debug
//! - otherwise Info

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use chrono::{NaiveDate, Utc};

static LOG_FILE: OnceLock<PathBuf> = OnceLock::new();
static MIN_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Log levels, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// Parse a level name as accepted by `STRATA_LOG`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// The log file name for a given day.
fn file_name_for(date: NaiveDate) -> String {
    format!("strata-{}.log", date.format("%Y%m%d"))
}

/// Initialize logging at default verbosity.
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging; `debug` is the CLI `--debug` flag.
pub fn init_with_debug(debug: bool) {
    let exact = std::env::var("STRATA_LOG")
        .ok()
        .and_then(|v| LogLevel::parse(&v));
    let env_debug = std::env::var("STRATA_DEBUG")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);

    let level = exact.unwrap_or(if debug || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });
    MIN_LEVEL.store(level as u8, Ordering::SeqCst);

    if let Some(home) = dirs::home_dir() {
        let logs_dir = home.join(".strata").join("logs");
        let _ = std::fs::create_dir_all(&logs_dir);
        let path = logs_dir.join(file_name_for(Utc::now().date_naive()));
        LOG_FILE.set(path).ok();
    }
}

/// Set the minimum level at runtime.
pub fn set_level(level: LogLevel) {
    MIN_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// The current minimum level.
pub fn get_level() -> LogLevel {
    LogLevel::from_u8(MIN_LEVEL.load(Ordering::Relaxed))
}

/// Whether a message at this level would be written.
pub fn enabled(level: LogLevel) -> bool {
    level <= get_level()
}

fn append(level: LogLevel, msg: &str) {
    if !enabled(level) {
        return;
    }
    let Some(path) = LOG_FILE.get() else {
        return;
    };
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let stamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let _ = writeln!(file, "{} {:5} {}", stamp, level.as_str(), msg);
    }
}

/// Log a message at INFO level (default for `stlog!`).
pub fn log(msg: &str) {
    append(LogLevel::Info, msg);
}

/// Log a message at ERROR level.
pub fn error(msg: &str) {
    append(LogLevel::Error, msg);
}

/// Log a message at WARN level.
pub fn warn(msg: &str) {
    append(LogLevel::Warn, msg);
}

/// Log a message at INFO level.
pub fn info(msg: &str) {
    append(LogLevel::Info, msg);
}

/// Log a message at DEBUG level.
pub fn debug(msg: &str) {
    append(LogLevel::Debug, msg);
}

/// Log a message at TRACE level.
pub fn trace(msg: &str) {
    append(LogLevel::Trace, msg);
}

/// Log macro for INFO level (convenience).
#[macro_export]
macro_rules! stlog {
    ($($arg:tt)*) => {
        $crate::log::log(&format!($($arg)*))
    };
}

/// Log macro for ERROR level.
#[macro_export]
macro_rules! stlog_error {
    ($($arg:tt)*) => {
        $crate::log::error(&format!($($arg)*))
    };
}

/// Log macro for WARN level.
#[macro_export]
macro_rules! stlog_warn {
    ($($arg:tt)*) => {
        $crate::log::warn(&format!($($arg)*))
    };
}

/// Log macro for DEBUG level.
#[macro_export]
macro_rules! stlog_debug {
    ($($arg:tt)*) => {
        $crate::log::debug(&format!($($arg)*))
    };
}

/// Log macro for TRACE level (very verbose).
#[macro_export]
macro_rules! stlog_trace {
    ($($arg:tt)*) => {
        $crate::log::trace(&format!($($arg)*))
    };
}
