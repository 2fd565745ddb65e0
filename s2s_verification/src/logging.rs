//! Structured logging for the verification dataset builder.
//!
//! Provides leveled log entries tagged with the pipeline stage and, where
//! relevant, the product being written. Supports console output and an
//! optional append-only log file for long batch runs.

use chrono::Utc;
use serde::Deserialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Parses `--log-level` values; accepts the same names as the config file.
impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl LogLevel {
    /// Level selected by repeated `-v` flags, starting from `base`.
    pub fn raised_by(base: LogLevel, verbosity: u8) -> LogLevel {
        match verbosity {
            0 => base,
            1 => base.min(LogLevel::Info),
            _ => LogLevel::Debug,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Calendar,
    Temperature,
    Precipitation,
    Io,
    Reference,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Calendar => write!(f, "CAL"),
            Stage::Temperature => write!(f, "T2M"),
            Stage::Precipitation => write!(f, "TP"),
            Stage::Io => write!(f, "IO"),
            Stage::Reference => write!(f, "REF"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<PathBuf>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    fn format_entry(level: LogLevel, stage: Stage, product: Option<&str>, message: &str) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let product_part = product.map(|p| format!(" [{}]", p)).unwrap_or_default();
        format!("{} {} {}{}: {}", timestamp, level, stage, product_part, message)
    }

    fn log(&self, level: LogLevel, stage: Stage, product: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let log_entry = Self::format_entry(level, stage, product, message);
        let product_part = product.map(|p| format!(" [{}]", p)).unwrap_or_default();

        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", stage, product_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", stage, product_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   [DEBUG] {}", message),
            }
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path.display(), e);
            }
        }
    }

    fn append_to_file(path: &Path, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger. Calling it again replaces the settings.
pub fn init_logger(min_level: LogLevel, log_file: Option<&Path>, console_timestamps: bool) {
    let logger = Logger {
        min_level,
        log_file: log_file.map(Path::to_path_buf),
        console_timestamps,
    };
    if let Ok(mut slot) = LOGGER.lock() {
        *slot = Some(logger);
    }
}

fn dispatch(level: LogLevel, stage: Stage, product: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, stage, product, message);
        }
    }
}

pub fn info(stage: Stage, product: Option<&str>, message: &str) {
    dispatch(LogLevel::Info, stage, product, message);
}

pub fn warn(stage: Stage, product: Option<&str>, message: &str) {
    dispatch(LogLevel::Warning, stage, product, message);
}

pub fn error(stage: Stage, product: Option<&str>, message: &str) {
    dispatch(LogLevel::Error, stage, product, message);
}

pub fn debug(stage: Stage, product: Option<&str>, message: &str) {
    dispatch(LogLevel::Debug, stage, product, message);
}

// ---------------------------------------------------------------------------
// Build Summary Logging
// ---------------------------------------------------------------------------

/// Log how many products of a build were written.
pub fn log_build_summary(stage: Stage, total: usize, written: usize, failed: usize) {
    let message = format!(
        "Build complete: {}/{} products written, {} failed",
        written, total, failed
    );

    if failed == 0 {
        info(stage, None, &message);
    } else if written == 0 {
        error(stage, None, &message);
    } else {
        warn(stage, None, &message);
    }
}
