//! Error types for caldav-engine operations.

use thiserror::Error;

/// Errors that abort a poll cycle.
///
/// Every variant is fatal for the cycle that raised it: no commands fire and
/// the persisted active windows are left as they were.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The calendar source could not be read.
    #[error("Calendar source unavailable: {0}")]
    SourceFetch(String),

    /// The calendar text is structurally broken.
    /// Includes the 1-based line number where the error was detected.
    #[error("Calendar parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A `DT*` property carried text that is not an iCalendar date-time.
    #[error("Invalid date-time in {property}: {value:?}")]
    InvalidDateTime { property: String, value: String },

    /// A recurrence rule could not be parsed or expanded.
    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Persisted active-window state could not be read or written.
    #[error("Active window state error: {0}")]
    State(#[from] serde_json::Error),
}

/// Convenience alias used throughout caldav-engine.
pub type Result<T> = std::result::Result<T, EngineError>;
