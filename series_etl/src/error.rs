use chrono::NaiveDateTime;
use thiserror::Error;

/// The unified error type for the `series_etl` engine.
///
/// Every variant is fatal for the stage that raised it. Per-cell problems
/// (bad numbers, bad timestamps, DST ambiguity) never surface here; they are
/// counted in the stage reports instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// None of the recognized datetime aliases is present in the frame.
    #[error("No datetime column found (looked for {})", .candidates.join(", "))]
    MissingDatetimeColumn { candidates: Vec<String> },

    /// Required canonical columns are absent after column mapping.
    ///
    /// `missing` always lists every absent column, in the order they were required.
    #[error("Missing required column(s): {}", .missing.join(", "))]
    MissingRequiredColumns { missing: Vec<String> },

    /// A timezone identifier could not be resolved against the IANA database.
    #[error("Invalid timezone name: {name}")]
    InvalidTimezoneName { name: String },

    /// Timestamps are naive, no source timezone was given, and policy forbids assuming UTC.
    #[error("Timestamps are timezone-naive and no source timezone was provided")]
    MissingSourceTimezone,

    /// The series index violates the sorted, duplicate-free datetime precondition.
    #[error("Index is not a valid datetime index: {reason}")]
    IndexNotDatetime { reason: String },

    /// A local wall-clock boundary could not be resolved in the series timezone.
    #[error("Cannot resolve local time {local} in timezone {tz}: {reason}")]
    TimezoneConversion {
        tz: String,
        local: NaiveDateTime,
        reason: String,
    },

    /// A grid rule string does not follow the `<amount><unit>` grammar.
    #[error("Invalid grid rule '{input}': {reason}")]
    InvalidRule { input: String, reason: String },

    /// A column has a different number of rows than the rest of the frame.
    #[error("Column '{name}' has {actual} rows, expected {expected}")]
    ColumnLengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Two columns share the same name.
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    /// Grid arithmetic left the representable timestamp range.
    #[error("Timestamp arithmetic overflowed near {0}")]
    TimestampOutOfRange(NaiveDateTime),
}
