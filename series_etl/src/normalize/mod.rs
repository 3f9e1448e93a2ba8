//! Normalization: raw frame in, canonical series out.
//!
//! Stages run in a fixed order:
//! 1. [`columns::map_columns`]: canonical column names.
//! 2. [`dtypes::enforce_dtypes`]: required columns and numeric types.
//! 3. [`datetime::normalize_datetime`]: timezone-aware index in the target zone.
//! 4. [`dedupe::remove_duplicates`]: first occurrence wins, sorted ascending.
//!
//! The output index is sorted, duplicate-free and timezone-aware.

pub mod columns;
pub mod datetime;
pub mod dedupe;
pub mod dtypes;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::{config::EtlConfig, error::EngineError, frame::{RawFrame, Series}};

pub use columns::{ColumnMapping, ColumnResolution, map_columns, resolve_columns};
pub use datetime::{DatetimeReport, NaiveTimestampPolicy, TimezoneOptions, TzAction, normalize_datetime};
pub use dedupe::remove_duplicates;
pub use dtypes::enforce_dtypes;

/// Columns every OHLC input must carry unless configured otherwise.
pub const DEFAULT_REQUIRED: [&str; 4] = ["OPEN", "HIGH", "LOW", "CLOSE"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub mapping: ColumnMapping,
    pub required_columns: Vec<String>,
    pub timezone: TimezoneOptions,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            mapping: ColumnMapping::standard(),
            required_columns: DEFAULT_REQUIRED.iter().map(|s| s.to_string()).collect(),
            timezone: TimezoneOptions::default(),
        }
    }
}

impl NormalizeOptions {
    /// Options from a loaded configuration.
    ///
    /// An empty `schema.columns_map` falls back to [`ColumnMapping::standard`].
    pub fn from_config(cfg: &EtlConfig) -> Result<Self, EngineError> {
        let mapping = if cfg.schema.columns_map.is_empty() {
            ColumnMapping::standard()
        } else {
            ColumnMapping::new(&cfg.schema.columns_map)
        };
        let timezone = TimezoneOptions::new(
            &cfg.timezone.target,
            cfg.timezone.source_default.as_deref(),
        )?
        .with_policy(cfg.timezone.policy_if_naive);
        Ok(Self {
            mapping,
            required_columns: cfg.schema.required_columns.clone(),
            timezone,
        })
    }
}

/// Audit record of one [`normalize`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizationReport {
    /// canonical → original
    pub renamed: IndexMap<String, String>,
    pub unmatched: Vec<String>,
    /// Always empty in a returned report; a non-empty list aborts with
    /// [`EngineError::MissingRequiredColumns`].
    pub missing_required: Vec<String>,
    pub numeric_coercions: IndexMap<String, usize>,
    pub datetime_column: String,
    pub coerced_rows: usize,
    pub tz_action: TzAction,
    pub original_tz: Option<String>,
    pub final_tz: String,
    pub ambiguous_count: usize,
    pub nonexistent_shifted: usize,
    pub dropped_invalid_rows: usize,
    pub needs_review: bool,
    pub removed_duplicates: usize,
    pub rows_in: usize,
    pub rows_out: usize,
}

/// Run the full normalization pipeline over `frame`.
pub fn normalize(
    frame: RawFrame,
    options: &NormalizeOptions,
) -> Result<(Series, NormalizationReport), EngineError> {
    let rows_in = frame.len();

    let (frame, resolution) = map_columns(frame, &options.mapping);
    let (frame, numeric_coercions) = enforce_dtypes(frame, &options.required_columns)?;
    let (series, dt) = normalize_datetime(frame, &options.timezone)?;
    let (series, removed_duplicates) = remove_duplicates(series);

    if removed_duplicates > 0 {
        warn!(removed_duplicates, "removed duplicate timestamps (kept first occurrence)");
    }

    let report = NormalizationReport {
        renamed: resolution.renamed,
        unmatched: resolution.unmatched,
        missing_required: Vec::new(),
        numeric_coercions,
        datetime_column: dt.datetime_column,
        coerced_rows: dt.coerced_rows,
        tz_action: dt.tz_action,
        original_tz: dt.original_tz,
        final_tz: dt.final_tz,
        ambiguous_count: dt.ambiguous_count,
        nonexistent_shifted: dt.nonexistent_shifted,
        dropped_invalid_rows: dt.dropped_invalid_rows,
        needs_review: dt.needs_review,
        removed_duplicates,
        rows_in,
        rows_out: series.len(),
    };

    info!(
        rows_in,
        rows_out = report.rows_out,
        tz_action = %report.tz_action,
        needs_review = report.needs_review,
        "normalization complete"
    );
    Ok((series, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Cell;

    fn raw() -> RawFrame {
        RawFrame::new()
            .with_column("Timestamp", ["2024-01-01 00:01", "2024-01-01 00:00", "2024-01-01 00:01"])
            .unwrap()
            .with_column("o", [1.0, 2.0, 3.0])
            .unwrap()
            .with_column("high", [1.5, 2.5, 3.5])
            .unwrap()
            .with_column("low", [0.5, 1.5, 2.5])
            .unwrap()
            .with_column("close", vec![Cell::from(1.2), Cell::from("bad"), Cell::from(3.2)])
            .unwrap()
            .with_column("symbol", ["EURUSD", "EURUSD", "EURUSD"])
            .unwrap()
    }

    #[test]
    fn pipeline_produces_report() {
        let (series, report) = normalize(raw(), &NormalizeOptions::default()).unwrap();
        assert_eq!(series.len(), 2);
        assert!(series.ensure_datetime_index().is_ok());
        assert_eq!(report.renamed.get("OPEN").map(String::as_str), Some("o"));
        assert!(!report.renamed.contains_key("SYMBOL"));
        assert_eq!(report.numeric_coercions["CLOSE"], 1);
        assert_eq!(report.removed_duplicates, 1);
        assert_eq!(report.datetime_column, "Timestamp");
        assert_eq!(report.rows_in, 3);
        assert_eq!(report.rows_out, 2);
        assert!(report.needs_review);
        // The first 00:01 row survives.
        assert_eq!(series.numeric("OPEN"), Some(&[Some(2.0), Some(1.0)][..]));
    }

    #[test]
    fn report_serializes_to_plain_json() {
        let (_, report) = normalize(raw(), &NormalizeOptions::default()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tz_action"], "localized_to_UTC_assumed");
        assert_eq!(json["final_tz"], "UTC");
        assert_eq!(json["renamed"]["OPEN"], "o");
        assert!(json["original_tz"].is_null());
    }
}
