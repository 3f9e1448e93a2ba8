//! Datetime index construction and timezone normalization.
//!
//! The first column named `datetime`, `timestamp` or `time` (any case) becomes
//! the index. Cells that do not parse are invalid, never fatal. Naive entries are
//! localized in the source timezone (or UTC when none is given) under
//! [`DstPolicy::NORMALIZE`]; offset-carrying entries keep their instant. Everything
//! ends up converted into the target timezone, and rows whose timestamp is still
//! invalid are dropped.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, warn};

use crate::{
    error::EngineError,
    frame::{Column, Frame, Series},
    schema::{DATETIME_ALIASES, is_datetime_alias},
    tz::{DstPolicy, Localized, ParsedTimestamp, describe_offset, localize, parse_tz, parse_timestamp},
};

/// What to do with a naive index when no source timezone is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaiveTimestampPolicy {
    /// Localize to UTC and flag the run for review.
    #[default]
    AssumeUtc,
    /// Fail with [`EngineError::MissingSourceTimezone`].
    RequireSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneOptions {
    pub target: Tz,
    pub source: Option<Tz>,
    pub policy_if_naive: NaiveTimestampPolicy,
}

impl TimezoneOptions {
    /// Resolve timezone names; unknown names fail with [`EngineError::InvalidTimezoneName`].
    pub fn new(target: &str, source: Option<&str>) -> Result<Self, EngineError> {
        Ok(Self {
            target: parse_tz(target)?,
            source: source.map(parse_tz).transpose()?,
            policy_if_naive: NaiveTimestampPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: NaiveTimestampPolicy) -> Self {
        self.policy_if_naive = policy;
        self
    }
}

impl Default for TimezoneOptions {
    fn default() -> Self {
        Self {
            target: Tz::UTC,
            source: None,
            policy_if_naive: NaiveTimestampPolicy::default(),
        }
    }
}

/// How the index acquired its timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TzAction {
    AlreadyAware,
    LocalizedTo(String),
    LocalizedToUtcAssumed,
}

impl fmt::Display for TzAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TzAction::AlreadyAware => f.write_str("already_aware"),
            TzAction::LocalizedTo(tz) => write!(f, "localized_to_{tz}"),
            TzAction::LocalizedToUtcAssumed => f.write_str("localized_to_UTC_assumed"),
        }
    }
}

impl Serialize for TzAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatetimeReport {
    pub datetime_column: String,
    /// Entries that failed to parse, including empty ones.
    pub coerced_rows: usize,
    pub tz_action: TzAction,
    /// Offset carried by the input (`"UTC"`, `"+01:00"`, `"mixed"`); `None` for naive input.
    pub original_tz: Option<String>,
    pub final_tz: String,
    /// Entries invalidated by DST localization.
    pub ambiguous_count: usize,
    pub nonexistent_shifted: usize,
    pub dropped_invalid_rows: usize,
    pub needs_review: bool,
}

/// Locate the datetime column, build a timezone-aware index and convert it to the target zone.
///
/// The returned series keeps input row order; sorting happens in the duplicate stage.
pub fn normalize_datetime(
    frame: Frame,
    options: &TimezoneOptions,
) -> Result<(Series, DatetimeReport), EngineError> {
    let datetime_column = frame
        .column_names()
        .find(|name| is_datetime_alias(name))
        .map(str::to_string)
        .ok_or_else(|| EngineError::MissingDatetimeColumn {
            candidates: DATETIME_ALIASES.iter().map(|s| s.to_string()).collect(),
        })?;

    let (mut columns, len) = frame.into_parts();
    let raw = columns
        .shift_remove(&datetime_column)
        .unwrap_or(Column::Text(vec![None; len]));

    let parsed: Vec<Option<ParsedTimestamp>> = match &raw {
        Column::Text(values) => values
            .iter()
            .map(|v| v.as_deref().and_then(parse_timestamp))
            .collect(),
        // Bare numbers carry no unit or epoch; they are not timestamps.
        Column::Numeric(values) => vec![None; values.len()],
    };
    let coerced_rows = parsed.iter().filter(|p| p.is_none()).count();

    let offsets: Vec<FixedOffset> = parsed
        .iter()
        .filter_map(|p| match p {
            Some(ParsedTimestamp::Aware(dt)) => Some(*dt.offset()),
            _ => None,
        })
        .collect();
    let any_naive = parsed
        .iter()
        .any(|p| matches!(p, Some(ParsedTimestamp::Naive(_))));
    let is_aware = !offsets.is_empty() && !any_naive;
    let original_tz = offsets.first().map(|first| {
        if offsets.iter().all(|o| o == first) {
            describe_offset(*first)
        } else {
            "mixed".to_string()
        }
    });

    let (tz_action, source) = if is_aware {
        (TzAction::AlreadyAware, Tz::UTC)
    } else {
        match (options.source, options.policy_if_naive) {
            (Some(src), _) => (TzAction::LocalizedTo(src.name().to_string()), src),
            (None, NaiveTimestampPolicy::RequireSource) => {
                return Err(EngineError::MissingSourceTimezone);
            }
            (None, NaiveTimestampPolicy::AssumeUtc) => {
                warn!("timestamps are naive and no source timezone was given; assuming UTC");
                (TzAction::LocalizedToUtcAssumed, Tz::UTC)
            }
        }
    };

    let target = options.target;
    let mut ambiguous_count = 0;
    let mut nonexistent_shifted = 0;
    let mut keep = Vec::with_capacity(parsed.len());
    let mut index = Vec::with_capacity(parsed.len());
    for (row, p) in parsed.into_iter().enumerate() {
        let instant: Option<DateTime<Tz>> = match p {
            None => None,
            Some(ParsedTimestamp::Aware(dt)) => Some(dt.with_timezone(&target)),
            Some(ParsedTimestamp::Naive(naive)) => match localize(naive, source, DstPolicy::NORMALIZE) {
                Localized::Exact(dt) | Localized::Disambiguated(dt) => Some(dt),
                Localized::ShiftedForward(dt) => {
                    nonexistent_shifted += 1;
                    Some(dt)
                }
                Localized::Ambiguous | Localized::Nonexistent => {
                    ambiguous_count += 1;
                    None
                }
            },
        };
        if let Some(dt) = instant {
            keep.push(row);
            index.push(dt.with_timezone(&target));
        }
    }

    let dropped_invalid_rows = len - keep.len();
    if ambiguous_count > 0 {
        warn!(ambiguous_count, tz = source.name(), "local timestamps invalidated by DST transitions");
    }
    if nonexistent_shifted > 0 {
        debug!(nonexistent_shifted, "shifted nonexistent local timestamps forward");
    }
    if dropped_invalid_rows > 0 {
        debug!(dropped_invalid_rows, "dropped rows with invalid timestamps");
    }

    let columns = columns
        .into_iter()
        .map(|(name, col)| {
            let col = if keep.len() == len { col } else { col.take(&keep) };
            (name, col)
        })
        .collect();
    let series = Series::new(target, index, columns)?;

    let needs_review = tz_action == TzAction::LocalizedToUtcAssumed || ambiguous_count > 0;
    let report = DatetimeReport {
        datetime_column,
        coerced_rows,
        tz_action,
        original_tz,
        final_tz: target.name().to_string(),
        ambiguous_count,
        nonexistent_shifted,
        dropped_invalid_rows,
        needs_review,
    };
    Ok((series, report))
}
