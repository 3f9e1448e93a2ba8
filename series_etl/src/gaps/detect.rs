//! Missing-timestamp detection against the expected grid.

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeDelta};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::{
    bucket::{advance, expected_grid},
    error::EngineError,
    frame::Series,
    rule::Rule,
};

/// Gaps of at least this many minutes are `long_gap` (unless shorter rules apply first).
const LONG_GAP_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapClass {
    ShortGap,
    MediumGap,
    OvernightGap,
    LongGap,
}

impl fmt::Display for GapClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GapClass::ShortGap => "short_gap",
            GapClass::MediumGap => "medium_gap",
            GapClass::OvernightGap => "overnight_gap",
            GapClass::LongGap => "long_gap",
        })
    }
}

/// One maximal run of missing grid points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GapInfo {
    /// First missing grid point.
    #[serde(serialize_with = "rfc3339")]
    pub start: DateTime<Tz>,
    /// Last missing grid point (inclusive).
    #[serde(serialize_with = "rfc3339")]
    pub end: DateTime<Tz>,
    /// Grid point right after the gap.
    #[serde(serialize_with = "rfc3339")]
    pub resume_at: DateTime<Tz>,
    /// `resume_at - start`: the missing span including the last step.
    #[serde(rename = "length_seconds", serialize_with = "seconds")]
    pub length: TimeDelta,
    pub missing_count: usize,
    pub classification: GapClass,
}

fn rfc3339<S: Serializer>(ts: &DateTime<Tz>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn seconds<S: Serializer>(d: &TimeDelta, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(d.num_seconds())
}

/// Classify a gap.
///
/// In order: short when the whole-minute length is within `short_gap_minutes`;
/// overnight when `start` and `resume_at` (the first grid point after the gap)
/// fall on different local dates; long from 24h; medium otherwise.
pub fn classify_gap(
    length: TimeDelta,
    start: DateTime<Tz>,
    resume_at: DateTime<Tz>,
    short_gap_minutes: i64,
) -> GapClass {
    let minutes = length.num_minutes();
    if minutes <= short_gap_minutes {
        GapClass::ShortGap
    } else if start.date_naive() != resume_at.date_naive() {
        GapClass::OvernightGap
    } else if minutes >= LONG_GAP_MINUTES {
        GapClass::LongGap
    } else {
        GapClass::MediumGap
    }
}

/// Expected grid plus, for every grid point, the row of the series sitting on it.
#[derive(Debug)]
pub(crate) struct GridScan {
    pub grid: Vec<DateTime<Tz>>,
    pub rows: Vec<Option<usize>>,
    pub gaps: Vec<GapInfo>,
}

pub(crate) fn scan(series: &Series, rule: Rule, short_gap_minutes: i64) -> Result<GridScan, EngineError> {
    series.ensure_datetime_index()?;
    let (Some(first), Some(last)) = (series.first_timestamp(), series.last_timestamp()) else {
        return Ok(GridScan {
            grid: Vec::new(),
            rows: Vec::new(),
            gaps: Vec::new(),
        });
    };

    let grid = expected_grid(first, last, rule)?;
    let index = series.index();
    let mut rows = Vec::with_capacity(grid.len());
    let mut p = 0;
    for point in &grid {
        while p < index.len() && index[p] < *point {
            p += 1;
        }
        rows.push((p < index.len() && index[p] == *point).then_some(p));
    }

    let mut gaps = Vec::new();
    let mut k = 0;
    while k < grid.len() {
        if rows[k].is_some() {
            k += 1;
            continue;
        }
        let run_start = k;
        while k < grid.len() && rows[k].is_none() {
            k += 1;
        }
        let start = grid[run_start];
        let end = grid[k - 1];
        let resume_at = match grid.get(k) {
            Some(next) => *next,
            None => advance(end, rule)?,
        };
        let length = resume_at - start;
        gaps.push(GapInfo {
            start,
            end,
            resume_at,
            length,
            missing_count: k - run_start,
            classification: classify_gap(length, start, resume_at, short_gap_minutes),
        });
    }

    debug!(
        grid_points = grid.len(),
        gaps = gaps.len(),
        rule = %rule,
        "scanned series against expected grid"
    );
    Ok(GridScan { grid, rows, gaps })
}

/// Find and classify every run of missing grid points.
///
/// The grid runs from the first to the last timestamp of `series` at `rule`
/// spacing. Fails with [`EngineError::IndexNotDatetime`] when the index is not
/// strictly ascending.
pub fn detect_gaps(
    series: &Series,
    rule: Rule,
    short_gap_minutes: i64,
) -> Result<Vec<GapInfo>, EngineError> {
    scan(series, rule, short_gap_minutes).map(|s| s.gaps)
}
