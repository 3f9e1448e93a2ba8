//! OHLC-aware frequency conversion.
//!
//! Aggregation plan, in output column order:
//! - `OPEN` → first, `HIGH` → max, `LOW` → min, `CLOSE` → last
//! - `VOLUME`, `TICKVOL`, `VOL` → sum
//! - `SYMBOL` and other identity columns → last
//! - remaining numeric columns → [`ExtraNumericPolicy`]; remaining text columns are dropped
//!
//! Missing values are skipped by every aggregation. An empty bin (or one with only
//! missing values) sums to 0 and is missing for every other aggregation.

use std::{fmt, ops::Range};

use chrono::DateTime;
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    bucket::Bucketer,
    error::EngineError,
    frame::{Column, Series},
    rule::Rule,
    schema::{CanonicalColumn, ColumnRole, role_of},
};

/// How numeric columns outside the OHLC/volume/identity vocabulary are aggregated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraNumericPolicy {
    #[default]
    Mean,
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    First,
    Last,
    Max,
    Min,
    Sum,
    Mean,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Aggregation::First => "first",
            Aggregation::Last => "last",
            Aggregation::Max => "max",
            Aggregation::Min => "min",
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResampleOptions {
    pub rule: Rule,
    /// Drop bins whose `CLOSE` is missing.
    pub drop_incomplete: bool,
    pub extra_numeric_policy: ExtraNumericPolicy,
}

impl ResampleOptions {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            drop_incomplete: true,
            extra_numeric_policy: ExtraNumericPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResampleReport {
    pub rule: Rule,
    pub aggregations: IndexMap<String, Aggregation>,
    /// Bins from the first to the last occupied one, before the incomplete filter.
    pub bins_total: usize,
    pub dropped_incomplete: usize,
    pub rows_out: usize,
    /// True when the series had no OHLC or volume column and was returned unchanged.
    pub skipped: bool,
}

/// Column → aggregation for `series`, in output order.
pub fn aggregation_plan(series: &Series, extra: ExtraNumericPolicy) -> IndexMap<String, Aggregation> {
    let mut plan = IndexMap::new();
    let ohlc = [
        (CanonicalColumn::Open, Aggregation::First),
        (CanonicalColumn::High, Aggregation::Max),
        (CanonicalColumn::Low, Aggregation::Min),
        (CanonicalColumn::Close, Aggregation::Last),
    ];
    for (col, agg) in ohlc {
        if series.has_column(col.as_str()) {
            plan.insert(col.as_str().to_string(), agg);
        }
    }

    let roles: Vec<(&str, ColumnRole, bool)> = series
        .columns()
        .map(|(name, col)| (name, role_of(name), col.is_numeric()))
        .collect();
    for &(name, role, _) in &roles {
        if role == ColumnRole::VolumeLike {
            plan.insert(name.to_string(), Aggregation::Sum);
        }
    }
    for &(name, role, _) in &roles {
        if role == ColumnRole::Identity {
            plan.insert(name.to_string(), Aggregation::Last);
        }
    }
    let extra_agg = match extra {
        ExtraNumericPolicy::Mean => Aggregation::Mean,
        ExtraNumericPolicy::Sum => Aggregation::Sum,
    };
    for &(name, role, numeric) in &roles {
        if role == ColumnRole::Other && numeric {
            plan.insert(name.to_string(), extra_agg);
        }
    }
    plan
}

/// Aggregate `series` into `options.rule` bins.
///
/// Bins are left-closed and labelled by their start in the series timezone.
/// A series without any OHLC or volume column is returned unchanged with
/// `skipped = true`.
pub fn resample(series: &Series, options: &ResampleOptions) -> Result<(Series, ResampleReport), EngineError> {
    series.ensure_datetime_index()?;
    let rule = options.rule;

    let plan = aggregation_plan(series, options.extra_numeric_policy);
    let has_core = series.column_names().any(|n| role_of(n).is_price_or_volume());
    if !has_core {
        warn!(rule = %rule, "no OHLC or volume columns; resample skipped");
        let report = ResampleReport {
            rule,
            aggregations: IndexMap::new(),
            bins_total: 0,
            dropped_incomplete: 0,
            rows_out: series.len(),
            skipped: true,
        };
        return Ok((series.clone(), report));
    }

    let (labels, ranges) = match series.first_timestamp() {
        Some(first) => bin_rows(series, Bucketer::new(rule, first)?)?,
        None => (Vec::new(), Vec::new()),
    };
    let bins_total = labels.len();

    let mut columns: IndexMap<String, Column> = IndexMap::with_capacity(plan.len());
    for (name, &agg) in &plan {
        let Some(col) = series.column(name) else { continue };
        let out = match col {
            Column::Numeric(values) => Column::Numeric(
                ranges.iter().map(|r| aggregate(&values[r.clone()], agg)).collect(),
            ),
            Column::Text(values) => Column::Text(
                ranges.iter().map(|r| aggregate_text(&values[r.clone()], agg)).collect(),
            ),
        };
        columns.insert(name.clone(), out);
    }

    let mut out = Series::new(series.tz(), labels, columns)?;
    let mut dropped_incomplete = 0;
    let complete: Option<Vec<usize>> = options
        .drop_incomplete
        .then(|| out.numeric(CanonicalColumn::Close.as_str()))
        .flatten()
        .map(|close| (0..close.len()).filter(|&i| close[i].is_some()).collect());
    if let Some(keep) = complete {
        dropped_incomplete = out.len() - keep.len();
        if dropped_incomplete > 0 {
            out = out.take_rows(&keep);
        }
    }

    let report = ResampleReport {
        rule,
        aggregations: plan,
        bins_total,
        dropped_incomplete,
        rows_out: out.len(),
        skipped: false,
    };
    info!(
        rule = %rule,
        rows_in = series.len(),
        rows_out = report.rows_out,
        dropped_incomplete,
        "resample complete"
    );
    Ok((out, report))
}

/// Bin labels from the first to the last occupied bin, and the row range of each.
fn bin_rows(
    series: &Series,
    bucketer: Bucketer,
) -> Result<(Vec<DateTime<Tz>>, Vec<Range<usize>>), EngineError> {
    let ids: Vec<i64> = series.index().iter().map(|&ts| bucketer.bin_id(ts)).collect();
    let (Some(&first_id), Some(&last_id)) = (ids.first(), ids.last()) else {
        return Ok((Vec::new(), Vec::new()));
    };

    let mut labels = Vec::new();
    let mut ranges = Vec::new();
    let mut row = 0;
    for id in first_id..=last_id {
        let start = row;
        while row < ids.len() && ids[row] == id {
            row += 1;
        }
        labels.push(bucketer.bin_start(id)?);
        ranges.push(start..row);
    }
    Ok((labels, ranges))
}

fn aggregate(values: &[Option<f64>], agg: Aggregation) -> Option<f64> {
    let mut present = values.iter().flatten().copied();
    match agg {
        Aggregation::First => present.next(),
        Aggregation::Last => present.last(),
        Aggregation::Max => present.reduce(f64::max),
        Aggregation::Min => present.reduce(f64::min),
        Aggregation::Sum => Some(present.sum()),
        Aggregation::Mean => {
            let (sum, n) = present.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            (n > 0).then(|| sum / n as f64)
        }
    }
}

fn aggregate_text(values: &[Option<String>], agg: Aggregation) -> Option<String> {
    let mut present = values.iter().flatten();
    match agg {
        Aggregation::First => present.next().cloned(),
        _ => present.last().cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32) -> DateTime<Tz> {
        Tz::UTC.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    fn nums(v: &[f64]) -> Column {
        Column::Numeric(v.iter().map(|&x| Some(x)).collect())
    }

    fn ohlcv() -> Series {
        Series::new(
            Tz::UTC,
            (0..6).map(|m| utc(0, m)).collect(),
            IndexMap::from([
                ("OPEN".to_string(), nums(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])),
                ("HIGH".to_string(), nums(&[1.5, 2.5, 9.0, 4.5, 5.5, 6.5])),
                ("LOW".to_string(), nums(&[0.5, 0.1, 2.5, 3.5, 4.5, 5.5])),
                ("CLOSE".to_string(), nums(&[1.2, 2.2, 3.2, 4.2, 5.2, 6.2])),
                ("VOLUME".to_string(), nums(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0])),
                ("SYMBOL".to_string(), Column::Text(vec![Some("EURUSD".into()); 6])),
                ("note".to_string(), Column::Text(vec![Some("x".into()); 6])),
                ("SPREAD".to_string(), nums(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])),
            ]),
        )
        .unwrap()
    }

    #[test]
    fn five_minute_bins_follow_ohlc_semantics() {
        let (out, report) = resample(&ohlcv(), &ResampleOptions::new("5min".parse().unwrap())).unwrap();
        assert_eq!(out.index(), &[utc(0, 0), utc(0, 5)]);
        assert_eq!(out.numeric("OPEN").unwrap()[0], Some(1.0));
        assert_eq!(out.numeric("HIGH").unwrap()[0], Some(9.0));
        assert_eq!(out.numeric("LOW").unwrap()[0], Some(0.1));
        assert_eq!(out.numeric("CLOSE").unwrap()[0], Some(5.2));
        assert_eq!(out.numeric("VOLUME").unwrap()[0], Some(150.0));
        assert_eq!(out.numeric("SPREAD").unwrap()[0], Some(3.0));
        assert_eq!(out.text("SYMBOL").unwrap()[1].as_deref(), Some("EURUSD"));
        assert!(!out.has_column("note"));
        let names: Vec<&str> = out.column_names().collect();
        assert_eq!(names, vec!["OPEN", "HIGH", "LOW", "CLOSE", "VOLUME", "SYMBOL", "SPREAD"]);
        assert_eq!(report.aggregations["SPREAD"], Aggregation::Mean);
        assert_eq!(report.bins_total, 2);
        assert!(!report.skipped);
    }

    #[test]
    fn empty_bins_are_emitted_then_dropped_when_incomplete() {
        let s = Series::new(
            Tz::UTC,
            vec![utc(0, 0), utc(0, 12)],
            IndexMap::from([
                ("CLOSE".to_string(), nums(&[1.0, 2.0])),
                ("VOLUME".to_string(), nums(&[5.0, 7.0])),
            ]),
        )
        .unwrap();
        let mut opts = ResampleOptions::new("5min".parse().unwrap());
        opts.drop_incomplete = false;
        let (kept, report) = resample(&s, &opts).unwrap();
        assert_eq!(report.bins_total, 3);
        assert_eq!(kept.numeric("CLOSE").unwrap()[1], None);
        assert_eq!(kept.numeric("VOLUME").unwrap()[1], Some(0.0));

        opts.drop_incomplete = true;
        let (dropped, report) = resample(&s, &opts).unwrap();
        assert_eq!(report.dropped_incomplete, 1);
        assert_eq!(dropped.index(), &[utc(0, 0), utc(0, 10)]);
        assert!(dropped.numeric("CLOSE").unwrap().iter().all(Option::is_some));
    }

    #[test]
    fn series_without_ohlc_is_left_alone() {
        let s = Series::new(
            Tz::UTC,
            vec![utc(0, 0), utc(0, 1)],
            IndexMap::from([("SPREAD".to_string(), nums(&[1.0, 2.0]))]),
        )
        .unwrap();
        let (out, report) = resample(&s, &ResampleOptions::new("5min".parse().unwrap())).unwrap();
        assert!(report.skipped);
        assert_eq!(out, s);
    }

    #[test]
    fn extra_numeric_sum_policy() {
        let mut opts = ResampleOptions::new("1h".parse().unwrap());
        opts.extra_numeric_policy = ExtraNumericPolicy::Sum;
        let (out, report) = resample(&ohlcv(), &opts).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.numeric("SPREAD").unwrap()[0], Some(21.0));
        assert_eq!(report.aggregations["SPREAD"], Aggregation::Sum);
    }

    #[test]
    fn daily_bins_use_local_midnight() {
        let ny: Tz = "America/New_York".parse().unwrap();
        let idx = vec![
            ny.with_ymd_and_hms(2024, 3, 9, 23, 0, 0).unwrap(),
            ny.with_ymd_and_hms(2024, 3, 10, 1, 0, 0).unwrap(),
            ny.with_ymd_and_hms(2024, 3, 10, 23, 0, 0).unwrap(),
        ];
        let s = Series::new(ny, idx, IndexMap::from([("CLOSE".to_string(), nums(&[1.0, 2.0, 3.0]))])).unwrap();
        let (out, _) = resample(&s, &ResampleOptions::new("1D".parse().unwrap())).unwrap();
        assert_eq!(
            out.index(),
            &[
                ny.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap(),
                ny.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
            ]
        );
        assert_eq!(out.numeric("CLOSE"), Some(&[Some(1.0), Some(3.0)][..]));
    }
}
