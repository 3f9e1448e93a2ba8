//! Data-quality summary of a normalized series.
//!
//! Numbers only: no series is dumped. Range metrics need `HIGH` and `LOW`; close
//! statistics and SMA summaries need a numeric `CLOSE`.

use chrono::{DateTime, SecondsFormat};
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::{frame::Series, schema::CanonicalColumn};

/// Close extremes beyond these multiples of the median flag a suspicious jump.
const JUMP_MAX_RATIO: f64 = 100.0;
const JUMP_MIN_RATIO: f64 = 0.01;

/// Summary of one simple moving average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmaSummary {
    pub last: Option<f64>,
    pub nan_count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub rows: usize,
    pub start: Option<String>,
    pub end: Option<String>,
    pub columns: Vec<String>,
    pub nans_per_column: IndexMap<String, usize>,
    pub dups_timestamps: usize,
    pub candles_count: usize,
    pub mean_range: Option<f64>,
    pub max_range: Option<f64>,
    pub close_min: Option<f64>,
    pub close_max: Option<f64>,
    pub close_median: Option<f64>,
    pub close_max_over_median: Option<f64>,
    pub close_min_over_median: Option<f64>,
    pub suspicious_price_jump: bool,
    /// `SMA_<window>` → summary.
    pub indicators: IndexMap<String, SmaSummary>,
    pub notes: Vec<String>,
}

/// Build a [`QualityReport`] for `series`, with one SMA summary per entry of `sma_windows`.
///
/// Zero-length windows are skipped with a warning.
pub fn data_quality_report(series: &Series, sma_windows: &[usize]) -> QualityReport {
    let fmt_ts = |ts: DateTime<Tz>| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true);
    let nans_per_column: IndexMap<String, usize> = series
        .columns()
        .map(|(name, col)| (name.to_string(), col.missing_count()))
        .collect();
    let dups_timestamps = series.duplicated_count();

    let (mean_range, max_range) = match (
        series.numeric(CanonicalColumn::High.as_str()),
        series.numeric(CanonicalColumn::Low.as_str()),
    ) {
        (Some(high), Some(low)) => {
            let ranges: Vec<f64> = high
                .iter()
                .zip(low)
                .filter_map(|(h, l)| Some((*h)? - (*l)?))
                .collect();
            (mean(&ranges), ranges.iter().copied().reduce(f64::max))
        }
        _ => (None, None),
    };

    let close = series.numeric(CanonicalColumn::Close.as_str());
    let closes: Vec<f64> = close.map(|c| c.iter().flatten().copied().collect()).unwrap_or_default();
    let close_min = closes.iter().copied().reduce(f64::min);
    let close_max = closes.iter().copied().reduce(f64::max);
    let close_median = median(&closes);

    let (close_max_over_median, close_min_over_median) = match (close_min, close_max, close_median) {
        (Some(lo), Some(hi), Some(med)) if med != 0.0 => (Some(hi / med), Some(lo / med)),
        _ => (None, None),
    };
    let suspicious_price_jump = close_max_over_median.is_some_and(|r| r > JUMP_MAX_RATIO)
        || close_min_over_median.is_some_and(|r| r < JUMP_MIN_RATIO);

    let mut indicators = IndexMap::new();
    if let Some(close) = close.filter(|c| !c.is_empty()) {
        for &window in sma_windows {
            if window == 0 {
                warn!(window, "invalid SMA window; skipping");
                continue;
            }
            indicators.insert(format!("SMA_{window}"), summarize(&rolling_mean(close, window)));
        }
    }

    let mut notes = Vec::new();
    if dups_timestamps > 0 {
        notes.push(format!("{dups_timestamps} duplicated timestamps"));
    }
    if nans_per_column.values().any(|&n| n > 0) {
        notes.push("There are NaNs in some columns".to_string());
    }
    if suspicious_price_jump {
        notes.push("Suspicious price jump detected (check max/min vs median)".to_string());
    }

    QualityReport {
        rows: series.len(),
        start: series.index().iter().min().copied().map(fmt_ts),
        end: series.index().iter().max().copied().map(fmt_ts),
        columns: series.column_names().map(str::to_string).collect(),
        nans_per_column,
        dups_timestamps,
        candles_count: series.len(),
        mean_range,
        max_range,
        close_min,
        close_max,
        close_median,
        close_max_over_median,
        close_min_over_median,
        suspicious_price_jump,
        indicators,
        notes,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Trailing mean over `window` rows; a window with at least one value yields a value.
fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut sum = 0.0;
    let mut count = 0usize;
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if let Some(v) = values[i] {
            sum += v;
            count += 1;
        }
        if i >= window {
            if let Some(old) = values[i - window] {
                sum -= old;
                count -= 1;
            }
        }
        out.push((count > 0).then(|| sum / count as f64));
    }
    out
}

fn summarize(sma: &[Option<f64>]) -> SmaSummary {
    let present: Vec<f64> = sma.iter().flatten().copied().collect();
    SmaSummary {
        last: present.last().copied(),
        nan_count: sma.len() - present.len(),
        min: present.iter().copied().reduce(f64::min),
        max: present.iter().copied().reduce(f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Column;
    use chrono::TimeZone;

    fn ts(m: u32) -> DateTime<Tz> {
        Tz::UTC.with_ymd_and_hms(2024, 1, 1, 0, m, 0).unwrap()
    }

    fn series(close: Vec<Option<f64>>) -> Series {
        let n = close.len() as u32;
        let high = close.iter().map(|c| c.map(|v| v + 1.0)).collect();
        let low = close.iter().map(|c| c.map(|v| v - 1.0)).collect();
        Series::new(
            Tz::UTC,
            (0..n).map(ts).collect(),
            IndexMap::from([
                ("HIGH".to_string(), Column::Numeric(high)),
                ("LOW".to_string(), Column::Numeric(low)),
                ("CLOSE".to_string(), Column::Numeric(close)),
            ]),
        )
        .unwrap()
    }

    #[test]
    fn summarizes_prices() {
        let report = data_quality_report(&series(vec![Some(1.0), Some(3.0), None, Some(2.0)]), &[2, 10]);
        assert_eq!(report.rows, 4);
        assert_eq!(report.start.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(report.end.as_deref(), Some("2024-01-01T00:03:00Z"));
        assert_eq!(report.nans_per_column["CLOSE"], 1);
        assert_eq!(report.mean_range, Some(2.0));
        assert_eq!(report.max_range, Some(2.0));
        assert_eq!(report.close_min, Some(1.0));
        assert_eq!(report.close_max, Some(3.0));
        assert_eq!(report.close_median, Some(2.0));
        assert_eq!(report.close_max_over_median, Some(1.5));
        assert!(!report.suspicious_price_jump);
        assert_eq!(report.notes, vec!["There are NaNs in some columns".to_string()]);

        let sma2 = &report.indicators["SMA_2"];
        // [1, 2, 3, 2]
        assert_eq!(sma2.last, Some(2.0));
        assert_eq!(sma2.min, Some(1.0));
        assert_eq!(sma2.max, Some(3.0));
        assert_eq!(sma2.nan_count, 0);
        assert_eq!(report.indicators["SMA_10"].last, Some(2.0));
    }

    #[test]
    fn flags_absurd_jumps() {
        let report = data_quality_report(&series(vec![Some(1.0), Some(1.0), Some(500.0)]), &[]);
        assert!(report.suspicious_price_jump);
        assert_eq!(report.close_max_over_median, Some(500.0));
        assert!(report.notes.iter().any(|n| n.starts_with("Suspicious")));
    }

    #[test]
    fn empty_series_has_no_statistics() {
        let report = data_quality_report(&Series::empty(Tz::UTC), &[10]);
        assert_eq!(report.rows, 0);
        assert_eq!(report.start, None);
        assert_eq!(report.close_median, None);
        assert!(report.indicators.is_empty());
        assert!(report.notes.is_empty());
    }
}
