//! Reindex onto the expected grid and fill by policy.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    error::EngineError,
    frame::{Column, Series},
    gaps::detect::{GapInfo, scan},
    rule::Rule,
    schema::CanonicalColumn,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOptions {
    pub rule: Rule,
    pub short_gap_minutes: i64,
    /// Columns forward-filled after interpolation (absent names are ignored).
    pub ffill_columns: Vec<String>,
    /// Linearly interpolate `OPEN`, `HIGH`, `LOW`, `CLOSE`.
    pub interpolate_prices: bool,
}

impl RepairOptions {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            short_gap_minutes: 5,
            ffill_columns: Vec::new(),
            interpolate_prices: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GapRepairReport {
    pub detected_gaps: Vec<GapInfo>,
    /// Cells changed by forward fill, per requested column present in the series.
    pub filled_counts: IndexMap<String, usize>,
    /// Cells changed by interpolation, per price column present in the series.
    pub interpolated_counts: IndexMap<String, usize>,
    /// Missing values left in every column after repair.
    pub remaining_nans: IndexMap<String, usize>,
    pub rows_before: usize,
    pub rows_after: usize,
    /// Input rows whose timestamp is not a grid point.
    pub off_grid_dropped: usize,
}

/// Reindex `series` onto its expected grid, then interpolate and forward-fill.
///
/// The output has exactly one row per grid point. Gaps are detected once and
/// returned in the report.
pub fn repair_gaps(
    series: &Series,
    options: &RepairOptions,
) -> Result<(Series, GapRepairReport), EngineError> {
    let scanned = scan(series, options.rule, options.short_gap_minutes)?;
    let rows_before = series.len();
    let on_grid = scanned.rows.iter().filter(|r| r.is_some()).count();
    let off_grid_dropped = rows_before - on_grid;
    if off_grid_dropped > 0 {
        debug!(off_grid_dropped, rule = %options.rule, "dropped rows off the expected grid");
    }

    let mut columns: IndexMap<String, Column> = series
        .columns()
        .map(|(name, col)| (name.to_string(), col.reindex(&scanned.rows)))
        .collect();

    let mut interpolated_counts = IndexMap::new();
    if options.interpolate_prices {
        for price in CanonicalColumn::PRICES {
            if let Some(Column::Numeric(values)) = columns.get_mut(price.as_str()) {
                interpolated_counts.insert(price.to_string(), interpolate_linear(values));
            }
        }
    }

    let mut filled_counts = IndexMap::new();
    for name in &options.ffill_columns {
        if let Some(col) = columns.get_mut(name) {
            filled_counts.insert(name.clone(), forward_fill(col));
        }
    }

    let remaining_nans = columns
        .iter()
        .map(|(name, col)| (name.clone(), col.missing_count()))
        .collect();

    let repaired = Series::new(series.tz(), scanned.grid, columns)?;
    let report = GapRepairReport {
        detected_gaps: scanned.gaps,
        filled_counts,
        interpolated_counts,
        remaining_nans,
        rows_before,
        rows_after: repaired.len(),
        off_grid_dropped,
    };
    info!(
        gaps = report.detected_gaps.len(),
        rows_before,
        rows_after = report.rows_after,
        "gap repair complete"
    );
    Ok((repaired, report))
}

/// Positional linear interpolation; cells before the first or after the last
/// known value take that value. Returns the number of cells filled.
fn interpolate_linear(values: &mut [Option<f64>]) -> usize {
    let known: Vec<usize> = (0..values.len()).filter(|&i| values[i].is_some()).collect();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return 0;
    };

    let mut filled = 0;
    for i in 0..values.len() {
        if values[i].is_some() {
            continue;
        }
        let v = if i < first {
            values[first]
        } else if i > last {
            values[last]
        } else {
            // `known` is sorted; the insertion point sits between two known positions.
            let hi = known.partition_point(|&k| k < i);
            let (x0, x1) = (known[hi - 1], known[hi]);
            match (values[x0], values[x1]) {
                (Some(y0), Some(y1)) => {
                    Some(y0 + (y1 - y0) * (i - x0) as f64 / (x1 - x0) as f64)
                }
                _ => None,
            }
        };
        if v.is_some() {
            values[i] = v;
            filled += 1;
        }
    }
    filled
}

/// Carry the last present value forward. Returns the number of cells filled.
fn forward_fill(column: &mut Column) -> usize {
    fn fill<T: Clone>(values: &mut [Option<T>]) -> usize {
        let mut last: Option<T> = None;
        let mut filled = 0;
        for v in values.iter_mut() {
            match v {
                Some(x) => last = Some(x.clone()),
                None => {
                    if let Some(prev) = &last {
                        *v = Some(prev.clone());
                        filled += 1;
                    }
                }
            }
        }
        filled
    }
    match column {
        Column::Numeric(values) => fill(values),
        Column::Text(values) => fill(values),
    }
}
