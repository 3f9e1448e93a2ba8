//! In-memory tables moving through the pipeline.
//!
//! - [`RawFrame`]: untyped cells exactly as a reader produced them.
//! - [`Frame`]: typed columns ([`Column`]) without an index, produced by the dtype stage.
//! - [`Series`]: typed columns keyed by a timezone-aware timestamp index.
//!
//! Missing values are `None` inside a [`Column`]; there is no NaN sentinel.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use indexmap::IndexMap;

use crate::error::EngineError;

/// One untyped input value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Missing => true,
            Cell::Number(v) => v.is_nan(),
            Cell::Text(_) => false,
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Number(v as f64)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map_or(Cell::Missing, Into::into)
    }
}

/// Column-oriented table of untyped cells, in input column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    columns: IndexMap<String, Vec<Cell>>,
    len: usize,
}

impl RawFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`RawFrame::push_column`].
    pub fn with_column<I, C>(mut self, name: impl Into<String>, cells: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        self.push_column(name, cells.into_iter().map(Into::into).collect())?;
        Ok(self)
    }

    /// Append a column; the first column fixes the row count.
    pub fn push_column(&mut self, name: impl Into<String>, cells: Vec<Cell>) -> Result<(), EngineError> {
        let name = name.into();
        if self.columns.contains_key(&name) {
            return Err(EngineError::DuplicateColumn(name));
        }
        if !self.columns.is_empty() && cells.len() != self.len {
            return Err(EngineError::ColumnLengthMismatch {
                name,
                expected: self.len,
                actual: cells.len(),
            });
        }
        self.len = cells.len();
        self.columns.insert(name, cells);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub(crate) fn into_columns(self) -> IndexMap<String, Vec<Cell>> {
        self.columns
    }

    pub(crate) fn from_columns(columns: IndexMap<String, Vec<Cell>>, len: usize) -> Self {
        Self { columns, len }
    }
}

/// A typed column. `None` marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }

    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match self {
            Column::Numeric(v) => Some(v),
            Column::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&[Option<String>]> {
        match self {
            Column::Text(v) => Some(v),
            Column::Numeric(_) => None,
        }
    }

    pub fn missing_count(&self) -> usize {
        match self {
            Column::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            Column::Text(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Rows at `positions`, in that order.
    pub(crate) fn take(&self, positions: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(positions.iter().map(|&i| v[i]).collect()),
            Column::Text(v) => Column::Text(positions.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// Rows at `positions`, with `None` positions becoming missing values.
    pub(crate) fn reindex(&self, positions: &[Option<usize>]) -> Column {
        match self {
            Column::Numeric(v) => {
                Column::Numeric(positions.iter().map(|p| p.and_then(|i| v[i])).collect())
            }
            Column::Text(v) => Column::Text(
                positions
                    .iter()
                    .map(|p| p.and_then(|i| v[i].clone()))
                    .collect(),
            ),
        }
    }
}

/// Typed columns without an index, in input column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: IndexMap<String, Column>,
    len: usize,
}

impl Frame {
    pub fn new(columns: IndexMap<String, Column>) -> Result<Self, EngineError> {
        let len = check_lengths(&columns, None)?;
        Ok(Self { columns, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub(crate) fn into_parts(self) -> (IndexMap<String, Column>, usize) {
        (self.columns, self.len)
    }
}

/// Typed columns keyed by a timezone-aware timestamp index.
///
/// Construction only checks shapes. Ordering and uniqueness are established by
/// [`crate::normalize::normalize`] and verified on entry to the gap and resample
/// stages via [`Series::ensure_datetime_index`].
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    tz: Tz,
    index: Vec<DateTime<Tz>>,
    columns: IndexMap<String, Column>,
}

impl Series {
    /// Build a series; every index entry is converted into `tz`.
    pub fn new(
        tz: Tz,
        index: Vec<DateTime<Tz>>,
        columns: IndexMap<String, Column>,
    ) -> Result<Self, EngineError> {
        check_lengths(&columns, Some(index.len()))?;
        let index = index.into_iter().map(|ts| ts.with_timezone(&tz)).collect();
        Ok(Self { tz, index, columns })
    }

    /// A series with no rows and no columns.
    pub fn empty(tz: Tz) -> Self {
        Self {
            tz,
            index: Vec::new(),
            columns: IndexMap::new(),
        }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Tz>] {
        &self.index
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Tz>> {
        self.index.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Tz>> {
        self.index.last().copied()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Numeric values of `name`, or `None` if absent or textual.
    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).and_then(Column::as_numeric)
    }

    /// Text values of `name`, or `None` if absent or numeric.
    pub fn text(&self, name: &str) -> Option<&[Option<String>]> {
        self.columns.get(name).and_then(Column::as_text)
    }

    /// Fails with [`EngineError::IndexNotDatetime`] unless the index is strictly ascending.
    pub fn ensure_datetime_index(&self) -> Result<(), EngineError> {
        for (pos, pair) in self.index.windows(2).enumerate() {
            if pair[1] == pair[0] {
                return Err(EngineError::IndexNotDatetime {
                    reason: format!("duplicate timestamp {} at row {}", pair[1], pos + 1),
                });
            }
            if pair[1] < pair[0] {
                return Err(EngineError::IndexNotDatetime {
                    reason: format!("index not sorted ascending at row {}", pos + 1),
                });
            }
        }
        Ok(())
    }

    /// Count of index entries equal to an earlier entry.
    pub fn duplicated_count(&self) -> usize {
        let mut seen: HashSet<NaiveDateTime> = HashSet::with_capacity(self.index.len());
        self.index
            .iter()
            .filter(|ts| !seen.insert(ts.naive_utc()))
            .count()
    }

    /// Rows at `positions`, in that order.
    pub(crate) fn take_rows(&self, positions: &[usize]) -> Series {
        Series {
            tz: self.tz,
            index: positions.iter().map(|&i| self.index[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, col)| (name.clone(), col.take(positions)))
                .collect(),
        }
    }
}

fn check_lengths(
    columns: &IndexMap<String, Column>,
    expected: Option<usize>,
) -> Result<usize, EngineError> {
    let mut expected = expected;
    for (name, col) in columns {
        match expected {
            Some(n) if n != col.len() => {
                return Err(EngineError::ColumnLengthMismatch {
                    name: name.clone(),
                    expected: n,
                    actual: col.len(),
                });
            }
            Some(_) => {}
            None => expected = Some(col.len()),
        }
    }
    Ok(expected.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(min: u32) -> DateTime<Tz> {
        Tz::UTC.with_ymd_and_hms(2024, 1, 1, 0, min, 0).unwrap()
    }

    #[test]
    fn raw_frame_rejects_ragged_and_duplicate_columns() {
        let frame = RawFrame::new().with_column("a", [1.0, 2.0]).unwrap();
        let err = frame.clone().with_column("b", [1.0]).unwrap_err();
        assert!(matches!(err, EngineError::ColumnLengthMismatch { expected: 2, actual: 1, .. }));

        let err = frame.with_column("a", [3.0, 4.0]).unwrap_err();
        assert_eq!(err, EngineError::DuplicateColumn("a".into()));
    }

    #[test]
    fn nan_numbers_count_as_missing_cells() {
        assert!(Cell::Number(f64::NAN).is_missing());
        assert!(Cell::from(None::<f64>).is_missing());
        assert!(!Cell::from("x").is_missing());
    }

    #[test]
    fn series_index_checks() {
        let cols = IndexMap::from([("CLOSE".to_string(), Column::Numeric(vec![Some(1.0), Some(2.0)]))]);
        let ok = Series::new(Tz::UTC, vec![ts(0), ts(1)], cols.clone()).unwrap();
        assert!(ok.ensure_datetime_index().is_ok());

        let unsorted = Series::new(Tz::UTC, vec![ts(1), ts(0)], cols.clone()).unwrap();
        assert!(matches!(
            unsorted.ensure_datetime_index(),
            Err(EngineError::IndexNotDatetime { .. })
        ));

        let dup = Series::new(Tz::UTC, vec![ts(1), ts(1)], cols).unwrap();
        assert_eq!(dup.duplicated_count(), 1);
        assert!(dup.ensure_datetime_index().is_err());
    }

    #[test]
    fn reindex_inserts_missing_rows() {
        let col = Column::Text(vec![Some("a".into()), Some("b".into())]);
        let out = col.reindex(&[Some(0), None, Some(1)]);
        assert_eq!(out, Column::Text(vec![Some("a".into()), None, Some("b".into())]));
        assert_eq!(out.missing_count(), 1);
    }
}
