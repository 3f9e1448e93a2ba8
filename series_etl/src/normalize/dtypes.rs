//! Required-column enforcement and numeric coercion.

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    error::EngineError,
    frame::{Cell, Column, Frame, RawFrame},
    schema::CanonicalColumn,
};

/// Check `required` against the frame and type every column.
///
/// Canonical numeric columns are coerced cell by cell; a present value that
/// does not parse becomes missing and is counted. Any other column is numeric
/// when all of its present cells are numbers, and text otherwise.
///
/// Returns the typed frame and per-column coercion counts (canonical numeric
/// columns only, zero counts included).
pub fn enforce_dtypes(
    frame: RawFrame,
    required: &[String],
) -> Result<(Frame, IndexMap<String, usize>), EngineError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| frame.column(name).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::MissingRequiredColumns { missing });
    }

    let mut coercions = IndexMap::new();
    let mut columns = IndexMap::new();
    for (name, cells) in frame.into_columns() {
        let column = match CanonicalColumn::from_name(&name) {
            Some(c) if c.is_numeric() => {
                let (values, invalid) = coerce_numeric(&cells);
                if invalid > 0 {
                    debug!(column = %name, invalid, "coerced unparseable values to missing");
                }
                coercions.insert(name.clone(), invalid);
                Column::Numeric(values)
            }
            _ => infer_column(cells),
        };
        columns.insert(name, column);
    }
    Ok((Frame::new(columns)?, coercions))
}

/// Parse a numeric cell, `None` when absent or unparseable.
pub fn parse_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Missing => None,
        Cell::Number(v) => (!v.is_nan()).then_some(*v),
        Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|v| !v.is_nan()),
    }
}

fn coerce_numeric(cells: &[Cell]) -> (Vec<Option<f64>>, usize) {
    let mut invalid = 0;
    let values = cells
        .iter()
        .map(|cell| {
            let parsed = parse_number(cell);
            if parsed.is_none() && !is_blank(cell) {
                invalid += 1;
            }
            parsed
        })
        .collect();
    (values, invalid)
}

fn is_blank(cell: &Cell) -> bool {
    match cell {
        Cell::Text(s) => s.trim().is_empty(),
        other => other.is_missing(),
    }
}

fn infer_column(cells: Vec<Cell>) -> Column {
    let all_numbers = cells
        .iter()
        .all(|c| matches!(c, Cell::Number(_) | Cell::Missing));
    if all_numbers {
        return Column::Numeric(cells.iter().map(parse_number).collect());
    }
    Column::Text(
        cells
            .into_iter()
            .map(|c| match c {
                Cell::Missing => None,
                Cell::Number(v) if v.is_nan() => None,
                Cell::Number(v) => Some(v.to_string()),
                Cell::Text(s) => Some(s),
            })
            .collect(),
    )
}
