//! CSV reader and writer.
//!
//! Reading produces a [`RawFrame`]: empty fields are missing, numeric-looking
//! fields are numbers, everything else is text. Datetime-alias columns always
//! stay text so compact dates such as `20240102` are not read as numbers.
//!
//! Writing emits a leading `datetime` column in RFC 3339 followed by every
//! series column; missing values are empty fields.

use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

use anyhow::Context;
use chrono::SecondsFormat;

use crate::{
    frame::{Cell, Column, RawFrame, Series},
    schema::is_datetime_alias,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

/// Read a CSV file with a header row.
pub fn read_csv(path: impl AsRef<Path>, options: &CsvOptions) -> anyhow::Result<RawFrame> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_csv_from(file, options).with_context(|| format!("read CSV {}", path.display()))
}

/// Read CSV from any reader with a header row.
pub fn read_csv_from<R: Read>(reader: R, options: &CsvOptions) -> anyhow::Result<RawFrame> {
    let mut rdr = ::csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .trim(::csv::Trim::Headers)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .context("read CSV header")?
        .iter()
        .map(str::to_string)
        .collect();
    let text_only: Vec<bool> = headers.iter().map(|h| is_datetime_alias(h)).collect();

    let mut cells: Vec<Vec<Cell>> = vec![Vec::new(); headers.len()];
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("CSV record {}", line + 1))?;
        for (col, field) in record.iter().enumerate() {
            if let Some(column) = cells.get_mut(col) {
                column.push(parse_field(field, text_only[col]));
            }
        }
    }

    let mut frame = RawFrame::new();
    for (name, column) in headers.into_iter().zip(cells) {
        frame
            .push_column(name, column)
            .context("assemble CSV columns")?;
    }
    Ok(frame)
}

fn parse_field(field: &str, text_only: bool) -> Cell {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Cell::Missing;
    }
    if text_only {
        return Cell::Text(trimmed.to_string());
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_nan() => Cell::Missing,
        Ok(v) if v.is_finite() => Cell::Number(v),
        _ => Cell::Text(trimmed.to_string()),
    }
}

/// Write `series` to a CSV file, creating or truncating it.
pub fn write_csv(series: &Series, path: impl AsRef<Path>, options: &CsvOptions) -> anyhow::Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    write_csv_to(series, file, options).with_context(|| format!("write CSV {}", path.display()))
}

/// Write `series` as CSV to any writer.
pub fn write_csv_to<W: Write>(series: &Series, writer: W, options: &CsvOptions) -> anyhow::Result<()> {
    let mut wtr = ::csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .from_writer(writer);

    let mut header = vec!["datetime".to_string()];
    header.extend(series.column_names().map(str::to_string));
    wtr.write_record(&header)?;

    let columns: Vec<&Column> = series.columns().map(|(_, c)| c).collect();
    let mut record: Vec<String> = Vec::with_capacity(header.len());
    for (row, ts) in series.index().iter().enumerate() {
        record.clear();
        record.push(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        for col in &columns {
            record.push(match col {
                Column::Numeric(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
                Column::Text(v) => v[row].clone().unwrap_or_default(),
            });
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use indexmap::IndexMap;

    #[test]
    fn reads_cells_by_shape() {
        let data = "time;open;note\n20240102;1.5;x\n2024-01-02 00:01;;NaN\n";
        let frame = read_csv_from(data.as_bytes(), &CsvOptions { delimiter: b';' }).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(
            frame.column("time").unwrap(),
            &[Cell::Text("20240102".into()), Cell::Text("2024-01-02 00:01".into())]
        );
        assert_eq!(frame.column("open").unwrap(), &[Cell::Number(1.5), Cell::Missing]);
        assert_eq!(frame.column("note").unwrap(), &[Cell::Text("x".into()), Cell::Missing]);
    }

    #[test]
    fn duplicate_headers_are_rejected() {
        let err = read_csv_from("a,a\n1,2\n".as_bytes(), &CsvOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("Duplicate column name: a"));
    }

    #[test]
    fn writes_rfc3339_and_blank_missing() {
        let series = Series::new(
            Tz::UTC,
            vec![Tz::UTC.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()],
            IndexMap::from([
                ("CLOSE".to_string(), Column::Numeric(vec![None])),
                ("SYMBOL".to_string(), Column::Text(vec![Some("EURUSD".into())])),
            ]),
        )
        .unwrap();
        let mut buf = Vec::new();
        write_csv_to(&series, &mut buf, &CsvOptions::default()).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "datetime,CLOSE,SYMBOL\n2024-01-01T00:00:00Z,,EURUSD\n"
        );
    }
}
