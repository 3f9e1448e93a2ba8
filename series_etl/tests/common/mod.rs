#![allow(dead_code)]

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use series_etl::{
    RawFrame, Series,
    io::csv::{CsvOptions, read_csv_from},
    normalize::{NormalizationReport, NormalizeOptions, normalize},
};

/// `2024-01-01 hh:mm` in UTC.
pub fn utc(h: u32, m: u32) -> DateTime<Tz> {
    Tz::UTC.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
}

/// Parse an inline CSV document the way the binary reads files.
pub fn raw_csv(text: &str) -> RawFrame {
    read_csv_from(text.as_bytes(), &CsvOptions::default()).expect("inline csv")
}

/// Normalize with default options (standard mapping, UTC target, naive as UTC).
pub fn normalized(text: &str) -> (Series, NormalizationReport) {
    normalize(raw_csv(text), &NormalizeOptions::default()).expect("normalize")
}

/// One-minute OHLCV rows starting at midnight; `minutes` picks which rows exist.
///
/// Row `m` has OPEN=m, HIGH=m+0.5, LOW=m-0.5, CLOSE=m+0.25, VOLUME=10.
pub fn minute_bars(minutes: &[u32]) -> String {
    let mut out = String::from("Time,Open,High,Low,Close,Volume\n");
    for &m in minutes {
        let m_f = f64::from(m);
        out.push_str(&format!(
            "2024-01-01 {:02}:{:02},{},{},{},{},10\n",
            m / 60,
            m % 60,
            m_f,
            m_f + 0.5,
            m_f - 0.5,
            m_f + 0.25
        ));
    }
    out
}
