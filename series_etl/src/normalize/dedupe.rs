//! Duplicate-timestamp resolution and final ordering.

use std::collections::HashSet;

use crate::frame::Series;

/// Keep the first occurrence of each timestamp (in input order), then stable-sort ascending.
///
/// Returns the cleaned series and the number of rows removed.
pub fn remove_duplicates(series: Series) -> (Series, usize) {
    let mut seen = HashSet::with_capacity(series.len());
    let mut positions: Vec<usize> = (0..series.len())
        .filter(|&i| seen.insert(series.index()[i].naive_utc()))
        .collect();
    let removed = series.len() - positions.len();

    let index = series.index();
    positions.sort_by_key(|&i| index[i]);

    let already_clean = removed == 0 && positions.iter().enumerate().all(|(k, &i)| k == i);
    if already_clean {
        return (series, 0);
    }
    (series.take_rows(&positions), removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Column;
    use chrono::{DateTime, TimeZone};
    use chrono_tz::Tz;
    use indexmap::IndexMap;

    fn ts(min: u32) -> DateTime<Tz> {
        Tz::UTC.with_ymd_and_hms(2024, 1, 1, 0, min, 0).unwrap()
    }

    #[test]
    fn first_occurrence_wins_and_output_is_sorted() {
        let series = Series::new(
            Tz::UTC,
            vec![ts(2), ts(0), ts(2), ts(1)],
            IndexMap::from([(
                "CLOSE".to_string(),
                Column::Numeric(vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]),
            )]),
        )
        .unwrap();
        let (clean, removed) = remove_duplicates(series);
        assert_eq!(removed, 1);
        assert_eq!(clean.index(), &[ts(0), ts(1), ts(2)]);
        assert_eq!(clean.numeric("CLOSE"), Some(&[Some(2.0), Some(4.0), Some(1.0)][..]));
        assert!(clean.ensure_datetime_index().is_ok());
    }

    #[test]
    fn clean_series_passes_through() {
        let series = Series::new(Tz::UTC, vec![ts(0), ts(1)], IndexMap::new()).unwrap();
        let (clean, removed) = remove_duplicates(series.clone());
        assert_eq!(removed, 0);
        assert_eq!(clean, series);
    }
}
