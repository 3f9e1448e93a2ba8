//! Grid and bin arithmetic for a [`Rule`] in a series timezone.
//!
//! - Fixed rules (second/minute/hour): elapsed-time math on absolute instants.
//! - Day/week/month rules: wall-clock math on local dates, localized back with
//!   [`DstPolicy::BOUNDARY`].
//! - Week bins are Monday 00:00 local, aligned on the Monday 1969-12-29 anchor.
//! - Month bins use a linear (year, month) index relative to 1970-01.
//!
//! Two consumers:
//! - [`expected_grid`] / [`advance`]: the regular grid gap detection and repair compare against.
//! - [`Bucketer`]: bin ids and bin starts for resampling.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta};
use chrono_tz::Tz;

use crate::{
    error::EngineError,
    rule::{Rule, RuleUnit},
    tz::{DstPolicy, local_midnight, localize_boundary},
};

/// Number of milliseconds in a second.
const MILLIS_PER_SECOND: i64 = 1_000;

/// Monday 1969-12-29 as days from the common era; week index 0 starts here.
const WEEK_ANCHOR_DAYS_FROM_CE: i64 = 719_160;

/// Grid point `steps` rule-steps after `origin`.
///
/// Calendar rules step the local wall clock of `origin`, so repeated calls from the
/// same origin never drift across DST changes.
pub fn step_from(origin: DateTime<Tz>, rule: Rule, steps: i64) -> Result<DateTime<Tz>, EngineError> {
    let tz = origin.timezone();
    match rule.fixed_step() {
        Some(step) => {
            let delta = step
                .checked_mul(i32::try_from(steps).map_err(|_| out_of_range(origin))?)
                .ok_or_else(|| out_of_range(origin))?;
            origin
                .checked_add_signed(delta)
                .ok_or_else(|| out_of_range(origin))
        }
        None => {
            let local = shift_local(origin.naive_local(), rule, steps)?;
            localize_boundary(local, tz, DstPolicy::BOUNDARY)
        }
    }
}

/// The grid point right after `ts`.
pub fn advance(ts: DateTime<Tz>, rule: Rule) -> Result<DateTime<Tz>, EngineError> {
    step_from(ts, rule, 1)
}

/// Every grid point from `start` to `end` inclusive at `rule` spacing.
///
/// `end` is included only when it falls exactly on the grid.
pub fn expected_grid(
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    rule: Rule,
) -> Result<Vec<DateTime<Tz>>, EngineError> {
    let mut grid = Vec::new();
    if end < start {
        return Ok(grid);
    }
    if let Some(step) = rule.fixed_step() {
        let span_ms = (end - start).num_milliseconds();
        let step_ms = step.num_milliseconds();
        grid.reserve(usize::try_from(span_ms / step_ms + 1).unwrap_or(0));
    }

    let mut k: i64 = 0;
    loop {
        let point = step_from(start, rule, k)?;
        if point > end {
            break;
        }
        grid.push(point);
        k += 1;
    }
    Ok(grid)
}

fn shift_local(local: NaiveDateTime, rule: Rule, steps: i64) -> Result<NaiveDateTime, EngineError> {
    let n = i64::from(rule.amount().get()) * steps;
    let shifted = match rule.unit() {
        RuleUnit::Day => TimeDelta::try_days(n).and_then(|d| local.checked_add_signed(d)),
        RuleUnit::Week => TimeDelta::try_weeks(n).and_then(|d| local.checked_add_signed(d)),
        RuleUnit::Month => {
            let months = u32::try_from(n.unsigned_abs()).ok().map(Months::new);
            match months {
                Some(m) if n >= 0 => local.checked_add_months(m),
                Some(m) => local.checked_sub_months(m),
                None => None,
            }
        }
        RuleUnit::Second | RuleUnit::Minute | RuleUnit::Hour => {
            rule.fixed_step()
                .and_then(|s| s.checked_mul(i32::try_from(steps).ok()?))
                .and_then(|d| local.checked_add_signed(d))
        }
    };
    shifted.ok_or(EngineError::TimestampOutOfRange(local))
}

fn out_of_range(ts: DateTime<Tz>) -> EngineError {
    EngineError::TimestampOutOfRange(ts.naive_local())
}

/// Maps timestamps to resampling bins for one rule and timezone.
///
/// Bins are left-closed and labelled by their start:
/// - Fixed rules count whole steps from local midnight of the first timestamp's day.
/// - Day rules count `amount`-day blocks of local dates from that same day.
/// - Week rules count `amount`-week blocks of Monday-based local weeks.
/// - Month rules count `amount`-month blocks of local calendar months since 1970-01.
#[derive(Debug, Clone)]
pub struct Bucketer {
    rule: Rule,
    tz: Tz,
    origin: DateTime<Tz>,
}

impl Bucketer {
    /// Anchor bins on the day of `first`.
    pub fn new(rule: Rule, first: DateTime<Tz>) -> Result<Self, EngineError> {
        let tz = first.timezone();
        let origin = local_midnight(first.date_naive(), tz)?;
        Ok(Self { rule, tz, origin })
    }

    /// Compute the bin id for a timestamp.
    pub fn bin_id(&self, ts: DateTime<Tz>) -> i64 {
        let amount = i64::from(self.rule.amount().get());
        match self.rule.unit() {
            RuleUnit::Second | RuleUnit::Minute | RuleUnit::Hour => {
                let step_ms = self
                    .rule
                    .fixed_step()
                    .map_or(MILLIS_PER_SECOND, |s| s.num_milliseconds());
                (ts - self.origin).num_milliseconds().div_euclid(step_ms)
            }
            RuleUnit::Day => {
                let days = (ts.with_timezone(&self.tz).date_naive() - self.origin.date_naive())
                    .num_days();
                days.div_euclid(amount)
            }
            RuleUnit::Week => {
                let days = i64::from(ts.with_timezone(&self.tz).date_naive().num_days_from_ce())
                    - WEEK_ANCHOR_DAYS_FROM_CE;
                days.div_euclid(7 * amount)
            }
            RuleUnit::Month => {
                let local = ts.with_timezone(&self.tz);
                let idx = (i64::from(local.year()) - 1970) * 12 + i64::from(local.month0());
                idx.div_euclid(amount)
            }
        }
    }

    /// Get the start instant for a bin id.
    pub fn bin_start(&self, id: i64) -> Result<DateTime<Tz>, EngineError> {
        let amount = i64::from(self.rule.amount().get());
        match self.rule.unit() {
            RuleUnit::Second | RuleUnit::Minute | RuleUnit::Hour => {
                step_from(self.origin, self.rule, id)
            }
            RuleUnit::Day => {
                let date = TimeDelta::try_days(id * amount)
                    .and_then(|d| self.origin.date_naive().checked_add_signed(d))
                    .ok_or_else(|| out_of_range(self.origin))?;
                local_midnight(date, self.tz)
            }
            RuleUnit::Week => {
                let date = i32::try_from(WEEK_ANCHOR_DAYS_FROM_CE + id * amount * 7)
                    .ok()
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
                    .ok_or_else(|| out_of_range(self.origin))?;
                local_midnight(date, self.tz)
            }
            RuleUnit::Month => {
                let start_idx = id * amount;
                let year = i32::try_from(1970 + start_idx.div_euclid(12))
                    .map_err(|_| out_of_range(self.origin))?;
                let month = u32::try_from(start_idx.rem_euclid(12) + 1)
                    .map_err(|_| out_of_range(self.origin))?;
                let date = NaiveDate::from_ymd_opt(year, month, 1)
                    .ok_or_else(|| out_of_range(self.origin))?;
                local_midnight(date, self.tz)
            }
        }
    }
}

// -------------------- tests --------------------
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike, Utc};

    fn rule(s: &str) -> Rule {
        s.parse().unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        Tz::UTC.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn minute_grid_is_inclusive() {
        let grid = expected_grid(utc(2024, 1, 1, 0, 0), utc(2024, 1, 1, 0, 6), rule("1min")).unwrap();
        assert_eq!(grid.len(), 7);
        assert_eq!(grid[6], utc(2024, 1, 1, 0, 6));
    }

    #[test]
    fn off_grid_end_is_excluded() {
        let end = utc(2024, 1, 1, 0, 6) + TimeDelta::seconds(30);
        let grid = expected_grid(utc(2024, 1, 1, 0, 0), end, rule("2min")).unwrap();
        assert_eq!(grid.last(), Some(&utc(2024, 1, 1, 0, 6)));
        assert_eq!(grid.len(), 4);
    }

    #[test]
    fn daily_grid_follows_local_midnight_across_dst() {
        let ny: Tz = "America/New_York".parse().unwrap();
        let start = ny.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
        let end = ny.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap();
        let grid = expected_grid(start, end, rule("1D")).unwrap();
        assert_eq!(grid.len(), 3);
        assert!(grid.iter().all(|ts| ts.hour() == 0));
        // 2024-03-10 is a 23-hour day in New York.
        assert_eq!(grid[2] - grid[1], TimeDelta::hours(23));
    }

    #[test]
    fn monthly_steps_clamp_to_month_end() {
        let start = utc(2024, 1, 31, 0, 0);
        assert_eq!(advance(start, rule("1M")).unwrap(), utc(2024, 2, 29, 0, 0));
        assert_eq!(step_from(start, rule("1M"), 2).unwrap(), utc(2024, 3, 31, 0, 0));
    }

    #[test]
    fn minute_bins_floor_from_midnight() {
        let b = Bucketer::new(rule("5min"), utc(2024, 1, 1, 0, 3)).unwrap();
        let id = b.bin_id(utc(2024, 1, 1, 0, 7));
        assert_eq!(id, 1);
        assert_eq!(b.bin_start(id).unwrap(), utc(2024, 1, 1, 0, 5));
        assert_eq!(b.bin_id(utc(2024, 1, 1, 0, 4)), 0);
    }

    #[test]
    fn week_bins_start_on_monday() {
        // 2025-01-02 is a Thursday.
        let t = utc(2025, 1, 2, 3, 4);
        let b = Bucketer::new(rule("1W"), t).unwrap();
        let start = b.bin_start(b.bin_id(t)).unwrap();
        assert_eq!(start, utc(2024, 12, 30, 0, 0));
    }

    #[test]
    fn month_bins_roundtrip_and_boundaries() {
        let t = utc(2024, 2, 29, 13, 0); // leap day
        let b = Bucketer::new(rule("1M"), t).unwrap();
        let id = b.bin_id(t);
        assert_eq!(b.bin_start(id).unwrap(), utc(2024, 2, 1, 0, 0));
        assert_eq!(b.bin_start(id + 1).unwrap(), utc(2024, 3, 1, 0, 0));
    }

    #[test]
    fn day_bins_use_local_dates() {
        let tokyo: Tz = "Asia/Tokyo".parse().unwrap();
        // 2024-01-01 20:00Z is 2024-01-02 05:00 in Tokyo.
        let t = Utc
            .with_ymd_and_hms(2024, 1, 1, 20, 0, 0)
            .unwrap()
            .with_timezone(&tokyo);
        let b = Bucketer::new(rule("1D"), t).unwrap();
        let start = b.bin_start(b.bin_id(t)).unwrap();
        assert_eq!(start, tokyo.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }
}
