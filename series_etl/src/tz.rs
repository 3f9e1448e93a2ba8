//! Time zone parsing and localization helpers.
//!
//! What this module provides:
//! - [`parse_tz`]: Resolve an IANA time zone name (e.g. "America/New_York") or fail with
//!   [`EngineError::InvalidTimezoneName`].
//! - [`parse_timestamp`]: Parse one timestamp string into a naive or offset-carrying value.
//! - [`localize`]: Attach a time zone to a naive local timestamp under a [`DstPolicy`],
//!   reporting *how* the local time resolved ([`Localized`]).
//! - [`localize_boundary`]: Strict-or-error variant used for grid and bin boundaries.
//!
//! Notes:
//! - Ambiguous local times happen during “fall back” when a wall time occurs twice.
//! - Nonexistent local times happen during “spring forward” when a wall time is skipped.
//! - Normalization uses [`DstPolicy::NORMALIZE`]: ambiguous → invalid, nonexistent → shift
//!   forward to the first valid instant after the gap.
//! - Grid and bin boundaries use [`DstPolicy::BOUNDARY`], which never produces an invalid
//!   instant for zones with ordinary DST rules.
//!
//! Examples
//! - New York “spring forward” (2024-03-10 02:30 does not exist): shift forward → 03:00 EDT.
//! - New York “fall back” ambiguity (2024-11-03 01:30 occurs twice):
//!   earliest → 05:30Z, latest → 06:30Z, invalid under normalization.

use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike,
};
use chrono_tz::Tz;

use crate::error::EngineError;

/// Longest spring-forward gap we search across.
const MAX_SHIFT_MINUTES: u32 = 180;

/// Resolve an IANA time zone name.
pub fn parse_tz(name: &str) -> Result<Tz, EngineError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| EngineError::InvalidTimezoneName {
            name: name.to_string(),
        })
}

/// Resolution for local times that occur twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguousPolicy {
    /// Leave the timestamp invalid.
    Invalid,
    /// Pick the earlier instant (typically the DST occurrence).
    Earliest,
    /// Pick the later instant (typically the standard-time occurrence).
    Latest,
}

/// Resolution for local times skipped by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonexistentPolicy {
    /// Leave the timestamp invalid.
    Invalid,
    /// Move to the first valid instant after the gap.
    ShiftForward,
}

/// Policy for handling DST edge cases when localizing naive timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstPolicy {
    pub ambiguous: AmbiguousPolicy,
    pub nonexistent: NonexistentPolicy,
}

impl DstPolicy {
    /// Used when localizing input data.
    pub const NORMALIZE: DstPolicy = DstPolicy {
        ambiguous: AmbiguousPolicy::Invalid,
        nonexistent: NonexistentPolicy::ShiftForward,
    };

    /// Used for calendar grid points and bin edges.
    pub const BOUNDARY: DstPolicy = DstPolicy {
        ambiguous: AmbiguousPolicy::Earliest,
        nonexistent: NonexistentPolicy::ShiftForward,
    };
}

impl Default for DstPolicy {
    fn default() -> Self {
        Self::NORMALIZE
    }
}

/// Outcome of localizing one naive timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Localized {
    /// The local time maps to exactly one instant.
    Exact(DateTime<Tz>),
    /// The local time was ambiguous and the policy picked one instant.
    Disambiguated(DateTime<Tz>),
    /// The local time did not exist and was moved forward.
    ShiftedForward(DateTime<Tz>),
    /// Ambiguous and left invalid by policy.
    Ambiguous,
    /// Nonexistent and left invalid by policy (or no valid instant within reach).
    Nonexistent,
}

impl Localized {
    pub fn instant(self) -> Option<DateTime<Tz>> {
        match self {
            Localized::Exact(dt) | Localized::Disambiguated(dt) | Localized::ShiftedForward(dt) => {
                Some(dt)
            }
            Localized::Ambiguous | Localized::Nonexistent => None,
        }
    }
}

/// Attach `tz` to a naive local timestamp.
///
/// Behavior:
/// - A local time mapping to a single instant is returned as [`Localized::Exact`].
/// - Ambiguous (fall-back) local times follow `policy.ambiguous`.
/// - Nonexistent (spring-forward) local times follow `policy.nonexistent`. Shifting
///   truncates to the minute and steps forward one minute at a time (capped at three hours)
///   until the wall clock exists again, landing on the transition itself.
pub fn localize(naive: NaiveDateTime, tz: Tz, policy: DstPolicy) -> Localized {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Localized::Exact(dt),
        LocalResult::Ambiguous(a, b) => match policy.ambiguous {
            AmbiguousPolicy::Earliest => Localized::Disambiguated(a.min(b)),
            AmbiguousPolicy::Latest => Localized::Disambiguated(a.max(b)),
            AmbiguousPolicy::Invalid => Localized::Ambiguous,
        },
        LocalResult::None => match policy.nonexistent {
            NonexistentPolicy::ShiftForward => shift_forward(naive, tz),
            NonexistentPolicy::Invalid => Localized::Nonexistent,
        },
    }
}

fn shift_forward(naive: NaiveDateTime, tz: Tz) -> Localized {
    let Some(mut t) = naive.with_second(0).and_then(|t| t.with_nanosecond(0)) else {
        return Localized::Nonexistent;
    };
    for _ in 0..MAX_SHIFT_MINUTES {
        t += TimeDelta::minutes(1);
        match tz.from_local_datetime(&t) {
            LocalResult::Single(dt) => return Localized::ShiftedForward(dt),
            LocalResult::Ambiguous(a, b) => return Localized::ShiftedForward(a.min(b)),
            LocalResult::None => continue,
        }
    }
    Localized::Nonexistent
}

/// Localize a grid or bin boundary, failing with [`EngineError::TimezoneConversion`]
/// when the policy cannot produce an instant.
pub fn localize_boundary(
    naive: NaiveDateTime,
    tz: Tz,
    policy: DstPolicy,
) -> Result<DateTime<Tz>, EngineError> {
    localize(naive, tz, policy)
        .instant()
        .ok_or_else(|| EngineError::TimezoneConversion {
            tz: tz.name().to_string(),
            local: naive,
            reason: "no valid instant for this wall-clock time".to_string(),
        })
}

/// Local midnight of `date` in `tz`, resolved as a boundary.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> Result<DateTime<Tz>, EngineError> {
    localize_boundary(date.and_time(chrono::NaiveTime::MIN), tz, DstPolicy::BOUNDARY)
}

/// One parsed timestamp cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTimestamp {
    /// Wall-clock time without zone information.
    Naive(NaiveDateTime),
    /// Instant with an explicit UTC offset.
    Aware(DateTime<FixedOffset>),
}

const AWARE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: [&str; 10] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y.%m.%d %H:%M:%S%.f",
    "%Y.%m.%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%Y%m%d %H:%M:%S%.f",
    "%Y%m%d %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d"];

/// Parse one timestamp string.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS[.f]]` with an optional numeric offset or a
/// trailing `Z`, dotted and slashed date variants, compact `YYYYMMDD HH:MM[:SS]`, and
/// bare dates (interpreted as midnight). Returns `None` for anything else.
pub fn parse_timestamp(input: &str) -> Option<ParsedTimestamp> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(ParsedTimestamp::Aware(dt));
    }

    // "Z" / " UTC" suffixes spelled outside RFC 3339.
    let zulu = s
        .strip_suffix('Z')
        .or_else(|| s.strip_suffix(" UTC"))
        .map(|rest| format!("{}+00:00", rest.trim_end()));
    let candidate = zulu.as_deref().unwrap_or(s);

    for fmt in AWARE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
            return Some(ParsedTimestamp::Aware(dt));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ParsedTimestamp::Naive(dt));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(ParsedTimestamp::Naive(d.and_time(chrono::NaiveTime::MIN)));
        }
    }
    None
}

/// Format a UTC offset the way reports print it (`"UTC"` for zero, else `"+05:30"`).
pub fn describe_offset(offset: FixedOffset) -> String {
    if offset.local_minus_utc() == 0 {
        "UTC".to_string()
    } else {
        offset.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn ny() -> Tz {
        parse_tz("America/New_York").unwrap()
    }

    #[test]
    fn invalid_tz_name_is_reported() {
        let err = parse_tz("Mars/Olympus_Mons").unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidTimezoneName {
                name: "Mars/Olympus_Mons".into()
            }
        );
        assert_eq!(parse_tz("UTC").unwrap(), Tz::UTC);
    }

    #[test]
    fn ny_spring_forward_gap_shifts_to_3am() {
        // America/New_York jumps from 02:00 to 03:00 on 2024-03-10; 03:00 EDT is 07:00Z.
        let got = localize(naive(2024, 3, 10, 2, 30), ny(), DstPolicy::NORMALIZE);
        let Localized::ShiftedForward(dt) = got else {
            panic!("expected a forward shift, got {got:?}");
        };
        assert_eq!(
            dt.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn ny_spring_forward_gap_is_invalid_when_strict() {
        let strict = DstPolicy {
            ambiguous: AmbiguousPolicy::Invalid,
            nonexistent: NonexistentPolicy::Invalid,
        };
        assert_eq!(
            localize(naive(2024, 3, 10, 2, 30), ny(), strict),
            Localized::Nonexistent
        );
    }

    #[test]
    fn ny_fall_back_is_invalid_under_normalize_policy() {
        // 2024-11-03 01:30 occurs twice in New York.
        assert_eq!(
            localize(naive(2024, 11, 3, 1, 30), ny(), DstPolicy::NORMALIZE),
            Localized::Ambiguous
        );
    }

    #[test]
    fn ny_fall_back_prefer_earliest_and_latest() {
        // - 01:30 EDT (UTC-4) -> 05:30Z (earlier instant)
        // - 01:30 EST (UTC-5) -> 06:30Z (later instant)
        let n = naive(2024, 11, 3, 1, 30);
        let earliest = localize(n, ny(), DstPolicy::BOUNDARY).instant().unwrap();
        assert_eq!(
            earliest.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap()
        );

        let latest_policy = DstPolicy {
            ambiguous: AmbiguousPolicy::Latest,
            nonexistent: NonexistentPolicy::Invalid,
        };
        let latest = localize(n, ny(), latest_policy).instant().unwrap();
        assert_eq!(
            latest.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 11, 3, 6, 30, 0).unwrap()
        );
    }

    #[test]
    fn ny_valid_conversion_est() {
        let got = localize(naive(2024, 1, 15, 9, 30), ny(), DstPolicy::NORMALIZE);
        assert_eq!(
            got.instant().unwrap().with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn parses_naive_and_aware_spellings() {
        let want = naive(2024, 1, 2, 12, 0);
        for s in [
            "2024-01-02 12:00:00",
            "2024-01-02T12:00:00",
            "2024-01-02 12:00",
            "2024.01.02 12:00",
            "2024/01/02 12:00:00",
            "20240102 12:00:00",
        ] {
            assert_eq!(parse_timestamp(s), Some(ParsedTimestamp::Naive(want)), "{s}");
        }

        let utc = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        for s in [
            "2024-01-02T12:00:00Z",
            "2024-01-02 12:00:00Z",
            "2024-01-02 12:00:00+00:00",
            "2024-01-02T13:00:00+01:00",
            "2024-01-02 07:00:00-0500",
            "2024-01-02 12:00:00 UTC",
        ] {
            match parse_timestamp(s) {
                Some(ParsedTimestamp::Aware(dt)) => assert_eq!(dt.with_timezone(&Utc), utc, "{s}"),
                other => panic!("{s} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn parses_bare_dates_and_rejects_garbage() {
        assert_eq!(
            parse_timestamp("2024-06-02"),
            Some(ParsedTimestamp::Naive(naive(2024, 6, 2, 0, 0)))
        );
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("2024-13-40 25:00"), None);
    }

    #[test]
    fn offsets_describe_utc_by_name() {
        assert_eq!(describe_offset(FixedOffset::east_opt(0).unwrap()), "UTC");
        assert_eq!(describe_offset(FixedOffset::east_opt(3600).unwrap()), "+01:00");
    }
}
