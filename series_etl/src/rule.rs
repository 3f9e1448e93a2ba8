//! Grid rules: the sampling frequency shared by gap detection and resampling.
//!
//! A [`Rule`] pairs a non-zero amount with a [`RuleUnit`]. Second, minute and
//! hour rules are fixed durations; day, week and month rules are calendar steps
//! taken on local wall-clock time in the series timezone, so a "1D" step across
//! a DST change spans 23 or 25 hours.
//!
//! Typical usage:
//! ```
//! use series_etl::rule::{Rule, RuleUnit};
//!
//! let rule: Rule = "5min".parse().unwrap();
//! assert_eq!(rule.amount().get(), 5);
//! assert_eq!(rule.unit(), RuleUnit::Minute);
//! assert_eq!(rule.to_string(), "5min");
//! ```

use std::{fmt, num::NonZeroU32, str::FromStr};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Rule granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleUnit {
    /// Fixed 1-second step
    Second,
    /// Fixed 60-second step
    Minute,
    /// Fixed 3600-second step
    Hour,
    /// Local calendar day
    Day,
    /// Monday-based local calendar week
    Week,
    /// Local calendar month
    Month,
}

impl RuleUnit {
    /// Calendar units step on local wall-clock time rather than elapsed time.
    pub const fn is_calendar(self) -> bool {
        matches!(self, Self::Day | Self::Week | Self::Month)
    }
}

/// A rule = amount × unit (e.g. 1-Minute, 4-Hour, 1-Day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rule {
    amount: NonZeroU32,
    unit: RuleUnit,
}

impl Rule {
    pub const fn new(amount: NonZeroU32, unit: RuleUnit) -> Self {
        Self { amount, unit }
    }
    pub const fn amount(&self) -> NonZeroU32 {
        self.amount
    }
    pub const fn unit(&self) -> RuleUnit {
        self.unit
    }
    pub const fn is_calendar(&self) -> bool {
        self.unit.is_calendar()
    }

    /// Elapsed-time width of one step, for fixed-duration rules only.
    pub fn fixed_step(&self) -> Option<TimeDelta> {
        let n = i64::from(self.amount.get());
        match self.unit {
            RuleUnit::Second => Some(TimeDelta::seconds(n)),
            RuleUnit::Minute => Some(TimeDelta::minutes(n)),
            RuleUnit::Hour => Some(TimeDelta::hours(n)),
            RuleUnit::Day | RuleUnit::Week | RuleUnit::Month => None,
        }
    }
}

/// Display/parse round-trip through the canonical spelling (`"30s"`, `"5min"`, `"1h"`, `"1D"`, `"1W"`, `"1M"`).
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.amount.get();
        let u = match self.unit {
            RuleUnit::Second => "s",
            RuleUnit::Minute => "min",
            RuleUnit::Hour => "h",
            RuleUnit::Day => "D",
            RuleUnit::Week => "W",
            RuleUnit::Month => "M",
        };
        write!(f, "{a}{u}")
    }
}

impl FromStr for Rule {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| EngineError::InvalidRule {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty rule"));
        }
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| invalid("missing unit"))?;
        let (digits, unit) = trimmed.split_at(split);

        let amount_num: u32 = if digits.is_empty() {
            1
        } else {
            digits.parse().map_err(|_| invalid("amount is not a number"))?
        };
        let amount = NonZeroU32::new(amount_num).ok_or_else(|| invalid("amount must be > 0"))?;

        // Case matters only to tell minutes ("m") from months ("M").
        let unit = match unit {
            "M" | "MS" => RuleUnit::Month,
            "m" | "T" => RuleUnit::Minute,
            other => match other.to_lowercase().as_str() {
                "s" | "sec" | "second" | "seconds" => RuleUnit::Second,
                "min" | "mins" | "minute" | "minutes" => RuleUnit::Minute,
                "h" | "hr" | "hour" | "hours" => RuleUnit::Hour,
                "d" | "day" | "days" => RuleUnit::Day,
                "w" | "wk" | "week" | "weeks" => RuleUnit::Week,
                "mo" | "month" | "months" => RuleUnit::Month,
                _ => return Err(invalid("unknown unit")),
            },
        };
        Ok(Rule::new(amount, unit))
    }
}

impl TryFrom<String> for Rule {
    type Error = EngineError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rule> for String {
    fn from(rule: Rule) -> Self {
        rule.to_string()
    }
}
