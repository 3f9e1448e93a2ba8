//! Canonical column vocabulary.
//!
//! The engine only ever reasons about column *roles*: the eight canonical
//! columns, identity columns (symbol-like, never renamed), volume-like columns,
//! and everything else. Roles are computed once from a name via [`role_of`]
//! instead of being probed ad hoc in each stage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical, upper-case column names produced by the column mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CanonicalColumn {
    Open,
    High,
    Low,
    Close,
    Volume,
    TickVol,
    Spread,
    Symbol,
}

impl CanonicalColumn {
    /// All canonical columns in vocabulary order.
    pub const ALL: [CanonicalColumn; 8] = [
        Self::Open,
        Self::High,
        Self::Low,
        Self::Close,
        Self::Volume,
        Self::TickVol,
        Self::Spread,
        Self::Symbol,
    ];

    /// Columns coerced to numbers by the dtype stage.
    pub const NUMERIC: [CanonicalColumn; 7] = [
        Self::Open,
        Self::High,
        Self::Low,
        Self::Close,
        Self::Volume,
        Self::TickVol,
        Self::Spread,
    ];

    /// Price-like columns eligible for linear interpolation.
    pub const PRICES: [CanonicalColumn; 4] = [Self::Open, Self::High, Self::Low, Self::Close];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::High => "HIGH",
            Self::Low => "LOW",
            Self::Close => "CLOSE",
            Self::Volume => "VOLUME",
            Self::TickVol => "TICKVOL",
            Self::Spread => "SPREAD",
            Self::Symbol => "SYMBOL",
        }
    }

    /// Exact (case-sensitive) lookup of a canonical name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Symbol)
    }
}

impl fmt::Display for CanonicalColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity columns that the mapper never renames (compared case-insensitively).
pub const PROTECTED_COLUMNS: [&str; 4] = ["symbol", "ticker", "instrument", "pair"];

/// Recognized datetime column names (compared case-insensitively).
pub const DATETIME_ALIASES: [&str; 3] = ["datetime", "timestamp", "time"];

/// Column names aggregated with `sum` by the resampler.
pub const VOLUME_LIKE: [&str; 3] = ["VOLUME", "TICKVOL", "VOL"];

/// Comparison key for a column name: trimmed, `<...>` brackets removed, lower-case.
pub fn match_key(name: &str) -> String {
    let trimmed = name.trim();
    let unbracketed = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed);
    unbracketed.trim().to_lowercase()
}

/// True when `name` is one of [`PROTECTED_COLUMNS`] under [`match_key`].
pub fn is_protected(name: &str) -> bool {
    PROTECTED_COLUMNS.contains(&match_key(name).as_str())
}

/// True when `name` is one of [`DATETIME_ALIASES`] under [`match_key`].
pub fn is_datetime_alias(name: &str) -> bool {
    DATETIME_ALIASES.contains(&match_key(name).as_str())
}

/// How a column takes part in aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Open,
    High,
    Low,
    Close,
    /// `VOLUME`, `TICKVOL` or `VOL`.
    VolumeLike,
    /// `SYMBOL` or any protected identity column.
    Identity,
    /// Anything else, including `SPREAD`.
    Other,
}

impl ColumnRole {
    pub fn is_price_or_volume(self) -> bool {
        matches!(
            self,
            Self::Open | Self::High | Self::Low | Self::Close | Self::VolumeLike
        )
    }
}

/// Classify a column name into its aggregation role.
///
/// Canonical and volume-like names must match exactly (the mapper has already
/// upper-cased them); identity names match case-insensitively because the
/// mapper leaves protected columns untouched.
pub fn role_of(name: &str) -> ColumnRole {
    match CanonicalColumn::from_name(name) {
        Some(CanonicalColumn::Open) => ColumnRole::Open,
        Some(CanonicalColumn::High) => ColumnRole::High,
        Some(CanonicalColumn::Low) => ColumnRole::Low,
        Some(CanonicalColumn::Close) => ColumnRole::Close,
        Some(CanonicalColumn::Symbol) => ColumnRole::Identity,
        _ if VOLUME_LIKE.contains(&name) => ColumnRole::VolumeLike,
        _ if is_protected(name) => ColumnRole::Identity,
        _ => ColumnRole::Other,
    }
}
