//! Column identity resolution.
//!
//! Resolution order for each input column (case-insensitive, surrounding whitespace
//! and `<...>` brackets ignored):
//! 1. Protected identity columns (`symbol`, `ticker`, `instrument`, `pair`) are skipped.
//! 2. Exact match against any variant of any canonical target (the canonical name
//!    itself counts as a variant).
//! 3. Prefix `variant_` or suffix `_variant` match.
//!
//! Substring-only matches are never accepted, so `reopened` does not match `open`.
//! The first matching canonical target wins, and each target is claimed by at most
//! one column: canonical spellings claim first, then exact matches, then affix
//! matches, each in input order.

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::{
    frame::RawFrame,
    schema::{is_protected, match_key},
};

/// Canonical target → accepted variants.
///
/// Keys are stored upper-case and variants lower-case; both are trimmed and
/// de-duplicated while preserving first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    targets: IndexMap<String, IndexSet<String>>,
}

impl ColumnMapping {
    pub fn new<I, K, V, S>(map: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut targets: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for (canonical, variants) in map {
            let key = canonical.as_ref().trim().to_uppercase();
            if key.is_empty() {
                continue;
            }
            let entry = targets.entry(key).or_default();
            for v in variants {
                let v = v.as_ref().trim().to_lowercase();
                if !v.is_empty() {
                    entry.insert(v);
                }
            }
        }
        Self { targets }
    }

    /// Vendor spellings seen in broker and exchange exports.
    pub fn standard() -> Self {
        Self::new([
            ("OPEN", vec!["open", "o", "open_price", "openprice"]),
            ("HIGH", vec!["high", "h", "high_price", "highprice"]),
            ("LOW", vec!["low", "l", "low_price", "lowprice"]),
            ("CLOSE", vec!["close", "c", "close_price", "closeprice", "last"]),
            ("VOLUME", vec!["volume", "v", "vol", "real_volume", "qty"]),
            ("TICKVOL", vec!["tickvol", "tick_volume", "tickvolume", "ticks"]),
            ("SPREAD", vec!["spread", "spr"]),
        ])
    }

    fn exact_match(&self, key: &str) -> Option<&str> {
        self.targets
            .iter()
            .find(|(canonical, variants)| canonical.to_lowercase() == key || variants.contains(key))
            .map(|(canonical, _)| canonical.as_str())
    }

    fn affix_match(&self, key: &str) -> Option<&str> {
        self.targets
            .iter()
            .find(|(canonical, variants)| {
                let canonical = canonical.to_lowercase();
                std::iter::once(canonical.as_str())
                    .chain(variants.iter().map(String::as_str))
                    .any(|v| {
                        key.strip_prefix(v).is_some_and(|rest| rest.starts_with('_'))
                            || key.strip_suffix(v).is_some_and(|rest| rest.ends_with('_'))
                    })
            })
            .map(|(canonical, _)| canonical.as_str())
    }

    /// Canonical target for one column name, ignoring claims by other columns.
    pub fn resolve(&self, column: &str) -> Option<&str> {
        self.resolve_with_kind(column).map(|(canonical, _)| canonical)
    }

    fn resolve_with_kind(&self, column: &str) -> Option<(&str, MatchKind)> {
        if is_protected(column) {
            return None;
        }
        let key = match_key(column);
        if key.is_empty() {
            return None;
        }
        self.exact_match(&key)
            .map(|c| (c, MatchKind::Exact))
            .or_else(|| self.affix_match(&key).map(|c| (c, MatchKind::Affix)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchKind {
    Exact,
    Affix,
}

/// Result of resolving a set of column names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnResolution {
    /// canonical → original, only for columns whose name changed.
    pub renamed: IndexMap<String, String>,
    /// Columns left under their original name (protected, unknown, or losing a claim).
    pub unmatched: Vec<String>,
    /// original → final name, for every column.
    pub final_names: IndexMap<String, String>,
}

/// Resolve every column name against `mapping`.
pub fn resolve_columns<'a, I>(columns: I, mapping: &ColumnMapping) -> ColumnResolution
where
    I: IntoIterator<Item = &'a str>,
{
    let columns: Vec<&str> = columns.into_iter().collect();
    let resolved: Vec<Option<(&str, MatchKind)>> =
        columns.iter().map(|col| mapping.resolve_with_kind(col)).collect();
    let mut winners: Vec<Option<&str>> = vec![None; columns.len()];
    let mut claimed: IndexSet<&str> = IndexSet::new();

    // A column already spelled canonically keeps its claim even if it comes later.
    for (i, &col) in columns.iter().enumerate() {
        if let Some((canonical, _)) = resolved[i].filter(|(canonical, _)| *canonical == col) {
            claimed.insert(canonical);
            winners[i] = Some(canonical);
        }
    }
    // Exact matches claim before affix matches; within a kind, input order decides.
    for kind in [MatchKind::Exact, MatchKind::Affix] {
        for (i, r) in resolved.iter().enumerate() {
            if winners[i].is_some() {
                continue;
            }
            if let Some((canonical, _)) = r.filter(|(_, k)| *k == kind) {
                if claimed.insert(canonical) {
                    winners[i] = Some(canonical);
                }
            }
        }
    }

    let mut out = ColumnResolution::default();
    for (i, &col) in columns.iter().enumerate() {
        let final_name = match (winners[i], resolved[i]) {
            (Some(canonical), _) => {
                if canonical != col {
                    out.renamed.insert(canonical.to_string(), col.to_string());
                }
                canonical.to_string()
            }
            (None, Some((canonical, _))) => {
                warn!(column = col, canonical, "canonical column already claimed; keeping original name");
                out.unmatched.push(col.to_string());
                col.to_string()
            }
            (None, None) => {
                out.unmatched.push(col.to_string());
                col.to_string()
            }
        };
        out.final_names.insert(col.to_string(), final_name);
    }

    if !out.renamed.is_empty() {
        debug!(renamed = ?out.renamed, "resolved column names");
    }
    out
}

/// Rename the columns of `frame` to their canonical names.
pub fn map_columns(frame: RawFrame, mapping: &ColumnMapping) -> (RawFrame, ColumnResolution) {
    let resolution = resolve_columns(frame.column_names(), mapping);
    let len = frame.len();
    let columns = frame
        .into_columns()
        .into_iter()
        .map(|(name, cells)| {
            let renamed = resolution
                .final_names
                .get(&name)
                .cloned()
                .unwrap_or(name);
            (renamed, cells)
        })
        .collect();
    (RawFrame::from_columns(columns, len), resolution)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ohlc() -> ColumnMapping {
        ColumnMapping::new([
            ("open", vec!["open", "o"]),
            ("HIGH", vec!["high", "h"]),
            ("LOW", vec!["low", "l"]),
            ("CLOSE", vec!["close", "c"]),
        ])
    }

    #[test]
    fn exact_matches_ignore_case() {
        let m = ohlc();
        assert_eq!(m.resolve("Open"), Some("OPEN"));
        assert_eq!(m.resolve(" C "), Some("CLOSE"));
        assert_eq!(m.resolve("<HIGH>"), Some("HIGH"));
        assert_eq!(m.resolve("LOW"), Some("LOW"));
    }

    #[test]
    fn affixes_match_but_substrings_do_not() {
        let m = ohlc();
        assert_eq!(m.resolve("low_value"), Some("LOW"));
        assert_eq!(m.resolve("bid_close"), Some("CLOSE"));
        assert_eq!(m.resolve("reopened"), None);
        assert_eq!(m.resolve("closed"), None);
        assert_eq!(m.resolve("highlow"), None);
    }

    #[test]
    fn protected_columns_never_renamed() {
        let m = ColumnMapping::new([("SYMBOL", vec!["symbol", "ticker"]), ("CLOSE", vec!["pair"])]);
        let res = resolve_columns(["symbol", "Ticker", "PAIR", "instrument", "<TICKER>"], &m);
        assert!(res.renamed.is_empty());
        assert_eq!(res.unmatched, vec!["symbol", "Ticker", "PAIR", "instrument", "<TICKER>"]);
    }

    #[test]
    fn first_claim_wins_and_loser_is_unmatched() {
        let res = resolve_columns(["close", "c", "volume"], &ohlc());
        assert_eq!(res.renamed.get("CLOSE").map(String::as_str), Some("close"));
        assert_eq!(res.unmatched, vec!["c", "volume"]);
        assert_eq!(res.final_names["c"], "c");
    }

    #[test]
    fn canonical_spelling_keeps_claim() {
        let res = resolve_columns(["close", "CLOSE"], &ohlc());
        assert!(res.renamed.is_empty());
        assert_eq!(res.final_names["CLOSE"], "CLOSE");
        assert_eq!(res.final_names["close"], "close");
        assert_eq!(res.unmatched, vec!["close"]);
    }

    #[test]
    fn exact_match_beats_earlier_affix_match() {
        let res = resolve_columns(["time", "open_time", "open", "high", "low", "close"], &ColumnMapping::standard());
        assert_eq!(res.renamed.get("OPEN").map(String::as_str), Some("open"));
        assert_eq!(res.final_names["open_time"], "open_time");
        assert_eq!(res.unmatched, vec!["time", "open_time"]);
    }

    #[test]
    fn affix_match_claims_when_no_exact_competitor() {
        let res = resolve_columns(["open_time", "high"], &ColumnMapping::standard());
        assert_eq!(res.renamed.get("OPEN").map(String::as_str), Some("open_time"));
    }

    #[test]
    fn map_columns_renames_in_place() {
        let frame = RawFrame::new()
            .with_column("timestamp", ["2024-01-01 00:00"])
            .unwrap()
            .with_column("o", [1.0])
            .unwrap()
            .with_column("symbol", ["EURUSD"])
            .unwrap();
        let (frame, res) = map_columns(frame, &ohlc());
        let names: Vec<&str> = frame.column_names().collect();
        assert_eq!(names, vec!["timestamp", "OPEN", "symbol"]);
        assert_eq!(res.unmatched, vec!["timestamp", "symbol"]);
    }
}
