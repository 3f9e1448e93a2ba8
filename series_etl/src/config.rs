//! Pipeline configuration: parsing, normalization, and loading.
//!
//! This module defines the TOML-backed configuration that drives a run:
//! - `[schema]`: canonical column variants and required columns
//! - `[timezone]`: target zone, optional source zone, naive-timestamp policy
//! - `[gaps]`: optional gap-repair stage (grid rule, fills)
//! - `[resample]`: target timeframes and aggregation options
//! - `[quality]`: SMA windows for the quality report
//!
//! Key behaviors:
//! - `$VAR` / `${VAR}` references in string values are expanded before
//!   deserialization; unknown variables are left untouched.
//! - Normalization upper-cases and trims `columns_map` keys and required columns,
//!   lower-cases and de-duplicates variants while preserving order, and rejects
//!   keys that collide after normalization.
//! - Timezone names are validated against the IANA database; rule strings are
//!   validated while deserializing.
//!
//! Entrypoints:
//! - Parse + normalize from a TOML string: [`load_config_str`]
//! - Parse + normalize from a file path: [`load_config_path`]
//! - Normalization of an already-deserialized value: [`normalize_config`]

use std::{collections::HashSet, mem, num::NonZeroU32, path::Path};

use anyhow::{Context, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shared_utils::env::expand_with;
use tracing::debug;

use crate::{
    normalize::{DEFAULT_REQUIRED, NaiveTimestampPolicy},
    resample::ExtraNumericPolicy,
    rule::{Rule, RuleUnit},
    tz::parse_tz,
};

/// Top-level configuration. Every section is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EtlConfig {
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub timezone: TimezoneConfig,
    /// Gap repair runs only when this section is present.
    #[serde(default)]
    pub gaps: Option<GapsConfig>,
    #[serde(default)]
    pub resample: ResampleConfig,
    #[serde(default)]
    pub quality: QualityConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaConfig {
    /// Columns that must exist after column mapping.
    pub required_columns: Vec<String>,
    /// Canonical name → accepted variants.
    ///
    /// Empty means the built-in vendor mapping.
    pub columns_map: IndexMap<String, Vec<String>>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            required_columns: DEFAULT_REQUIRED.iter().map(|s| s.to_string()).collect(),
            columns_map: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimezoneConfig {
    pub target: String,
    pub source_default: Option<String>,
    pub policy_if_naive: NaiveTimestampPolicy,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self {
            target: "UTC".to_string(),
            source_default: None,
            policy_if_naive: NaiveTimestampPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GapsConfig {
    pub rule: Rule,
    #[serde(default = "default_short_gap_minutes")]
    pub short_gap_minutes: i64,
    #[serde(default)]
    pub ffill_columns: Vec<String>,
    #[serde(default)]
    pub interpolate_prices: bool,
}

fn default_short_gap_minutes() -> i64 {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResampleConfig {
    pub timeframes: Vec<Rule>,
    pub drop_incomplete: bool,
    pub extra_numeric_policy: ExtraNumericPolicy,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        let rule = |n: u32, unit| NonZeroU32::new(n).map(|a| Rule::new(a, unit));
        Self {
            timeframes: [rule(1, RuleUnit::Minute), rule(5, RuleUnit::Minute), rule(1, RuleUnit::Hour)]
                .into_iter()
                .flatten()
                .collect(),
            drop_incomplete: true,
            extra_numeric_policy: ExtraNumericPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    pub sma_windows: Vec<usize>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            sma_windows: vec![10, 50],
        }
    }
}

/// Summary of changes performed during normalization.
///
/// All counters are additive for the processed configuration.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConfigNormalizationReport {
    /// `columns_map` keys that changed when upper-casing/trimming.
    pub columns_renamed: usize,
    /// Duplicate variants removed after lower-casing.
    pub variants_deduped: usize,
    /// Duplicate required columns removed after upper-casing.
    pub required_deduped: usize,
    /// Duplicate timeframes removed.
    pub timeframes_deduped: usize,
}

/// Normalize a configuration in place.
///
/// What normalization does:
/// - Upper-case + trim `columns_map` keys; reject empty or colliding keys
/// - Lower-case + trim variants; drop empty ones and duplicates, preserving first occurrence
/// - Upper-case + trim + de-duplicate `required_columns`
/// - Trim timezone names and validate them
/// - Trim `gaps.ffill_columns`; reject a negative `short_gap_minutes`
/// - De-duplicate `resample.timeframes`; reject zero SMA windows
///
/// Errors:
/// - Any rejection above, or an unknown timezone name
pub fn normalize_config(cfg: &mut EtlConfig) -> anyhow::Result<ConfigNormalizationReport> {
    let mut report = ConfigNormalizationReport::default();

    let mut rebuilt: IndexMap<String, Vec<String>> = IndexMap::new();
    for (raw_key, variants) in mem::take(&mut cfg.schema.columns_map) {
        let key = raw_key.trim().to_uppercase();
        if key.is_empty() {
            bail!("schema.columns_map key cannot be empty after trimming");
        }
        if key != raw_key {
            report.columns_renamed += 1;
        }
        if rebuilt.contains_key(&key) {
            bail!("duplicate schema.columns_map key after normalization: {key}");
        }

        let before = variants.len();
        let mut seen = HashSet::new();
        let norm: Vec<String> = variants
            .into_iter()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty() && seen.insert(v.clone()))
            .collect();
        report.variants_deduped += before.saturating_sub(norm.len());
        rebuilt.insert(key, norm);
    }
    cfg.schema.columns_map = rebuilt;

    let before = cfg.schema.required_columns.len();
    let mut seen = HashSet::new();
    let mut required = Vec::with_capacity(before);
    for name in mem::take(&mut cfg.schema.required_columns) {
        let name = name.trim().to_uppercase();
        if name.is_empty() {
            bail!("schema.required_columns entries cannot be empty");
        }
        if seen.insert(name.clone()) {
            required.push(name);
        }
    }
    report.required_deduped = before - required.len();
    cfg.schema.required_columns = required;

    cfg.timezone.target = cfg.timezone.target.trim().to_string();
    parse_tz(&cfg.timezone.target).context("timezone.target")?;
    if let Some(src) = cfg.timezone.source_default.take() {
        let src = src.trim().to_string();
        if !src.is_empty() {
            parse_tz(&src).context("timezone.source_default")?;
            cfg.timezone.source_default = Some(src);
        }
    }

    if let Some(gaps) = cfg.gaps.as_mut() {
        if gaps.short_gap_minutes < 0 {
            bail!("gaps.short_gap_minutes must be >= 0, got {}", gaps.short_gap_minutes);
        }
        gaps.ffill_columns = mem::take(&mut gaps.ffill_columns)
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
    }

    let before = cfg.resample.timeframes.len();
    let mut seen = HashSet::new();
    cfg.resample.timeframes.retain(|r| seen.insert(*r));
    report.timeframes_deduped = before - cfg.resample.timeframes.len();

    if cfg.quality.sma_windows.contains(&0) {
        bail!("quality.sma_windows entries must be > 0");
    }

    Ok(report)
}

/// Parse and normalize a configuration from a TOML string, expanding
/// environment variables from the process environment.
pub fn load_config_str(toml_str: &str) -> anyhow::Result<EtlConfig> {
    load_config_str_with(toml_str, |name| std::env::var(name).ok())
}

/// [`load_config_str`] with variables resolved through `lookup`.
///
/// Steps:
/// - Parse TOML into a generic table and expand `$VAR` references in string values
/// - Deserialize into [`EtlConfig`]
/// - Normalize via [`normalize_config`]
pub fn load_config_str_with<F>(toml_str: &str, lookup: F) -> anyhow::Result<EtlConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let table: toml::Table = toml::from_str(toml_str).context("failed to parse config TOML")?;
    let mut value = toml::Value::Table(table);
    expand_strings(&mut value, &lookup);
    let mut cfg: EtlConfig = value.try_into().context("invalid configuration")?;
    let report = normalize_config(&mut cfg).context("normalize_config failed")?;
    debug!(?report, "configuration normalized");
    Ok(cfg)
}

/// Read a configuration TOML file from disk, parse, and normalize it.
///
/// See [`load_config_str`] for details on parsing and normalization.
pub fn load_config_path(path: impl AsRef<Path>) -> anyhow::Result<EtlConfig> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read config file {}", path.as_ref().display()))?;
    load_config_str(&text)
}

fn expand_strings<F>(value: &mut toml::Value, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        toml::Value::String(s) => *s = expand_with(s, lookup),
        toml::Value::Array(items) => items.iter_mut().for_each(|v| expand_strings(v, lookup)),
        toml::Value::Table(table) => table.iter_mut().for_each(|(_, v)| expand_strings(v, lookup)),
        _ => {}
    }
}
