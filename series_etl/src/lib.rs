//! Time-series normalization, gap analysis and resampling for OHLC market data.
//!
//! Pipeline, leaf-first:
//! - [`normalize`]: canonical columns, typed values, a sorted, duplicate-free,
//!   timezone-aware index, plus a [`normalize::NormalizationReport`].
//! - [`gaps`]: missing-timestamp detection against a regular [`rule::Rule`] grid,
//!   and repair onto that grid.
//! - [`resample`]: OHLC-aware aggregation to coarser rules.
//! - [`quality`]: a numeric data-quality summary.
//!
//! [`config`] and [`io`] are thin edges used by the `series-etl` binary; the
//! engine modules do no I/O.

pub mod bucket;
pub mod config;
pub mod error;
pub mod frame;
pub mod gaps;
pub mod io;
pub mod normalize;
pub mod quality;
pub mod resample;
pub mod rule;
pub mod schema;
pub mod tz;

pub use error::EngineError;
pub use frame::{Cell, Column, Frame, RawFrame, Series};
pub use rule::Rule;
