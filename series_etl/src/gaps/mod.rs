//! Gap analysis: detection against the expected grid and repair onto it.

pub mod detect;
pub mod repair;

pub use detect::{GapClass, GapInfo, classify_gap, detect_gaps};
pub use repair::{GapRepairReport, RepairOptions, repair_gaps};
