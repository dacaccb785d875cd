//! Statistics collection and report shaping for the obfuscation pipeline.

pub mod report;
pub mod stats;

pub use report::{ObfuscationMetrics, ObfuscationReport};
pub use stats::ObfuscationStats;
