//! The externally consumed report shape.
//!
//! Serializes to a JSON object with a single `obfuscation_metrics` key
//! holding the per-pass effect counts. Writing the report file is the
//! caller's responsibility; the core only produces the serializable value.

use crate::stats::ObfuscationStats;
use serde::{Deserialize, Serialize};

/// Integer effect counts, one field per pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscationMetrics {
    pub flattened_functions: u64,
    pub bogus_blocks: u64,
    pub opaque_predicates: u64,
    pub encrypted_strings: u64,
    pub substituted_instructions: u64,
    pub indirect_calls: u64,
}

/// Top-level report document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscationReport {
    pub obfuscation_metrics: ObfuscationMetrics,
}

impl ObfuscationReport {
    pub fn from_stats(stats: &ObfuscationStats) -> Self {
        Self {
            obfuscation_metrics: ObfuscationMetrics {
                flattened_functions: stats.flattened_functions,
                bogus_blocks: stats.bogus_blocks,
                opaque_predicates: stats.opaque_predicates,
                encrypted_strings: stats.encrypted_strings,
                substituted_instructions: stats.substituted_instructions,
                indirect_calls: stats.indirect_calls,
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
