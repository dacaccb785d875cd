//! Obfuscation transform passes and the pipeline orchestrator.
//!
//! Each pass implements [`Transform`]: apply to a module, mutate in place,
//! report whether anything changed. The orchestrator in [`pipeline`] runs the
//! enabled passes in a fixed order over one shared [`rng::Prng`] stream and
//! one shared statistics collector, then re-verifies the module.

pub mod bogus_flow;
pub mod flattening;
pub mod indirect_call;
pub mod pipeline;
pub mod rng;
pub mod string_encryption;
pub mod substitution;

use rng::Prng;
use serde::{Deserialize, Serialize};
use shroud_analysis::ObfuscationStats;
use shroud_ir::Module;
use shroud_utils::errors::TransformError;

/// Trait for IR obfuscation transforms.
pub trait Transform: Send + Sync {
    /// Returns the transform's name for logging and identification.
    fn name(&self) -> &'static str;
    /// Applies the transform to the module, returning whether changes were made.
    fn apply(&self, module: &mut Module, ctx: &mut PassContext<'_>)
        -> Result<bool, TransformError>;
}

/// Shared mutable state handed to every pass: the seeded random stream and
/// the statistics counters. Single-threaded by design; a parallel driver
/// would need one stream per function and atomic counters.
#[derive(Debug)]
pub struct PassContext<'a> {
    pub rng: &'a mut Prng,
    pub stats: &'a mut ObfuscationStats,
}

/// Configuration for the obfuscation pipeline, consumed from an external
/// CLI or config loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscationOptions {
    /// Enable control flow flattening.
    pub flatten: bool,
    /// Enable bogus control flow injection.
    pub bogus_flow: bool,
    /// Enable instruction substitution.
    pub substitute: bool,
    /// Enable string-literal encryption.
    pub encrypt_strings: bool,
    /// Enable call-target indirection.
    pub indirect_calls: bool,
    /// Flattening split factor. Advisory; reserved for block pre-splitting.
    pub split_factor: u32,
    /// Probability (0-100) of injecting bogus flow at a candidate block.
    pub bogus_probability: u32,
    /// Random seed; 0 selects a nondeterministic seed.
    pub seed: u64,
    /// Whether the caller should emit a report file.
    pub report: bool,
    /// Where the caller should write the report.
    pub report_path: String,
}

impl Default for ObfuscationOptions {
    fn default() -> Self {
        Self {
            flatten: false,
            bogus_flow: false,
            substitute: false,
            encrypt_strings: false,
            indirect_calls: false,
            split_factor: 3,
            bogus_probability: 50,
            seed: 0,
            report: false,
            report_path: "obfuscation_report.json".to_owned(),
        }
    }
}

impl ObfuscationOptions {
    /// All five passes enabled with a fixed seed. Convenience for tests and
    /// maximum-protection builds.
    pub fn all_passes(seed: u64) -> Self {
        Self {
            flatten: true,
            bogus_flow: true,
            substitute: true,
            encrypt_strings: true,
            indirect_calls: true,
            seed,
            ..Self::default()
        }
    }
}
