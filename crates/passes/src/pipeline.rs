//! Pipeline orchestration.
//!
//! Passes run in a fixed order regardless of how the options are spelled:
//! string encryption first (so the decryptor exists before calls are
//! indirected around it), then call indirection, substitution, bogus flow,
//! and flattening last, once every other pass has finished reshaping blocks.
//! The module is verified after the full run; a verifier failure aborts the
//! build rather than emitting a broken artifact.

use crate::bogus_flow::BogusControlFlow;
use crate::flattening::Flattening;
use crate::indirect_call::IndirectCall;
use crate::rng::Prng;
use crate::string_encryption::StringEncryption;
use crate::substitution::Substitution;
use crate::{ObfuscationOptions, PassContext, Transform};
use shroud_analysis::ObfuscationStats;
use shroud_ir::verify::verify_module;
use shroud_ir::Module;
use shroud_utils::errors::ObfuscateError;
use tracing::{debug, info};

/// Instantiates the enabled passes in pipeline order.
pub fn build_passes(options: &ObfuscationOptions) -> Vec<Box<dyn Transform>> {
    let mut passes: Vec<Box<dyn Transform>> = Vec::new();
    if options.encrypt_strings {
        passes.push(Box::new(StringEncryption));
    }
    if options.indirect_calls {
        passes.push(Box::new(IndirectCall));
    }
    if options.substitute {
        passes.push(Box::new(Substitution));
    }
    if options.bogus_flow {
        passes.push(Box::new(BogusControlFlow::new(options.bogus_probability)));
    }
    if options.flatten {
        passes.push(Box::new(Flattening));
    }
    passes
}

/// Runs the configured passes over `module` and returns the collected
/// statistics. The random stream is seeded once and shared across passes.
pub fn run_pipeline(
    module: &mut Module,
    options: &ObfuscationOptions,
) -> Result<ObfuscationStats, ObfuscateError> {
    let passes = build_passes(options);
    let mut rng = Prng::from_seed(options.seed);
    let mut stats = ObfuscationStats::default();
    stats.snapshot_before(module);

    for pass in &passes {
        let changed = pass.apply(
            module,
            &mut PassContext {
                rng: &mut rng,
                stats: &mut stats,
            },
        )?;
        info!(pass = pass.name(), changed, "pass finished");
    }

    stats.snapshot_after(module);
    verify_module(module)?;
    debug!(
        blocks_before = stats.blocks_before,
        blocks_after = stats.blocks_after,
        "pipeline verified"
    );
    Ok(stats)
}
