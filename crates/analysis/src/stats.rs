//! Mutable counters shared by reference across every pass.
//!
//! Each pass bumps its own effect counters; the orchestrator snapshots module
//! shape before the first pass and after the last one so a report can show
//! how much the module grew.

use serde::{Deserialize, Serialize};
use shroud_ir::Module;
use tracing::debug;

/// Accumulated per-pass effect counts plus before/after module snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscationStats {
    pub flattened_functions: u64,
    pub bogus_blocks: u64,
    pub opaque_predicates: u64,
    pub encrypted_strings: u64,
    pub substituted_instructions: u64,
    pub indirect_calls: u64,

    pub functions_before: usize,
    pub blocks_before: usize,
    pub instructions_before: usize,
    pub functions_after: usize,
    pub blocks_after: usize,
    pub instructions_after: usize,
}

impl ObfuscationStats {
    /// Records module shape before any pass runs.
    pub fn snapshot_before(&mut self, module: &Module) {
        self.functions_before = module.function_count();
        self.blocks_before = module.block_count();
        self.instructions_before = module.instruction_count();
        debug!(
            functions = self.functions_before,
            blocks = self.blocks_before,
            instructions = self.instructions_before,
            "pre-obfuscation snapshot"
        );
    }

    /// Records module shape once the full pipeline has finished.
    pub fn snapshot_after(&mut self, module: &Module) {
        self.functions_after = module.function_count();
        self.blocks_after = module.block_count();
        self.instructions_after = module.instruction_count();
        debug!(
            functions = self.functions_after,
            blocks = self.blocks_after,
            instructions = self.instructions_after,
            "post-obfuscation snapshot"
        );
    }
}
