//! Call-target indirection.
//!
//! Rewrites every direct call to a statically known, non-intrinsic function
//! into a call through a freshly allocated stack slot: store the target
//! reference, load it back, invoke the loaded value. Behavior is unchanged
//! (the loaded value is always the original target); what disappears is the
//! static call-graph edge a naive disassembly listing would show.

use crate::string_encryption::DECRYPT_FN;
use crate::{PassContext, Transform};
use shroud_ir::{Callee, FunctionId, Instruction, Module, Type, Value};
use shroud_utils::errors::TransformError;
use tracing::debug;

#[derive(Debug)]
pub struct IndirectCall;

impl Transform for IndirectCall {
    fn name(&self) -> &'static str {
        "IndirectCall"
    }

    fn apply(
        &self,
        module: &mut Module,
        ctx: &mut PassContext<'_>,
    ) -> Result<bool, TransformError> {
        let intrinsic: Vec<bool> = module.functions.iter().map(|f| f.intrinsic).collect();
        let mut rewritten = 0u64;

        for func in &mut module.functions {
            if func.is_declaration
                || func.optimize_disabled
                || func.synthetic
                || func.name.starts_with(DECRYPT_FN)
            {
                continue;
            }

            for bi in 0..func.blocks.len() {
                // snapshot call sites first; insertion below shifts indices
                let sites: Vec<(usize, FunctionId)> = func.blocks[bi]
                    .instructions
                    .iter()
                    .enumerate()
                    .filter_map(|(i, ins)| match ins {
                        Instruction::Call {
                            callee: Callee::Direct(fid),
                            ..
                        } if !intrinsic[fid.0] => Some((i, *fid)),
                        _ => None,
                    })
                    .collect();

                // back to front so earlier indices stay valid
                for (i, target) in sites.into_iter().rev() {
                    let slot = func.new_value();
                    let loaded = func.new_value();
                    let block = &mut func.blocks[bi];
                    let prelude = [
                        Instruction::Alloca {
                            result: slot,
                            ty: Type::Ptr,
                        },
                        Instruction::Store {
                            ty: Type::Ptr,
                            value: Value::Function(target),
                            ptr: Value::Instr(slot),
                        },
                        Instruction::Load {
                            result: loaded,
                            ty: Type::Ptr,
                            ptr: Value::Instr(slot),
                        },
                    ];
                    for (k, ins) in prelude.into_iter().enumerate() {
                        block.instructions.insert(i + k, ins);
                    }
                    if let Instruction::Call { callee, .. } = &mut block.instructions[i + 3] {
                        *callee = Callee::Indirect(Value::Instr(loaded));
                    }
                    rewritten += 1;
                }
            }
        }

        ctx.stats.indirect_calls += rewritten;
        if rewritten > 0 {
            debug!(call_sites = rewritten, "indirected direct calls");
        }
        Ok(rewritten > 0)
    }
}
