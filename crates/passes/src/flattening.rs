//! Control-flow flattening.
//!
//! Rewrites a function's block-to-block topology into a dispatch loop: every
//! flattened block gets a unique nonzero key, a stack-allocated state
//! variable selects the next block through a `switch` in a new dispatcher,
//! and each flattened block ends by storing its successor's key and jumping
//! back to the dispatcher. Conditional branches become a `select` between
//! the two successor keys, so the original branch structure is no longer
//! visible in the block graph. Returns are left untouched.

use crate::{PassContext, Transform};
use shroud_ir::{
    BasicBlock, BlockId, Function, Instruction, IntTy, Module, Terminator, Type, Value,
};
use shroud_utils::errors::TransformError;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Dispatch keys are drawn from this inclusive range; zero is reserved so an
/// uninitialized state slot can never alias a real block.
const KEY_MIN: i64 = 1;
const KEY_MAX: i64 = 1_000_000;

#[derive(Debug)]
pub struct Flattening;

impl Transform for Flattening {
    fn name(&self) -> &'static str {
        "Flattening"
    }

    fn apply(
        &self,
        module: &mut Module,
        ctx: &mut PassContext<'_>,
    ) -> Result<bool, TransformError> {
        let mut flattened = 0u64;
        for func in &mut module.functions {
            if func.is_declaration || func.optimize_disabled || func.synthetic {
                continue;
            }
            if flatten_function(func, ctx) {
                flattened += 1;
                ctx.stats.flattened_functions += 1;
            }
        }
        if flattened > 0 {
            debug!(functions = flattened, "flattened control flow");
        }
        Ok(flattened > 0)
    }
}

fn flatten_function(func: &mut Function, ctx: &mut PassContext<'_>) -> bool {
    if func.blocks.len() < 2 {
        return false;
    }
    // phi nodes encode predecessor identity, which the dispatcher would
    // destroy; such functions are left whole rather than half-rewritten
    let has_phi = func
        .blocks
        .iter()
        .any(|b| b.instructions.iter().any(Instruction::is_phi));
    if has_phi {
        return false;
    }

    // every non-entry block that may be rewired gets a key
    let candidates: Vec<BlockId> = (1..func.blocks.len())
        .map(BlockId)
        .filter(|b| {
            let block = func.block(*b);
            !block.eh_pad && !block.address_taken
        })
        .collect();
    if candidates.len() < 2 {
        return false;
    }

    let mut used = HashSet::new();
    let mut keys: HashMap<BlockId, i64> = HashMap::new();
    for &b in &candidates {
        let key = loop {
            let k = ctx.rng.range(KEY_MIN, KEY_MAX);
            if used.insert(k) {
                break k;
            }
        };
        keys.insert(b, key);
    }

    // the entry must fall through unconditionally into a keyed block,
    // otherwise the dispatcher cannot take over from it
    let Terminator::Br(first) = func.blocks[0].terminator else {
        return false;
    };
    let Some(&start_key) = keys.get(&first) else {
        return false;
    };

    let dispatch_id = BlockId(func.blocks.len());
    let default_id = BlockId(func.blocks.len() + 1);

    let state = func.new_value();
    let loaded = func.new_value();

    let mut cases: Vec<(i64, BlockId)> = candidates.iter().map(|b| (keys[b], *b)).collect();
    cases.sort_unstable();

    let mut dispatch = BasicBlock::new(
        "dispatch",
        Terminator::Switch {
            value: Value::Instr(loaded),
            default: default_id,
            cases,
        },
    );
    dispatch.instructions.push(Instruction::Load {
        result: loaded,
        ty: Type::Int(IntTy::I32),
        ptr: Value::Instr(state),
    });
    func.push_block(dispatch);

    // unreachable in practice; keys cover every switch operand the blocks
    // can store
    func.push_block(BasicBlock::new(
        "dispatch_default",
        Terminator::Ret(func.ret.zero_value()),
    ));

    let entry = &mut func.blocks[0];
    entry.instructions.insert(
        0,
        Instruction::Alloca {
            result: state,
            ty: Type::Int(IntTy::I32),
        },
    );
    entry.instructions.insert(
        1,
        Instruction::Store {
            ty: Type::Int(IntTy::I32),
            value: Value::Const(start_key, IntTy::I32),
            ptr: Value::Instr(state),
        },
    );
    entry.terminator = Terminator::Br(dispatch_id);

    for &b in &candidates {
        match func.blocks[b.0].terminator.clone() {
            Terminator::Ret(_) => {}
            Terminator::Br(succ) => {
                let Some(&key) = keys.get(&succ) else {
                    continue;
                };
                let block = &mut func.blocks[b.0];
                block.instructions.push(Instruction::Store {
                    ty: Type::Int(IntTy::I32),
                    value: Value::Const(key, IntTy::I32),
                    ptr: Value::Instr(state),
                });
                block.terminator = Terminator::Br(dispatch_id);
            }
            Terminator::CondBr {
                cond,
                then_to,
                else_to,
            } => {
                let (Some(&tk), Some(&fk)) = (keys.get(&then_to), keys.get(&else_to)) else {
                    continue;
                };
                let chosen = func.new_value();
                let block = &mut func.blocks[b.0];
                block.instructions.push(Instruction::Select {
                    result: chosen,
                    cond,
                    on_true: Value::Const(tk, IntTy::I32),
                    on_false: Value::Const(fk, IntTy::I32),
                });
                block.instructions.push(Instruction::Store {
                    ty: Type::Int(IntTy::I32),
                    value: Value::Instr(chosen),
                    ptr: Value::Instr(state),
                });
                block.terminator = Terminator::Br(dispatch_id);
            }
            // multi-way dispatch keeps its shape; rewiring it through the
            // state variable would need one select per case
            Terminator::Switch { .. } => {}
        }
    }

    true
}
