//! Instruction substitution.
//!
//! Rewrites add/sub/xor through equivalent identities that hold under
//! two's-complement wraparound at the operand width:
//!
//! - `a + b`  becomes `a - (-b)`
//! - `a - b`  becomes `a + (-b)`
//! - `a ^ b`  becomes `(a | b) - (a & b)`
//!
//! Candidates are snapshotted per function before any mutation; each is
//! independently selected with a 50% roll. Replacements are inserted in front
//! of the original, uses are rewired, and the originals are deleted only
//! after the whole function has been scanned so the candidate list never
//! goes stale mid-rewrite.

use crate::{PassContext, Transform};
use shroud_ir::{BinOp, Function, Instruction, IntTy, Module, Value, ValueId};
use shroud_utils::errors::TransformError;
use std::collections::HashSet;
use tracing::debug;

/// Per-candidate selection probability, in percent.
const SUBSTITUTION_CHANCE: u32 = 50;

#[derive(Debug)]
pub struct Substitution;

struct Candidate {
    block: usize,
    result: ValueId,
    op: BinOp,
    ty: IntTy,
    lhs: Value,
    rhs: Value,
}

impl Transform for Substitution {
    fn name(&self) -> &'static str {
        "Substitution"
    }

    fn apply(
        &self,
        module: &mut Module,
        ctx: &mut PassContext<'_>,
    ) -> Result<bool, TransformError> {
        let mut changed = false;
        for func in &mut module.functions {
            if func.is_declaration || func.optimize_disabled || func.synthetic {
                continue;
            }
            changed |= substitute_in_function(func, ctx);
        }
        Ok(changed)
    }
}

fn substitute_in_function(func: &mut Function, ctx: &mut PassContext<'_>) -> bool {
    let mut candidates = Vec::new();
    for (bi, block) in func.blocks.iter().enumerate() {
        for ins in &block.instructions {
            if let Instruction::BinOp {
                result,
                op,
                ty,
                lhs,
                rhs,
            } = ins
            {
                if matches!(op, BinOp::Add | BinOp::Sub | BinOp::Xor) {
                    candidates.push(Candidate {
                        block: bi,
                        result: *result,
                        op: *op,
                        ty: *ty,
                        lhs: lhs.clone(),
                        rhs: rhs.clone(),
                    });
                }
            }
        }
    }

    let selected: Vec<Candidate> = candidates
        .into_iter()
        .filter(|_| ctx.rng.roll(SUBSTITUTION_CHANCE))
        .collect();
    if selected.is_empty() {
        return false;
    }

    let mut doomed: HashSet<ValueId> = HashSet::new();
    let mut rewires: Vec<(ValueId, ValueId)> = Vec::new();
    for cand in &selected {
        let Some(at) = func.blocks[cand.block]
            .instructions
            .iter()
            .position(|i| i.result() == Some(cand.result))
        else {
            continue;
        };
        let (replacement, new_result) = expand(func, cand);
        for (k, ins) in replacement.into_iter().enumerate() {
            func.blocks[cand.block].instructions.insert(at + k, ins);
        }
        rewires.push((cand.result, new_result));
        doomed.insert(cand.result);
        ctx.stats.substituted_instructions += 1;
    }

    for (old, new) in &rewires {
        func.replace_value_uses(*old, &Value::Instr(*new));
    }
    // deferred deletion of the originals
    for block in &mut func.blocks {
        block
            .instructions
            .retain(|i| !i.result().is_some_and(|r| doomed.contains(&r)));
    }

    debug!(
        function = %func.name,
        substituted = rewires.len(),
        "substituted binary operations"
    );
    true
}

/// Builds the replacement sequence; the last instruction defines the value
/// the original result is rewired to. Negation is expressed as `0 - x`.
fn expand(func: &mut Function, cand: &Candidate) -> (Vec<Instruction>, ValueId) {
    let zero = Value::Const(0, cand.ty);
    match cand.op {
        BinOp::Add => {
            let neg = func.new_value();
            let out = func.new_value();
            (
                vec![
                    Instruction::BinOp {
                        result: neg,
                        op: BinOp::Sub,
                        ty: cand.ty,
                        lhs: zero,
                        rhs: cand.rhs.clone(),
                    },
                    Instruction::BinOp {
                        result: out,
                        op: BinOp::Sub,
                        ty: cand.ty,
                        lhs: cand.lhs.clone(),
                        rhs: Value::Instr(neg),
                    },
                ],
                out,
            )
        }
        BinOp::Sub => {
            let neg = func.new_value();
            let out = func.new_value();
            (
                vec![
                    Instruction::BinOp {
                        result: neg,
                        op: BinOp::Sub,
                        ty: cand.ty,
                        lhs: zero,
                        rhs: cand.rhs.clone(),
                    },
                    Instruction::BinOp {
                        result: out,
                        op: BinOp::Add,
                        ty: cand.ty,
                        lhs: cand.lhs.clone(),
                        rhs: Value::Instr(neg),
                    },
                ],
                out,
            )
        }
        BinOp::Xor => {
            let or = func.new_value();
            let and = func.new_value();
            let out = func.new_value();
            (
                vec![
                    Instruction::BinOp {
                        result: or,
                        op: BinOp::Or,
                        ty: cand.ty,
                        lhs: cand.lhs.clone(),
                        rhs: cand.rhs.clone(),
                    },
                    Instruction::BinOp {
                        result: and,
                        op: BinOp::And,
                        ty: cand.ty,
                        lhs: cand.lhs.clone(),
                        rhs: cand.rhs.clone(),
                    },
                    Instruction::BinOp {
                        result: out,
                        op: BinOp::Sub,
                        ty: cand.ty,
                        lhs: Value::Instr(or),
                        rhs: Value::Instr(and),
                    },
                ],
                out,
            )
        }
        _ => unreachable!("only add/sub/xor are collected as candidates"),
    }
}
