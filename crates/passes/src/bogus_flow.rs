//! Bogus control flow behind opaque predicates.
//!
//! Candidate blocks are split in two; the prefix re-ends in a conditional
//! branch on `(x * (x + 1)) % 2 == 0`, where `x` is loaded from a mutable
//! module global the optimizer cannot see through. The predicate is always
//! true for any integer `x` (one of two consecutive integers is even), so
//! execution always takes the real path; the false edge leads to a junk
//! block of dead arithmetic that falls through to the real path anyway.

use crate::{PassContext, Transform};
use shroud_ir::{
    BasicBlock, BinOp, BlockId, CmpPred, Global, Instruction, IntTy, Module, Terminator, Value,
};
use shroud_utils::errors::TransformError;
use tracing::debug;

/// Mutable global backing the opaque predicate. Created lazily on the first
/// injection so untouched modules carry no extra data.
pub const OPAQUE_GLOBAL: &str = "opaque_x";

/// Blocks shorter than this (terminator included) are not worth splitting.
const MIN_BLOCK_SIZE: usize = 3;

#[derive(Debug)]
pub struct BogusControlFlow {
    probability: u32,
}

impl BogusControlFlow {
    pub fn new(probability: u32) -> Self {
        Self { probability }
    }
}

impl Transform for BogusControlFlow {
    fn name(&self) -> &'static str {
        "BogusControlFlow"
    }

    fn apply(
        &self,
        module: &mut Module,
        ctx: &mut PassContext<'_>,
    ) -> Result<bool, TransformError> {
        let mut injected = 0u64;

        for fi in 0..module.functions.len() {
            let func = &module.functions[fi];
            if func.is_declaration || func.optimize_disabled || func.synthetic {
                continue;
            }

            // snapshot the block range; injections append blocks and must
            // not themselves become candidates
            let original_len = func.blocks.len();
            for bi in 1..original_len {
                let block = &module.functions[fi].blocks[bi];
                if block.eh_pad
                    || block.address_taken
                    || block.instructions.len() + 1 < MIN_BLOCK_SIZE
                {
                    continue;
                }
                if !ctx.rng.roll(self.probability) {
                    continue;
                }
                if inject(module, ctx, fi, BlockId(bi)) {
                    injected += 1;
                    ctx.stats.bogus_blocks += 1;
                    ctx.stats.opaque_predicates += 1;
                }
            }
        }

        if injected > 0 {
            debug!(blocks = injected, "injected bogus control flow");
        }
        Ok(injected > 0)
    }
}

/// Splits the block after its leading phi/alloca run and wires the opaque
/// conditional plus the junk block in between.
fn inject(module: &mut Module, ctx: &mut PassContext<'_>, fi: usize, bb: BlockId) -> bool {
    let Some(at) = module.functions[fi].blocks[bb.0]
        .instructions
        .iter()
        .position(|i| !i.is_phi() && !i.is_alloca())
    else {
        return false;
    };

    if !module.globals.contains_key(OPAQUE_GLOBAL) {
        let init = ctx.rng.range(1, 100) as i32;
        module.add_global(OPAQUE_GLOBAL, Global::mutable(init.to_le_bytes()));
    }
    let junk_a = ctx.rng.range(1, 100);
    let junk_b = ctx.rng.range(1, 100);

    let func = &mut module.functions[fi];
    let real = func.split_block(bb, at, "real_path");

    // dead arithmetic on the never-taken edge
    let j1 = func.new_value();
    let j2 = func.new_value();
    let mut bogus = BasicBlock::new("bogus_path", Terminator::Br(real));
    bogus.instructions.push(Instruction::BinOp {
        result: j1,
        op: BinOp::Add,
        ty: IntTy::I32,
        lhs: Value::Const(junk_a, IntTy::I32),
        rhs: Value::Const(junk_b, IntTy::I32),
    });
    bogus.instructions.push(Instruction::BinOp {
        result: j2,
        op: BinOp::Mul,
        ty: IntTy::I32,
        lhs: Value::Instr(j1),
        rhs: Value::Const(junk_b, IntTy::I32),
    });
    let bogus_id = func.push_block(bogus);

    // (x * (x + 1)) % 2 == 0 over the opaque global
    let x = func.new_value();
    let x1 = func.new_value();
    let prod = func.new_value();
    let rem = func.new_value();
    let pred = func.new_value();
    let prefix = func.block_mut(bb);
    prefix.instructions.extend([
        Instruction::Load {
            result: x,
            ty: shroud_ir::Type::Int(IntTy::I32),
            ptr: Value::Global(OPAQUE_GLOBAL.to_owned()),
        },
        Instruction::BinOp {
            result: x1,
            op: BinOp::Add,
            ty: IntTy::I32,
            lhs: Value::Instr(x),
            rhs: Value::Const(1, IntTy::I32),
        },
        Instruction::BinOp {
            result: prod,
            op: BinOp::Mul,
            ty: IntTy::I32,
            lhs: Value::Instr(x),
            rhs: Value::Instr(x1),
        },
        Instruction::BinOp {
            result: rem,
            op: BinOp::SRem,
            ty: IntTy::I32,
            lhs: Value::Instr(prod),
            rhs: Value::Const(2, IntTy::I32),
        },
        Instruction::ICmp {
            result: pred,
            pred: CmpPred::Eq,
            lhs: Value::Instr(rem),
            rhs: Value::Const(0, IntTy::I32),
        },
    ]);
    prefix.terminator = Terminator::CondBr {
        cond: Value::Instr(pred),
        then_to: real,
        else_to: bogus_id,
    };
    true
}
