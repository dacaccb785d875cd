//! In-memory intermediate representation for the shroud obfuscation engine.
//!
//! A [`module::Module`] owns insertion-ordered functions and global byte
//! constants. Each function is a list of basic blocks ending in exactly one
//! typed terminator; the first block is the entry block. Transform passes
//! mutate the module in place and the [`verify`] module re-checks structural
//! well-formedness afterwards. The [`eval`] module provides a bounded
//! reference interpreter so tests can compare observable behavior before and
//! after obfuscation.

pub mod builder;
pub mod eval;
pub mod module;
pub mod verify;

pub use builder::FunctionBuilder;
pub use module::{
    BasicBlock, BinOp, BlockId, Callee, CmpPred, Constructor, Function, FunctionId, Global, IntTy,
    Instruction, Module, Terminator, Type, Value, ValueId,
};
