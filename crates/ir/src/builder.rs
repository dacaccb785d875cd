//! Append-oriented construction of functions.
//!
//! Used by the string-encryption pass to synthesize the bootstrap decryptor
//! and by tests to assemble input modules without hand-writing block lists.
//! The builder keeps a current block; instruction methods append to it and
//! return the defined value as an operand ready for the next instruction.

use crate::module::{
    BasicBlock, BinOp, BlockId, Callee, CmpPred, Function, Instruction, IntTy, Terminator, Type,
    Value,
};

#[derive(Debug)]
pub struct FunctionBuilder {
    func: Function,
    cur: BlockId,
}

impl FunctionBuilder {
    /// Starts a function definition with an empty `entry` block.
    pub fn new(name: impl Into<String>, params: Vec<Type>, ret: Type) -> Self {
        let mut func = Function::new(name, params, ret);
        let cur = func.push_block(BasicBlock::new("entry", Terminator::Ret(None)));
        Self { func, cur }
    }

    /// Appends a new block without switching to it.
    pub fn block(&mut self, label: impl Into<String>) -> BlockId {
        self.func
            .push_block(BasicBlock::new(label, Terminator::Ret(None)))
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.cur = block;
    }

    pub const fn current(&self) -> BlockId {
        self.cur
    }

    fn push(&mut self, ins: Instruction) {
        let cur = self.cur;
        self.func.block_mut(cur).instructions.push(ins);
    }

    pub fn alloca(&mut self, ty: Type) -> Value {
        let result = self.func.new_value();
        self.push(Instruction::Alloca { result, ty });
        Value::Instr(result)
    }

    pub fn load(&mut self, ty: Type, ptr: Value) -> Value {
        let result = self.func.new_value();
        self.push(Instruction::Load { result, ty, ptr });
        Value::Instr(result)
    }

    pub fn store(&mut self, ty: Type, value: Value, ptr: Value) {
        self.push(Instruction::Store { ty, value, ptr });
    }

    pub fn binop(&mut self, op: BinOp, ty: IntTy, lhs: Value, rhs: Value) -> Value {
        let result = self.func.new_value();
        self.push(Instruction::BinOp {
            result,
            op,
            ty,
            lhs,
            rhs,
        });
        Value::Instr(result)
    }

    pub fn icmp(&mut self, pred: CmpPred, lhs: Value, rhs: Value) -> Value {
        let result = self.func.new_value();
        self.push(Instruction::ICmp {
            result,
            pred,
            lhs,
            rhs,
        });
        Value::Instr(result)
    }

    pub fn select(&mut self, cond: Value, on_true: Value, on_false: Value) -> Value {
        let result = self.func.new_value();
        self.push(Instruction::Select {
            result,
            cond,
            on_true,
            on_false,
        });
        Value::Instr(result)
    }

    pub fn gep(&mut self, base: Value, index: Value) -> Value {
        let result = self.func.new_value();
        self.push(Instruction::Gep {
            result,
            base,
            index,
        });
        Value::Instr(result)
    }

    /// Appends a call; returns the result operand for non-void callees.
    pub fn call(&mut self, callee: Callee, args: Vec<Value>, ret: Type) -> Option<Value> {
        let result = if ret == Type::Void {
            None
        } else {
            Some(self.func.new_value())
        };
        self.push(Instruction::Call {
            result,
            callee,
            args,
        });
        result.map(Value::Instr)
    }

    pub fn phi(&mut self, ty: IntTy, incoming: Vec<(Value, BlockId)>) -> Value {
        let result = self.func.new_value();
        self.push(Instruction::Phi {
            result,
            ty,
            incoming,
        });
        Value::Instr(result)
    }

    pub fn br(&mut self, target: BlockId) {
        let cur = self.cur;
        self.func.block_mut(cur).terminator = Terminator::Br(target);
    }

    pub fn cond_br(&mut self, cond: Value, then_to: BlockId, else_to: BlockId) {
        let cur = self.cur;
        self.func.block_mut(cur).terminator = Terminator::CondBr {
            cond,
            then_to,
            else_to,
        };
    }

    pub fn switch(&mut self, value: Value, default: BlockId, cases: Vec<(i64, BlockId)>) {
        let cur = self.cur;
        self.func.block_mut(cur).terminator = Terminator::Switch {
            value,
            default,
            cases,
        };
    }

    pub fn ret(&mut self, value: Option<Value>) {
        let cur = self.cur;
        self.func.block_mut(cur).terminator = Terminator::Ret(value);
    }

    pub fn finish(self) -> Function {
        self.func
    }
}
