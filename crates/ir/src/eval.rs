//! Bounded reference interpreter for the IR.
//!
//! Exists so tests can run a function before and after obfuscation and diff
//! the observable results, including the mutable global state the decrypt
//! bootstrap rewrites. Not a performance-oriented VM: one shared step budget
//! guards against transforms that accidentally introduce nontermination.

use crate::module::{
    BinOp, Callee, CmpPred, Function, FunctionId, Instruction, IntTy, Module, Terminator, Type,
    Value, ValueId,
};
use indexmap::IndexMap;
use shroud_utils::errors::EvalError;
use std::collections::HashMap;

/// Upper bound on executed instructions per [`Machine`] lifetime.
const STEP_LIMIT: usize = 1_000_000;

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtValue {
    /// Sign-extended integer.
    Int(i64),
    /// Pointer into a stack slot or a global byte array.
    Ptr(PtrValue),
    /// A function reference, loadable and callable indirectly.
    Fn(FunctionId),
    /// Contents of a slot nothing has stored to yet.
    Undef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtrValue {
    Slot(usize),
    GlobalByte(String, usize),
}

/// Interpreter state: a module, a mutable copy of its global byte arrays, and
/// a slot arena shared by all frames.
#[derive(Debug)]
pub struct Machine<'m> {
    module: &'m Module,
    globals: IndexMap<String, Vec<u8>>,
    slots: Vec<RtValue>,
    steps: usize,
}

impl<'m> Machine<'m> {
    pub fn new(module: &'m Module) -> Self {
        let globals = module
            .globals
            .iter()
            .map(|(name, g)| (name.clone(), g.init.clone()))
            .collect();
        Self {
            module,
            globals,
            slots: Vec::new(),
            steps: 0,
        }
    }

    /// Current bytes of a global, reflecting any stores executed so far.
    pub fn global_bytes(&self, name: &str) -> Option<&[u8]> {
        self.globals.get(name).map(Vec::as_slice)
    }

    /// Runs every registered constructor in priority order (lowest first,
    /// registration order as tiebreak), mirroring program startup.
    pub fn run_constructors(&mut self) -> Result<(), EvalError> {
        let mut ctors = self.module.constructors.clone();
        ctors.sort_by_key(|c| c.priority);
        for ctor in ctors {
            self.call(ctor.function, &[])?;
        }
        Ok(())
    }

    /// Calls a function with the given arguments.
    pub fn call(
        &mut self,
        id: FunctionId,
        args: &[RtValue],
    ) -> Result<Option<RtValue>, EvalError> {
        let func = self
            .module
            .functions
            .get(id.0)
            .ok_or_else(|| EvalError::TypeMismatch(format!("no function #{}", id.0)))?;
        if func.is_declaration {
            return Err(EvalError::ExternalCall(func.name.clone()));
        }
        if args.len() != func.params.len() {
            return Err(EvalError::ArityMismatch(func.name.clone()));
        }
        self.exec(func, args)
    }

    fn exec(&mut self, func: &Function, args: &[RtValue]) -> Result<Option<RtValue>, EvalError> {
        let mut values: HashMap<ValueId, RtValue> = HashMap::new();
        let mut block = func.entry_id();
        let mut prev: Option<crate::module::BlockId> = None;

        loop {
            // Phis read their inputs against the pre-transfer state, so they
            // are evaluated as a batch before anything is bound.
            let mut phi_writes = Vec::new();
            for ins in &func.blocks[block.0].instructions {
                let Instruction::Phi {
                    result, incoming, ..
                } = ins
                else {
                    break;
                };
                let from = prev.ok_or_else(|| {
                    EvalError::TypeMismatch("phi in entry block".into())
                })?;
                let (value, _) = incoming
                    .iter()
                    .find(|(_, b)| *b == from)
                    .ok_or_else(|| {
                        EvalError::TypeMismatch(format!("phi has no edge from {from}"))
                    })?;
                phi_writes.push((*result, self.operand(func, &values, args, value)?));
            }
            for (id, v) in phi_writes {
                values.insert(id, v);
            }

            for ins in &func.blocks[block.0].instructions {
                if ins.is_phi() {
                    continue;
                }
                self.bump()?;
                self.step(func, &mut values, args, ins)?;
            }

            self.bump()?;
            match &func.blocks[block.0].terminator {
                Terminator::Br(t) => {
                    prev = Some(block);
                    block = *t;
                }
                Terminator::CondBr {
                    cond,
                    then_to,
                    else_to,
                } => {
                    let c = self.int_operand(func, &values, args, cond)?;
                    prev = Some(block);
                    block = if c != 0 { *then_to } else { *else_to };
                }
                Terminator::Switch {
                    value,
                    default,
                    cases,
                } => {
                    let v = self.int_operand(func, &values, args, value)?;
                    prev = Some(block);
                    block = cases
                        .iter()
                        .find(|(k, _)| *k == v)
                        .map_or(*default, |(_, b)| *b);
                }
                Terminator::Ret(v) => {
                    return v
                        .as_ref()
                        .map(|v| self.operand(func, &values, args, v))
                        .transpose();
                }
            }
        }
    }

    fn step(
        &mut self,
        func: &Function,
        values: &mut HashMap<ValueId, RtValue>,
        args: &[RtValue],
        ins: &Instruction,
    ) -> Result<(), EvalError> {
        match ins {
            Instruction::Alloca { result, .. } => {
                self.slots.push(RtValue::Undef);
                values.insert(*result, RtValue::Ptr(PtrValue::Slot(self.slots.len() - 1)));
            }
            Instruction::Load { result, ty, ptr } => {
                let loaded = match self.ptr_operand(func, values, args, ptr)? {
                    PtrValue::Slot(i) => self.slots[i].clone(),
                    PtrValue::GlobalByte(name, off) => {
                        RtValue::Int(self.read_global(&name, off, *ty)?)
                    }
                };
                values.insert(*result, loaded);
            }
            Instruction::Store { ty, value, ptr } => {
                let v = self.operand(func, values, args, value)?;
                match self.ptr_operand(func, values, args, ptr)? {
                    PtrValue::Slot(i) => self.slots[i] = v,
                    PtrValue::GlobalByte(name, off) => {
                        let RtValue::Int(n) = v else {
                            return Err(EvalError::TypeMismatch(
                                "store of non-integer into global".into(),
                            ));
                        };
                        self.write_global(&name, off, *ty, n)?;
                    }
                }
            }
            Instruction::BinOp {
                result,
                op,
                ty,
                lhs,
                rhs,
            } => {
                let a = ty.wrap(self.int_operand(func, values, args, lhs)?);
                let b = ty.wrap(self.int_operand(func, values, args, rhs)?);
                let raw = match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::And => a & b,
                    BinOp::Or => a | b,
                    BinOp::Xor => a ^ b,
                    BinOp::SRem => {
                        if b == 0 {
                            return Err(EvalError::DivisionByZero);
                        }
                        a.wrapping_rem(b)
                    }
                };
                values.insert(*result, RtValue::Int(ty.wrap(raw)));
            }
            Instruction::ICmp {
                result,
                pred,
                lhs,
                rhs,
            } => {
                let a = self.int_operand(func, values, args, lhs)?;
                let b = self.int_operand(func, values, args, rhs)?;
                let hit = match pred {
                    CmpPred::Eq => a == b,
                    CmpPred::Ne => a != b,
                    CmpPred::Slt => a < b,
                    CmpPred::Sle => a <= b,
                    CmpPred::Sgt => a > b,
                    CmpPred::Sge => a >= b,
                };
                values.insert(*result, RtValue::Int(i64::from(hit)));
            }
            Instruction::Select {
                result,
                cond,
                on_true,
                on_false,
            } => {
                let c = self.int_operand(func, values, args, cond)?;
                let v = if c != 0 {
                    self.operand(func, values, args, on_true)?
                } else {
                    self.operand(func, values, args, on_false)?
                };
                values.insert(*result, v);
            }
            Instruction::Gep {
                result,
                base,
                index,
            } => {
                let PtrValue::GlobalByte(name, off) =
                    self.ptr_operand(func, values, args, base)?
                else {
                    return Err(EvalError::TypeMismatch(
                        "gep requires a global base".into(),
                    ));
                };
                let idx = self.int_operand(func, values, args, index)?;
                let off = usize::try_from(off as i64 + idx)
                    .map_err(|_| EvalError::OutOfBounds {
                        global: name.clone(),
                        offset: 0,
                    })?;
                values.insert(*result, RtValue::Ptr(PtrValue::GlobalByte(name, off)));
            }
            Instruction::Call {
                result,
                callee,
                args: call_args,
            } => {
                let target = match callee {
                    Callee::Direct(fid) => *fid,
                    Callee::Indirect(v) => match self.operand(func, values, args, v)? {
                        RtValue::Fn(fid) => fid,
                        other => {
                            return Err(EvalError::TypeMismatch(format!(
                                "indirect call through non-function value {other:?}"
                            )))
                        }
                    },
                };
                let evaluated: Vec<RtValue> = call_args
                    .iter()
                    .map(|a| self.operand(func, values, args, a))
                    .collect::<Result<_, _>>()?;
                let ret = self.call(target, &evaluated)?;
                if let Some(result) = result {
                    values.insert(
                        *result,
                        ret.ok_or_else(|| {
                            EvalError::TypeMismatch("void call used as value".into())
                        })?,
                    );
                }
            }
            Instruction::Phi { .. } => unreachable!("phis are evaluated at block entry"),
        }
        Ok(())
    }

    fn operand(
        &self,
        func: &Function,
        values: &HashMap<ValueId, RtValue>,
        args: &[RtValue],
        value: &Value,
    ) -> Result<RtValue, EvalError> {
        match value {
            Value::Const(c, ty) => Ok(RtValue::Int(ty.wrap(*c))),
            Value::Instr(id) => values.get(id).cloned().ok_or_else(|| {
                EvalError::TypeMismatch(format!("use of {id} before definition in `{}`", func.name))
            }),
            Value::Arg(i) => Ok(args[*i].clone()),
            Value::Global(name) => {
                if self.globals.contains_key(name) {
                    Ok(RtValue::Ptr(PtrValue::GlobalByte(name.clone(), 0)))
                } else {
                    Err(EvalError::TypeMismatch(format!("unknown global `{name}`")))
                }
            }
            Value::Function(fid) => Ok(RtValue::Fn(*fid)),
        }
    }

    fn int_operand(
        &self,
        func: &Function,
        values: &HashMap<ValueId, RtValue>,
        args: &[RtValue],
        value: &Value,
    ) -> Result<i64, EvalError> {
        match self.operand(func, values, args, value)? {
            RtValue::Int(n) => Ok(n),
            other => Err(EvalError::TypeMismatch(format!(
                "expected integer, got {other:?}"
            ))),
        }
    }

    fn ptr_operand(
        &self,
        func: &Function,
        values: &HashMap<ValueId, RtValue>,
        args: &[RtValue],
        value: &Value,
    ) -> Result<PtrValue, EvalError> {
        match self.operand(func, values, args, value)? {
            RtValue::Ptr(p) => Ok(p),
            other => Err(EvalError::TypeMismatch(format!(
                "expected pointer, got {other:?}"
            ))),
        }
    }

    fn read_global(&self, name: &str, off: usize, ty: Type) -> Result<i64, EvalError> {
        let bytes = self.globals.get(name).ok_or_else(|| {
            EvalError::TypeMismatch(format!("unknown global `{name}`"))
        })?;
        let width = match ty {
            Type::Int(ity) => ity.bits().div_ceil(8) as usize,
            _ => {
                return Err(EvalError::TypeMismatch(
                    "non-integer load from global".into(),
                ))
            }
        };
        if off + width > bytes.len() {
            return Err(EvalError::OutOfBounds {
                global: name.to_owned(),
                offset: off,
            });
        }
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(&bytes[off..off + width]);
        let Type::Int(ity) = ty else { unreachable!() };
        Ok(ity.wrap(i64::from_le_bytes(raw)))
    }

    fn write_global(&mut self, name: &str, off: usize, ty: Type, v: i64) -> Result<(), EvalError> {
        let width = match ty {
            Type::Int(ity) => ity.bits().div_ceil(8) as usize,
            _ => {
                return Err(EvalError::TypeMismatch(
                    "non-integer store into global".into(),
                ))
            }
        };
        let bytes = self.globals.get_mut(name).ok_or_else(|| {
            EvalError::TypeMismatch(format!("unknown global `{name}`"))
        })?;
        if off + width > bytes.len() {
            return Err(EvalError::OutOfBounds {
                global: name.to_owned(),
                offset: off,
            });
        }
        bytes[off..off + width].copy_from_slice(&v.to_le_bytes()[..width]);
        Ok(())
    }

    fn bump(&mut self) -> Result<(), EvalError> {
        self.steps += 1;
        if self.steps > STEP_LIMIT {
            return Err(EvalError::StepLimit);
        }
        Ok(())
    }
}
