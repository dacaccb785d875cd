//! The CFG/IR data model mutated by every transform pass.
//!
//! The shapes follow a conventional SSA-style IR: instructions define values
//! identified by [`ValueId`], operands are [`Value`]s (constants, instruction
//! results, arguments, globals, or function references), and control transfers
//! live in a dedicated [`Terminator`] so a block can never hold more or fewer
//! than one. Blocks are addressed by index-stable [`BlockId`]s; passes only
//! ever append blocks, so ids handed out before a rewrite stay valid.

use indexmap::IndexMap;

/// Identifies a function within its [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub usize);

/// Identifies a basic block within its [`Function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// Identifies an instruction result within its [`Function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub usize);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Integer width. Arithmetic wraps at the given width with two's-complement
/// semantics, which the substitution identities rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntTy {
    /// Boolean-sized integer (comparison results).
    I1,
    /// Byte-sized integer (string data).
    I8,
    I32,
    I64,
}

impl IntTy {
    pub const fn bits(self) -> u32 {
        match self {
            Self::I1 => 1,
            Self::I8 => 8,
            Self::I32 => 32,
            Self::I64 => 64,
        }
    }

    /// Truncates `v` to this width and sign-extends back to `i64`.
    pub const fn wrap(self, v: i64) -> i64 {
        match self {
            Self::I1 => v & 1,
            Self::I8 => v as i8 as i64,
            Self::I32 => v as i32 as i64,
            Self::I64 => v,
        }
    }
}

/// The type of a value or memory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int(IntTy),
    /// An untyped pointer: stack slots, globals, function references.
    Ptr,
}

impl Type {
    /// The zero value of this type, or `None` for `Void`. Used by the
    /// flattening default block to synthesize a well-typed return.
    pub const fn zero_value(self) -> Option<Value> {
        match self {
            Self::Void => None,
            Self::Int(ty) => Some(Value::Const(0, ty)),
            Self::Ptr => Some(Value::Const(0, IntTy::I64)),
        }
    }
}

/// An operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// An integer constant of the given width.
    Const(i64, IntTy),
    /// The result of an instruction in the same function.
    Instr(ValueId),
    /// The n-th function parameter.
    Arg(usize),
    /// The address of a named module global.
    Global(String),
    /// A reference to a function, usable as a call target.
    Function(FunctionId),
}

/// Binary operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    /// Signed remainder, truncated toward zero.
    SRem,
}

/// Signed comparison predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

/// A call target: a statically known function or a computed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Direct(FunctionId),
    Indirect(Value),
}

/// A non-terminator instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Stack allocation of one slot of `ty`. Conventionally hoisted to the
    /// entry block; never relocated by a transform.
    Alloca { result: ValueId, ty: Type },
    Load {
        result: ValueId,
        ty: Type,
        ptr: Value,
    },
    Store {
        ty: Type,
        value: Value,
        ptr: Value,
    },
    BinOp {
        result: ValueId,
        op: BinOp,
        ty: IntTy,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        result: ValueId,
        pred: CmpPred,
        lhs: Value,
        rhs: Value,
    },
    Select {
        result: ValueId,
        cond: Value,
        on_true: Value,
        on_false: Value,
    },
    /// Byte-element address computation: `base` must point into a global.
    Gep {
        result: ValueId,
        base: Value,
        index: Value,
    },
    Call {
        result: Option<ValueId>,
        callee: Callee,
        args: Vec<Value>,
    },
    /// Merge of values flowing in from predecessor blocks. Must stay at the
    /// head of its block and is never relocated by a transform.
    Phi {
        result: ValueId,
        ty: IntTy,
        incoming: Vec<(Value, BlockId)>,
    },
}

impl Instruction {
    /// The value this instruction defines, if any.
    pub fn result(&self) -> Option<ValueId> {
        match self {
            Self::Alloca { result, .. }
            | Self::Load { result, .. }
            | Self::BinOp { result, .. }
            | Self::ICmp { result, .. }
            | Self::Select { result, .. }
            | Self::Gep { result, .. }
            | Self::Phi { result, .. } => Some(*result),
            Self::Call { result, .. } => *result,
            Self::Store { .. } => None,
        }
    }

    pub const fn is_phi(&self) -> bool {
        matches!(self, Self::Phi { .. })
    }

    pub const fn is_alloca(&self) -> bool {
        matches!(self, Self::Alloca { .. })
    }

    /// Visits every operand.
    pub fn for_each_value(&self, f: &mut impl FnMut(&Value)) {
        match self {
            Self::Alloca { .. } => {}
            Self::Load { ptr, .. } => f(ptr),
            Self::Store { value, ptr, .. } => {
                f(value);
                f(ptr);
            }
            Self::BinOp { lhs, rhs, .. } | Self::ICmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Self::Select {
                cond,
                on_true,
                on_false,
                ..
            } => {
                f(cond);
                f(on_true);
                f(on_false);
            }
            Self::Gep { base, index, .. } => {
                f(base);
                f(index);
            }
            Self::Call { callee, args, .. } => {
                if let Callee::Indirect(v) = callee {
                    f(v);
                }
                for a in args {
                    f(a);
                }
            }
            Self::Phi { incoming, .. } => {
                for (v, _) in incoming {
                    f(v);
                }
            }
        }
    }

    /// Visits every operand mutably.
    pub fn for_each_value_mut(&mut self, f: &mut impl FnMut(&mut Value)) {
        match self {
            Self::Alloca { .. } => {}
            Self::Load { ptr, .. } => f(ptr),
            Self::Store { value, ptr, .. } => {
                f(value);
                f(ptr);
            }
            Self::BinOp { lhs, rhs, .. } | Self::ICmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Self::Select {
                cond,
                on_true,
                on_false,
                ..
            } => {
                f(cond);
                f(on_true);
                f(on_false);
            }
            Self::Gep { base, index, .. } => {
                f(base);
                f(index);
            }
            Self::Call { callee, args, .. } => {
                if let Callee::Indirect(v) = callee {
                    f(v);
                }
                for a in args {
                    f(a);
                }
            }
            Self::Phi { incoming, .. } => {
                for (v, _) in incoming {
                    f(v);
                }
            }
        }
    }
}

/// The single control transfer ending every block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional branch.
    Br(BlockId),
    /// Two-way conditional branch on a nonzero condition.
    CondBr {
        cond: Value,
        then_to: BlockId,
        else_to: BlockId,
    },
    /// Multi-way dispatch on an integer value.
    Switch {
        value: Value,
        default: BlockId,
        cases: Vec<(i64, BlockId)>,
    },
    /// Function return.
    Ret(Option<Value>),
}

impl Terminator {
    /// All blocks this terminator may transfer to.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Self::Br(t) => vec![*t],
            Self::CondBr {
                then_to, else_to, ..
            } => vec![*then_to, *else_to],
            Self::Switch {
                default, cases, ..
            } => {
                let mut out = vec![*default];
                out.extend(cases.iter().map(|(_, b)| *b));
                out
            }
            Self::Ret(_) => Vec::new(),
        }
    }

    pub fn for_each_value(&self, f: &mut impl FnMut(&Value)) {
        match self {
            Self::Br(_) => {}
            Self::CondBr { cond, .. } => f(cond),
            Self::Switch { value, .. } => f(value),
            Self::Ret(v) => {
                if let Some(v) = v {
                    f(v);
                }
            }
        }
    }

    pub fn for_each_value_mut(&mut self, f: &mut impl FnMut(&mut Value)) {
        match self {
            Self::Br(_) => {}
            Self::CondBr { cond, .. } => f(cond),
            Self::Switch { value, .. } => f(value),
            Self::Ret(v) => {
                if let Some(v) = v {
                    f(v);
                }
            }
        }
    }
}

/// A basic block: straight-line instructions plus exactly one terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Human-readable label, for diagnostics only.
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
    /// The block's identity is observed elsewhere (e.g. a jump table);
    /// structural rewrites must leave it in place.
    pub address_taken: bool,
    /// Exception-handling pad; excluded from structural rewrites.
    pub eh_pad: bool,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>, terminator: Terminator) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
            terminator,
            address_taken: false,
            eh_pad: false,
        }
    }
}

/// A function: an ordered block list whose first entry is the entry block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub blocks: Vec<BasicBlock>,
    /// Body-less external function.
    pub is_declaration: bool,
    /// Passes must leave this function untouched.
    pub optimize_disabled: bool,
    /// Synthesized by a pass; later passes must not re-obfuscate it.
    pub synthetic: bool,
    /// Compiler intrinsic; never a candidate for call indirection.
    pub intrinsic: bool,
    next_value: usize,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<Type>, ret: Type) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            blocks: Vec::new(),
            is_declaration: false,
            optimize_disabled: false,
            synthetic: false,
            intrinsic: false,
            next_value: 0,
        }
    }

    pub fn declaration(name: impl Into<String>, params: Vec<Type>, ret: Type) -> Self {
        Self {
            is_declaration: true,
            ..Self::new(name, params, ret)
        }
    }

    pub const fn entry_id(&self) -> BlockId {
        BlockId(0)
    }

    /// Hands out a fresh SSA value id.
    pub fn new_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    pub fn push_block(&mut self, block: BasicBlock) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(block);
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    /// Splits `id` at instruction index `at`. Everything from `at` onward,
    /// together with the terminator, moves into a new appended block; the
    /// original block keeps its incoming edges and falls through to the new
    /// one. Phi nodes in the moved terminator's successors are repointed at
    /// the new block so predecessor lists stay accurate.
    pub fn split_block(&mut self, id: BlockId, at: usize, label: impl Into<String>) -> BlockId {
        let new_id = BlockId(self.blocks.len());
        let src = &mut self.blocks[id.0];
        let tail = src.instructions.split_off(at);
        let term = std::mem::replace(&mut src.terminator, Terminator::Br(new_id));
        self.blocks.push(BasicBlock {
            label: label.into(),
            instructions: tail,
            terminator: term,
            address_taken: false,
            eh_pad: false,
        });

        let succs = self.blocks[new_id.0].terminator.successors();
        for s in succs {
            for ins in &mut self.blocks[s.0].instructions {
                if let Instruction::Phi { incoming, .. } = ins {
                    for (_, pred) in incoming.iter_mut() {
                        if *pred == id {
                            *pred = new_id;
                        }
                    }
                }
            }
        }
        new_id
    }

    /// Rewires every use of `old` to `new` across the whole function.
    pub fn replace_value_uses(&mut self, old: ValueId, new: &Value) {
        self.for_each_value_mut(&mut |v| {
            if matches!(v, Value::Instr(id) if *id == old) {
                *v = new.clone();
            }
        });
    }

    /// Visits every operand in every instruction and terminator.
    pub fn for_each_value_mut(&mut self, f: &mut impl FnMut(&mut Value)) {
        for block in &mut self.blocks {
            for ins in &mut block.instructions {
                ins.for_each_value_mut(f);
            }
            block.terminator.for_each_value_mut(f);
        }
    }
}

/// A module-level byte constant (string literals, the opaque-predicate
/// variable). Encrypted replacements are mutable so the bootstrap decryptor
/// can rewrite them in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub init: Vec<u8>,
    pub constant: bool,
}

impl Global {
    pub fn constant(init: impl Into<Vec<u8>>) -> Self {
        Self {
            init: init.into(),
            constant: true,
        }
    }

    pub fn mutable(init: impl Into<Vec<u8>>) -> Self {
        Self {
            init: init.into(),
            constant: false,
        }
    }
}

/// Registration of a function to run before normal program entry.
/// Lower priority runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constructor {
    pub function: FunctionId,
    pub priority: u16,
}

/// Top-level unit of transformation: ordered functions, ordered globals, and
/// constructor registrations. Constructed by an external loader, mutated in
/// place by the pipeline, handed to an external writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub functions: Vec<Function>,
    pub globals: IndexMap<String, Global>,
    pub constructors: Vec<Constructor>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len());
        self.functions.push(function);
        id
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.0]
    }

    /// Looks a function up by name.
    pub fn function_id(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FunctionId)
    }

    pub fn add_global(&mut self, name: impl Into<String>, global: Global) {
        self.globals.insert(name.into(), global);
    }

    /// Redirects every use of global `old` to global `new`, in every function.
    pub fn replace_global_uses(&mut self, old: &str, new: &str) {
        for func in &mut self.functions {
            func.for_each_value_mut(&mut |v| {
                if matches!(v, Value::Global(name) if name == old) {
                    *v = Value::Global(new.to_owned());
                }
            });
        }
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn block_count(&self) -> usize {
        self.functions.iter().map(|f| f.blocks.len()).sum()
    }

    /// Total instruction count. Terminators count as instructions, matching
    /// the block-size notion the statistics snapshots use.
    pub fn instruction_count(&self) -> usize {
        self.functions
            .iter()
            .flat_map(|f| &f.blocks)
            .map(|b| b.instructions.len() + 1)
            .sum()
    }
}
