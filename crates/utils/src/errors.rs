use thiserror::Error;

/// Error type for structural IR verification.
///
/// Any of these after the pipeline has run means a transform produced a
/// malformed module; the run must abort rather than emit a broken artifact.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// A defined function has no blocks.
    #[error("function `{function}` has no entry block")]
    MissingEntry { function: String },
    /// A declaration carries a body.
    #[error("function `{function}` is a declaration but has a body")]
    DeclarationWithBody { function: String },
    /// A terminator targets a block outside the function.
    #[error("function `{function}`: block {block} branches to missing block {target}")]
    DanglingTarget {
        function: String,
        block: usize,
        target: usize,
    },
    /// A phi node appears after a non-phi instruction.
    #[error("function `{function}`: phi in block {block} is not at the head of the block")]
    PhiNotLeading { function: String, block: usize },
    /// A phi node lists an incoming block that is not a direct predecessor.
    #[error("function `{function}`: phi in block {block} references non-predecessor {incoming}")]
    PhiNonPredecessor {
        function: String,
        block: usize,
        incoming: usize,
    },
    /// A phi node has no incoming entry for one of its predecessors.
    #[error("function `{function}`: phi in block {block} has no entry for predecessor {predecessor}")]
    PhiMissingPredecessor {
        function: String,
        block: usize,
        predecessor: usize,
    },
    /// An operand references a value no instruction defines.
    #[error("function `{function}`: use of undefined value %{value}")]
    UndefinedValue { function: String, value: usize },
    /// An operand references an argument index past the parameter list.
    #[error("function `{function}`: use of undefined argument #{index}")]
    UndefinedArg { function: String, index: usize },
    /// An operand names a global the module does not own.
    #[error("function `{function}` references unknown global `{global}`")]
    UnknownGlobal { function: String, global: String },
    /// An operand or call references a function id outside the module.
    #[error("function `{function}` references unknown function #{id}")]
    UnknownFunction { function: String, id: usize },
    /// A constructor entry points at a missing or non-void function.
    #[error("constructor references invalid function #{id}")]
    BadConstructor { id: usize },
}

/// Error type for the reference interpreter.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("step budget exhausted")]
    StepLimit,
    #[error("call to external declaration `{0}`")]
    ExternalCall(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("out-of-bounds access to global `{global}` at byte {offset}")]
    OutOfBounds { global: String, offset: usize },
    #[error("argument count mismatch calling `{0}`")]
    ArityMismatch(String),
}

/// Error type for transform passes.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),
    #[error("transform produced inconsistent state: {0}")]
    Inconsistent(String),
}

/// Errors that can occur while running the obfuscation pipeline.
#[derive(Debug, Error)]
pub enum ObfuscateError {
    /// A pass failed outright.
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
    /// The module no longer passes structural verification.
    #[error("module verification failed after obfuscation: {0}")]
    Verify(#[from] VerifyError),
    /// Report serialization failed.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
