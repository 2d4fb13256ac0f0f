//! Error taxonomy for the AOT pipeline.
//!
//! Every failure aborts the compilation call: there is no partial artifact.

use thiserror::Error;

/// Failures while evaluating graph ops on host tensors (reference evaluator,
/// constant folding, plan execution).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("element count mismatch: shape {shape:?} requires {expected} elements, got {got}")]
    ElementCount {
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },

    #[error("element count of shape {shape:?} overflows usize")]
    TooLarge { shape: Vec<usize> },

    #[error("cannot broadcast {lhs:?} with {rhs:?}")]
    Broadcast { lhs: Vec<usize>, rhs: Vec<usize> },

    #[error("matmul shape mismatch: {lhs:?} @ {rhs:?}")]
    MatMul { lhs: Vec<usize>, rhs: Vec<usize> },

    #[error("cannot reshape {from:?} into {to:?}")]
    Reshape { from: Vec<usize>, to: Vec<i64> },

    #[error("{op}: expected {expected}")]
    Operand { op: String, expected: &'static str },

    #[error("expected {expected} inputs, got {got}")]
    InputCount { expected: usize, got: usize },

    #[error("op `{0}` cannot be evaluated on the host")]
    Unsupported(String),
}

/// Rejections from a kernel compiler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("unsupported operator `{op}` at op {index}")]
    UnsupportedOperator { op: String, index: usize },

    #[error("unsupported input {value}: {reason}")]
    UnsupportedInput { value: String, reason: String },

    #[error("shape conflict at {value}: {detail}")]
    ShapeConflict { value: String, detail: String },

    #[error("failed to render generated code: {0}")]
    Render(String),
}

/// Everything that can abort one compilation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("shape of {value} (defined by {node}) is still symbolic after specialization")]
    ShapeResolution { node: String, value: String },

    #[error("shape mismatch at {node}: {detail}")]
    ShapeMismatch { node: String, detail: String },

    #[error("graph declares {expected} tensor inputs, got shapes for {got}")]
    InputArity { expected: usize, got: usize },

    #[error("input {input} is declared with rank {declared}, got sizes of rank {got}")]
    InputRank {
        input: String,
        declared: usize,
        got: usize,
    },

    #[error("backend compilation failed: {0}")]
    Backend(#[from] BackendError),

    #[error("output {index} is a {kind}, only buffer outputs are supported")]
    UnsupportedOutputKind { index: usize, kind: String },

    #[error("internal contract violated: {0}")]
    ContractViolation(String),

    #[error("constant folding failed: {0}")]
    Eval(#[from] EvalError),

    #[error("invalid graph: {0}")]
    InvalidGraph(String),
}

/// A `CompileError` tagged with the method that was being compiled.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to compile method `{method}`: {error}")]
pub struct AotError {
    pub method: String,
    #[source]
    pub error: CompileError,
}

impl AotError {
    pub fn new(method: &str, error: CompileError) -> Self {
        Self {
            method: method.to_string(),
            error,
        }
    }
}

/// Failures while reading a serialized graph.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed graph json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid graph: {0}")]
    Invalid(String),
}
