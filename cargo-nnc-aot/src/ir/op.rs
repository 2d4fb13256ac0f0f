//! Tensor operations.
//! Every op names the values it reads and the single value it defines.

use serde::{Deserialize, Serialize};

use super::graph::ValueId;
use super::tensor::HostTensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryKind {
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryKind::Add => a + b,
            BinaryKind::Sub => a - b,
            BinaryKind::Mul => a * b,
            BinaryKind::Div => a / b,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BinaryKind::Add => "add",
            BinaryKind::Sub => "sub",
            BinaryKind::Mul => "mul",
            BinaryKind::Div => "div",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryKind {
    Relu,
    Sigmoid,
    Tanh,
    Neg,
    Exp,
}

impl UnaryKind {
    pub fn apply(self, x: f32) -> f32 {
        match self {
            UnaryKind::Relu => {
                if x < 0.0 {
                    0.0
                } else {
                    x
                }
            }
            UnaryKind::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryKind::Tanh => x.tanh(),
            UnaryKind::Neg => -x,
            UnaryKind::Exp => x.exp(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UnaryKind::Relu => "relu",
            UnaryKind::Sigmoid => "sigmoid",
            UnaryKind::Tanh => "tanh",
            UnaryKind::Neg => "neg",
            UnaryKind::Exp => "exp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Tensor literal baked into the graph (weights, biases).
    Constant { value: HostTensor, output: ValueId },

    ScalarConstant { value: f32, output: ValueId },

    /// Tensor of `shape` filled with `value`.
    Full {
        shape: Vec<usize>,
        value: f32,
        output: ValueId,
    },

    /// `n x n` identity matrix.
    Eye { n: usize, output: ValueId },

    /// Broadcasting elementwise op; either operand may be a scalar.
    Binary {
        kind: BinaryKind,
        lhs: ValueId,
        rhs: ValueId,
        output: ValueId,
    },

    Unary {
        kind: UnaryKind,
        input: ValueId,
        output: ValueId,
    },

    /// `[m, k] @ [k, n]`
    MatMul {
        lhs: ValueId,
        rhs: ValueId,
        output: ValueId,
    },

    /// 2-D transpose
    Transpose { input: ValueId, output: ValueId },

    /// At most one entry of `shape` may be `-1`.
    Reshape {
        input: ValueId,
        shape: Vec<i64>,
        output: ValueId,
    },

    /// Sum of all elements into a 0-d tensor.
    Sum { input: ValueId, output: ValueId },

    /// Extracts the value of a single-element tensor as a scalar.
    Item { input: ValueId, output: ValueId },

    /// `target <op>= other`; `output` aliases `target`.
    BinaryInplace {
        kind: BinaryKind,
        target: ValueId,
        other: ValueId,
        output: ValueId,
    },

    /// `target = f(target)`; `output` aliases `target`.
    UnaryInplace {
        kind: UnaryKind,
        target: ValueId,
        output: ValueId,
    },

    /// Opaque op, optionally annotated with its result shape.
    Custom {
        name: String,
        inputs: Vec<ValueId>,
        #[serde(default)]
        output_shape: Option<Vec<usize>>,
        output: ValueId,
    },
}

impl Op {
    pub fn inputs(&self) -> Vec<ValueId> {
        match self {
            Op::Constant { .. }
            | Op::ScalarConstant { .. }
            | Op::Full { .. }
            | Op::Eye { .. } => vec![],
            Op::Binary { lhs, rhs, .. } | Op::MatMul { lhs, rhs, .. } => vec![*lhs, *rhs],
            Op::Unary { input, .. }
            | Op::Transpose { input, .. }
            | Op::Reshape { input, .. }
            | Op::Sum { input, .. }
            | Op::Item { input, .. } => vec![*input],
            Op::BinaryInplace { target, other, .. } => vec![*target, *other],
            Op::UnaryInplace { target, .. } => vec![*target],
            Op::Custom { inputs, .. } => inputs.clone(),
        }
    }

    pub fn inputs_mut(&mut self) -> Vec<&mut ValueId> {
        match self {
            Op::Constant { .. }
            | Op::ScalarConstant { .. }
            | Op::Full { .. }
            | Op::Eye { .. } => vec![],
            Op::Binary { lhs, rhs, .. } | Op::MatMul { lhs, rhs, .. } => vec![lhs, rhs],
            Op::Unary { input, .. }
            | Op::Transpose { input, .. }
            | Op::Reshape { input, .. }
            | Op::Sum { input, .. }
            | Op::Item { input, .. } => vec![input],
            Op::BinaryInplace { target, other, .. } => vec![target, other],
            Op::UnaryInplace { target, .. } => vec![target],
            Op::Custom { inputs, .. } => inputs.iter_mut().collect(),
        }
    }

    pub fn output(&self) -> ValueId {
        match self {
            Op::Constant { output, .. }
            | Op::ScalarConstant { output, .. }
            | Op::Full { output, .. }
            | Op::Eye { output, .. }
            | Op::Binary { output, .. }
            | Op::Unary { output, .. }
            | Op::MatMul { output, .. }
            | Op::Transpose { output, .. }
            | Op::Reshape { output, .. }
            | Op::Sum { output, .. }
            | Op::Item { output, .. }
            | Op::BinaryInplace { output, .. }
            | Op::UnaryInplace { output, .. }
            | Op::Custom { output, .. } => *output,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Op::Constant { .. } => "constant".into(),
            Op::ScalarConstant { .. } => "scalar_constant".into(),
            Op::Full { .. } => "full".into(),
            Op::Eye { .. } => "eye".into(),
            Op::Binary { kind, .. } => kind.name().into(),
            Op::Unary { kind, .. } => kind.name().into(),
            Op::MatMul { .. } => "matmul".into(),
            Op::Transpose { .. } => "transpose".into(),
            Op::Reshape { .. } => "reshape".into(),
            Op::Sum { .. } => "sum".into(),
            Op::Item { .. } => "item".into(),
            Op::BinaryInplace { kind, .. } => format!("{}_", kind.name()),
            Op::UnaryInplace { kind, .. } => format!("{}_", kind.name()),
            Op::Custom { name, .. } => format!("custom::{name}"),
        }
    }

    /// The value whose storage this op writes through, for in-place ops.
    pub fn mutated(&self) -> Option<ValueId> {
        match self {
            Op::BinaryInplace { target, .. } | Op::UnaryInplace { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Ops that define their result without reading any value.
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            Op::Constant { .. } | Op::ScalarConstant { .. } | Op::Full { .. } | Op::Eye { .. }
        )
    }

    /// Ops that must survive dead-code elimination and cannot be folded.
    pub fn has_side_effects(&self) -> bool {
        self.mutated().is_some() || matches!(self, Op::Custom { .. })
    }
}
