//! Kernel plan IR
//!
//! Three core concepts:
//! 1. **BufferAlloc**: every tensor the generated function touches, whether
//!    input, output, constant (passed in as a parameter) or temporary
//! 2. **Operand**: what a broadcasting call reads. A buffer, a scalar literal,
//!    or a scalar computed earlier in the function
//! 3. **KernelCall**: one kernel invocation per graph op, plus trailing copies
//!    that materialize outputs

use crate::backend::BufHandle;
use crate::ir::{BinaryKind, UnaryKind, ValueId};

/// Index into `KernelPlan::buffers`.
pub type BufId = usize;

/// Index of a scalar local in the generated function.
pub type SlotId = usize;

/// Complete plan for one kernel. Produced by `lower()`, consumed by `render()`
/// and `KernelPlan::execute`.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelPlan {
    pub buffers: Vec<BufferAlloc>,
    /// Constant buffers, in parameter order, with their payloads.
    pub constants: Vec<(BufId, Vec<f32>)>,
    pub inputs: Vec<BufId>,
    pub outputs: Vec<OutputArg>,
    pub num_slots: usize,
    pub calls: Vec<KernelCall>,
}

impl KernelPlan {
    pub fn buffer(&self, id: BufId) -> &BufferAlloc {
        &self.buffers[id]
    }

    pub fn temps(&self) -> impl Iterator<Item = &BufferAlloc> + '_ {
        self.buffers.iter().filter(|b| b.role == BufferRole::Temp)
    }

    /// Names of the calls, in order.
    pub fn op_names(&self) -> Vec<&'static str> {
        self.calls.iter().map(KernelCall::name).collect()
    }
}

// ─── (1) Buffers ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    Input,
    Output,
    Constant,
    Temp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferAlloc {
    pub role: BufferRole,
    pub handle: BufHandle,
    pub shape: Vec<usize>,
    /// Graph value stored here. Output copies have none.
    pub value: Option<ValueId>,
}

impl BufferAlloc {
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// A function output: a buffer the caller provides, or a scalar written
/// through `&mut f32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputArg {
    Buffer(BufId),
    Scalar(Operand),
}

// ─── (2) Operands ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Buffer(BufId),
    Literal(f32),
    Slot(SlotId),
}

impl Operand {
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Operand::Buffer(_))
    }
}

// ─── (3) Kernel calls ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum KernelCall {
    /// Broadcasting elementwise op; at least one operand is a buffer.
    Binary {
        kind: BinaryKind,
        lhs: Operand,
        rhs: Operand,
        output: BufId,
    },
    ScalarBinary {
        kind: BinaryKind,
        lhs: Operand,
        rhs: Operand,
        output: SlotId,
    },
    Unary {
        kind: UnaryKind,
        input: BufId,
        output: BufId,
    },
    ScalarUnary {
        kind: UnaryKind,
        input: Operand,
        output: SlotId,
    },
    MatMul {
        lhs: BufId,
        rhs: BufId,
        output: BufId,
        m: usize,
        k: usize,
        n: usize,
    },
    Transpose {
        input: BufId,
        output: BufId,
        rows: usize,
        cols: usize,
    },
    Sum {
        input: BufId,
        output: BufId,
    },
    /// Reads the single element of a buffer into a scalar slot.
    Item {
        input: BufId,
        output: SlotId,
    },
    /// Reshapes and output materialization.
    Copy {
        input: BufId,
        output: BufId,
    },
}

impl KernelCall {
    pub fn name(&self) -> &'static str {
        match self {
            KernelCall::Binary { kind, .. } | KernelCall::ScalarBinary { kind, .. } => kind.name(),
            KernelCall::Unary { kind, .. } | KernelCall::ScalarUnary { kind, .. } => kind.name(),
            KernelCall::MatMul { .. } => "matmul",
            KernelCall::Transpose { .. } => "transpose",
            KernelCall::Sum { .. } => "sum",
            KernelCall::Item { .. } => "item",
            KernelCall::Copy { .. } => "copy",
        }
    }
}
