//! Interface between the pipeline and a native kernel compiler.
//!
//! A backend takes a [`SpecializedGraph`] and returns a lowered kernel that can
//! be introspected for its constant buffers, its ordered buffer arguments and
//! the code it generated. The pipeline never looks past this interface.

use std::fmt;

use crate::error::BackendError;
use crate::ir::{DType, Graph};
use crate::specialize::SpecializedGraph;

/// One dimension of a backend buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimExpr {
    Imm(i64),
    /// A size the backend could not resolve to a number.
    Var(String),
}

impl DimExpr {
    pub fn as_imm(&self) -> Option<i64> {
        match self {
            DimExpr::Imm(v) => Some(*v),
            DimExpr::Var(_) => None,
        }
    }
}

impl fmt::Display for DimExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimExpr::Imm(v) => write!(f, "{v}"),
            DimExpr::Var(name) => write!(f, "{name}"),
        }
    }
}

/// A named buffer as the backend sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufHandle {
    pub name: String,
    pub dims: Vec<DimExpr>,
    pub dtype: DType,
}

impl BufHandle {
    pub fn new(name: impl Into<String>, shape: &[usize], dtype: DType) -> Self {
        Self {
            name: name.into(),
            dims: shape.iter().map(|&d| DimExpr::Imm(d as i64)).collect(),
            dtype,
        }
    }

    /// Concrete shape, if every dim is a non-negative immediate.
    pub fn concrete_shape(&self) -> Option<Vec<usize>> {
        self.dims
            .iter()
            .map(|d| d.as_imm().and_then(|v| usize::try_from(v).ok()))
            .collect()
    }

    pub fn size_in_bytes(&self) -> Option<usize> {
        let shape = self.concrete_shape()?;
        Some(shape.iter().product::<usize>() * self.dtype.size_in_bytes())
    }
}

/// A compile-time constant buffer. `data` borrows storage owned by the kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantDescriptor<'a> {
    pub buf: &'a BufHandle,
    pub data: &'a [f32],
}

/// A positional argument of the generated function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferArg {
    Buffer(BufHandle),
    Scalar { name: String, dtype: DType },
}

impl BufferArg {
    pub fn name(&self) -> &str {
        match self {
            BufferArg::Buffer(buf) => &buf.name,
            BufferArg::Scalar { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BufferArg::Buffer(_) => "buffer",
            BufferArg::Scalar { .. } => "scalar",
        }
    }
}

/// The result of lowering a specialized graph.
pub trait LoweredKernel {
    /// The graph this kernel was compiled from.
    fn graph(&self) -> &Graph;

    /// Constant buffers, in the order the generated code expects them.
    fn constant_descriptors(&self) -> Vec<ConstantDescriptor<'_>>;

    /// Inputs followed by outputs.
    fn buffer_args(&self) -> &[BufferArg];

    fn code_text(&self) -> &str;

    /// Temporaries the generated code allocates on every call.
    fn intermediate_buffers(&self) -> Vec<&BufHandle> {
        Vec::new()
    }
}

/// A native code generator.
pub trait KernelCompiler {
    type Kernel: LoweredKernel;

    fn name(&self) -> &str;

    fn compile(&self, graph: &SpecializedGraph) -> Result<Self::Kernel, BackendError>;
}
