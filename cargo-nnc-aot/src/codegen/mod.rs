//! Reference kernel compiler.
//!
//! Lowers a specialized graph into a `KernelPlan`, renders the plan as a Rust
//! module calling into `nnc_aot::kernels`, and formats it with prettyplease.
//! The plan can also be executed on the host (see `KernelPlan::execute`).

mod exec;
mod lower;
mod plan;
mod render;
mod tensor_expr;

use crate::backend::{BufferArg, BufHandle, ConstantDescriptor, KernelCompiler, LoweredKernel};
use crate::error::BackendError;
use crate::ir::{DType, Graph};
use crate::specialize::SpecializedGraph;

pub use lower::lower;
pub use plan::{BufId, BufferAlloc, BufferRole, KernelCall, KernelPlan, Operand, OutputArg, SlotId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RustBackendOptions {
    /// Name of the generated function.
    pub entry_point: String,
    /// Module path the generated code calls kernels through.
    pub kernel_module: String,
}

impl Default for RustBackendOptions {
    fn default() -> Self {
        Self {
            entry_point: "nnc_kernel".into(),
            kernel_module: "nnc_aot::kernels".into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RustKernelCompiler {
    options: RustBackendOptions,
}

impl RustKernelCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RustBackendOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RustBackendOptions {
        &self.options
    }
}

/// A lowered graph together with its generated source.
#[derive(Debug, Clone)]
pub struct RustKernel {
    graph: Graph,
    plan: KernelPlan,
    args: Vec<BufferArg>,
    code: String,
}

impl RustKernel {
    pub fn plan(&self) -> &KernelPlan {
        &self.plan
    }
}

impl KernelCompiler for RustKernelCompiler {
    type Kernel = RustKernel;

    fn name(&self) -> &str {
        "rust"
    }

    fn compile(&self, graph: &SpecializedGraph) -> Result<RustKernel, BackendError> {
        let plan = lower(graph.graph())?;
        let tokens = render::render(&plan, &self.options)?;
        let file: syn::File =
            syn::parse2(tokens).map_err(|e| BackendError::Render(e.to_string()))?;
        let code = prettyplease::unparse(&file);

        log::debug!(
            "lowered {} ops into {} kernel calls ({} params, {} temps)",
            graph.graph().ops.len(),
            plan.calls.len(),
            plan.constants.len(),
            plan.temps().count()
        );
        log::trace!("kernel calls: {}", plan.op_names().join(", "));

        Ok(RustKernel {
            graph: graph.graph().clone(),
            args: buffer_args(&plan),
            plan,
            code,
        })
    }
}

fn buffer_args(plan: &KernelPlan) -> Vec<BufferArg> {
    let inputs = plan
        .inputs
        .iter()
        .map(|&id| BufferArg::Buffer(plan.buffer(id).handle.clone()));
    let outputs = plan.outputs.iter().enumerate().map(|(j, out)| match out {
        OutputArg::Buffer(id) => BufferArg::Buffer(plan.buffer(*id).handle.clone()),
        OutputArg::Scalar(_) => BufferArg::Scalar {
            name: format!("out_{j}"),
            dtype: DType::F32,
        },
    });
    inputs.chain(outputs).collect()
}

impl LoweredKernel for RustKernel {
    fn graph(&self) -> &Graph {
        &self.graph
    }

    fn constant_descriptors(&self) -> Vec<ConstantDescriptor<'_>> {
        self.plan
            .constants
            .iter()
            .map(|(id, data)| ConstantDescriptor {
                buf: &self.plan.buffer(*id).handle,
                data,
            })
            .collect()
    }

    fn buffer_args(&self) -> &[BufferArg] {
        &self.args
    }

    fn code_text(&self) -> &str {
        &self.code
    }

    fn intermediate_buffers(&self) -> Vec<&BufHandle> {
        self.plan.temps().map(|b| &b.handle).collect()
    }
}
