use serde::{Deserialize, Serialize};

use crate::ir::HostTensor;

use super::io_spec::{InputSpec, OutputSpec};
use super::memory::MemoryPlan;

/// Everything a runtime needs to call the generated code for one method,
/// without the graph it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub name: String,
    pub input_specs: Vec<InputSpec>,
    pub output_specs: Vec<OutputSpec>,
    /// Constant buffers, passed to the generated function in this order.
    pub parameters: Vec<HostTensor>,
    pub memory_plan: MemoryPlan,
    pub code: String,
}

pub fn assemble(
    name: &str,
    input_specs: Vec<InputSpec>,
    output_specs: Vec<OutputSpec>,
    parameters: Vec<HostTensor>,
    memory_plan: MemoryPlan,
    code: String,
) -> CompiledFunction {
    CompiledFunction {
        name: name.to_string(),
        input_specs,
        output_specs,
        parameters,
        memory_plan,
        code,
    }
}
