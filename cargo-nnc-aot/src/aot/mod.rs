//! Ahead-of-time compilation of one graph method into a [`CompiledFunction`].
//!
//! The stages run in a fixed order: specialize, lower through a
//! [`KernelCompiler`](crate::backend::KernelCompiler), extract constants,
//! build I/O specs, plan memory and assemble.

mod compiler;
mod constants;
mod function;
mod io_spec;
mod memory;
mod options;

pub use compiler::{aot_compile, AotCompiler};
pub use constants::extract_constants;
pub use function::{assemble, CompiledFunction};
pub use io_spec::{build_input_specs, build_io_specs, build_output_specs, InputSpec, OutputSpec};
pub use memory::{
    plan_memory, EmptyMemoryPlanner, IntermediateBufferPlanner, MemoryPlan, MemoryPlanner,
};
pub use options::{CompileOptions, OutputDTypePolicy};
