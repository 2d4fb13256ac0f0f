use crate::backend::{KernelCompiler, LoweredKernel};
use crate::codegen::RustKernelCompiler;
use crate::error::{AotError, CompileError};
use crate::specialize::{specialize, RawGraph};

use super::constants::extract_constants;
use super::function::{assemble, CompiledFunction};
use super::io_spec::build_io_specs;
use super::memory::{EmptyMemoryPlanner, MemoryPlanner};
use super::options::CompileOptions;

/// Drives one backend through the whole pipeline. Holds no per-compilation
/// state, so a single compiler can be reused for many methods and sizes.
pub struct AotCompiler<B: KernelCompiler> {
    backend: B,
    options: CompileOptions,
    memory_planner: Box<dyn MemoryPlanner>,
}

impl<B: KernelCompiler> AotCompiler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            options: CompileOptions::default(),
            memory_planner: Box::new(EmptyMemoryPlanner),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_memory_planner(mut self, planner: impl MemoryPlanner + 'static) -> Self {
        self.memory_planner = Box::new(planner);
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Compiles `method` with the same `sizes` for every tensor input.
    ///
    /// A graph without tensor inputs only accepts empty `sizes`.
    pub fn compile(
        &self,
        method: &str,
        raw: &RawGraph,
        sizes: &[usize],
    ) -> Result<CompiledFunction, AotError> {
        if raw.declared_inputs() == 0 && !sizes.is_empty() {
            return Err(AotError::new(
                method,
                CompileError::InputArity {
                    expected: 0,
                    got: 1,
                },
            ));
        }
        let shapes = vec![sizes.to_vec(); raw.declared_inputs()];
        self.compile_with_shapes(method, raw, &shapes)
    }

    /// Compiles `method` with one shape per tensor input.
    pub fn compile_with_shapes(
        &self,
        method: &str,
        raw: &RawGraph,
        input_shapes: &[Vec<usize>],
    ) -> Result<CompiledFunction, AotError> {
        self.run(method, raw, input_shapes).map_err(|error| {
            log::debug!("compilation of `{method}` failed: {error}");
            AotError::new(method, error)
        })
    }

    fn run(
        &self,
        method: &str,
        raw: &RawGraph,
        input_shapes: &[Vec<usize>],
    ) -> Result<CompiledFunction, CompileError> {
        log::info!(
            "compiling `{method}` for input shapes {input_shapes:?} with the {} backend",
            self.backend.name()
        );
        if input_shapes.len() != raw.declared_inputs() {
            return Err(CompileError::InputArity {
                expected: raw.declared_inputs(),
                got: input_shapes.len(),
            });
        }

        let specialized = specialize(raw, input_shapes, &self.options)?;
        let kernel = self.backend.compile(&specialized)?;

        let parameters = extract_constants(&kernel)?;
        let (input_specs, output_specs) = build_io_specs(
            &kernel,
            input_shapes,
            raw.declared_outputs(),
            self.options.input_dtype,
            self.options.output_dtype,
        )?;
        let memory_plan = self.memory_planner.plan(&kernel);

        let function = assemble(
            method,
            input_specs,
            output_specs,
            parameters,
            memory_plan,
            kernel.code_text().to_string(),
        );
        log::info!(
            "compiled `{method}`: {} inputs, {} outputs, {} parameters, {} bytes of code",
            function.input_specs.len(),
            function.output_specs.len(),
            function.parameters.len(),
            function.code.len()
        );
        Ok(function)
    }
}

/// Compiles `method` with the built-in Rust backend and default options.
///
/// The generated source is also written into `code`, replacing its contents.
pub fn aot_compile(
    method: &str,
    raw: &RawGraph,
    sizes: &[usize],
    code: &mut String,
) -> Result<CompiledFunction, AotError> {
    let function = AotCompiler::new(RustKernelCompiler::new()).compile(method, raw, sizes)?;
    code.clear();
    code.push_str(&function.code);
    Ok(function)
}
