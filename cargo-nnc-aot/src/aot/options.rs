use crate::ir::DType;

/// How output element types are chosen for the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDTypePolicy {
    /// Every output gets this type, whatever the backend reports.
    Fixed(DType),
    /// Read the dtype of each output buffer from the lowered kernel.
    FromBackend,
}

impl Default for OutputDTypePolicy {
    fn default() -> Self {
        OutputDTypePolicy::Fixed(DType::F32)
    }
}

/// Knobs for one compilation. No global state: each call gets its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Seed for the synthesized example inputs.
    pub example_seed: u64,
    /// Element type recorded for every input spec.
    pub input_dtype: DType,
    pub output_dtype: OutputDTypePolicy,
    /// Dump the graph at `debug` level after each specialization step.
    pub dump_graphs: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            example_seed: 0,
            input_dtype: DType::F32,
            output_dtype: OutputDTypePolicy::default(),
            dump_graphs: false,
        }
    }
}

impl CompileOptions {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.example_seed = seed;
        self
    }

    pub fn with_input_dtype(mut self, dtype: DType) -> Self {
        self.input_dtype = dtype;
        self
    }

    pub fn with_output_dtype(mut self, policy: OutputDTypePolicy) -> Self {
        self.output_dtype = policy;
        self
    }

    pub fn with_dump_graphs(mut self, dump: bool) -> Self {
        self.dump_graphs = dump;
        self
    }
}
