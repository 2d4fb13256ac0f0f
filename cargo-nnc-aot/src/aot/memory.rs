use serde::{Deserialize, Serialize};

use crate::backend::LoweredKernel;

/// Byte sizes of scratch buffers a runtime should allocate once per loaded
/// function. Empty unless a planner fills it in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPlan {
    pub buffer_sizes: Vec<usize>,
}

impl MemoryPlan {
    pub fn is_empty(&self) -> bool {
        self.buffer_sizes.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.buffer_sizes.iter().sum()
    }
}

pub trait MemoryPlanner {
    fn plan(&self, kernel: &dyn LoweredKernel) -> MemoryPlan;
}

/// The default: generated code allocates its own temporaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyMemoryPlanner;

impl MemoryPlanner for EmptyMemoryPlanner {
    fn plan(&self, _kernel: &dyn LoweredKernel) -> MemoryPlan {
        MemoryPlan::default()
    }
}

/// The pipeline's default plan. Always empty for now.
pub fn plan_memory<K: LoweredKernel>(kernel: &K) -> MemoryPlan {
    EmptyMemoryPlanner.plan(kernel)
}

/// One slot per intermediate buffer, no reuse between them.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntermediateBufferPlanner;

impl MemoryPlanner for IntermediateBufferPlanner {
    fn plan(&self, kernel: &dyn LoweredKernel) -> MemoryPlan {
        MemoryPlan {
            buffer_sizes: kernel
                .intermediate_buffers()
                .into_iter()
                .filter_map(|buf| buf.size_in_bytes())
                .collect(),
        }
    }
}
