pub mod eval;
pub mod graph;
pub mod op;
pub mod tensor;

pub use eval::{evaluate, RuntimeValue};
pub use graph::{static_dims, DType, Dim, Graph, Value, ValueId, ValueType};
pub use op::{BinaryKind, Op, UnaryKind};
pub use tensor::HostTensor;
