use serde::{Deserialize, Serialize};

use crate::backend::{BufferArg, LoweredKernel};
use crate::error::CompileError;
use crate::ir::DType;

use super::options::OutputDTypePolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub shape: Vec<usize>,
    pub dtype: DType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub shape: Vec<usize>,
    pub dtype: DType,
}

/// Input specs come straight from the caller's shapes, one uniform dtype.
pub fn build_input_specs(input_shapes: &[Vec<usize>], dtype: DType) -> Vec<InputSpec> {
    input_shapes
        .iter()
        .map(|shape| InputSpec {
            shape: shape.clone(),
            dtype,
        })
        .collect()
}

/// Reads output `j` from buffer argument `n_inputs + j`.
pub fn build_output_specs<K: LoweredKernel + ?Sized>(
    kernel: &K,
    n_inputs: usize,
    n_outputs: usize,
    policy: OutputDTypePolicy,
) -> Result<Vec<OutputSpec>, CompileError> {
    let args = kernel.buffer_args();
    if args.len() != n_inputs + n_outputs {
        return Err(CompileError::ContractViolation(format!(
            "kernel has {} buffer arguments, expected {n_inputs} inputs and {n_outputs} outputs",
            args.len()
        )));
    }

    args[n_inputs..]
        .iter()
        .enumerate()
        .map(|(index, arg)| {
            let BufferArg::Buffer(buf) = arg else {
                return Err(CompileError::UnsupportedOutputKind {
                    index,
                    kind: arg.kind().to_string(),
                });
            };
            let shape = buf.concrete_shape().ok_or_else(|| {
                CompileError::ContractViolation(format!(
                    "output buffer `{}` has a non-concrete shape",
                    buf.name
                ))
            })?;
            let dtype = match policy {
                OutputDTypePolicy::Fixed(dtype) => dtype,
                OutputDTypePolicy::FromBackend => buf.dtype,
            };
            Ok(OutputSpec { shape, dtype })
        })
        .collect()
}

pub fn build_io_specs<K: LoweredKernel + ?Sized>(
    kernel: &K,
    input_shapes: &[Vec<usize>],
    n_outputs: usize,
    input_dtype: DType,
    output_dtype: OutputDTypePolicy,
) -> Result<(Vec<InputSpec>, Vec<OutputSpec>), CompileError> {
    let inputs = build_input_specs(input_shapes, input_dtype);
    let outputs = build_output_specs(kernel, input_shapes.len(), n_outputs, output_dtype)?;
    Ok((inputs, outputs))
}
