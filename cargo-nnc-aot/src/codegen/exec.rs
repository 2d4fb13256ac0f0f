//! Host execution of a `KernelPlan`.
//!
//! Runs the same kernel calls the rendered code makes, in the same order, so
//! a plan can be checked against the reference evaluator without compiling
//! the generated source.

use crate::error::EvalError;
use crate::ir::{HostTensor, RuntimeValue};
use crate::kernels::{self, Arg};

use super::plan::*;

impl KernelPlan {
    /// `inputs` follow the function's input order, `params` the constant order.
    pub fn execute(
        &self,
        inputs: &[HostTensor],
        params: &[HostTensor],
    ) -> Result<Vec<RuntimeValue>, EvalError> {
        if inputs.len() != self.inputs.len() {
            return Err(EvalError::InputCount {
                expected: self.inputs.len(),
                got: inputs.len(),
            });
        }
        if params.len() != self.constants.len() {
            return Err(EvalError::InputCount {
                expected: self.constants.len(),
                got: params.len(),
            });
        }

        let mut storage: Vec<Vec<f32>> = self.buffers.iter().map(|b| vec![0.0; b.numel()]).collect();
        let bound = self
            .inputs
            .iter()
            .zip(inputs)
            .chain(self.constants.iter().map(|(id, _)| id).zip(params));
        for (&id, tensor) in bound {
            let buf = self.buffer(id);
            if tensor.numel() != buf.numel() {
                return Err(EvalError::ElementCount {
                    shape: buf.shape.clone(),
                    expected: buf.numel(),
                    got: tensor.numel(),
                });
            }
            storage[id].copy_from_slice(tensor.data());
        }

        let mut slots = vec![0.0f32; self.num_slots];
        for call in &self.calls {
            self.step(call, &mut storage, &mut slots);
        }

        self.outputs
            .iter()
            .map(|out| match out {
                OutputArg::Buffer(id) => Ok(RuntimeValue::Tensor(HostTensor::new(
                    self.buffer(*id).shape.clone(),
                    storage[*id].clone(),
                )?)),
                OutputArg::Scalar(value) => Ok(RuntimeValue::Scalar(scalar(*value, &storage, &slots))),
            })
            .collect()
    }

    fn step(&self, call: &KernelCall, storage: &mut [Vec<f32>], slots: &mut [f32]) {
        match call {
            KernelCall::ScalarBinary {
                kind,
                lhs,
                rhs,
                output,
            } => {
                slots[*output] = kind.apply(scalar(*lhs, storage, slots), scalar(*rhs, storage, slots));
            }
            KernelCall::ScalarUnary {
                kind,
                input,
                output,
            } => {
                slots[*output] = kind.apply(scalar(*input, storage, slots));
            }
            KernelCall::Item { input, output } => {
                slots[*output] = storage[*input][0];
            }
            _ => {
                // Buffer-writing calls: the output never aliases an operand.
                let Some(output) = writes(call) else {
                    return;
                };
                let mut out = std::mem::take(&mut storage[output]);
                self.run_into(call, storage, slots, &mut out);
                storage[output] = out;
            }
        }
    }

    fn run_into(&self, call: &KernelCall, storage: &[Vec<f32>], slots: &[f32], out: &mut [f32]) {
        match call {
            KernelCall::Binary {
                kind,
                lhs,
                rhs,
                output,
            } => {
                let lhs = self.arg(*lhs, storage, slots);
                let rhs = self.arg(*rhs, storage, slots);
                kernels::binary(*kind, lhs, rhs, out, &self.buffer(*output).shape);
            }
            KernelCall::Unary { kind, input, .. } => kernels::unary(*kind, &storage[*input], out),
            KernelCall::MatMul {
                lhs, rhs, m, k, n, ..
            } => kernels::matmul(&storage[*lhs], &storage[*rhs], out, *m, *k, *n),
            KernelCall::Transpose {
                input, rows, cols, ..
            } => kernels::transpose(&storage[*input], out, *rows, *cols),
            KernelCall::Sum { input, .. } => kernels::sum(&storage[*input], out),
            KernelCall::Copy { input, .. } => kernels::copy(&storage[*input], out),
            KernelCall::ScalarBinary { .. } | KernelCall::ScalarUnary { .. } | KernelCall::Item { .. } => {}
        }
    }

    fn arg<'s>(&'s self, operand: Operand, storage: &'s [Vec<f32>], slots: &[f32]) -> Arg<'s> {
        match operand {
            Operand::Buffer(b) => Arg::Tensor(&storage[b], &self.buffer(b).shape),
            other => Arg::Scalar(scalar(other, storage, slots)),
        }
    }
}

fn writes(call: &KernelCall) -> Option<BufId> {
    match call {
        KernelCall::Binary { output, .. }
        | KernelCall::Unary { output, .. }
        | KernelCall::MatMul { output, .. }
        | KernelCall::Transpose { output, .. }
        | KernelCall::Sum { output, .. }
        | KernelCall::Copy { output, .. } => Some(*output),
        KernelCall::ScalarBinary { .. } | KernelCall::ScalarUnary { .. } | KernelCall::Item { .. } => None,
    }
}

fn scalar(operand: Operand, storage: &[Vec<f32>], slots: &[f32]) -> f32 {
    match operand {
        Operand::Literal(v) => v,
        Operand::Slot(s) => slots[s],
        Operand::Buffer(b) => storage[b][0],
    }
}
