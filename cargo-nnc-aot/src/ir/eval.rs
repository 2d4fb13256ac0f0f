//! Reference evaluator for graphs on host tensors.
//!
//! Serves as ground truth for compiled code and as the folding engine of
//! constant propagation. In-place ops mutate shared storage: a mutation is
//! visible through every alias of the written value.

use std::collections::HashMap;

use crate::error::EvalError;
use crate::kernels::{broadcast_shape, naive, Arg};

use super::graph::{Graph, ValueId};
use super::op::Op;
use super::tensor::{resolve_reshape, HostTensor};

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeValue {
    Tensor(HostTensor),
    Scalar(f32),
    /// Placeholder bound to a self/context argument.
    Module,
}

impl RuntimeValue {
    pub fn as_tensor(&self) -> Option<&HostTensor> {
        match self {
            RuntimeValue::Tensor(t) => Some(t),
            _ => None,
        }
    }

    fn arg(&self, op: &Op) -> Result<Arg<'_>, EvalError> {
        match self {
            RuntimeValue::Tensor(t) => Ok(Arg::Tensor(t.data(), t.shape())),
            RuntimeValue::Scalar(v) => Ok(Arg::Scalar(*v)),
            RuntimeValue::Module => Err(operand(op, "a tensor or scalar")),
        }
    }
}

fn operand(op: &Op, expected: &'static str) -> EvalError {
    EvalError::Operand {
        op: op.name(),
        expected,
    }
}

fn tensor_arg<'a>(op: &Op, value: &'a RuntimeValue) -> Result<&'a HostTensor, EvalError> {
    value.as_tensor().ok_or_else(|| operand(op, "a tensor operand"))
}

/// Pure semantics of a single op. In-place ops return the new value of their target.
pub fn eval_op(op: &Op, args: &[&RuntimeValue]) -> Result<RuntimeValue, EvalError> {
    match op {
        Op::Constant { value, .. } => Ok(RuntimeValue::Tensor(value.clone())),
        Op::ScalarConstant { value, .. } => Ok(RuntimeValue::Scalar(*value)),
        Op::Full { shape, value, .. } => Ok(RuntimeValue::Tensor(HostTensor::full(shape, *value))),
        Op::Eye { n, .. } => Ok(RuntimeValue::Tensor(HostTensor::eye(*n))),

        Op::Binary { kind, .. } | Op::BinaryInplace { kind, .. } => {
            let (lhs, rhs) = (args[0], args[1]);
            match (lhs, rhs) {
                (RuntimeValue::Scalar(a), RuntimeValue::Scalar(b)) => {
                    Ok(RuntimeValue::Scalar(kind.apply(*a, *b)))
                }
                _ => {
                    let shape = binary_shape(lhs, rhs)?;
                    let mut out = HostTensor::zeros(&shape);
                    naive::binary(*kind, lhs.arg(op)?, rhs.arg(op)?, out.data_mut(), &shape);
                    Ok(RuntimeValue::Tensor(out))
                }
            }
        }

        Op::Unary { kind, .. } | Op::UnaryInplace { kind, .. } => match args[0] {
            RuntimeValue::Tensor(t) => {
                let mut out = HostTensor::zeros(t.shape());
                naive::unary(*kind, t.data(), out.data_mut());
                Ok(RuntimeValue::Tensor(out))
            }
            RuntimeValue::Scalar(v) => Ok(RuntimeValue::Scalar(kind.apply(*v))),
            RuntimeValue::Module => Err(operand(op, "a tensor or scalar")),
        },

        Op::MatMul { .. } => {
            let a = tensor_arg(op, args[0])?;
            let b = tensor_arg(op, args[1])?;
            let (sa, sb) = (a.shape(), b.shape());
            if sa.len() != 2 || sb.len() != 2 || sa[1] != sb[0] {
                return Err(EvalError::MatMul {
                    lhs: sa.to_vec(),
                    rhs: sb.to_vec(),
                });
            }
            let (m, k, n) = (sa[0], sa[1], sb[1]);
            let mut out = HostTensor::zeros(&[m, n]);
            naive::matmul(a.data(), b.data(), out.data_mut(), m, k, n);
            Ok(RuntimeValue::Tensor(out))
        }

        Op::Transpose { .. } => {
            let a = tensor_arg(op, args[0])?;
            let [rows, cols] = a.shape() else {
                return Err(operand(op, "a 2-D tensor"));
            };
            let mut out = HostTensor::zeros(&[*cols, *rows]);
            naive::transpose(a.data(), out.data_mut(), *rows, *cols);
            Ok(RuntimeValue::Tensor(out))
        }

        Op::Reshape { shape, .. } => {
            let a = tensor_arg(op, args[0])?;
            let target = resolve_reshape(a.shape(), shape).ok_or_else(|| EvalError::Reshape {
                from: a.shape().to_vec(),
                to: shape.clone(),
            })?;
            Ok(RuntimeValue::Tensor(HostTensor::new(target, a.data().to_vec())?))
        }

        Op::Sum { .. } => {
            let a = tensor_arg(op, args[0])?;
            let mut out = HostTensor::zeros(&[]);
            naive::sum(a.data(), out.data_mut());
            Ok(RuntimeValue::Tensor(out))
        }

        Op::Item { .. } => {
            let a = tensor_arg(op, args[0])?;
            match a.data() {
                [v] => Ok(RuntimeValue::Scalar(*v)),
                _ => Err(operand(op, "a single-element tensor")),
            }
        }

        Op::Custom { name, .. } => Err(EvalError::Unsupported(format!("custom::{name}"))),
    }
}

fn binary_shape(lhs: &RuntimeValue, rhs: &RuntimeValue) -> Result<Vec<usize>, EvalError> {
    let shape_of = |v: &RuntimeValue| match v {
        RuntimeValue::Tensor(t) => t.shape().to_vec(),
        _ => vec![],
    };
    let (a, b) = (shape_of(lhs), shape_of(rhs));
    broadcast_shape(&a, &b).ok_or(EvalError::Broadcast { lhs: a, rhs: b })
}

/// Runs `graph` on `inputs` (one per graph input, in order) and returns its outputs.
pub fn evaluate(graph: &Graph, inputs: &[RuntimeValue]) -> Result<Vec<RuntimeValue>, EvalError> {
    if inputs.len() != graph.inputs.len() {
        return Err(EvalError::InputCount {
            expected: graph.inputs.len(),
            got: inputs.len(),
        });
    }

    // Storage is keyed by alias root; in-place outputs point at their target's root.
    let mut root: HashMap<ValueId, ValueId> = HashMap::new();
    let mut storage: HashMap<ValueId, RuntimeValue> = HashMap::new();

    for (&id, value) in graph.inputs.iter().zip(inputs) {
        root.insert(id, id);
        storage.insert(id, value.clone());
    }

    for op in &graph.ops {
        let ids = op.inputs();
        let mut args = Vec::with_capacity(ids.len());
        for id in &ids {
            let r = root.get(id).copied().unwrap_or(*id);
            let value = storage
                .get(&r)
                .ok_or_else(|| EvalError::Unsupported(format!("read of undefined value {id}")))?;
            args.push(value);
        }
        let result = eval_op(op, &args)?;

        let out = op.output();
        match op.mutated() {
            Some(target) => {
                let r = root.get(&target).copied().unwrap_or(target);
                root.insert(out, r);
                storage.insert(r, result);
            }
            None => {
                root.insert(out, out);
                storage.insert(out, result);
            }
        }
    }

    graph
        .outputs
        .iter()
        .map(|id| {
            let r = root.get(id).copied().unwrap_or(*id);
            storage
                .get(&r)
                .cloned()
                .ok_or_else(|| EvalError::Unsupported(format!("output {id} was never computed")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::{static_dims, DType, ValueType};
    use crate::ir::op::{BinaryKind, UnaryKind};

    fn tensor(shape: &[usize], data: &[f32]) -> RuntimeValue {
        RuntimeValue::Tensor(HostTensor::from_slice(shape, data).unwrap())
    }

    #[test]
    fn in_place_mutation_is_visible_through_original_value() {
        // y = x * 2; y.relu_(); return y + 0 (reads y after the mutation)
        let mut graph = Graph::new();
        let x = graph.add_input("x", ValueType::tensor(DType::F32, static_dims(&[3])));
        let two = graph.push_op(ValueType::Scalar { dtype: DType::F32 }, |output| {
            Op::ScalarConstant { value: 2.0, output }
        });
        let y = graph.push_op(ValueType::unranked(DType::F32), |output| Op::Binary {
            kind: BinaryKind::Mul,
            lhs: x,
            rhs: two,
            output,
        });
        graph.push_op(ValueType::unranked(DType::F32), |output| Op::UnaryInplace {
            kind: UnaryKind::Relu,
            target: y,
            output,
        });
        graph.outputs.push(y);

        let out = evaluate(&graph, &[tensor(&[3], &[-1.0, 0.5, 2.0])]).unwrap();
        assert_eq!(out[0], tensor(&[3], &[0.0, 1.0, 4.0]));
    }

    #[test]
    fn input_storage_is_not_shared_with_caller() {
        let mut graph = Graph::new();
        let x = graph.add_input("x", ValueType::unranked(DType::F32));
        let one = graph.push_op(ValueType::Scalar { dtype: DType::F32 }, |output| {
            Op::ScalarConstant { value: 1.0, output }
        });
        let out = graph.push_op(ValueType::unranked(DType::F32), |output| Op::BinaryInplace {
            kind: BinaryKind::Add,
            target: x,
            other: one,
            output,
        });
        graph.outputs.push(out);

        let input = tensor(&[2], &[1.0, 2.0]);
        let result = evaluate(&graph, std::slice::from_ref(&input)).unwrap();
        assert_eq!(result[0], tensor(&[2], &[2.0, 3.0]));
        assert_eq!(input, tensor(&[2], &[1.0, 2.0]));
    }

    #[test]
    fn matmul_rejects_inner_dim_mismatch() {
        let op = Op::MatMul {
            lhs: 0,
            rhs: 1,
            output: 2,
        };
        let a = tensor(&[2, 3], &[0.0; 6]);
        let b = tensor(&[2, 3], &[0.0; 6]);
        let err = eval_op(&op, &[&a, &b]).unwrap_err();
        assert!(matches!(err, EvalError::MatMul { .. }), "got: {err}");
    }

    #[test]
    fn item_requires_single_element() {
        let op = Op::Item {
            input: 0,
            output: 1,
        };
        assert_eq!(
            eval_op(&op, &[&tensor(&[1, 1], &[4.0])]).unwrap(),
            RuntimeValue::Scalar(4.0)
        );
        assert!(eval_op(&op, &[&tensor(&[2], &[1.0, 2.0])]).is_err());
    }

    #[test]
    fn wrong_input_count_rejected() {
        let mut graph = Graph::new();
        graph.add_input("x", ValueType::unranked(DType::F32));
        let err = evaluate(&graph, &[]).unwrap_err();
        assert_eq!(err, EvalError::InputCount { expected: 1, got: 0 });
    }
}
