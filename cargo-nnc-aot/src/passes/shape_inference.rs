//! Input shape annotation and forward shape propagation.

use crate::error::CompileError;
use crate::ir::tensor::resolve_reshape;
use crate::ir::{static_dims, DType, Dim, Graph, HostTensor, Op, ValueId, ValueType};

use super::op_label;

/// Stamps the concrete shape of each example onto the matching graph input.
///
/// `examples` has one entry per graph input; `None` leaves that input untouched.
pub fn annotate_input_shapes(
    graph: &mut Graph,
    examples: &[Option<HostTensor>],
) -> Result<(), CompileError> {
    if examples.len() != graph.inputs.len() {
        return Err(CompileError::InputArity {
            expected: graph.inputs.len(),
            got: examples.len(),
        });
    }

    for (&id, example) in graph.inputs.clone().iter().zip(examples) {
        let Some(example) = example else {
            continue;
        };
        let value = graph.value(id);
        let ValueType::Tensor { dtype, shape } = &value.ty else {
            return Err(CompileError::ShapeMismatch {
                node: format!("input {}", value.label()),
                detail: format!("example tensor given for a {} input", value.ty),
            });
        };

        if let Some(dims) = shape {
            if dims.len() != example.shape().len() {
                return Err(CompileError::InputRank {
                    input: value.label(),
                    declared: dims.len(),
                    got: example.shape().len(),
                });
            }
            for (axis, (dim, &size)) in dims.iter().zip(example.shape()).enumerate() {
                if let Dim::Static(declared) = dim {
                    if *declared != size {
                        return Err(CompileError::ShapeMismatch {
                            node: format!("input {}", value.label()),
                            detail: format!("dim {axis} is declared {declared}, got {size}"),
                        });
                    }
                }
            }
        }

        let ty = ValueType::tensor(*dtype, static_dims(example.shape()));
        graph.value_mut(id).ty = ty;
    }

    Ok(())
}

/// Forward shape inference over every op.
///
/// Results that cannot be inferred keep their previous (possibly symbolic)
/// type; provable conflicts are errors.
pub fn propagate_shapes(graph: &mut Graph) -> Result<(), CompileError> {
    let mut refined = 0;
    for i in 0..graph.ops.len() {
        let inferred = infer(graph, &graph.ops[i]).map_err(|detail| CompileError::ShapeMismatch {
            node: op_label(graph, i),
            detail,
        })?;
        if let Some(ty) = inferred {
            let out = graph.ops[i].output();
            if graph.value(out).ty != ty {
                graph.value_mut(out).ty = ty;
                refined += 1;
            }
        }
    }
    log::debug!("propagate_shapes: {refined} value types refined");
    Ok(())
}

fn infer(graph: &Graph, op: &Op) -> Result<Option<ValueType>, String> {
    let ty = move |id: ValueId| &graph.value(id).ty;
    let f32_tensor = |dims: Vec<Dim>| Some(ValueType::tensor(DType::F32, dims));

    Ok(match op {
        Op::Constant { value, .. } => f32_tensor(static_dims(value.shape())),
        Op::ScalarConstant { .. } => Some(ValueType::Scalar { dtype: DType::F32 }),
        Op::Full { shape, .. } => f32_tensor(static_dims(shape)),
        Op::Eye { n, .. } => f32_tensor(static_dims(&[*n, *n])),

        Op::Binary { lhs, rhs, .. } => infer_binary(ty(*lhs), ty(*rhs))?,
        Op::Unary { input, .. } => Some(ty(*input).clone()),
        Op::BinaryInplace { target, .. } | Op::UnaryInplace { target, .. } => {
            Some(ty(*target).clone())
        }

        Op::MatMul { lhs, rhs, .. } => match (ty(*lhs).dims(), ty(*rhs).dims()) {
            (Some(a), Some(b)) => {
                let ([m, k1], [k2, n]) = (a, b) else {
                    return Err(format!(
                        "matmul expects 2-D operands, got ranks {} and {}",
                        a.len(),
                        b.len()
                    ));
                };
                if let (Dim::Static(x), Dim::Static(y)) = (k1, k2) {
                    if x != y {
                        return Err(format!("matmul inner dims differ: {x} vs {y}"));
                    }
                }
                f32_tensor(vec![m.clone(), n.clone()])
            }
            _ => Some(ValueType::unranked(DType::F32)),
        },

        Op::Transpose { input, .. } => match ty(*input).dims() {
            Some([r, c]) => f32_tensor(vec![c.clone(), r.clone()]),
            Some(dims) => return Err(format!("transpose expects rank 2, got {}", dims.len())),
            None => Some(ValueType::unranked(DType::F32)),
        },

        Op::Reshape { input, shape, .. } => match ty(*input).concrete_shape() {
            Some(from) => {
                let to = resolve_reshape(&from, shape)
                    .ok_or_else(|| format!("cannot reshape {from:?} into {shape:?}"))?;
                f32_tensor(static_dims(&to))
            }
            None => f32_tensor(
                shape
                    .iter()
                    .map(|&d| {
                        if d < 0 {
                            Dim::Symbolic("?".into())
                        } else {
                            Dim::Static(d as usize)
                        }
                    })
                    .collect(),
            ),
        },

        Op::Sum { .. } => f32_tensor(vec![]),
        Op::Item { .. } => Some(ValueType::Scalar { dtype: DType::F32 }),

        Op::Custom { output_shape, .. } => output_shape
            .as_ref()
            .and_then(|shape| f32_tensor(static_dims(shape))),
    })
}

fn infer_binary(lhs: &ValueType, rhs: &ValueType) -> Result<Option<ValueType>, String> {
    use ValueType::{Scalar, Tensor};

    Ok(match (lhs, rhs) {
        (Scalar { dtype }, Scalar { .. }) => Some(Scalar { dtype: *dtype }),
        (Tensor { .. }, Scalar { .. }) => Some(lhs.clone()),
        (Scalar { .. }, Tensor { .. }) => Some(rhs.clone()),
        (Tensor { dtype, shape: Some(a) }, Tensor { shape: Some(b), .. }) => {
            Some(ValueType::tensor(*dtype, broadcast_dims(a, b)?))
        }
        (Tensor { dtype, .. }, Tensor { .. }) => Some(ValueType::unranked(*dtype)),
        _ => return Err(format!("operands {lhs} and {rhs} are not numeric")),
    })
}

/// Broadcast over possibly symbolic dims.
fn broadcast_dims(a: &[Dim], b: &[Dim]) -> Result<Vec<Dim>, String> {
    let rank = a.len().max(b.len());
    let one = Dim::Static(1);
    let mut out = Vec::with_capacity(rank);
    for i in 0..rank {
        let da = if i < rank - a.len() { &one } else { &a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { &one } else { &b[i - (rank - b.len())] };
        let dim = match (da, db) {
            (x, y) if x == y => x.clone(),
            (Dim::Static(1), y) => y.clone(),
            (x, Dim::Static(1)) => x.clone(),
            (Dim::Static(x), Dim::Static(y)) => {
                return Err(format!("cannot broadcast dim {x} with {y}"));
            }
            // A known non-1 extent wins: the symbolic side must be 1 or equal.
            (Dim::Static(x), Dim::Symbolic(_)) | (Dim::Symbolic(_), Dim::Static(x)) => {
                Dim::Static(*x)
            }
            (Dim::Symbolic(x), Dim::Symbolic(y)) => Dim::Symbolic(format!("max({x}, {y})")),
        };
        out.push(dim);
    }
    Ok(out)
}
