use std::collections::HashMap;

use crate::error::CompileError;
use crate::ir::eval::eval_op;
use crate::ir::{static_dims, DType, Graph, Op, RuntimeValue, ValueId, ValueType};

use super::{eliminate_dead_code, mutated_values};

/// Folds every pure op whose operands are all known into a literal.
///
/// `full` and `eye` are materialized too, so afterwards every compile-time
/// tensor in the graph is a `constant` op carrying its data.
pub fn constant_propagation(graph: &mut Graph) -> Result<usize, CompileError> {
    let mutated = mutated_values(graph);
    let mut known: HashMap<ValueId, RuntimeValue> = HashMap::new();
    let mut folds = 0;

    for i in 0..graph.ops.len() {
        let op = &graph.ops[i];
        let out = op.output();
        if op.has_side_effects() || mutated.contains(&out) {
            continue;
        }

        match op {
            Op::Constant { value, .. } => {
                known.insert(out, RuntimeValue::Tensor(value.clone()));
                continue;
            }
            Op::ScalarConstant { value, .. } => {
                known.insert(out, RuntimeValue::Scalar(*value));
                continue;
            }
            _ => {}
        }

        let inputs = op.inputs();
        if inputs.iter().any(|id| mutated.contains(id)) {
            continue;
        }
        let Some(args) = inputs
            .iter()
            .map(|id| known.get(id))
            .collect::<Option<Vec<_>>>()
        else {
            continue;
        };

        let result = eval_op(op, &args)?;
        let folded = match &result {
            RuntimeValue::Tensor(value) => {
                graph.value_mut(out).ty = ValueType::tensor(DType::F32, static_dims(value.shape()));
                Op::Constant {
                    value: value.clone(),
                    output: out,
                }
            }
            RuntimeValue::Scalar(value) => {
                graph.value_mut(out).ty = ValueType::Scalar { dtype: DType::F32 };
                Op::ScalarConstant {
                    value: *value,
                    output: out,
                }
            }
            RuntimeValue::Module => continue,
        };

        log::trace!("folded {}", graph.ops[i].name());
        known.insert(out, result);
        graph.ops[i] = folded;
        folds += 1;
    }

    let removed = eliminate_dead_code(graph);
    log::debug!("constant_propagation: {folds} ops folded, {removed} ops removed");
    Ok(folds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryKind, HostTensor, UnaryKind};

    fn t(shape: &[usize]) -> ValueType {
        ValueType::tensor(DType::F32, static_dims(shape))
    }

    #[test]
    fn folds_weight_only_subgraph() {
        // y = x + relu(eye(2) * 3)
        let mut graph = Graph::new();
        let x = graph.add_input("x", t(&[2, 2]));
        let eye = graph.push_op(t(&[2, 2]), |output| Op::Eye { n: 2, output });
        let three = graph.push_op(ValueType::Scalar { dtype: DType::F32 }, |output| {
            Op::ScalarConstant { value: 3.0, output }
        });
        let scaled = graph.push_op(t(&[2, 2]), |output| Op::Binary {
            kind: BinaryKind::Mul,
            lhs: eye,
            rhs: three,
            output,
        });
        let act = graph.push_op(t(&[2, 2]), |output| Op::Unary {
            kind: UnaryKind::Relu,
            input: scaled,
            output,
        });
        let y = graph.push_op(t(&[2, 2]), |output| Op::Binary {
            kind: BinaryKind::Add,
            lhs: x,
            rhs: act,
            output,
        });
        graph.outputs.push(y);

        assert_eq!(constant_propagation(&mut graph).unwrap(), 3);
        assert_eq!(graph.ops.len(), 2);
        let Op::Constant { value, .. } = &graph.ops[0] else {
            panic!("expected a folded constant, got {:?}", graph.ops[0]);
        };
        assert_eq!(value, &HostTensor::from_slice(&[2, 2], &[3.0, 0.0, 0.0, 3.0]).unwrap());
    }

    #[test]
    fn full_is_materialized() {
        let mut graph = Graph::new();
        let full = graph.push_op(t(&[2]), |output| Op::Full {
            shape: vec![2],
            value: 0.5,
            output,
        });
        graph.outputs.push(full);

        assert_eq!(constant_propagation(&mut graph).unwrap(), 1);
        assert!(matches!(&graph.ops[0], Op::Constant { value, .. } if value.data() == [0.5, 0.5]));
    }

    #[test]
    fn folding_error_surfaces() {
        let mut graph = Graph::new();
        let a = graph.push_op(t(&[2, 3]), |output| Op::Constant {
            value: HostTensor::zeros(&[2, 3]),
            output,
        });
        let mm = graph.push_op(ValueType::unranked(DType::F32), |output| Op::MatMul {
            lhs: a,
            rhs: a,
            output,
        });
        graph.outputs.push(mm);

        let err = constant_propagation(&mut graph).unwrap_err();
        assert!(err.to_string().contains("matmul"), "got: {err}");
    }

    #[test]
    fn custom_ops_are_never_folded() {
        let mut graph = Graph::new();
        let c = graph.push_op(t(&[1]), |output| Op::Constant {
            value: HostTensor::zeros(&[1]),
            output,
        });
        let custom = graph.push_op(t(&[1]), |output| Op::Custom {
            name: "opaque".into(),
            inputs: vec![c],
            output_shape: Some(vec![1]),
            output,
        });
        graph.outputs.push(custom);

        assert_eq!(constant_propagation(&mut graph).unwrap(), 0);
        assert_eq!(graph.ops.len(), 2);
    }
}
