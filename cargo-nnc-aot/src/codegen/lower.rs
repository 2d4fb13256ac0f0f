use std::collections::HashMap;

use crate::backend::BufHandle;
use crate::error::BackendError;
use crate::ir::{DType, Graph, HostTensor, Op, ValueId, ValueType};
use crate::kernels::broadcast_shape;

use super::plan::*;

/**
 * Lower a specialized graph into a KernelPlan.
 */
pub fn lower(graph: &Graph) -> Result<KernelPlan, BackendError> {
    let mut lowering = Lowering {
        graph,
        plan: KernelPlan {
            buffers: Vec::new(),
            constants: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            num_slots: 0,
            calls: Vec::new(),
        },
        locs: HashMap::new(),
        claimed: HashMap::new(),
    };

    lowering.lower_inputs()?;
    lowering.claim_outputs();
    for (i, op) in graph.ops.iter().enumerate() {
        lowering.lower_op(i, op)?;
    }
    lowering.lower_outputs()?;

    Ok(lowering.plan)
}

struct Lowering<'a> {
    graph: &'a Graph,
    plan: KernelPlan,
    locs: HashMap<ValueId, Operand>,
    /// Op results written straight into output `j`.
    claimed: HashMap<ValueId, usize>,
}

impl Lowering<'_> {
    fn conflict(&self, id: ValueId, detail: impl Into<String>) -> BackendError {
        BackendError::ShapeConflict {
            value: self.graph.value(id).label(),
            detail: detail.into(),
        }
    }

    fn alloc(
        &mut self,
        role: BufferRole,
        name: String,
        shape: Vec<usize>,
        value: Option<ValueId>,
    ) -> BufId {
        let id = self.plan.buffers.len();
        self.plan.buffers.push(BufferAlloc {
            role,
            handle: BufHandle::new(name, &shape, DType::F32),
            shape,
            value,
        });
        id
    }

    fn new_slot(&mut self) -> SlotId {
        self.plan.num_slots += 1;
        self.plan.num_slots - 1
    }

    fn shape_of(&self, id: ValueId) -> Result<Vec<usize>, BackendError> {
        self.graph
            .value(id)
            .ty
            .concrete_shape()
            .ok_or_else(|| self.conflict(id, format!("type {} is not concrete", self.graph.value(id).ty)))
    }

    fn operand(&self, id: ValueId) -> Result<Operand, BackendError> {
        self.locs
            .get(&id)
            .copied()
            .ok_or_else(|| self.conflict(id, "read before it was computed"))
    }

    fn buffer(&self, id: ValueId) -> Result<BufId, BackendError> {
        match self.operand(id)? {
            Operand::Buffer(b) => Ok(b),
            _ => Err(self.conflict(id, "expected a tensor, found a scalar")),
        }
    }

    fn operand_shape(&self, operand: Operand) -> &[usize] {
        match operand {
            Operand::Buffer(b) => &self.plan.buffers[b].shape,
            _ => &[],
        }
    }

    /// Allocates the buffer an op writes `id` into, checking the computed
    /// shape against the one shape propagation recorded.
    fn result_buffer(&mut self, id: ValueId, computed: &[usize]) -> Result<BufId, BackendError> {
        let declared = self.shape_of(id)?;
        if declared != computed {
            return Err(self.conflict(
                id,
                format!("declared shape {declared:?}, kernel produces {computed:?}"),
            ));
        }
        let buf = match self.claimed.get(&id) {
            Some(&j) => self.alloc(BufferRole::Output, format!("out_{j}"), declared, Some(id)),
            None => self.alloc(BufferRole::Temp, format!("t_{id}"), declared, Some(id)),
        };
        self.locs.insert(id, Operand::Buffer(buf));
        Ok(buf)
    }

    fn lower_inputs(&mut self) -> Result<(), BackendError> {
        let graph = self.graph;
        for (i, &id) in graph.inputs.iter().enumerate() {
            let value = graph.value(id);
            match &value.ty {
                ValueType::Tensor { .. } => {}
                ValueType::Scalar { .. } => {
                    return Err(BackendError::UnsupportedInput {
                        value: value.label(),
                        reason: "scalar inputs are not supported".into(),
                    });
                }
                ValueType::Module { class } => {
                    return Err(BackendError::UnsupportedInput {
                        value: value.label(),
                        reason: format!("module `{class}` has no buffer representation"),
                    });
                }
            }
            let shape = self.shape_of(id)?;
            let buf = self.alloc(BufferRole::Input, format!("in_{i}"), shape, Some(id));
            self.plan.inputs.push(buf);
            self.locs.insert(id, Operand::Buffer(buf));
        }
        Ok(())
    }

    /// Each output computed by a kernel writes straight into its output
    /// buffer; the rest get a trailing copy.
    fn claim_outputs(&mut self) {
        let graph = self.graph;
        for (j, &id) in graph.outputs.iter().enumerate() {
            let computed = graph
                .ops
                .iter()
                .any(|op| op.output() == id && !op.is_constant());
            if computed && graph.value(id).ty.is_tensor() && !self.claimed.contains_key(&id) {
                self.claimed.insert(id, j);
            }
        }
    }

    fn constant(&mut self, id: ValueId, value: HostTensor) {
        let name = format!("c_{}", self.plan.constants.len());
        let buf = self.alloc(BufferRole::Constant, name, value.shape().to_vec(), Some(id));
        self.plan.constants.push((buf, value.into_data()));
        self.locs.insert(id, Operand::Buffer(buf));
    }

    fn lower_op(&mut self, index: usize, op: &Op) -> Result<(), BackendError> {
        match op {
            Op::Constant { value, output } => self.constant(*output, value.clone()),
            Op::Full {
                shape,
                value,
                output,
            } => self.constant(*output, HostTensor::full(shape, *value)),
            Op::Eye { n, output } => self.constant(*output, HostTensor::eye(*n)),
            Op::ScalarConstant { value, output } => {
                self.locs.insert(*output, Operand::Literal(*value));
            }

            Op::Binary {
                kind,
                lhs,
                rhs,
                output,
            } => {
                let (a, b) = (self.operand(*lhs)?, self.operand(*rhs)?);
                if a.is_scalar() && b.is_scalar() {
                    let slot = self.new_slot();
                    self.plan.calls.push(KernelCall::ScalarBinary {
                        kind: *kind,
                        lhs: a,
                        rhs: b,
                        output: slot,
                    });
                    self.locs.insert(*output, Operand::Slot(slot));
                } else {
                    let (sa, sb) = (self.operand_shape(a), self.operand_shape(b));
                    let shape = broadcast_shape(sa, sb).ok_or_else(|| {
                        self.conflict(*output, format!("cannot broadcast {sa:?} with {sb:?}"))
                    })?;
                    let out = self.result_buffer(*output, &shape)?;
                    self.plan.calls.push(KernelCall::Binary {
                        kind: *kind,
                        lhs: a,
                        rhs: b,
                        output: out,
                    });
                }
            }

            Op::Unary {
                kind,
                input,
                output,
            } => match self.operand(*input)? {
                Operand::Buffer(b) => {
                    let shape = self.plan.buffers[b].shape.clone();
                    let out = self.result_buffer(*output, &shape)?;
                    self.plan.calls.push(KernelCall::Unary {
                        kind: *kind,
                        input: b,
                        output: out,
                    });
                }
                scalar => {
                    let slot = self.new_slot();
                    self.plan.calls.push(KernelCall::ScalarUnary {
                        kind: *kind,
                        input: scalar,
                        output: slot,
                    });
                    self.locs.insert(*output, Operand::Slot(slot));
                }
            },

            Op::MatMul { lhs, rhs, output } => {
                let (a, b) = (self.buffer(*lhs)?, self.buffer(*rhs)?);
                let (sa, sb) = (&self.plan.buffers[a].shape, &self.plan.buffers[b].shape);
                let (&[m, k], &[k2, n]) = (sa.as_slice(), sb.as_slice()) else {
                    return Err(self.conflict(*output, format!("matmul of {sa:?} and {sb:?}")));
                };
                if k != k2 {
                    return Err(self.conflict(*output, format!("matmul of {sa:?} and {sb:?}")));
                }
                let out = self.result_buffer(*output, &[m, n])?;
                self.plan.calls.push(KernelCall::MatMul {
                    lhs: a,
                    rhs: b,
                    output: out,
                    m,
                    k,
                    n,
                });
            }

            Op::Transpose { input, output } => {
                let b = self.buffer(*input)?;
                let &[rows, cols] = self.plan.buffers[b].shape.as_slice() else {
                    return Err(self.conflict(*input, "transpose expects a 2-D tensor"));
                };
                let out = self.result_buffer(*output, &[cols, rows])?;
                self.plan.calls.push(KernelCall::Transpose {
                    input: b,
                    output: out,
                    rows,
                    cols,
                });
            }

            Op::Reshape { input, output, .. } => {
                let b = self.buffer(*input)?;
                let declared = self.shape_of(*output)?;
                if declared.iter().product::<usize>() != self.plan.buffers[b].numel() {
                    return Err(self.conflict(
                        *output,
                        format!("cannot reshape {:?} into {declared:?}", self.plan.buffers[b].shape),
                    ));
                }
                let out = self.result_buffer(*output, &declared)?;
                self.plan.calls.push(KernelCall::Copy {
                    input: b,
                    output: out,
                });
            }

            Op::Sum { input, output } => {
                let b = self.buffer(*input)?;
                let out = self.result_buffer(*output, &[])?;
                self.plan.calls.push(KernelCall::Sum {
                    input: b,
                    output: out,
                });
            }

            Op::Item { input, output } => {
                let b = self.buffer(*input)?;
                if self.plan.buffers[b].numel() != 1 {
                    return Err(self.conflict(*input, "item of a tensor with more than one element"));
                }
                let slot = self.new_slot();
                self.plan.calls.push(KernelCall::Item {
                    input: b,
                    output: slot,
                });
                self.locs.insert(*output, Operand::Slot(slot));
            }

            Op::BinaryInplace { .. } | Op::UnaryInplace { .. } | Op::Custom { .. } => {
                return Err(BackendError::UnsupportedOperator {
                    op: op.name(),
                    index,
                });
            }
        }
        Ok(())
    }

    fn lower_outputs(&mut self) -> Result<(), BackendError> {
        let graph = self.graph;
        for (j, &id) in graph.outputs.iter().enumerate() {
            let arg = match self.operand(id)? {
                Operand::Buffer(b) if self.claimed.get(&id) == Some(&j) => OutputArg::Buffer(b),
                Operand::Buffer(b) => {
                    let shape = self.plan.buffers[b].shape.clone();
                    let out = self.alloc(BufferRole::Output, format!("out_{j}"), shape, None);
                    self.plan.calls.push(KernelCall::Copy {
                        input: b,
                        output: out,
                    });
                    OutputArg::Buffer(out)
                }
                scalar => OutputArg::Scalar(scalar),
            };
            self.plan.outputs.push(arg);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{static_dims, BinaryKind, UnaryKind};

    fn t(shape: &[usize]) -> ValueType {
        ValueType::tensor(DType::F32, static_dims(shape))
    }

    #[test]
    fn outputs_are_written_in_place_or_copied() {
        // return (relu(x), x, relu(x))
        let mut graph = Graph::new();
        let x = graph.add_input("x", t(&[4]));
        let y = graph.push_op(t(&[4]), |output| Op::Unary {
            kind: UnaryKind::Relu,
            input: x,
            output,
        });
        graph.outputs = vec![y, x, y];

        let plan = lower(&graph).unwrap();
        assert_eq!(plan.inputs.len(), 1);
        assert_eq!(plan.outputs.len(), 3);
        assert_eq!(plan.op_names(), ["relu", "copy", "copy"]);
        assert!(plan.temps().next().is_none());

        let OutputArg::Buffer(first) = plan.outputs[0] else {
            panic!("expected a buffer output");
        };
        assert_eq!(plan.buffer(first).handle.name, "out_0");
        assert_eq!(plan.buffer(first).role, BufferRole::Output);
    }

    #[test]
    fn constants_and_temps() {
        let mut graph = Graph::new();
        let x = graph.add_input("x", t(&[2, 3]));
        let w = graph.push_op(t(&[3]), |output| Op::Constant {
            value: HostTensor::full(&[3], 2.0),
            output,
        });
        let m = graph.push_op(t(&[2, 3]), |output| Op::Binary {
            kind: BinaryKind::Mul,
            lhs: x,
            rhs: w,
            output,
        });
        let s = graph.push_op(t(&[]), |output| Op::Sum { input: m, output });
        graph.outputs.push(s);

        let plan = lower(&graph).unwrap();
        assert_eq!(plan.constants.len(), 1);
        assert_eq!(plan.constants[0].1, vec![2.0; 3]);
        assert_eq!(plan.temps().count(), 1);
        assert_eq!(plan.op_names(), ["mul", "sum"]);
    }

    #[test]
    fn scalar_outputs_are_reported() {
        let mut graph = Graph::new();
        let x = graph.add_input("x", t(&[1]));
        let s = graph.push_op(ValueType::Scalar { dtype: DType::F32 }, |output| Op::Item {
            input: x,
            output,
        });
        graph.outputs.push(s);

        let plan = lower(&graph).unwrap();
        assert!(matches!(plan.outputs[0], OutputArg::Scalar(Operand::Slot(0))));
    }

    #[test]
    fn rejects_custom_ops_and_modules() {
        let mut graph = Graph::new();
        let x = graph.add_input("x", t(&[1]));
        let c = graph.push_op(t(&[1]), |output| Op::Custom {
            name: "opaque".into(),
            inputs: vec![x],
            output_shape: Some(vec![1]),
            output,
        });
        graph.outputs.push(c);
        let err = lower(&graph).unwrap_err();
        assert_eq!(
            err,
            BackendError::UnsupportedOperator {
                op: "custom::opaque".into(),
                index: 0
            }
        );

        let mut graph = Graph::new();
        graph.add_input(
            "self",
            ValueType::Module {
                class: "Net".into(),
            },
        );
        let err = lower(&graph).unwrap_err();
        assert!(err.to_string().contains("module `Net`"), "got: {err}");
    }

    #[test]
    fn declared_shape_must_match_kernel_shape() {
        let mut graph = Graph::new();
        let x = graph.add_input("x", t(&[2, 3]));
        let y = graph.push_op(t(&[2, 3]), |output| Op::Transpose { input: x, output });
        graph.outputs.push(y);

        let err = lower(&graph).unwrap_err();
        assert!(err.to_string().contains("kernel produces [3, 2]"), "got: {err}");
    }
}
