//! Core graph types: values, their types, and the dataflow graph itself.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::op::Op;
use super::tensor::checked_numel;

pub type ValueId = usize;

/// Element datatype tag.
///
/// Only `F32` is produced today; new variants must not change the shape of
/// any descriptor that carries a `DType`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
}

impl DType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 => std::mem::size_of::<f32>(),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
        }
    }
}

/// A single tensor dimension, either known or named-but-unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dim {
    Static(usize),
    Symbolic(String),
}

impl Dim {
    pub fn as_static(&self) -> Option<usize> {
        match self {
            Dim::Static(n) => Some(*n),
            Dim::Symbolic(_) => None,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Static(n) => write!(f, "{n}"),
            Dim::Symbolic(s) => write!(f, "{s}"),
        }
    }
}

/// Converts a fully known shape into graph dims.
pub fn static_dims(shape: &[usize]) -> Vec<Dim> {
    shape.iter().map(|&d| Dim::Static(d)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueType {
    /// `shape: None` means the rank itself is unknown.
    Tensor {
        dtype: DType,
        #[serde(default)]
        shape: Option<Vec<Dim>>,
    },
    Scalar { dtype: DType },
    /// The bound self/context object of a method. Never carries data.
    Module { class: String },
}

impl ValueType {
    pub fn tensor(dtype: DType, dims: Vec<Dim>) -> Self {
        ValueType::Tensor {
            dtype,
            shape: Some(dims),
        }
    }

    pub fn unranked(dtype: DType) -> Self {
        ValueType::Tensor { dtype, shape: None }
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, ValueType::Tensor { .. })
    }

    pub fn is_module(&self) -> bool {
        matches!(self, ValueType::Module { .. })
    }

    pub fn dtype(&self) -> Option<DType> {
        match self {
            ValueType::Tensor { dtype, .. } | ValueType::Scalar { dtype } => Some(*dtype),
            ValueType::Module { .. } => None,
        }
    }

    /// Declared dims of a tensor value, if ranked.
    pub fn dims(&self) -> Option<&[Dim]> {
        match self {
            ValueType::Tensor {
                shape: Some(dims), ..
            } => Some(dims),
            _ => None,
        }
    }

    /// Fully known shape of a tensor value.
    pub fn concrete_shape(&self) -> Option<Vec<usize>> {
        self.dims()?.iter().map(Dim::as_static).collect()
    }

    /// Scalars and modules are trivially concrete; tensors need every dim known.
    pub fn is_concrete(&self) -> bool {
        match self {
            ValueType::Tensor { .. } => self.concrete_shape().is_some(),
            ValueType::Scalar { .. } | ValueType::Module { .. } => true,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Tensor { dtype, shape } => match shape {
                Some(dims) => {
                    let dims: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                    write!(f, "{dtype}[{}]", dims.join(", "))
                }
                None => write!(f, "{dtype}[*]"),
            },
            ValueType::Scalar { dtype } => write!(f, "{dtype}"),
            ValueType::Module { class } => write!(f, "module {class}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub id: ValueId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: ValueType,
}

impl Value {
    /// `%name` when named, `%id` otherwise.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("%{name}"),
            None => format!("%{}", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub values: Vec<Value>,
    pub ops: Vec<Op>,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            ops: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id]
    }

    pub fn add_value(&mut self, name: Option<&str>, ty: ValueType) -> ValueId {
        let id = self.values.len();
        self.values.push(Value {
            id,
            name: name.map(str::to_string),
            ty,
        });
        id
    }

    /// Adds a value and registers it as the next graph input.
    pub fn add_input(&mut self, name: &str, ty: ValueType) -> ValueId {
        let id = self.add_value(Some(name), ty);
        self.inputs.push(id);
        id
    }

    /// Appends the op built by `build` from a freshly allocated output value.
    pub fn push_op(&mut self, ty: ValueType, build: impl FnOnce(ValueId) -> Op) -> ValueId {
        let output = self.add_value(None, ty);
        self.ops.push(build(output));
        output
    }

    /// Index of the op defining `id`, if any.
    pub fn producer(&self, id: ValueId) -> Option<usize> {
        self.ops.iter().position(|op| op.output() == id)
    }

    pub fn tensor_inputs(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.inputs
            .iter()
            .copied()
            .filter(|&id| self.values[id].ty.is_tensor())
    }

    /// True when any op or graph output reads `id`.
    pub fn has_uses(&self, id: ValueId) -> bool {
        self.outputs.contains(&id) || self.ops.iter().any(|op| op.inputs().contains(&id))
    }

    /// Redirects every read of `from` in ops `start..` and in the graph outputs to `to`.
    pub fn replace_uses_from(&mut self, start: usize, from: ValueId, to: ValueId) {
        for op in self.ops.iter_mut().skip(start) {
            for input in op.inputs_mut() {
                if *input == from {
                    *input = to;
                }
            }
        }
        for output in &mut self.outputs {
            if *output == from {
                *output = to;
            }
        }
    }

    /// Structural checks: ids match positions, single definition, defs before uses.
    pub fn validate(&self) -> Result<(), String> {
        for (idx, value) in self.values.iter().enumerate() {
            if value.id != idx {
                return Err(format!("value at position {idx} has id {}", value.id));
            }
        }

        let in_range = |id: ValueId| id < self.values.len();
        let mut defined: HashSet<ValueId> = HashSet::new();

        for &input in &self.inputs {
            if !in_range(input) {
                return Err(format!("graph input {input} is not a value"));
            }
            if !defined.insert(input) {
                return Err(format!("graph input {input} is listed twice"));
            }
        }

        for (i, op) in self.ops.iter().enumerate() {
            for used in op.inputs() {
                if !in_range(used) {
                    return Err(format!("op {i} ({}) reads unknown value {used}", op.name()));
                }
                if !defined.contains(&used) {
                    return Err(format!(
                        "op {i} ({}) reads {} before it is defined",
                        op.name(),
                        self.values[used].label()
                    ));
                }
            }
            match op {
                Op::Constant { value, .. } if checked_numel(value.shape()).is_none() => {
                    return Err(format!(
                        "op {i} (constant) has shape {:?}, whose element count overflows",
                        value.shape()
                    ));
                }
                Op::Constant { value, .. } if !value.is_consistent() => {
                    return Err(format!(
                        "op {i} (constant) has shape {:?} but {} elements",
                        value.shape(),
                        value.numel()
                    ));
                }
                Op::Full { shape, .. } if checked_numel(shape).is_none() => {
                    return Err(format!(
                        "op {i} (full) has shape {shape:?}, whose element count overflows"
                    ));
                }
                Op::Eye { n, .. } if n.checked_mul(*n).is_none() => {
                    return Err(format!("op {i} (eye) of size {n} overflows"));
                }
                _ => {}
            }
            let out = op.output();
            if !in_range(out) {
                return Err(format!("op {i} ({}) writes unknown value {out}", op.name()));
            }
            if !defined.insert(out) {
                return Err(format!(
                    "op {i} ({}) redefines {}",
                    op.name(),
                    self.values[out].label()
                ));
            }
        }

        for &output in &self.outputs {
            if !defined.contains(&output) {
                return Err(format!("graph output {output} is never defined"));
            }
        }

        Ok(())
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<String> = self
            .inputs
            .iter()
            .map(|&id| format!("{}: {}", self.values[id].label(), self.values[id].ty))
            .collect();
        writeln!(f, "graph({}) {{", inputs.join(", "))?;
        for op in &self.ops {
            let out = &self.values[op.output()];
            let args: Vec<String> = op
                .inputs()
                .iter()
                .map(|&id| self.values[id].label())
                .collect();
            writeln!(
                f,
                "  {}: {} = {}({})",
                out.label(),
                out.ty,
                op.name(),
                args.join(", ")
            )?;
        }
        let outputs: Vec<String> = self
            .outputs
            .iter()
            .map(|&id| self.values[id].label())
            .collect();
        writeln!(f, "  return ({})", outputs.join(", "))?;
        write!(f, "}}")
    }
}
