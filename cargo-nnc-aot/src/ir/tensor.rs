//! Owned host tensors: constant payloads and concrete example values.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EvalError;

use super::graph::DType;

/// Dense row-major f32 tensor that owns its storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Element count of `shape`. Saturates at `usize::MAX`; shapes that come
/// from outside the crate go through [`checked_numel`] first.
pub fn numel(shape: &[usize]) -> usize {
    checked_numel(shape).unwrap_or(usize::MAX)
}

/// Element count of `shape`, or `None` if it does not fit in a `usize`.
pub fn checked_numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Resolves a reshape target (one `-1` allowed) against a known input shape.
pub fn resolve_reshape(input: &[usize], target: &[i64]) -> Option<Vec<usize>> {
    let total = numel(input);
    let mut inferred: Option<usize> = None;
    let mut known = 1usize;
    for (i, &d) in target.iter().enumerate() {
        match d {
            -1 if inferred.is_none() => inferred = Some(i),
            d if d >= 0 => known = known.checked_mul(d as usize)?,
            _ => return None,
        }
    }
    let mut shape: Vec<usize> = target.iter().map(|&d| d.max(0) as usize).collect();
    match inferred {
        Some(i) => {
            if known == 0 || total % known != 0 {
                return None;
            }
            shape[i] = total / known;
        }
        None if known != total => return None,
        None => {}
    }
    Some(shape)
}

impl HostTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, EvalError> {
        let Some(expected) = checked_numel(&shape) else {
            return Err(EvalError::TooLarge { shape });
        };
        if expected != data.len() {
            return Err(EvalError::ElementCount {
                shape,
                expected,
                got: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Copies `data` into a new tensor. The result never aliases `data`.
    pub fn from_slice(shape: &[usize], data: &[f32]) -> Result<Self, EvalError> {
        Self::new(shape.to_vec(), data.to_vec())
    }

    pub fn full(shape: &[usize], value: f32) -> Self {
        Self {
            shape: shape.to_vec(),
            data: vec![value; numel(shape)],
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    pub fn eye(n: usize) -> Self {
        let mut t = Self::zeros(&[n, n]);
        for i in 0..n {
            t.data[i * n + i] = 1.0;
        }
        t
    }

    /// Uniform samples in `[0, 1)`.
    pub fn rand<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Self {
        let data = (0..numel(shape)).map(|_| rng.gen::<f32>()).collect();
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn dtype(&self) -> DType {
        DType::F32
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn is_consistent(&self) -> bool {
        checked_numel(&self.shape) == Some(self.data.len())
    }
}
