//! Naive reference implementations - correct but slow.
//! The reference evaluator uses these; generated code uses the parent module.

use super::{broadcast_strides, Arg};
use crate::ir::op::{BinaryKind, UnaryKind};

/// Broadcasting elementwise binary op.
///
/// - `output_shape` must be the broadcast of both tensor operand shapes.
pub fn binary(kind: BinaryKind, lhs: Arg, rhs: Arg, output: &mut [f32], output_shape: &[usize]) {
    let lhs_strides = operand_strides(&lhs, output_shape);
    let rhs_strides = operand_strides(&rhs, output_shape);
    let rank = output_shape.len();
    let mut index = vec![0usize; rank];

    for out in output.iter_mut() {
        let a = read(&lhs, &lhs_strides, &index);
        let b = read(&rhs, &rhs_strides, &index);
        *out = kind.apply(a, b);

        // Odometer increment over the output index.
        for d in (0..rank).rev() {
            index[d] += 1;
            if index[d] < output_shape[d] {
                break;
            }
            index[d] = 0;
        }
    }
}

fn operand_strides(arg: &Arg, output_shape: &[usize]) -> Vec<usize> {
    match arg {
        Arg::Tensor(_, shape) => broadcast_strides(shape, output_shape),
        Arg::Scalar(_) => vec![0; output_shape.len()],
    }
}

fn read(arg: &Arg, strides: &[usize], index: &[usize]) -> f32 {
    match arg {
        Arg::Tensor(data, _) => {
            let offset: usize = index.iter().zip(strides).map(|(i, s)| i * s).sum();
            data[offset]
        }
        Arg::Scalar(v) => *v,
    }
}

/// Elementwise unary op.
pub fn unary(kind: UnaryKind, input: &[f32], output: &mut [f32]) {
    for (o, &x) in output.iter_mut().zip(input) {
        *o = kind.apply(x);
    }
}

/// Matrix multiply (naive): C[M,N] = A[M,K] @ B[K,N]
pub fn matmul(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0;
            for p in 0..k {
                sum += a[i * k + p] * b[p * n + j];
            }
            c[i * n + j] = sum;
        }
    }
}

/// 2-D transpose: `input` is `[rows, cols]`, `output` is `[cols, rows]`.
pub fn transpose(input: &[f32], output: &mut [f32], rows: usize, cols: usize) {
    for r in 0..rows {
        for c in 0..cols {
            output[c * rows + r] = input[r * cols + c];
        }
    }
}

/// Copy (reshape is a copy into a buffer of the new shape)
pub fn copy(input: &[f32], output: &mut [f32]) {
    for i in 0..input.len() {
        output[i] = input[i];
    }
}

/// Sum of all elements into `output[0]`.
pub fn sum(input: &[f32], output: &mut [f32]) {
    output[0] = input.iter().sum();
}
