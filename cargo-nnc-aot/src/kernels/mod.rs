//! f32 kernels
//!
//! This module contains the operator implementations that generated code calls.
//!
//! - `naive`: Reference implementations, used by the graph evaluator
//! - Root module: the entry points emitted into generated code

pub mod naive;

pub use crate::ir::op::{BinaryKind, UnaryKind};

const TILE: usize = 4;

/// Operand of a broadcasting kernel.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    /// Row-major data with its shape.
    Tensor(&'a [f32], &'a [usize]),
    Scalar(f32),
}

/// Numpy-style broadcast of two shapes, aligned on trailing dims.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let rank = a.len().max(b.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
    }
    Some(out)
}

/// Element strides of `shape` when read at `output_shape` positions.
/// Broadcast dimensions get stride 0.
pub fn broadcast_strides(shape: &[usize], output_shape: &[usize]) -> Vec<usize> {
    let offset = output_shape.len() - shape.len();
    let mut strides = vec![0; output_shape.len()];
    let mut stride = 1;
    for d in (0..shape.len()).rev() {
        if shape[d] != 1 {
            strides[d + offset] = stride;
        }
        stride *= shape[d];
    }
    strides
}

/// Broadcasting elementwise binary op.
pub fn binary(kind: BinaryKind, lhs: Arg, rhs: Arg, output: &mut [f32], output_shape: &[usize]) {
    match (lhs, rhs) {
        // Same-shape fast path: no index arithmetic needed.
        (Arg::Tensor(a, sa), Arg::Tensor(b, sb)) if sa == output_shape && sb == output_shape => {
            for ((o, &x), &y) in output.iter_mut().zip(a).zip(b) {
                *o = kind.apply(x, y);
            }
        }
        (Arg::Tensor(a, sa), Arg::Scalar(s)) if sa == output_shape => {
            for (o, &x) in output.iter_mut().zip(a) {
                *o = kind.apply(x, s);
            }
        }
        _ => naive::binary(kind, lhs, rhs, output, output_shape),
    }
}

/// Elementwise unary op.
pub fn unary(kind: UnaryKind, input: &[f32], output: &mut [f32]) {
    naive::unary(kind, input, output);
}

/// Copy (reshape or output materialization)
pub fn copy(input: &[f32], output: &mut [f32]) {
    output[..input.len()].copy_from_slice(input);
}

/// 2-D transpose: `[rows, cols]` -> `[cols, rows]`.
pub fn transpose(input: &[f32], output: &mut [f32], rows: usize, cols: usize) {
    naive::transpose(input, output, rows, cols);
}

/// Sum of all elements into `output[0]`.
pub fn sum(input: &[f32], output: &mut [f32]) {
    naive::sum(input, output);
}

struct Tile([f32; 16]);

/// Load a 4x4 tile from a row-major matrix.
/// Zero-pads if the tile extends past matrix boundaries.
#[inline]
fn load_tile(src: &[f32], cols: usize, row: usize, col: usize, max_rows: usize, dst: &mut Tile) {
    dst.0 = [0.0; 16];
    let rows = if row + TILE <= max_rows { TILE } else { max_rows - row };
    let cs = if col + TILE <= cols { TILE } else { cols - col };
    for r in 0..rows {
        for c in 0..cs {
            dst.0[r * TILE + c] = src[(row + r) * cols + col + c];
        }
    }
}

/// Store a 4x4 tile into a row-major matrix, clipped to its boundaries.
#[inline]
fn store_tile(src: &Tile, dst: &mut [f32], cols: usize, row: usize, col: usize, max_rows: usize) {
    let rows = if row + TILE <= max_rows { TILE } else { max_rows - row };
    let cs = if col + TILE <= cols { TILE } else { cols - col };
    for r in 0..rows {
        for c in 0..cs {
            dst[(row + r) * cols + col + c] = src.0[r * TILE + c];
        }
    }
}

/// 4x4 multiply-accumulate: acc += a * b
#[inline]
fn mul_acc(a: &Tile, b: &Tile, acc: &mut Tile) {
    for i in 0..TILE {
        for j in 0..TILE {
            for k in 0..TILE {
                acc.0[i * TILE + j] += a.0[i * TILE + k] * b.0[k * TILE + j];
            }
        }
    }
}

/// Matrix multiply: C[M,N] = A[M,K] @ B[K,N]
///
/// Tiles the computation into 4x4 blocks.
pub fn matmul(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    let tiles_m = m.div_ceil(TILE);
    let tiles_n = n.div_ceil(TILE);
    let tiles_k = k.div_ceil(TILE);

    for ti in 0..tiles_m {
        for tj in 0..tiles_n {
            let mut acc = Tile([0.0; 16]);

            for tk in 0..tiles_k {
                let mut a_tile = Tile([0.0; 16]);
                let mut b_tile = Tile([0.0; 16]);

                load_tile(a, k, ti * TILE, tk * TILE, m, &mut a_tile);
                load_tile(b, n, tk * TILE, tj * TILE, k, &mut b_tile);

                mul_acc(&a_tile, &b_tile, &mut acc);
            }

            store_tile(&acc, c, n, ti * TILE, tj * TILE, m);
        }
    }
}
