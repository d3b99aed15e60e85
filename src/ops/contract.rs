//! Tensor contraction along one axis.
//!
//! Contracts `u` of shape `[a, b, c]` with a 1-D matrix `t` into `v` of shape
//! `[a, j, c]`:
//!
//! ```text
//! v[a, j, c] (+)= sum_b t[j, b] * u[a, b, c]
//! ```
//!
//! `t` is stored `j x b` for [`TransposeMode::NoTranspose`]. For
//! [`TransposeMode::Transpose`] the same `q x p` matrix is read as its
//! transpose by swapping the strides, so interpolation and its adjoint share
//! this one loop.

use crate::memory::Scalar;
use crate::restriction::TransposeMode;

/// Contracts `u` (`[a, b, c]`) with `t` into `v` (`[a, j, c]`).
///
/// When `add` is false `v` is overwritten, otherwise accumulated into.
#[allow(clippy::too_many_arguments, clippy::many_single_char_names)]
pub fn tensor_contract(
    a: usize,
    b: usize,
    c: usize,
    j: usize,
    t: &[Scalar],
    tmode: TransposeMode,
    add: bool,
    u: &[Scalar],
    v: &mut [Scalar],
) {
    let (tstride0, tstride1) = match tmode {
        TransposeMode::NoTranspose => (b, 1),
        TransposeMode::Transpose => (1, j),
    };
    debug_assert!(t.len() >= j * b);
    debug_assert!(u.len() >= a * b * c);
    debug_assert!(v.len() >= a * j * c);

    let v = &mut v[..a * j * c];
    if !add {
        v.fill(0.0);
    }
    for ai in 0..a {
        for ji in 0..j {
            let out = &mut v[(ai * j + ji) * c..(ai * j + ji + 1) * c];
            for bi in 0..b {
                let tq = t[ji * tstride0 + bi * tstride1];
                let inp = &u[(ai * b + bi) * c..(ai * b + bi + 1) * c];
                for (o, x) in out.iter_mut().zip(inp) {
                    *o += tq * x;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_matrix_copies_input() {
        let t = [1.0, 0.0, 0.0, 1.0];
        let u: Vec<Scalar> = (0..12).map(f64::from).collect();
        let mut v = vec![0.0; 12];
        tensor_contract(3, 2, 2, 2, &t, TransposeMode::NoTranspose, false, &u, &mut v);
        assert_eq!(u, v);
    }

    #[test]
    fn transpose_reads_matrix_columns() {
        // t is 3 x 2 (q x p)
        let t = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let u = [1.0, 1.0];
        let mut forward = [0.0; 3];
        tensor_contract(1, 2, 1, 3, &t, TransposeMode::NoTranspose, false, &u, &mut forward);
        assert_eq!(forward, [3.0, 7.0, 11.0]);

        let w = [1.0, 0.0, 1.0];
        let mut back = [0.0; 2];
        tensor_contract(1, 3, 1, 2, &t, TransposeMode::Transpose, false, &w, &mut back);
        assert_eq!(back, [6.0, 8.0]);
    }

    #[test]
    fn add_accumulates() {
        let t = [2.0];
        let mut v = [1.0, 1.0];
        tensor_contract(2, 1, 1, 1, &t, TransposeMode::NoTranspose, true, &[3.0, 4.0], &mut v);
        assert_eq!(v, [7.0, 9.0]);
    }
}
