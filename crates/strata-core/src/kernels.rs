// Primitive kernels — vector and matrix building blocks
//
// Every higher-level kernel (forward, backward, optimizers) is composed of
// these. They follow one convention:
//
//   - shapes are explicit arguments; nothing is inferred or broadcast
//   - results go into a caller-supplied buffer; nothing allocates
//   - matrices are row-major, `m[r * cols + c]`
//
// The compilers derive every dimension from the memory layout, so a shape
// mismatch here is a compiler bug. We only check it in debug builds.
//
// Orientation used throughout:
//
//   vec_mat_mul(u[rows], M[rows x cols])             -> out[cols]    (u M)
//   vec_mat_mul_transposed(u[cols], M[rows x cols])  -> out[rows]    (u Mᵗ)
//
// so an edge weight [src x dst] maps a source value forward with
// `vec_mat_mul` and a destination error backward with
// `vec_mat_mul_transposed`.

/// A per-element transform, e.g. an activation function bound to its
/// parameters.
pub type ElementFn = fn(f64, &[f64]) -> f64;

/// `out = u`
pub fn vec_copy(u: &[f64], dim: usize, out: &mut [f64]) {
    debug_assert!(u.len() >= dim && out.len() >= dim);
    out[..dim].copy_from_slice(&u[..dim]);
}

/// `out = u + v`
pub fn vec_add(u: &[f64], v: &[f64], dim: usize, out: &mut [f64]) {
    debug_assert!(u.len() >= dim && v.len() >= dim && out.len() >= dim);
    for i in 0..dim {
        out[i] = u[i] + v[i];
    }
}

/// `acc += v`
pub fn vec_add_assign(acc: &mut [f64], v: &[f64], dim: usize) {
    debug_assert!(acc.len() >= dim && v.len() >= dim);
    for i in 0..dim {
        acc[i] += v[i];
    }
}

/// `out = u - v`
pub fn vec_sub(u: &[f64], v: &[f64], dim: usize, out: &mut [f64]) {
    debug_assert!(u.len() >= dim && v.len() >= dim && out.len() >= dim);
    for i in 0..dim {
        out[i] = u[i] - v[i];
    }
}

/// `out = u ⊙ v`
pub fn vec_hadamard(u: &[f64], v: &[f64], dim: usize, out: &mut [f64]) {
    debug_assert!(u.len() >= dim && v.len() >= dim && out.len() >= dim);
    for i in 0..dim {
        out[i] = u[i] * v[i];
    }
}

/// `acc ⊙= v`
pub fn vec_hadamard_assign(acc: &mut [f64], v: &[f64], dim: usize) {
    debug_assert!(acc.len() >= dim && v.len() >= dim);
    for i in 0..dim {
        acc[i] *= v[i];
    }
}

/// `out = s * u`
pub fn vec_scalar_mul(u: &[f64], s: f64, dim: usize, out: &mut [f64]) {
    debug_assert!(u.len() >= dim && out.len() >= dim);
    for i in 0..dim {
        out[i] = u[i] * s;
    }
}

/// `out[i] = f(x[i], params)`
pub fn vec_map(f: ElementFn, params: &[f64], x: &[f64], dim: usize, out: &mut [f64]) {
    debug_assert!(x.len() >= dim && out.len() >= dim);
    for i in 0..dim {
        out[i] = f(x[i], params);
    }
}

/// `out = a + b` for `[rows x cols]` matrices.
pub fn mat_add(a: &[f64], b: &[f64], rows: usize, cols: usize, out: &mut [f64]) {
    vec_add(a, b, rows * cols, out);
}

/// `out = a - b` for `[rows x cols]` matrices.
pub fn mat_sub(a: &[f64], b: &[f64], rows: usize, cols: usize, out: &mut [f64]) {
    vec_sub(a, b, rows * cols, out);
}

/// `out = a ⊙ b` for `[rows x cols]` matrices.
pub fn mat_hadamard(a: &[f64], b: &[f64], rows: usize, cols: usize, out: &mut [f64]) {
    vec_hadamard(a, b, rows * cols, out);
}

/// `out = s * a` for a `[rows x cols]` matrix.
pub fn mat_scalar_mul(a: &[f64], s: f64, rows: usize, cols: usize, out: &mut [f64]) {
    vec_scalar_mul(a, s, rows * cols, out);
}

/// Row vector times matrix: `out[c] = Σ_r u[r] * m[r][c]`.
pub fn vec_mat_mul(u: &[f64], m: &[f64], rows: usize, cols: usize, out: &mut [f64]) {
    debug_assert!(u.len() >= rows && m.len() >= rows * cols && out.len() >= cols);
    for c in 0..cols {
        out[c] = 0.0;
    }
    for r in 0..rows {
        let ur = u[r];
        let row = &m[r * cols..(r + 1) * cols];
        for c in 0..cols {
            out[c] += ur * row[c];
        }
    }
}

/// Row vector times transposed matrix: `out[r] = Σ_c u[c] * m[r][c]`.
pub fn vec_mat_mul_transposed(u: &[f64], m: &[f64], rows: usize, cols: usize, out: &mut [f64]) {
    debug_assert!(u.len() >= cols && m.len() >= rows * cols && out.len() >= rows);
    for r in 0..rows {
        let row = &m[r * cols..(r + 1) * cols];
        let mut sum = 0.0;
        for c in 0..cols {
            sum += u[c] * row[c];
        }
        out[r] = sum;
    }
}

/// `m[r][c] += u[r] * v[c]` (outer product accumulation).
pub fn outer_product_accumulate(u: &[f64], v: &[f64], rows: usize, cols: usize, m: &mut [f64]) {
    debug_assert!(u.len() >= rows && v.len() >= cols && m.len() >= rows * cols);
    for r in 0..rows {
        let ur = u[r];
        let row = &mut m[r * cols..(r + 1) * cols];
        for c in 0..cols {
            row[c] += ur * v[c];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // M = [[1, 2, 3],
    //      [4, 5, 6]]
    const M: [f64; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

    #[test]
    fn test_vec_mat_mul() {
        let mut out = [0.0; 3];
        vec_mat_mul(&[1.0, 2.0], &M, 2, 3, &mut out);
        assert_eq!(out, [9.0, 12.0, 15.0]);
    }

    #[test]
    fn test_vec_mat_mul_overwrites_output() {
        let mut out = [100.0; 3];
        vec_mat_mul(&[1.0, 0.0], &M, 2, 3, &mut out);
        assert_eq!(out, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_vec_mat_mul_transposed() {
        let mut out = [0.0; 2];
        vec_mat_mul_transposed(&[1.0, 0.0, -1.0], &M, 2, 3, &mut out);
        assert_eq!(out, [-2.0, -2.0]);
    }

    #[test]
    fn test_transposed_is_adjoint() {
        // <u M, v> == <u, v Mᵗ>
        let u = [0.5, -1.5];
        let v = [2.0, 1.0, -3.0];
        let mut um = [0.0; 3];
        let mut vmt = [0.0; 2];
        vec_mat_mul(&u, &M, 2, 3, &mut um);
        vec_mat_mul_transposed(&v, &M, 2, 3, &mut vmt);
        let lhs: f64 = um.iter().zip(&v).map(|(a, b)| a * b).sum();
        let rhs: f64 = u.iter().zip(&vmt).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs).abs() < 1e-12);
    }

    #[test]
    fn test_elementwise() {
        let u = [1.0, 2.0, 3.0];
        let v = [4.0, 5.0, 6.0];
        let mut out = [0.0; 3];

        vec_add(&u, &v, 3, &mut out);
        assert_eq!(out, [5.0, 7.0, 9.0]);
        vec_sub(&u, &v, 3, &mut out);
        assert_eq!(out, [-3.0, -3.0, -3.0]);
        vec_hadamard(&u, &v, 3, &mut out);
        assert_eq!(out, [4.0, 10.0, 18.0]);
        vec_scalar_mul(&u, 2.0, 3, &mut out);
        assert_eq!(out, [2.0, 4.0, 6.0]);
        vec_copy(&v, 3, &mut out);
        assert_eq!(out, v);

        let mut acc = [1.0, 1.0, 1.0];
        vec_add_assign(&mut acc, &u, 3);
        assert_eq!(acc, [2.0, 3.0, 4.0]);
        vec_hadamard_assign(&mut acc, &u, 3);
        assert_eq!(acc, [2.0, 6.0, 12.0]);
    }

    #[test]
    fn test_matrix_elementwise() {
        let mut out = [0.0; 6];
        mat_add(&M, &M, 2, 3, &mut out);
        assert_eq!(out, [2.0, 4.0, 6.0, 8.0, 10.0, 12.0]);
        mat_sub(&M, &M, 2, 3, &mut out);
        assert_eq!(out, [0.0; 6]);
        mat_hadamard(&M, &M, 2, 3, &mut out);
        assert_eq!(out, [1.0, 4.0, 9.0, 16.0, 25.0, 36.0]);
        mat_scalar_mul(&M, -1.0, 2, 3, &mut out);
        assert_eq!(out, [-1.0, -2.0, -3.0, -4.0, -5.0, -6.0]);
    }

    #[test]
    fn test_outer_product_accumulate() {
        let mut m = [1.0; 6];
        outer_product_accumulate(&[1.0, 2.0], &[1.0, 0.0, -1.0], 2, 3, &mut m);
        assert_eq!(m, [2.0, 1.0, 0.0, 3.0, 1.0, -1.0]);
    }

    #[test]
    fn test_vec_map() {
        fn affine(x: f64, p: &[f64]) -> f64 {
            p[0] * x + p[1]
        }
        let mut out = [0.0; 3];
        vec_map(affine, &[2.0, 1.0], &[0.0, 1.0, 2.0], 3, &mut out);
        assert_eq!(out, [1.0, 3.0, 5.0]);
    }
}
