//! Small strided GEMM used by the batched dense layer.
//!
//! `c = alpha * a * b + beta * c`, with `a: (m, k)`, `b: (k, n)`, `c: (m, n)` given
//! as flat buffers plus row/column strides. Transposes are expressed by swapping
//! strides, so the dense layer never materializes `W^T`.
//!
//! - default: a safe triple loop
//! - feature `matrixmultiply`: delegates to `matrixmultiply::sgemm`
//!
//! When `beta == 0.0`, `c` is written without being read.

#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn gemm_f32(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    rsa: usize,
    csa: usize,
    b: &[f32],
    rsb: usize,
    csb: usize,
    beta: f32,
    c: &mut [f32],
    rsc: usize,
    csc: usize,
) {
    debug_assert!(m > 0 && n > 0 && k > 0);
    debug_assert!((m - 1) * rsa + (k - 1) * csa < a.len());
    debug_assert!((k - 1) * rsb + (n - 1) * csb < b.len());
    debug_assert!((m - 1) * rsc + (n - 1) * csc < c.len());

    #[cfg(feature = "matrixmultiply")]
    {
        // SAFETY: the debug assertions above describe the index bounds; callers in
        // `layer.rs` size every buffer from the same (m, n, k).
        unsafe {
            matrixmultiply::sgemm(
                m,
                k,
                n,
                alpha,
                a.as_ptr(),
                rsa as isize,
                csa as isize,
                b.as_ptr(),
                rsb as isize,
                csb as isize,
                beta,
                c.as_mut_ptr(),
                rsc as isize,
                csc as isize,
            );
        }
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0_f32;
            let a0 = i * rsa;
            let b0 = j * csb;

            for p in 0..k {
                let av = a[a0 + p * csa];
                let bv = b[p * rsb + b0];
                acc = av.mul_add(bv, acc);
            }

            let idx = i * rsc + j * csc;
            c[idx] = if beta == 0.0 {
                alpha * acc
            } else {
                alpha * acc + beta * c[idx]
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplies_with_transposed_strides() {
        // a: 2x3, b = a^T: 3x2 via swapped strides.
        let a = [1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut c = [f32::NAN; 4];
        gemm_f32(2, 2, 3, 1.0, &a, 3, 1, &a, 1, 3, 0.0, &mut c, 2, 1);
        assert_eq!(c, [14.0, 32.0, 32.0, 77.0]);
    }

    #[test]
    fn beta_accumulates_into_c() {
        let a = [1.0_f32, 1.0];
        let b = [2.0_f32, 3.0];
        let mut c = [10.0_f32];
        gemm_f32(1, 1, 2, 0.5, &a, 2, 1, &b, 1, 1, 1.0, &mut c, 1, 1);
        assert_eq!(c, [12.5]);
    }
}
