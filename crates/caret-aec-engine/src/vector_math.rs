//! Scalar vector kernels used in the per-sample hot loops.

/// Sum of `a[i] * b[i]`.
#[inline]
pub(crate) fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Sum of squares.
#[inline]
pub(crate) fn energy(x: &[f32]) -> f32 {
    x.iter().map(|v| v * v).sum()
}

/// `y[i] += alpha * x[i]`.
#[inline]
pub(crate) fn scaled_accumulate(alpha: f32, x: &[f32], y: &mut [f32]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * xi;
    }
}

/// Echo estimate and reference energy in one pass over the window.
#[inline]
pub(crate) fn filter_and_energy(h: &[f32], x: &[f32]) -> (f32, f32) {
    debug_assert_eq!(h.len(), x.len());
    let mut s = 0.0f32;
    let mut x2 = 0.0f32;
    for (&hk, &xk) in h.iter().zip(x.iter()) {
        s += hk * xk;
        x2 += xk * xk;
    }
    (s, x2)
}
