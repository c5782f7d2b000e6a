//! Vector-space abstraction over integrable states.
//!
//! The steppers are generic over [`OdeState`] so that a plain batched
//! state tensor and the augmented tensors used by the gradient engines
//! (state + sensitivities, or state + adjoints + gradient accumulators)
//! all flow through the same integration kernels.

use ndarray::{Array3, Axis};
use num_complex::Complex64;

/// Minimal vector-space interface the Runge–Kutta kernels need.
pub(crate) trait OdeState: Clone {
    /// A zero element of the same shape.
    fn zeros_like(&self) -> Self;

    /// `self += c · other`.
    fn add_scaled(&mut self, c: f64, other: &Self);

    /// Scaled error norm of `err` against `self` (the pre-step state) and
    /// `y_new` (the candidate): worst case over batch lanes of
    /// `rms(|e| / (atol + rtol · max(|y|, |y_new|)))`. A step is accepted
    /// iff this is ≤ 1.
    fn error_norm(&self, y_new: &Self, err: &Self, atol: f64, rtol: f64) -> f64;

    /// True if every component is finite.
    fn all_finite(&self) -> bool;
}

/// Worst case over batch lanes of the scaled RMS error of one tensor.
pub(crate) fn tensor_error_norm(
    y: &Array3<Complex64>,
    y_new: &Array3<Complex64>,
    err: &Array3<Complex64>,
    atol: f64,
    rtol: f64,
) -> f64 {
    let lanes = y.len_of(Axis(0));
    let mut worst = 0.0_f64;
    for i in 0..lanes {
        let yi = y.index_axis(Axis(0), i);
        let ni = y_new.index_axis(Axis(0), i);
        let ei = err.index_axis(Axis(0), i);
        let mut sum = 0.0;
        let mut count = 0usize;
        for ((a, b), e) in yi.iter().zip(ni.iter()).zip(ei.iter()) {
            let scale = atol + rtol * a.norm().max(b.norm());
            let r = e.norm() / scale;
            sum += r * r;
            count += 1;
        }
        let rms = (sum / count as f64).sqrt();
        worst = worst.max(rms);
    }
    worst
}

impl OdeState for Array3<Complex64> {
    fn zeros_like(&self) -> Self {
        Array3::zeros(self.raw_dim())
    }

    fn add_scaled(&mut self, c: f64, other: &Self) {
        self.scaled_add(Complex64::new(c, 0.0), other);
    }

    fn error_norm(&self, y_new: &Self, err: &Self, atol: f64, rtol: f64) -> f64 {
        tensor_error_norm(self, y_new, err, atol, rtol)
    }

    fn all_finite(&self) -> bool {
        solvay_core::linalg::all_finite(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(v: f64) -> Array3<Complex64> {
        Array3::from_elem((2, 2, 1), Complex64::new(v, 0.0))
    }

    #[test]
    fn add_scaled_accumulates() {
        let mut y = filled(1.0);
        y.add_scaled(0.5, &filled(2.0));
        assert!((y[[0, 0, 0]].re - 2.0).abs() < 1e-12);
    }

    #[test]
    fn error_norm_scales_with_tolerance() {
        let y = filled(1.0);
        let e = filled(1e-6);
        let tight = y.error_norm(&y, &e, 1e-9, 1e-9);
        let loose = y.error_norm(&y, &e, 1e-3, 1e-3);
        assert!(tight > 1.0);
        assert!(loose < 1.0);
    }

    #[test]
    fn error_norm_takes_worst_lane() {
        let y = filled(1.0);
        let mut e = filled(0.0);
        // one bad lane dominates
        e[[1, 0, 0]] = Complex64::new(1.0, 0.0);
        let norm = y.error_norm(&y, &e, 1e-6, 1e-6);
        assert!(norm > 1e4);
    }
}
