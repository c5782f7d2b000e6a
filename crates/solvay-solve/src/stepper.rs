//! Explicit Runge–Kutta step kernels.
//!
//! Fixed-step Euler and classical RK4 for stochastic-adjacent and testing
//! use, plus the embedded Dormand–Prince 5(4) pair that drives adaptive
//! deterministic integration.
//!
//! Refs: Dormand & Prince, J. Comp. Appl. Math. 6 (1980);
//! Press et al., "Numerical Recipes" (2007), §17.2.

use crate::ode::OdeState;

/// One explicit Euler step: y + h·f(t, y).
pub(crate) fn euler_step<S, F>(f: &F, t: f64, y: &S, h: f64) -> S
where
    S: OdeState,
    F: Fn(f64, &S) -> S,
{
    let mut out = y.clone();
    out.add_scaled(h, &f(t, y));
    out
}

/// One classical RK4 step.
pub(crate) fn rk4_step<S, F>(f: &F, t: f64, y: &S, h: f64) -> S
where
    S: OdeState,
    F: Fn(f64, &S) -> S,
{
    let k1 = f(t, y);

    let mut y2 = y.clone();
    y2.add_scaled(0.5 * h, &k1);
    let k2 = f(t + 0.5 * h, &y2);

    let mut y3 = y.clone();
    y3.add_scaled(0.5 * h, &k2);
    let k3 = f(t + 0.5 * h, &y3);

    let mut y4 = y.clone();
    y4.add_scaled(h, &k3);
    let k4 = f(t + h, &y4);

    let mut out = y.clone();
    out.add_scaled(h / 6.0, &k1);
    out.add_scaled(h / 3.0, &k2);
    out.add_scaled(h / 3.0, &k3);
    out.add_scaled(h / 6.0, &k4);
    out
}

/// Dormand–Prince 5(4) embedded pair.
///
/// Produces the 5th-order solution and the scaled norm of the difference
/// against the embedded 4th-order estimate; the caller accepts the step
/// iff the norm is ≤ 1.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Dopri5 {
    pub atol: f64,
    pub rtol: f64,
}

// Butcher tableau.
const C: [f64; 6] = [0.2, 0.3, 0.8, 8.0 / 9.0, 1.0, 1.0];
const A2: [f64; 1] = [0.2];
const A3: [f64; 2] = [3.0 / 40.0, 9.0 / 40.0];
const A4: [f64; 3] = [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0];
const A5: [f64; 4] = [19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0];
const A6: [f64; 5] = [
    9017.0 / 3168.0,
    -355.0 / 33.0,
    46732.0 / 5247.0,
    49.0 / 176.0,
    -5103.0 / 18656.0,
];
/// 5th-order weights (also the last tableau row, making k7 = f(t+h, y5)).
const B5: [f64; 6] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
];
/// Difference between the 5th- and embedded 4th-order weights.
const E: [f64; 7] = [
    35.0 / 384.0 - 5179.0 / 57600.0,
    0.0,
    500.0 / 1113.0 - 7571.0 / 16695.0,
    125.0 / 192.0 - 393.0 / 640.0,
    -2187.0 / 6784.0 + 92097.0 / 339200.0,
    11.0 / 84.0 - 187.0 / 2100.0,
    -1.0 / 40.0,
];

impl Dopri5 {
    /// Attempt one step of size `h`; returns the candidate state and its
    /// scaled error norm. Never mutates `y`.
    pub fn step<S, F>(&self, f: &F, t: f64, y: &S, h: f64) -> (S, f64)
    where
        S: OdeState,
        F: Fn(f64, &S) -> S,
    {
        let k1 = f(t, y);

        let mut ys = y.clone();
        ys.add_scaled(h * A2[0], &k1);
        let k2 = f(t + C[0] * h, &ys);

        let mut ys = y.clone();
        ys.add_scaled(h * A3[0], &k1);
        ys.add_scaled(h * A3[1], &k2);
        let k3 = f(t + C[1] * h, &ys);

        let mut ys = y.clone();
        ys.add_scaled(h * A4[0], &k1);
        ys.add_scaled(h * A4[1], &k2);
        ys.add_scaled(h * A4[2], &k3);
        let k4 = f(t + C[2] * h, &ys);

        let mut ys = y.clone();
        ys.add_scaled(h * A5[0], &k1);
        ys.add_scaled(h * A5[1], &k2);
        ys.add_scaled(h * A5[2], &k3);
        ys.add_scaled(h * A5[3], &k4);
        let k5 = f(t + C[3] * h, &ys);

        let mut ys = y.clone();
        ys.add_scaled(h * A6[0], &k1);
        ys.add_scaled(h * A6[1], &k2);
        ys.add_scaled(h * A6[2], &k3);
        ys.add_scaled(h * A6[3], &k4);
        ys.add_scaled(h * A6[4], &k5);
        let k6 = f(t + C[4] * h, &ys);

        let ks = [&k1, &k2, &k3, &k4, &k5, &k6];

        let mut y5 = y.clone();
        for (b, k) in B5.iter().zip(ks.iter()) {
            if *b != 0.0 {
                y5.add_scaled(h * b, k);
            }
        }

        let k7 = f(t + h, &y5);

        let mut err = y.zeros_like();
        for (e, k) in E[..6].iter().zip(ks.iter()) {
            if *e != 0.0 {
                err.add_scaled(h * e, k);
            }
        }
        err.add_scaled(h * E[6], &k7);

        let norm = y.error_norm(&y5, &err, self.atol, self.rtol);
        (y5, norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use num_complex::Complex64;

    // dy/dt = -y, y(0) = 1, exact y(t) = e^{-t}
    fn decay(_t: f64, y: &Array3<Complex64>) -> Array3<Complex64> {
        y.mapv(|z| -z)
    }

    fn one() -> Array3<Complex64> {
        Array3::from_elem((1, 1, 1), Complex64::new(1.0, 0.0))
    }

    #[test]
    fn euler_is_first_order() {
        let h = 1e-3;
        let mut y = one();
        let mut t = 0.0;
        for _ in 0..1000 {
            y = euler_step(&decay, t, &y, h);
            t += h;
        }
        let exact = (-1.0_f64).exp();
        assert!((y[[0, 0, 0]].re - exact).abs() < 1e-3);
    }

    #[test]
    fn rk4_beats_euler() {
        let h = 1e-2;
        let mut y = one();
        let mut t = 0.0;
        for _ in 0..100 {
            y = rk4_step(&decay, t, &y, h);
            t += h;
        }
        let exact = (-1.0_f64).exp();
        assert!((y[[0, 0, 0]].re - exact).abs() < 1e-9);
    }

    #[test]
    fn dopri5_single_step_accuracy() {
        let dp = Dopri5 {
            atol: 1e-10,
            rtol: 1e-10,
        };
        let (y, _norm) = dp.step(&decay, 0.0, &one(), 0.1);
        let exact = (-0.1_f64).exp();
        assert!((y[[0, 0, 0]].re - exact).abs() < 1e-9);
    }

    #[test]
    fn dopri5_error_norm_grows_with_step() {
        let dp = Dopri5 {
            atol: 1e-12,
            rtol: 1e-12,
        };
        let (_, small) = dp.step(&decay, 0.0, &one(), 0.01);
        let (_, large) = dp.step(&decay, 0.0, &one(), 0.5);
        assert!(large > small);
    }
}
