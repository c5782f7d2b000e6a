//! Gradients of final-time expectation values.
//!
//! Both engines exploit the linearity of the evolution equations.
//!
//! Forward sensitivity carries one tangent tensor σ_p per parameter
//! through the forward pass, obeying dσ_p/dt = f(t, σ_p) + ∂f/∂θ_p(y),
//! and contracts the tangents against the terminal adjoint seeds.
//!
//! The adjoint method re-integrates the state backward from the final
//! time alongside one adjoint tensor per observable, accumulating
//! dg/dθ_p = ∫ w · Re⟨λ(t), ∂f/∂θ_p(y(t))⟩ dt on the way. Memory stays
//! O(n_observables) in the trajectory length at the cost of a second
//! pass; the backward state matches the forward one only to the solver
//! tolerance.
//!
//! Ref: Pontryagin et al. (1962); Chen et al., "Neural Ordinary
//! Differential Equations" (2018), adjoint appendix.

use ndarray::{Array2, Array3, Axis};
use num_complex::Complex64;

use solvay_core::TimeOperator;

use crate::equation::Equation;
use crate::error::SolveError;
use crate::integrate::{StepStats, run_method};
use crate::ode::{OdeState, tensor_error_norm};
use crate::options::{Method, Options};
use crate::progress::Progress;

/// Derivatives of the system operators with respect to one scalar
/// parameter. `None` entries mean the operator does not depend on it.
#[derive(Clone, Debug)]
pub struct Parameter {
    /// ∂H/∂θ.
    pub dh: Option<TimeOperator>,
    /// ∂L_k/∂θ, one entry per jump operator.
    pub dl: Vec<Option<TimeOperator>>,
}

/// The declared parameters of a solve, in gradient-output order.
#[derive(Clone, Debug, Default)]
pub struct Parameters(pub Vec<Parameter>);

impl Parameters {
    /// Number of declared parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no parameters are declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Augmented integration state
// ---------------------------------------------------------------------------

/// State tensor bundled with per-parameter tangents (sensitivity) or
/// per-observable adjoints plus gradient accumulators (adjoint).
#[derive(Clone)]
struct Augmented {
    y: Array3<Complex64>,
    extras: Vec<Array3<Complex64>>,
    grads: Array3<f64>,
}

impl OdeState for Augmented {
    fn zeros_like(&self) -> Self {
        Self {
            y: Array3::zeros(self.y.raw_dim()),
            extras: self
                .extras
                .iter()
                .map(|e| Array3::zeros(e.raw_dim()))
                .collect(),
            grads: Array3::zeros(self.grads.raw_dim()),
        }
    }

    fn add_scaled(&mut self, c: f64, other: &Self) {
        self.y.scaled_add(Complex64::new(c, 0.0), &other.y);
        for (e, o) in self.extras.iter_mut().zip(other.extras.iter()) {
            e.scaled_add(Complex64::new(c, 0.0), o);
        }
        self.grads.scaled_add(c, &other.grads);
    }

    fn error_norm(&self, y_new: &Self, err: &Self, atol: f64, rtol: f64) -> f64 {
        // Step control watches the state and the auxiliary tensors; the
        // gradient accumulators ride along.
        let mut worst = tensor_error_norm(&self.y, &y_new.y, &err.y, atol, rtol);
        for ((e, n), r) in self
            .extras
            .iter()
            .zip(y_new.extras.iter())
            .zip(err.extras.iter())
        {
            worst = worst.max(tensor_error_norm(e, n, r, atol, rtol));
        }
        worst
    }

    fn all_finite(&self) -> bool {
        solvay_core::linalg::all_finite(&self.y)
            && self.extras.iter().all(solvay_core::linalg::all_finite)
            && self.grads.iter().all(|v| v.is_finite())
    }
}

/// `w · Re⟨a, b⟩` per batch lane under the Hilbert–Schmidt inner product.
fn lane_re_inner(a: &Array3<Complex64>, b: &Array3<Complex64>, weight: f64) -> Vec<f64> {
    let lanes = a.len_of(Axis(0));
    (0..lanes)
        .map(|i| {
            let ai = a.index_axis(Axis(0), i);
            let bi = b.index_axis(Axis(0), i);
            let s: Complex64 = ai.iter().zip(bi.iter()).map(|(x, y)| x.conj() * y).sum();
            weight * s.re
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Forward sensitivity
// ---------------------------------------------------------------------------

/// Run the forward pass with per-parameter tangents and return the final
/// state, the gradient tensor `(batch, n_observables, n_params)` and the
/// step statistics. `on_save` receives the state component at every save
/// time.
pub(crate) fn run_sensitivity<E, C>(
    eq: &E,
    y0: Array3<Complex64>,
    t0: f64,
    tsave: &[f64],
    params: &Parameters,
    observables: &[Array2<Complex64>],
    method: &Method,
    opts: &Options,
    observer: &mut dyn Progress,
    on_save: &mut C,
) -> Result<(Array3<Complex64>, Array3<f64>, StepStats), SolveError>
where
    E: Equation,
    C: FnMut(usize, f64, &Array3<Complex64>),
{
    let batch = y0.len_of(Axis(0));
    let init = Augmented {
        extras: params
            .0
            .iter()
            .map(|_| Array3::zeros(y0.raw_dim()))
            .collect(),
        grads: Array3::zeros((0, 0, 0)),
        y: y0,
    };

    let f = |t: f64, s: &Augmented| Augmented {
        y: eq.rhs(t, &s.y),
        extras: params
            .0
            .iter()
            .zip(s.extras.iter())
            .map(|(p, sigma)| {
                let mut d = eq.rhs(t, sigma);
                d += &eq.param_rhs(t, &s.y, p);
                d
            })
            .collect(),
        grads: Array3::zeros((0, 0, 0)),
    };
    let project = |s: &mut Augmented| {
        eq.project(&mut s.y);
        // Tangents live in the same Hermitian subspace as the state.
        for e in s.extras.iter_mut() {
            eq.project(e);
        }
    };

    let (final_aug, stats) = run_method(
        method,
        &f,
        &project,
        init,
        t0,
        tsave,
        opts,
        observer,
        &mut |idx, t, s: &Augmented| on_save(idx, t, &s.y),
    )
    .map_err(wrap_gradient)?;

    let weight = eq.grad_weight();
    let mut grads = Array3::zeros((batch, observables.len(), params.len()));
    for (j, obs) in observables.iter().enumerate() {
        let seed = eq.adjoint_seed(&obs.view(), &final_aug.y);
        for (p, sigma) in final_aug.extras.iter().enumerate() {
            for (b, v) in lane_re_inner(&seed, sigma, weight).into_iter().enumerate() {
                grads[[b, j, p]] = v;
            }
        }
    }

    Ok((final_aug.y, grads, stats))
}

// ---------------------------------------------------------------------------
// Adjoint state method
// ---------------------------------------------------------------------------

/// Re-integrate backward from the final state and return the gradient
/// tensor `(batch, n_observables, n_params)` with the backward-pass step
/// statistics.
pub(crate) fn run_adjoint<E>(
    eq: &E,
    y_final: &Array3<Complex64>,
    t0: f64,
    tf: f64,
    params: &Parameters,
    observables: &[Array2<Complex64>],
    method: &Method,
    opts: &Options,
    observer: &mut dyn Progress,
) -> Result<(Array3<f64>, StepStats), SolveError>
where
    E: Equation,
{
    let batch = y_final.len_of(Axis(0));
    let n_obs = observables.len();
    let n_params = params.len();

    let seeds: Vec<Array3<Complex64>> = observables
        .iter()
        .map(|obs| eq.adjoint_seed(&obs.view(), y_final))
        .collect();
    let init = Augmented {
        y: y_final.clone(),
        extras: seeds,
        grads: Array3::zeros((batch, n_obs, n_params)),
    };

    let weight = eq.grad_weight();
    // Backward pass in τ = tf − t: the state runs in reverse, the
    // adjoints obey the negated Heisenberg-picture generator, and the
    // accumulators pick up the integrand at forward time tf − τ.
    let f = |tau: f64, s: &Augmented| {
        let t = tf - tau;
        let dy = eq.rhs(t, &s.y).mapv(|z| -z);
        let dlambda: Vec<Array3<Complex64>> = s
            .extras
            .iter()
            .map(|l| eq.adjoint_rhs(t, l).mapv(|z| -z))
            .collect();
        let mut dgrads = Array3::zeros((batch, n_obs, n_params));
        for (p, param) in params.0.iter().enumerate() {
            let pr = eq.param_rhs(t, &s.y, param);
            for (j, lambda) in s.extras.iter().enumerate() {
                for (b, v) in lane_re_inner(lambda, &pr, weight).into_iter().enumerate() {
                    dgrads[[b, j, p]] = v;
                }
            }
        }
        Augmented {
            y: dy,
            extras: dlambda,
            grads: dgrads,
        }
    };
    let project = |s: &mut Augmented| {
        eq.project(&mut s.y);
        for l in s.extras.iter_mut() {
            eq.project(l);
        }
    };

    let (final_aug, stats) = run_method(
        method,
        &f,
        &project,
        init,
        0.0,
        &[tf - t0],
        opts,
        observer,
        &mut |_, _, _: &Augmented| {},
    )
    .map_err(wrap_gradient)?;

    Ok((final_aug.grads, stats))
}

fn wrap_gradient(e: SolveError) -> SolveError {
    match e {
        e @ SolveError::Validation(_) => e,
        other => SolveError::Gradient(Box::new(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation::Schrodinger;
    use crate::progress::NullProgress;
    use approx::assert_relative_eq;
    use solvay_core::ops;

    fn rabi_setup(theta: f64) -> (Schrodinger, Parameters, Vec<Array2<Complex64>>) {
        // H(θ) = (θ/2) σx, g(θ) = ⟨σz⟩(T) = cos(θT), dg/dθ = −T sin(θT).
        let h = ops::sigmax().mapv(|z| z * (theta / 2.0));
        let dh = ops::sigmax().mapv(|z| z * 0.5);
        let eq = Schrodinger {
            h: TimeOperator::constant(h).unwrap(),
        };
        let params = Parameters(vec![Parameter {
            dh: Some(TimeOperator::constant(dh).unwrap()),
            dl: vec![],
        }]);
        (eq, params, vec![ops::sigmaz()])
    }

    fn ground_ket() -> Array3<Complex64> {
        ops::fock(2, 0)
            .unwrap()
            .into_shape_with_order((1, 2, 1))
            .unwrap()
    }

    #[test]
    fn sensitivity_matches_analytic_rabi_gradient() {
        let theta = 1.3;
        let tf = 0.8;
        let (eq, params, obs) = rabi_setup(theta);
        let opts = Options::default();
        let (_, grads, _) = run_sensitivity(
            &eq,
            ground_ket(),
            0.0,
            &[tf],
            &params,
            &obs,
            &Method::Dopri5,
            &opts,
            &mut NullProgress,
            &mut |_, _, _| {},
        )
        .unwrap();
        let expected = -tf * (theta * tf).sin();
        assert_relative_eq!(grads[[0, 0, 0]], expected, epsilon = 1e-5);
    }

    #[test]
    fn adjoint_agrees_with_sensitivity() {
        let theta = 0.7;
        let tf = 1.1;
        let (eq, params, obs) = rabi_setup(theta);
        let opts = Options::default();

        let (y_final, g_fwd, _) = run_sensitivity(
            &eq,
            ground_ket(),
            0.0,
            &[tf],
            &params,
            &obs,
            &Method::Dopri5,
            &opts,
            &mut NullProgress,
            &mut |_, _, _| {},
        )
        .unwrap();
        let (g_bwd, _) = run_adjoint(
            &eq,
            &y_final,
            0.0,
            tf,
            &params,
            &obs,
            &Method::Dopri5,
            &opts,
            &mut NullProgress,
        )
        .unwrap();
        assert_relative_eq!(g_fwd[[0, 0, 0]], g_bwd[[0, 0, 0]], epsilon = 1e-5);
    }

    #[test]
    fn backward_failure_is_wrapped() {
        let (eq, params, obs) = rabi_setup(1.0);
        let opts = Options {
            max_steps: 1,
            ..Options::default()
        };
        let err = run_adjoint(
            &eq,
            &ground_ket(),
            0.0,
            10.0,
            &params,
            &obs,
            &Method::Dopri5,
            &opts,
            &mut NullProgress,
        )
        .unwrap_err();
        assert!(matches!(err, SolveError::Gradient(_)));
    }
}
