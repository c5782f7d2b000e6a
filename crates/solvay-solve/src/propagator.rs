//! Exact propagation for constant generators.
//!
//! One matrix exponential per save interval instead of many small steps:
//!
//! - kets advance by ψ(t + Δt) = exp(−iH Δt) ψ(t)
//! - density matrices advance in row-major Liouville space,
//!   vec(ρ(t + Δt)) = exp(𝓛 Δt) vec(ρ(t)), with
//!   𝓛 = −i(H⊗I − I⊗Hᵀ) + Σ_k [L_k⊗L̄_k − ½((L†L)_k⊗I + I⊗(L†L)_kᵀ)]
//!
//! Uniform save grids reuse the exponential across intervals.

use ndarray::linalg::kron;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use num_complex::Complex64;

use solvay_core::linalg::{all_finite, dag};
use solvay_core::{StateKind, TimeOperator, expm};

use crate::error::SolveError;
use crate::integrate::StepStats;
use crate::progress::Progress;

/// Propagate through `tsave` with one exponential per interval, invoking
/// `on_save` at every entry. Operators must be constant — enforced by
/// validation before this point.
pub(crate) fn run_propagator<C>(
    h: &TimeOperator,
    jump_ops: &[TimeOperator],
    y0: Array3<Complex64>,
    kind: StateKind,
    t0: f64,
    tsave: &[f64],
    observer: &mut dyn Progress,
    on_save: &mut C,
) -> Result<(Array3<Complex64>, StepStats), SolveError>
where
    C: FnMut(usize, f64, &Array3<Complex64>),
{
    let batch = y0.len_of(Axis(0));
    let gens = generators(h, jump_ops, kind, t0, batch);
    let t_end = tsave[tsave.len() - 1];

    let mut y = y0;
    let mut t = t0;
    let mut stats = StepStats::default();
    let mut cached: Option<(f64, Vec<Array2<Complex64>>)> = None;

    for (idx, &target) in tsave.iter().enumerate() {
        let span = target - t;
        if span > 0.0 {
            let reuse = matches!(&cached, Some((dt, _)) if (dt - span).abs() <= 1e-12 * dt);
            if !reuse {
                let props = gens
                    .iter()
                    .map(|g| expm(&g.mapv(|z| z * span)))
                    .collect::<Result<Vec<_>, _>>()?;
                cached = Some((span, props));
            }
            if let Some((_, props)) = &cached {
                advance(&mut y, props, kind);
            }
            if !all_finite(&y) {
                return Err(SolveError::NonFiniteState { t: target });
            }
            stats.n_accepted += 1;
            observer.on_step(target, t_end, true);
        }
        t = target;
        on_save(idx, target, &y);
        observer.on_save(idx, target);
    }

    Ok((y, stats))
}

/// Apply the lane propagators in place. A single propagator broadcasts
/// over the whole batch.
fn advance(y: &mut Array3<Complex64>, props: &[Array2<Complex64>], kind: StateKind) {
    let batch = y.len_of(Axis(0));
    for b in 0..batch {
        let u = &props[if props.len() == 1 { 0 } else { b }];
        let lane = y.index_axis(Axis(0), b).to_owned();
        let next = match kind {
            StateKind::Operator => {
                let n = lane.nrows();
                let v = Array2::from_shape_fn((n * n, 1), |(k, _)| lane[[k / n, k % n]]);
                let w = u.dot(&v);
                Array2::from_shape_fn((n, n), |(i, j)| w[[i * n + j, 0]])
            }
            StateKind::Ket | StateKind::Bra => u.dot(&lane),
        };
        y.index_axis_mut(Axis(0), b).assign(&next);
    }
}

/// One generator per operator lane: −iH for kets, the Liouville-space
/// Lindbladian for density matrices. Unbatched operators yield a single
/// shared generator.
fn generators(
    h: &TimeOperator,
    jump_ops: &[TimeOperator],
    kind: StateKind,
    t0: f64,
    batch: usize,
) -> Vec<Array2<Complex64>> {
    let ht = h.eval(t0);
    let lt: Vec<Array3<Complex64>> = jump_ops.iter().map(|l| l.eval(t0)).collect();
    let op_batched =
        ht.len_of(Axis(0)) > 1 || lt.iter().any(|l| l.len_of(Axis(0)) > 1);
    let lanes = if op_batched { batch } else { 1 };

    (0..lanes)
        .map(|b| {
            let hb = lane_of(&ht, b);
            match kind {
                StateKind::Operator => {
                    let ls: Vec<ArrayView2<'_, Complex64>> =
                        lt.iter().map(|l| lane_of(l, b)).collect();
                    lindbladian(&hb, &ls)
                }
                StateKind::Ket | StateKind::Bra => hb.mapv(|z| z * Complex64::new(0.0, -1.0)),
            }
        })
        .collect()
}

fn lane_of(m: &Array3<Complex64>, b: usize) -> ArrayView2<'_, Complex64> {
    let i = if m.len_of(Axis(0)) == 1 { 0 } else { b };
    m.index_axis(Axis(0), i)
}

/// The Lindblad generator as an n² × n² matrix acting on row-major
/// vectorized density matrices, via vec(AρB) = (A ⊗ Bᵀ) vec(ρ).
fn lindbladian(
    h: &ArrayView2<'_, Complex64>,
    ls: &[ArrayView2<'_, Complex64>],
) -> Array2<Complex64> {
    let n = h.nrows();
    let id: Array2<Complex64> = Array2::eye(n);
    let mi = Complex64::new(0.0, -1.0);

    let mut acc = (kron(h, &id) - kron(&id, &h.t())).mapv(|z| z * mi);
    for l in ls {
        let ld = dag(l);
        let ldl = ld.dot(l);
        let lconj = l.mapv(|z| z.conj());
        acc = acc + kron(l, &lconj)
            - (kron(&ldl, &id) + kron(&id, &ldl.t())).mapv(|z| z * 0.5);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation::{Equation, Lindblad};
    use crate::progress::NullProgress;
    use approx::assert_relative_eq;
    use solvay_core::ops;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn lindbladian_matrix_matches_the_equation_rhs() {
        // Applying the vectorized generator must reproduce the Lindblad
        // RHS elementwise on an arbitrary Hermitian state.
        let kappa: f64 = 0.7;
        let h2 = ops::sigmaz();
        let l2 = ops::sigmam().mapv(|z| z * kappa.sqrt());

        let mut rho = ops::fock_dm(2, 1).unwrap();
        rho[[0, 0]] = c(0.4, 0.0);
        rho[[1, 1]] = c(0.6, 0.0);
        rho[[0, 1]] = c(0.2, 0.1);
        rho[[1, 0]] = c(0.2, -0.1);

        let generator = lindbladian(&h2.view(), &[l2.view()]);
        let v = Array2::from_shape_fn((4, 1), |(k, _)| rho[[k / 2, k % 2]]);
        let dv = generator.dot(&v);

        let eq = Lindblad {
            h: TimeOperator::constant(h2).unwrap(),
            jump_ops: vec![TimeOperator::constant(l2).unwrap()],
        };
        let drho = eq.rhs(0.0, &rho.insert_axis(Axis(0)));
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(dv[[i * 2 + j, 0]].re, drho[[0, i, j]].re, epsilon = 1e-12);
                assert_relative_eq!(dv[[i * 2 + j, 0]].im, drho[[0, i, j]].im, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn decay_propagates_to_the_analytic_population() {
        let kappa: f64 = 0.8;
        let t = 1.3;
        let h = TimeOperator::constant(Array2::<Complex64>::zeros((2, 2))).unwrap();
        let l =
            TimeOperator::constant(ops::sigmam().mapv(|z| z * kappa.sqrt())).unwrap();
        let rho0 = ops::fock_dm(2, 1).unwrap().insert_axis(Axis(0));

        let (rho, stats) = run_propagator(
            &h,
            &[l],
            rho0,
            StateKind::Operator,
            0.0,
            &[t],
            &mut NullProgress,
            &mut |_, _, _| {},
        )
        .unwrap();
        assert_eq!(stats.n_accepted, 1);
        assert_relative_eq!(rho[[0, 1, 1]].re, (-kappa * t).exp(), epsilon = 1e-12);
        assert_relative_eq!(rho[[0, 0, 0]].re, 1.0 - (-kappa * t).exp(), epsilon = 1e-12);
    }

    #[test]
    fn uniform_grid_reuses_the_cached_exponential() {
        let h = TimeOperator::constant(ops::sigmax()).unwrap();
        let psi0 = ops::fock(2, 0).unwrap().insert_axis(Axis(0));
        let (psi, stats) = run_propagator(
            &h,
            &[],
            psi0,
            StateKind::Ket,
            0.0,
            &[0.5, 1.0, 1.5],
            &mut NullProgress,
            &mut |_, _, _| {},
        )
        .unwrap();
        assert_eq!(stats.n_accepted, 3);
        // exp(−i t σx)|0⟩ has ⟨σz⟩ = cos(2t) at t = 1.5
        let pz = psi[[0, 0, 0]].norm_sqr() - psi[[0, 1, 0]].norm_sqr();
        assert_relative_eq!(pz, (2.0 * 1.5_f64).cos(), epsilon = 1e-12);
    }
}
