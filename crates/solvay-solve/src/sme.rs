//! Diffusive stochastic master equation under Euler–Maruyama.
//!
//! Each monitored channel k with efficiency η_k adds a measurement
//! backaction on top of the Lindblad drift:
//!
//!   dρ = 𝓛(ρ) dt + Σ_k √η_k (L_k ρ + ρ L_k† − tr[(L_k + L_k†) ρ] ρ) dW_k
//!
//! and produces the homodyne record dy_k = √η_k tr[(L_k + L_k†) ρ] dt
//! + dW_k, reported as its time average over each integration interval —
//! the stretch between consecutive stop points of {t0} ∪ tsave. The
//! window from t0 up to the first save time is recorded like any other;
//! a zero-width window (tsave[0] = t0) contributes no record.
//!
//! Ref: Wiseman & Milburn, "Quantum Measurement and Control" (2009),
//! Ch. 4.

use ndarray::{Array2, Array3, Axis};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use solvay_core::TimeOperator;
use solvay_core::linalg::{bmm, dag_batched};
use solvay_core::state::hermitize_lanes;

use crate::equation::{Equation, Lindblad};
use crate::error::SolveError;
use crate::integrate::StepStats;
use crate::options::Options;
use crate::progress::Progress;

/// Integrate the diffusive SME with fixed step `dt`, invoking `on_save`
/// at every entry of `tsave`. Returns the final density matrices, the
/// averaged measurement records `(batch, n_channels, n_records)` — one
/// record per positive-width integration interval, so `n_records` is
/// `n_tsave` when `tsave[0] > t0` and `n_tsave − 1` when they coincide —
/// and the step statistics.
///
/// The batch axis already folds trajectories in; each lane draws its own
/// Wiener increments, in channel-major lane order, so a fixed seed
/// reproduces the run exactly.
#[allow(clippy::too_many_arguments)]
pub(crate) fn integrate_sme<C>(
    h: &TimeOperator,
    jump_ops: &[TimeOperator],
    etas: &[f64],
    y0: Array3<Complex64>,
    t0: f64,
    tsave: &[f64],
    dt: f64,
    opts: &Options,
    rng: &mut StdRng,
    observer: &mut dyn Progress,
    on_save: &mut C,
) -> Result<(Array3<Complex64>, Array3<f64>, StepStats), SolveError>
where
    C: FnMut(usize, f64, &Array3<Complex64>),
{
    let drift = Lindblad {
        h: h.clone(),
        jump_ops: jump_ops.to_vec(),
    };
    let batch = y0.len_of(Axis(0));
    let n_channels = jump_ops.len();
    let t_end = tsave[tsave.len() - 1];

    let mut rho = y0;
    let mut t = t0;
    let mut stats = StepStats::default();
    let n_records = tsave.len() - usize::from(tsave[0] <= t0);
    let mut records = Array3::zeros((batch, n_channels, n_records));
    let mut signal_acc: Array2<f64> = Array2::zeros((batch, n_channels));
    let mut seg = 0usize;

    for (idx, &target) in tsave.iter().enumerate() {
        let span = target - t;
        if span > 0.0 {
            let n_sub = (span / dt).ceil().max(1.0) as usize;
            let h_sub = span / n_sub as f64;
            let sqrt_h = h_sub.sqrt();

            for k in 0..n_sub {
                if stats.n_accepted >= opts.max_steps {
                    return Err(SolveError::StepBudgetExceeded {
                        max_steps: opts.max_steps,
                        t,
                    });
                }
                let tk = t + k as f64 * h_sub;

                let mut next = rho.clone();
                next.scaled_add(Complex64::new(h_sub, 0.0), &drift.rhs(tk, &rho));

                for (ch, (l_op, &eta)) in jump_ops.iter().zip(etas.iter()).enumerate() {
                    let l = l_op.eval(tk);
                    let ld = dag_batched(&l);
                    let lrho = bmm(&l, &rho);
                    let rhold = bmm(&rho, &ld);

                    for b in 0..batch {
                        let z: f64 = StandardNormal.sample(rng);
                        let dw = z * sqrt_h;

                        // tr[(L + L†) ρ], real for Hermitian ρ.
                        let mut tr = 0.0;
                        let lr = lrho.index_axis(Axis(0), b);
                        let rl = rhold.index_axis(Axis(0), b);
                        for i in 0..lr.nrows() {
                            tr += lr[[i, i]].re + rl[[i, i]].re;
                        }

                        if eta > 0.0 {
                            let scale = Complex64::new(eta.sqrt() * dw, 0.0);
                            let mut lane = next.index_axis_mut(Axis(0), b);
                            lane.scaled_add(scale, &lr);
                            lane.scaled_add(scale, &rl);
                            let rho_lane = rho.index_axis(Axis(0), b);
                            lane.scaled_add(-scale * tr, &rho_lane);
                        }

                        signal_acc[[b, ch]] += eta.sqrt() * tr * h_sub + dw;
                    }
                }

                rho = next;
                hermitize_lanes(&mut rho);
                if !solvay_core::linalg::all_finite(&rho) {
                    return Err(SolveError::NonFiniteState { t: tk + h_sub });
                }
                stats.n_accepted += 1;
                observer.on_step(tk + h_sub, t_end, true);
            }
        }
        if span > 0.0 {
            for b in 0..batch {
                for ch in 0..n_channels {
                    records[[b, ch, seg]] = signal_acc[[b, ch]] / span;
                }
            }
            signal_acc.fill(0.0);
            seg += 1;
        }
        t = target;
        on_save(idx, target, &rho);
        observer.on_save(idx, target);
    }

    Ok((rho, records, stats))
}
