//! Deterministic time loop.
//!
//! Drives the step kernels from `t0` through the sorted save times,
//! clipping the proposed step to land exactly on each save point. The
//! adaptive controller follows the standard PI-free error control:
//! accept iff the scaled error norm is ≤ 1, then rescale the step by
//! `0.9 · norm^(−1/5)` clamped to [0.2, 5].
//!
//! Ref: Hairer, Nørsett & Wanner, "Solving Ordinary Differential
//! Equations I" (1993), §II.4.

use tracing::debug;

use crate::error::{SolveError, ValidationError};
use crate::ode::OdeState;
use crate::options::{Method, Options};
use crate::progress::Progress;
use crate::stepper::{Dopri5, euler_step, rk4_step};

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

/// Step counts accumulated by a single pass of the time loop.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StepStats {
    pub n_accepted: usize,
    pub n_rejected: usize,
}

impl StepStats {
    fn total(&self) -> usize {
        self.n_accepted + self.n_rejected
    }
}

/// Controller phase of the adaptive loop. Failures exit through `Err`
/// directly.
#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Advancing toward the next save time.
    Stepping,
    /// Recording the state at save index `i`.
    Saving(usize),
    /// All save times recorded.
    Finished,
}

/// Integrate `dy/dt = f(t, y)` from `t0` with adaptive Dormand–Prince,
/// invoking `on_save` at every entry of `tsave` (which must be sorted,
/// strictly increasing and ≥ `t0` — validated by the caller).
///
/// `project` restores state invariants after each accepted step.
pub(crate) fn integrate_adaptive<S, F, P, C>(
    f: &F,
    project: &P,
    y0: S,
    t0: f64,
    tsave: &[f64],
    opts: &Options,
    observer: &mut dyn Progress,
    on_save: &mut C,
) -> Result<(S, StepStats), SolveError>
where
    S: OdeState,
    F: Fn(f64, &S) -> S,
    P: Fn(&mut S),
    C: FnMut(usize, f64, &S),
{
    let dp = Dopri5 {
        atol: opts.atol,
        rtol: opts.rtol,
    };
    let t_end = tsave[tsave.len() - 1];

    let mut y = y0;
    let mut t = t0;
    let mut stats = StepStats::default();

    // Initial guess; the controller corrects it within a few steps.
    let mut h = if t_end > t0 { (t_end - t0) / 100.0 } else { 0.0 };

    let mut next = 0usize;
    let mut phase = Phase::Stepping;
    loop {
        match phase {
            Phase::Stepping => {
                let target = tsave[next];
                // The first save time may coincide with t0.
                if t >= target || close(t, target, t0, t_end) {
                    t = target;
                    phase = Phase::Saving(next);
                    continue;
                }
                if stats.total() >= opts.max_steps {
                    return Err(SolveError::StepBudgetExceeded {
                        max_steps: opts.max_steps,
                        t,
                    });
                }

                let clipped = h > target - t;
                let h_eff = h.min(target - t);
                let (y_new, norm) = dp.step(f, t, &y, h_eff);
                let accepted = norm <= 1.0;
                observer.on_step(t, t_end, accepted);

                let factor = (SAFETY * norm.max(1e-16).powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR);
                if accepted {
                    t += h_eff;
                    y = y_new;
                    project(&mut y);
                    if !y.all_finite() {
                        return Err(SolveError::NonFiniteState { t });
                    }
                    stats.n_accepted += 1;
                    // A clipped step says nothing about the natural step
                    // size; keep the controller's value in that case.
                    if clipped {
                        h = h.max(h_eff * factor);
                    } else {
                        h = h_eff * factor;
                    }
                } else {
                    stats.n_rejected += 1;
                    h = h_eff * factor;
                    debug!(t, h, norm, "step rejected");
                }
            }
            Phase::Saving(idx) => {
                on_save(idx, tsave[idx], &y);
                observer.on_save(idx, tsave[idx]);
                next = idx + 1;
                phase = if next == tsave.len() {
                    Phase::Finished
                } else {
                    Phase::Stepping
                };
            }
            Phase::Finished => break,
        }
    }

    Ok((y, stats))
}

/// Fixed-step scheme selector for [`integrate_fixed`].
#[derive(Debug, Clone, Copy)]
pub(crate) enum FixedScheme {
    Euler,
    Rk4,
}

/// Integrate with a fixed nominal step `dt`, subdividing each save
/// interval into uniform substeps so every save time is hit exactly.
pub(crate) fn integrate_fixed<S, F, P, C>(
    scheme: FixedScheme,
    f: &F,
    project: &P,
    y0: S,
    t0: f64,
    tsave: &[f64],
    dt: f64,
    opts: &Options,
    observer: &mut dyn Progress,
    on_save: &mut C,
) -> Result<(S, StepStats), SolveError>
where
    S: OdeState,
    F: Fn(f64, &S) -> S,
    P: Fn(&mut S),
    C: FnMut(usize, f64, &S),
{
    let t_end = tsave[tsave.len() - 1];
    let mut y = y0;
    let mut t = t0;
    let mut stats = StepStats::default();

    for (idx, &target) in tsave.iter().enumerate() {
        let span = target - t;
        if span > 0.0 {
            let n_sub = (span / dt).ceil().max(1.0) as usize;
            let h = span / n_sub as f64;
            for k in 0..n_sub {
                if stats.total() >= opts.max_steps {
                    return Err(SolveError::StepBudgetExceeded {
                        max_steps: opts.max_steps,
                        t,
                    });
                }
                let tk = t + k as f64 * h;
                y = match scheme {
                    FixedScheme::Euler => euler_step(f, tk, &y, h),
                    FixedScheme::Rk4 => rk4_step(f, tk, &y, h),
                };
                project(&mut y);
                if !y.all_finite() {
                    return Err(SolveError::NonFiniteState { t: tk + h });
                }
                stats.n_accepted += 1;
                observer.on_step(tk + h, t_end, true);
            }
        }
        t = target;
        on_save(idx, target, &y);
        observer.on_save(idx, target);
    }

    Ok((y, stats))
}

/// Dispatch one deterministic pass to the method's driver. The
/// stochastic method never reaches this point.
pub(crate) fn run_method<S, F, P, C>(
    method: &Method,
    f: &F,
    project: &P,
    y0: S,
    t0: f64,
    tsave: &[f64],
    opts: &Options,
    observer: &mut dyn Progress,
    on_save: &mut C,
) -> Result<(S, StepStats), SolveError>
where
    S: OdeState,
    F: Fn(f64, &S) -> S,
    P: Fn(&mut S),
    C: FnMut(usize, f64, &S),
{
    match method {
        Method::Dopri5 => integrate_adaptive(f, project, y0, t0, tsave, opts, observer, on_save),
        Method::Euler { dt } => integrate_fixed(
            FixedScheme::Euler,
            f,
            project,
            y0,
            t0,
            tsave,
            *dt,
            opts,
            observer,
            on_save,
        ),
        Method::Rk4 { dt } => integrate_fixed(
            FixedScheme::Rk4,
            f,
            project,
            y0,
            t0,
            tsave,
            *dt,
            opts,
            observer,
            on_save,
        ),
        // Both carry their own drivers and are dispatched before the
        // generic ODE passes.
        Method::EulerMaruyama { .. } | Method::Propagator => {
            Err(ValidationError::UnsupportedMethod {
                method: method.name().to_string(),
                equation: "deterministic".to_string(),
            }
            .into())
        }
    }
}

fn close(t: f64, target: f64, t0: f64, t_end: f64) -> bool {
    let scale = (t_end - t0).abs().max(1.0);
    (target - t).abs() <= 1e-12 * scale
}
