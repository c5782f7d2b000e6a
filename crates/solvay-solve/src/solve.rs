//! Problem definition and the solve entry points.
//!
//! A [`Problem`] bundles the Hamiltonian, the initial state, the save
//! times and the optional open-system pieces (jump operators,
//! measurement efficiencies, observables, parameter derivatives). The
//! equation family is inferred from the inputs: a ket with no jump
//! operators evolves under the Schrödinger equation, anything else under
//! the Lindblad master equation, and the Euler–Maruyama method selects
//! the diffusive stochastic master equation. The propagator method
//! solves either deterministic family exactly by exponentiating its
//! constant generator.

use chrono::Utc;
use ndarray::{Array2, Array3, Axis};
use num_complex::Complex64;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use solvay_core::linalg::tile_lanes;
use solvay_core::state::expect_lanes;
use solvay_core::{QuantumState, StateKind, TimeOperator};

use crate::batch::{common_batch, expand_lanes};
use crate::equation::{Equation, Lindblad, Schrodinger};
use crate::error::{SolveError, SolveResult, ValidationError};
use crate::gradient::{Parameters, run_adjoint, run_sensitivity};
use crate::integrate::{StepStats, run_method};
use crate::options::{GradientMode, Method, Options};
use crate::progress::{NullProgress, Progress, TracingProgress};
use crate::propagator::run_propagator;
use crate::result::Solution;
use crate::sme::integrate_sme;

/// A fully specified evolution problem.
#[derive(Clone, Debug)]
pub struct Problem {
    h: TimeOperator,
    y0: QuantumState,
    tsave: Vec<f64>,
    jump_ops: Vec<TimeOperator>,
    etas: Option<Vec<f64>>,
    exp_ops: Vec<Array2<Complex64>>,
    parameters: Option<Parameters>,
    seed: Option<u64>,
    n_trajectories: usize,
}

impl Problem {
    /// Start from the three mandatory ingredients: Hamiltonian, initial
    /// state and save times.
    pub fn new(h: TimeOperator, y0: QuantumState, tsave: Vec<f64>) -> Self {
        Self {
            h,
            y0,
            tsave,
            jump_ops: Vec::new(),
            etas: None,
            exp_ops: Vec::new(),
            parameters: None,
            seed: None,
            n_trajectories: 1,
        }
    }

    /// Jump operators for open-system evolution.
    pub fn with_jump_ops(mut self, jump_ops: Vec<TimeOperator>) -> Self {
        self.jump_ops = jump_ops;
        self
    }

    /// Measurement efficiencies, one per jump operator, for the
    /// stochastic master equation.
    pub fn with_etas(mut self, etas: Vec<f64>) -> Self {
        self.etas = Some(etas);
        self
    }

    /// Hermitian observables whose expectation values are recorded at
    /// every save time.
    pub fn with_exp_ops(mut self, exp_ops: Vec<Array2<Complex64>>) -> Self {
        self.exp_ops = exp_ops;
        self
    }

    /// Operator derivatives declaring the differentiable parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Seed for the Wiener increments; unseeded runs draw from entropy.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of stochastic trajectories, folded into the batch axis
    /// trajectory-major.
    pub fn with_trajectories(mut self, n: usize) -> Self {
        self.n_trajectories = n;
        self
    }
}

/// Solve with the default progress observer (tracing when
/// `opts.verbose`, silent otherwise).
pub fn solve(
    problem: &Problem,
    method: &Method,
    gradient: GradientMode,
    opts: &Options,
) -> SolveResult<Solution> {
    if opts.verbose {
        let mut obs = TracingProgress::new(opts.t0);
        solve_with_observer(problem, method, gradient, opts, &mut obs)
    } else {
        solve_with_observer(problem, method, gradient, opts, &mut NullProgress)
    }
}

/// Solve with a caller-supplied progress observer.
pub fn solve_with_observer(
    problem: &Problem,
    method: &Method,
    gradient: GradientMode,
    opts: &Options,
    observer: &mut dyn Progress,
) -> SolveResult<Solution> {
    let start = Utc::now();
    validate(problem, method, gradient, opts)?;

    let dim = problem.y0.dim();
    let batch = common_batch(&batch_sizes(problem))?;
    debug!(
        method = method.name(),
        gradient = gradient.name(),
        dim,
        batch,
        n_tsave = problem.tsave.len(),
        "starting solve"
    );

    let mut run = if method.is_stochastic() {
        run_stochastic(problem, method, opts, batch, observer)?
    } else {
        run_deterministic(problem, method, gradient, opts, batch, observer)?
    };

    let final_state = QuantumState::new(run.final_data, run.kind)?;
    let states = if opts.save_states {
        let mut out = Vec::with_capacity(run.saved.len());
        for data in run.saved.drain(..) {
            out.push(QuantumState::new(data, run.kind)?);
        }
        Some(out)
    } else {
        None
    };

    Ok(Solution {
        tsave: problem.tsave.clone(),
        states,
        final_state,
        expects: run.expects,
        measurements: run.measurements,
        gradients: run.gradients,
        method: method.name().to_string(),
        gradient_mode: gradient,
        start,
        end: Utc::now(),
        n_accepted: run.stats.n_accepted,
        n_rejected: run.stats.n_rejected,
    })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

struct RunOutput {
    saved: Vec<Array3<Complex64>>,
    final_data: Array3<Complex64>,
    kind: StateKind,
    expects: Option<Array3<Complex64>>,
    measurements: Option<Array3<f64>>,
    gradients: Option<Array3<f64>>,
    stats: StepStats,
}

/// Per-save-time output accumulator. Expectation values are folded in
/// as each save point arrives; the state itself is only cloned when the
/// caller asked to keep it.
struct SaveSink<'a> {
    kind: StateKind,
    exp_ops: &'a [Array2<Complex64>],
    keep_states: bool,
    saved: Vec<Array3<Complex64>>,
    expects: Option<Array3<Complex64>>,
}

impl<'a> SaveSink<'a> {
    fn new(
        kind: StateKind,
        exp_ops: &'a [Array2<Complex64>],
        keep_states: bool,
        batch: usize,
        n_tsave: usize,
    ) -> Self {
        let expects =
            (!exp_ops.is_empty()).then(|| Array3::zeros((batch, exp_ops.len(), n_tsave)));
        Self {
            kind,
            exp_ops,
            keep_states,
            saved: Vec::new(),
            expects,
        }
    }

    fn record(&mut self, idx: usize, y: &Array3<Complex64>) {
        if let Some(out) = &mut self.expects {
            for (j, op) in self.exp_ops.iter().enumerate() {
                let vals = expect_lanes(y, self.kind, &op.view());
                for (b, v) in vals.iter().enumerate() {
                    out[[b, j, idx]] = *v;
                }
            }
        }
        if self.keep_states {
            self.saved.push(y.clone());
        }
    }
}

fn run_deterministic(
    problem: &Problem,
    method: &Method,
    gradient: GradientMode,
    opts: &Options,
    batch: usize,
    observer: &mut dyn Progress,
) -> Result<RunOutput, SolveError> {
    let schrodinger = problem.y0.kind() == StateKind::Ket && problem.jump_ops.is_empty();
    if matches!(method, Method::Propagator) {
        let (kind, y0) = if schrodinger {
            (StateKind::Ket, expand_lanes(problem.y0.data(), batch))
        } else {
            (
                StateKind::Operator,
                expand_lanes(problem.y0.to_density_matrix().data(), batch),
            )
        };
        let mut sink = SaveSink::new(
            kind,
            &problem.exp_ops,
            opts.save_states,
            y0.len_of(Axis(0)),
            problem.tsave.len(),
        );
        let (final_data, stats) = run_propagator(
            &problem.h,
            &problem.jump_ops,
            y0,
            kind,
            opts.t0,
            &problem.tsave,
            observer,
            &mut |idx, _t, y: &Array3<Complex64>| sink.record(idx, y),
        )?;
        return Ok(RunOutput {
            saved: sink.saved,
            final_data,
            kind,
            expects: sink.expects,
            measurements: None,
            gradients: None,
            stats,
        });
    }
    if schrodinger {
        let y0 = expand_lanes(problem.y0.data(), batch);
        let eq = Schrodinger {
            h: problem.h.clone(),
        };
        drive_equation(&eq, y0, StateKind::Ket, problem, method, gradient, opts, observer)
    } else {
        let y0 = expand_lanes(problem.y0.to_density_matrix().data(), batch);
        let eq = Lindblad {
            h: problem.h.clone(),
            jump_ops: problem.jump_ops.clone(),
        };
        drive_equation(&eq, y0, StateKind::Operator, problem, method, gradient, opts, observer)
    }
}

#[allow(clippy::too_many_arguments)]
fn drive_equation<E: Equation>(
    eq: &E,
    y0: Array3<Complex64>,
    kind: StateKind,
    problem: &Problem,
    method: &Method,
    gradient: GradientMode,
    opts: &Options,
    observer: &mut dyn Progress,
) -> Result<RunOutput, SolveError> {
    let mut sink = SaveSink::new(
        kind,
        &problem.exp_ops,
        opts.save_states,
        y0.len_of(Axis(0)),
        problem.tsave.len(),
    );
    let empty = Parameters::default();
    let params = problem.parameters.as_ref().unwrap_or(&empty);

    let (final_data, gradients, stats) = match gradient {
        GradientMode::None => {
            let f = |t: f64, y: &Array3<Complex64>| eq.rhs(t, y);
            let project = |y: &mut Array3<Complex64>| eq.project(y);
            let (final_data, stats) = run_method(
                method,
                &f,
                &project,
                y0,
                opts.t0,
                &problem.tsave,
                opts,
                observer,
                &mut |idx, _t, y: &Array3<Complex64>| sink.record(idx, y),
            )?;
            (final_data, None, stats)
        }
        GradientMode::Sensitivity => {
            let (final_data, grads, stats) = run_sensitivity(
                eq,
                y0,
                opts.t0,
                &problem.tsave,
                params,
                &problem.exp_ops,
                method,
                opts,
                observer,
                &mut |idx, _t, y: &Array3<Complex64>| sink.record(idx, y),
            )?;
            (final_data, Some(grads), stats)
        }
        GradientMode::Adjoint => {
            let f = |t: f64, y: &Array3<Complex64>| eq.rhs(t, y);
            let project = |y: &mut Array3<Complex64>| eq.project(y);
            let (final_data, forward) = run_method(
                method,
                &f,
                &project,
                y0,
                opts.t0,
                &problem.tsave,
                opts,
                observer,
                &mut |idx, _t, y: &Array3<Complex64>| sink.record(idx, y),
            )?;
            let tf = problem.tsave[problem.tsave.len() - 1];
            let (grads, backward) = run_adjoint(
                eq,
                &final_data,
                opts.t0,
                tf,
                params,
                &problem.exp_ops,
                method,
                opts,
                observer,
            )?;
            let stats = StepStats {
                n_accepted: forward.n_accepted + backward.n_accepted,
                n_rejected: forward.n_rejected + backward.n_rejected,
            };
            (final_data, Some(grads), stats)
        }
    };

    Ok(RunOutput {
        saved: sink.saved,
        final_data,
        kind,
        expects: sink.expects,
        measurements: None,
        gradients,
        stats,
    })
}

fn run_stochastic(
    problem: &Problem,
    method: &Method,
    opts: &Options,
    batch: usize,
    observer: &mut dyn Progress,
) -> Result<RunOutput, SolveError> {
    // fixed_dt is Some by construction for the stochastic method
    let dt = match method.fixed_dt() {
        Some(dt) => dt,
        None => {
            return Err(ValidationError::UnsupportedMethod {
                method: method.name().to_string(),
                equation: "stochastic".to_string(),
            }
            .into());
        }
    };
    let etas = problem.etas.as_deref().unwrap_or(&[]);

    // Trajectory folding repeats state AND operator lanes so batched
    // operators keep lining up lane for lane after tiling.
    let n = problem.n_trajectories;
    let rho0 = expand_lanes(problem.y0.to_density_matrix().data(), batch);
    let y0 = tile_lanes(&rho0, n);
    let h = problem.h.tile(n);
    let jump_ops: Vec<TimeOperator> = problem.jump_ops.iter().map(|l| l.tile(n)).collect();

    let mut rng = match problem.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut sink = SaveSink::new(
        StateKind::Operator,
        &problem.exp_ops,
        opts.save_states,
        y0.len_of(Axis(0)),
        problem.tsave.len(),
    );
    let (final_data, records, stats) = integrate_sme(
        &h,
        &jump_ops,
        etas,
        y0,
        opts.t0,
        &problem.tsave,
        dt,
        opts,
        &mut rng,
        observer,
        &mut |idx, _t, rho: &Array3<Complex64>| sink.record(idx, rho),
    )?;

    Ok(RunOutput {
        saved: sink.saved,
        final_data,
        kind: StateKind::Operator,
        expects: sink.expects,
        measurements: Some(records),
        gradients: None,
        stats,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn batch_sizes(problem: &Problem) -> Vec<usize> {
    let mut sizes = vec![problem.h.batch(), problem.y0.batch()];
    sizes.extend(problem.jump_ops.iter().map(|l| l.batch()));
    // Parameter derivatives ride along in the same lanes as the state.
    if let Some(params) = &problem.parameters {
        for p in &params.0 {
            if let Some(dh) = &p.dh {
                sizes.push(dh.batch());
            }
            sizes.extend(p.dl.iter().flatten().map(|dl| dl.batch()));
        }
    }
    sizes
}

fn validate(
    problem: &Problem,
    method: &Method,
    gradient: GradientMode,
    opts: &Options,
) -> Result<(), SolveError> {
    opts.validate()?;
    method.validate()?;

    if problem.tsave.is_empty() {
        return Err(ValidationError::EmptySaveTimes.into());
    }
    for (i, w) in problem.tsave.windows(2).enumerate() {
        if w[1] <= w[0] {
            return Err(ValidationError::SaveTimesNotIncreasing {
                index: i + 1,
                value: w[1],
                previous: w[0],
            }
            .into());
        }
    }
    if problem.tsave[0] < opts.t0 {
        return Err(ValidationError::SaveTimeBeforeStart {
            t0: opts.t0,
            first: problem.tsave[0],
        }
        .into());
    }

    if problem.y0.kind() == StateKind::Bra {
        return Err(ValidationError::BraInitialState.into());
    }

    let dim = problem.y0.dim();
    if problem.h.dim() != dim {
        return Err(ValidationError::DimensionMismatch {
            op_dim: problem.h.dim(),
            state_dim: dim,
        }
        .into());
    }
    for l in &problem.jump_ops {
        if l.dim() != dim {
            return Err(ValidationError::DimensionMismatch {
                op_dim: l.dim(),
                state_dim: dim,
            }
            .into());
        }
    }
    for e in &problem.exp_ops {
        if e.nrows() != e.ncols() || e.nrows() != dim {
            return Err(ValidationError::DimensionMismatch {
                op_dim: e.nrows(),
                state_dim: dim,
            }
            .into());
        }
    }
    common_batch(&batch_sizes(problem))?;

    if problem.n_trajectories == 0 {
        return Err(ValidationError::InvalidTrajectories.into());
    }

    if method.is_stochastic() {
        if problem.jump_ops.is_empty() {
            return Err(ValidationError::MissingJumpOps.into());
        }
        let etas = problem.etas.as_deref().unwrap_or(&[]);
        if etas.len() != problem.jump_ops.len() {
            return Err(ValidationError::EtasLengthMismatch {
                n_etas: etas.len(),
                n_ops: problem.jump_ops.len(),
            }
            .into());
        }
        for &eta in etas {
            if !(0.0..=1.0).contains(&eta) || !eta.is_finite() {
                return Err(ValidationError::EtaOutOfRange { value: eta }.into());
            }
        }
        if etas.iter().all(|&eta| eta == 0.0) {
            return Err(ValidationError::AllEtasZero.into());
        }
    } else {
        if problem.etas.is_some() {
            return Err(ValidationError::UnexpectedEtas.into());
        }
        if problem.n_trajectories > 1 {
            return Err(ValidationError::UnexpectedTrajectories.into());
        }
    }

    if matches!(method, Method::Propagator)
        && !(problem.h.is_constant() && problem.jump_ops.iter().all(|l| l.is_constant()))
    {
        return Err(ValidationError::TimeDependentPropagator.into());
    }

    if gradient != GradientMode::None {
        if method.is_stochastic() || matches!(method, Method::Propagator) {
            return Err(ValidationError::GradientUnsupported {
                method: method.name().to_string(),
            }
            .into());
        }
        let params = problem
            .parameters
            .as_ref()
            .filter(|p| !p.is_empty())
            .ok_or(ValidationError::MissingParameters {
                mode: gradient.name().to_string(),
            })?;
        if problem.exp_ops.is_empty() {
            return Err(ValidationError::NoObservables.into());
        }
        for (index, p) in params.0.iter().enumerate() {
            if p.dl.len() != problem.jump_ops.len() {
                return Err(ValidationError::ParameterShapeMismatch {
                    index,
                    got: p.dl.len(),
                    expected: problem.jump_ops.len(),
                }
                .into());
            }
            if let Some(dh) = &p.dh {
                if dh.dim() != dim {
                    return Err(ValidationError::DimensionMismatch {
                        op_dim: dh.dim(),
                        state_dim: dim,
                    }
                    .into());
                }
            }
            for dl in p.dl.iter().flatten() {
                if dl.dim() != dim {
                    return Err(ValidationError::DimensionMismatch {
                        op_dim: dl.dim(),
                        state_dim: dim,
                    }
                    .into());
                }
            }
        }
    }

    Ok(())
}
