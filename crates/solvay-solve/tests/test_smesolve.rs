//! Tests for the diffusive stochastic master equation.

use approx::assert_relative_eq;
use ndarray::Axis;
use solvay_core::{QuantumState, TimeOperator, ops};
use solvay_solve::{GradientMode, Method, Options, Problem, SolveError, ValidationError, solve};

fn monitored_decay(kappa: f64, eta: f64, tsave: Vec<f64>) -> Problem {
    let h = TimeOperator::constant(ops::sigmaz().mapv(|z| z * 0.5)).unwrap();
    let l = TimeOperator::constant(ops::sigmam().mapv(|z| z * kappa.sqrt())).unwrap();
    let rho0 = QuantumState::density_matrix(ops::fock_dm(2, 1).unwrap()).unwrap();
    Problem::new(h, rho0, tsave)
        .with_jump_ops(vec![l])
        .with_etas(vec![eta])
}

fn em(dt: f64) -> Method {
    Method::EulerMaruyama { dt }
}

// ---------------------------------------------------------------------------
// Trajectory structure
// ---------------------------------------------------------------------------

#[test]
fn same_seed_gives_identical_trajectories() {
    let opts = Options::default();
    let run = |seed| {
        let problem = monitored_decay(1.0, 0.7, vec![0.5, 1.0]).with_seed(seed);
        solve(&problem, &em(1e-3), GradientMode::None, &opts).unwrap()
    };
    let a = run(11);
    let b = run(11);
    let c = run(12);

    assert_eq!(a.final_state.data(), b.final_state.data());
    assert_eq!(a.measurements, b.measurements);
    assert_ne!(a.final_state.data(), c.final_state.data());
}

#[test]
fn trajectories_fold_into_the_batch_axis() {
    let problem = monitored_decay(1.0, 0.5, vec![0.2, 0.4])
        .with_seed(5)
        .with_trajectories(16);
    let sol = solve(&problem, &em(1e-3), GradientMode::None, &Options::default()).unwrap();

    assert_eq!(sol.final_state.batch(), 16);
    // one averaged record per integration interval, [0, 0.2] included
    assert_eq!(sol.measurements.unwrap().dim(), (16, 1, 2));
}

#[test]
fn records_cover_the_interval_from_the_start_time() {
    // A single save time still spans [t0, tsave[0]], so one record comes
    // back; repeating t0 at the head adds a zero-width interval and no
    // extra record.
    let opts = Options::default();
    let sol = solve(
        &monitored_decay(1.0, 0.7, vec![0.3]).with_seed(3),
        &em(1e-3),
        GradientMode::None,
        &opts,
    )
    .unwrap();
    assert_eq!(sol.measurements.unwrap().dim(), (1, 1, 1));

    let sol = solve(
        &monitored_decay(1.0, 0.7, vec![0.0, 0.3]).with_seed(3),
        &em(1e-3),
        GradientMode::None,
        &opts,
    )
    .unwrap();
    assert_eq!(sol.measurements.unwrap().dim(), (1, 1, 1));
}

#[test]
fn batched_operators_tile_with_trajectories() {
    // Two jump-operator lanes folded over three trajectories each: the
    // operators must tile alongside the state to 6 lanes.
    use ndarray::Array3;
    let kappas: [f64; 2] = [0.5, 2.0];
    let mut ls = Array3::zeros((2, 2, 2));
    for (i, &k) in kappas.iter().enumerate() {
        ls.index_axis_mut(Axis(0), i)
            .assign(&ops::sigmam().mapv(|z| z * k.sqrt()));
    }
    let h = TimeOperator::constant(ops::sigmaz().mapv(|z| z * 0.5)).unwrap();
    let l = TimeOperator::constant_batched(ls).unwrap();
    let rho0 = QuantumState::density_matrix(ops::fock_dm(2, 1).unwrap()).unwrap();
    let problem = Problem::new(h, rho0, vec![0.4])
        .with_jump_ops(vec![l])
        .with_etas(vec![1.0])
        .with_seed(17)
        .with_trajectories(3);
    let sol = solve(&problem, &em(1e-3), GradientMode::None, &Options::default()).unwrap();

    assert_eq!(sol.final_state.batch(), 6);
    assert_eq!(sol.measurements.unwrap().dim(), (6, 1, 1));
    for tr in sol.final_state.trace().iter() {
        assert_relative_eq!(tr.re, 1.0, epsilon = 1e-2);
    }
}

#[test]
fn vacuum_is_invariant_under_decay_monitoring() {
    let h = TimeOperator::constant(ops::sigmaz().mapv(|z| z * 0.5)).unwrap();
    let l = TimeOperator::constant(ops::sigmam()).unwrap();
    let rho0 = QuantumState::density_matrix(ops::fock_dm(2, 0).unwrap()).unwrap();
    let problem = Problem::new(h, rho0, vec![1.0])
        .with_jump_ops(vec![l])
        .with_etas(vec![1.0])
        .with_seed(99);
    let sol = solve(&problem, &em(1e-3), GradientMode::None, &Options::default()).unwrap();

    let rho = sol.final_state.data().clone();
    assert_relative_eq!(rho[[0, 0, 0]].re, 1.0, epsilon = 1e-10);
    assert_relative_eq!(rho[[0, 1, 1]].re, 0.0, epsilon = 1e-10);
}

#[test]
fn trace_is_preserved_along_the_trajectory() {
    let problem = monitored_decay(0.8, 1.0, vec![0.25, 0.5, 0.75, 1.0]).with_seed(21);
    let sol = solve(&problem, &em(1e-4), GradientMode::None, &Options::default()).unwrap();

    for state in sol.states.unwrap() {
        assert_relative_eq!(state.trace()[0].re, 1.0, epsilon = 1e-2);
    }
}

// ---------------------------------------------------------------------------
// Measurement records
// ---------------------------------------------------------------------------

#[test]
fn homodyne_signal_tracks_the_conditional_mean() {
    // ⟨σx⟩(0) = 1 for |+⟩; averaged over many trajectories the record
    // J ≈ √η ⟨L + L†⟩ = √(η κ) ⟨σx⟩ up to shot noise ~ 1/√(N Δt).
    let kappa: f64 = 1.0;
    let eta: f64 = 1.0;
    let n_traj = 400;
    let plus = {
        let k = ops::fock(2, 0).unwrap().mapv(|z| z / 2.0_f64.sqrt())
            + ops::fock(2, 1).unwrap().mapv(|z| z / 2.0_f64.sqrt());
        QuantumState::ket(k).unwrap()
    };
    let h = TimeOperator::constant(ops::sigmaz().mapv(|z| z * 0.0)).unwrap();
    let l = TimeOperator::constant(ops::sigmam().mapv(|z| z * kappa.sqrt())).unwrap();
    let problem = Problem::new(h, plus, vec![0.1])
        .with_jump_ops(vec![l])
        .with_etas(vec![eta])
        .with_seed(7)
        .with_trajectories(n_traj);
    let sol = solve(&problem, &em(1e-3), GradientMode::None, &Options::default()).unwrap();

    let records = sol.measurements.unwrap();
    let mean = records.sum_axis(Axis(0)).sum() / n_traj as f64;
    // ⟨σx⟩ barely decays over [0, 0.1]; allow generous shot noise.
    assert_relative_eq!(mean, (eta * kappa).sqrt(), epsilon = 0.6);
}

#[test]
fn unmonitored_channel_records_pure_noise_with_zero_mean() {
    let h = TimeOperator::constant(ops::sigmaz().mapv(|z| z * 0.5)).unwrap();
    let l1 = TimeOperator::constant(ops::sigmam()).unwrap();
    let l2 = TimeOperator::constant(ops::sigmaz().mapv(|z| z * 0.3)).unwrap();
    let rho0 = QuantumState::density_matrix(ops::fock_dm(2, 1).unwrap()).unwrap();
    let problem = Problem::new(h, rho0, vec![0.5])
        .with_jump_ops(vec![l1, l2])
        .with_etas(vec![0.0, 1.0])
        .with_seed(13)
        .with_trajectories(200);
    let sol = solve(&problem, &em(1e-3), GradientMode::None, &Options::default()).unwrap();

    let records = sol.measurements.unwrap();
    assert_eq!(records.dim(), (200, 2, 1));
    let mean_ch0 = records.index_axis(Axis(1), 0).sum() / 200.0;
    // σ/√N = 1/√(N Δt) ≈ 0.1 for N = 200, Δt = 0.5
    assert!(mean_ch0.abs() < 0.5, "mean = {mean_ch0}");
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn all_zero_efficiencies_are_rejected() {
    let problem = monitored_decay(1.0, 0.0, vec![1.0]);
    let err = solve(&problem, &em(1e-3), GradientMode::None, &Options::default()).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Validation(ValidationError::AllEtasZero)
    ));
}

#[test]
fn efficiency_outside_unit_interval_is_rejected() {
    let problem = monitored_decay(1.0, 1.5, vec![1.0]);
    let err = solve(&problem, &em(1e-3), GradientMode::None, &Options::default()).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Validation(ValidationError::EtaOutOfRange { .. })
    ));
}

#[test]
fn stochastic_method_requires_jump_ops() {
    let h = TimeOperator::constant(ops::sigmaz()).unwrap();
    let rho0 = QuantumState::density_matrix(ops::fock_dm(2, 0).unwrap()).unwrap();
    let problem = Problem::new(h, rho0, vec![1.0]).with_etas(vec![1.0]);
    let err = solve(&problem, &em(1e-3), GradientMode::None, &Options::default()).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Validation(ValidationError::MissingJumpOps)
    ));
}

#[test]
fn etas_are_rejected_for_deterministic_methods() {
    let problem = monitored_decay(1.0, 0.5, vec![1.0]);
    let err = solve(&problem, &Method::Dopri5, GradientMode::None, &Options::default()).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Validation(ValidationError::UnexpectedEtas)
    ));
}

#[test]
fn trajectories_are_rejected_for_deterministic_methods() {
    let h = TimeOperator::constant(ops::sigmax()).unwrap();
    let psi0 = QuantumState::ket(ops::fock(2, 0).unwrap()).unwrap();
    let problem = Problem::new(h, psi0, vec![1.0]).with_trajectories(8);
    let err = solve(&problem, &Method::Dopri5, GradientMode::None, &Options::default()).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Validation(ValidationError::UnexpectedTrajectories)
    ));
}
