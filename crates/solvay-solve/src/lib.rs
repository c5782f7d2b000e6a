//! Solvay solvers
//!
//! Time evolution of closed and open quantum systems, with gradients of
//! final-time expectation values.
//!
//! # Overview
//!
//! A [`Problem`] bundles a Hamiltonian, an initial state and the save
//! times; [`solve`] infers the equation family from the inputs:
//!
//! | Inputs | Equation |
//! |--------|----------|
//! | ket, no jump operators | Schrödinger |
//! | density matrix, or any jump operators | Lindblad master equation |
//! | [`Method::EulerMaruyama`] with efficiencies | diffusive stochastic master equation |
//!
//! Deterministic evolution defaults to adaptive Dormand–Prince 5(4);
//! fixed-step Euler and RK4 are available for cross-checks, and
//! [`Method::Propagator`] exponentiates constant generators exactly.
//! Everything is batched along a leading axis, with size-1 operands
//! broadcast.
//!
//! # Example
//!
//! ```ignore
//! use ndarray::Array2;
//! use num_complex::Complex64;
//! use solvay_core::{ops, QuantumState, TimeOperator};
//! use solvay_solve::{solve, GradientMode, Method, Options, Problem};
//!
//! fn main() -> Result<(), solvay_solve::SolveError> {
//!     // Rabi oscillation of a qubit driven on resonance.
//!     let h = TimeOperator::constant(ops::sigmax().mapv(|z| z * 0.5))?;
//!     let psi0 = QuantumState::ket(ops::fock(2, 0)?)?;
//!     let tsave: Vec<f64> = (0..=20).map(|k| k as f64 * 0.1).collect();
//!
//!     let problem = Problem::new(h, psi0, tsave).with_exp_ops(vec![ops::sigmaz()]);
//!     let solution = solve(&problem, &Method::Dopri5, GradientMode::None, &Options::default())?;
//!
//!     println!("⟨σz⟩(T) = {}", solution.expects.unwrap()[[0, 0, 20]].re);
//!     Ok(())
//! }
//! ```
//!
//! # Gradients
//!
//! Declaring operator derivatives through [`Parameters`] and passing
//! [`GradientMode::Sensitivity`] or [`GradientMode::Adjoint`] computes
//! d⟨E⟩/dθ at the final save time for every observable. Sensitivity
//! differentiates through the forward pass; the adjoint method trades a
//! backward re-integration for memory independent of the parameter
//! count.

mod batch;
mod equation;
mod error;
mod gradient;
mod integrate;
mod ode;
mod options;
mod progress;
mod propagator;
mod result;
mod sme;
mod solve;
mod stepper;

pub use error::{SolveError, SolveResult, ValidationError};
pub use gradient::{Parameter, Parameters};
pub use options::{GradientMode, Method, Options};
pub use progress::{NullProgress, Progress, TracingProgress};
pub use result::Solution;
pub use solve::{Problem, solve, solve_with_observer};
