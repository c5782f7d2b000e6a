//! `solvay-core` — batched quantum states and time-dependent operators.
//!
//! Foundation types for the Solvay quantum-dynamics solvers:
//!
//! - [`QuantumState`] — batched kets / bras / density matrices with
//!   semantic tagging and invariant helpers (norm, trace, hermitization)
//! - [`TimeOperator`] — constant, callable or piecewise-constant
//!   operator-valued functions of time
//! - [`linalg`] — the batched complex linear-algebra primitives the
//!   solver layer is built on
//! - [`ops`] — construction utilities for the usual cavity/qubit
//!   operators and states
//!
//! # Quick start
//!
//! ```rust
//! use num_complex::Complex64;
//! use solvay_core::{QuantumState, TimeOperator, ops};
//!
//! // A detuned cavity Hamiltonian H = δ a†a on 8 Fock levels.
//! let h = TimeOperator::constant(ops::number(8).mapv(|z| z * 2.0)).unwrap();
//!
//! // A coherent state |α = 0.5⟩ as the initial ket.
//! let psi0 = QuantumState::ket(ops::coherent(8, Complex64::new(0.5, 0.0))).unwrap();
//!
//! assert_eq!(h.dim(), 8);
//! assert_eq!(psi0.dim(), 8);
//! assert!((psi0.norm()[0] - 1.0).abs() < 1e-12);
//! ```

pub mod error;
pub mod expm;
pub mod linalg;
pub mod operator;
pub mod ops;
pub mod state;

pub use error::{CoreError, CoreResult};
pub use expm::expm;
pub use operator::TimeOperator;
pub use state::{QuantumState, StateKind};
