//! Solve output container.

use chrono::{DateTime, Utc};
use ndarray::Array3;
use num_complex::Complex64;

use solvay_core::QuantumState;

use crate::options::GradientMode;

/// Everything a solve call produced. Fields are public and read-only by
/// convention; the solver never hands out a partially filled solution.
#[derive(Debug, Clone)]
pub struct Solution {
    /// The save times the solve was asked for.
    pub tsave: Vec<f64>,
    /// State at every save time, when `save_states` was set.
    pub states: Option<Vec<QuantumState>>,
    /// State at the final save time, always present.
    pub final_state: QuantumState,
    /// Expectation values, shape `(batch, n_observables, n_tsave)`, when
    /// observables were supplied.
    pub expects: Option<Array3<Complex64>>,
    /// Time-averaged measurement records for the stochastic master
    /// equation, shape `(batch, n_channels, n_records)` with one record
    /// per positive-width interval between consecutive stop points of
    /// {t0} ∪ tsave.
    pub measurements: Option<Array3<f64>>,
    /// Gradients of the final-time expectation values, shape
    /// `(batch, n_observables, n_params)`.
    pub gradients: Option<Array3<f64>>,
    /// Name of the integration method used.
    pub method: String,
    /// Gradient mode the solve ran with.
    pub gradient_mode: GradientMode,
    /// Wall-clock start of the solve.
    pub start: DateTime<Utc>,
    /// Wall-clock end of the solve.
    pub end: DateTime<Utc>,
    /// Accepted steps across all passes.
    pub n_accepted: usize,
    /// Rejected steps across all passes.
    pub n_rejected: usize,
}

impl Solution {
    /// Wall-clock duration of the solve.
    pub fn elapsed(&self) -> chrono::Duration {
        self.end - self.start
    }
}
