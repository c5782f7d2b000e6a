//! Error types for the core crate.

use thiserror::Error;

/// Errors produced by state and operator construction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Operator tensor is not square on its last two axes.
    #[error("operator must be square, got {rows} × {cols}")]
    NonSquareOperator {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },

    /// State tensor is neither a ket, a bra nor an operator.
    #[error("state shape ({rows}, {cols}) is neither a ket (n, 1), a bra (1, n) nor an operator (n, n)")]
    InvalidStateShape {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },

    /// Two tensors disagree on the Hilbert-space dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        got: usize,
    },

    /// Piecewise-constant operator with inconsistent grid lengths.
    #[error(
        "piecewise-constant operator needs len(times) == len(values) + 1, \
         got {n_times} times and {n_values} values"
    )]
    PwcLengthMismatch {
        /// Number of interval edges.
        n_times: usize,
        /// Number of interval values.
        n_values: usize,
    },

    /// Piecewise-constant interval edges out of order.
    #[error("piecewise-constant times must be strictly increasing")]
    PwcTimesNotIncreasing,

    /// Fock-state index beyond the truncated Hilbert space.
    #[error("Fock index {index} out of range for dimension {dim}")]
    FockOutOfRange {
        /// Requested Fock level.
        index: usize,
        /// Hilbert-space dimension.
        dim: usize,
    },

    /// The linear solve inside the matrix exponential hit a vanishing
    /// pivot.
    #[error("matrix exponential failed: singular Padé denominator")]
    SingularMatrix,
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
