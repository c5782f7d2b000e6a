//! Error types for the solver crate.

use solvay_core::CoreError;
use thiserror::Error;

/// Malformed input detected before any integration step.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// No save times supplied.
    #[error("save times must be non-empty")]
    EmptySaveTimes,

    /// Save times out of order.
    #[error("save times must be strictly increasing: tsave[{index}] = {value} follows {previous}")]
    SaveTimesNotIncreasing {
        /// Index of the offending entry.
        index: usize,
        /// The offending value.
        value: f64,
        /// The preceding value.
        previous: f64,
    },

    /// First save time precedes the integration start.
    #[error("save times must be ≥ t0 = {t0}, got tsave[0] = {first}")]
    SaveTimeBeforeStart {
        /// Integration start time.
        t0: f64,
        /// First requested save time.
        first: f64,
    },

    /// Operator and state disagree on the Hilbert-space dimension.
    #[error("operator dimension {op_dim} does not match state dimension {state_dim}")]
    DimensionMismatch {
        /// Operator dimension.
        op_dim: usize,
        /// State dimension.
        state_dim: usize,
    },

    /// Batch sizes cannot be broadcast to a common size.
    #[error("batch sizes must be 1 or all equal, got {sizes:?}")]
    BatchMismatch {
        /// The observed batch sizes of H, the state, the jump operators
        /// and any declared parameter derivatives.
        sizes: Vec<usize>,
    },

    /// Tolerances must be strictly positive.
    #[error("tolerances must be positive, got atol = {atol}, rtol = {rtol}")]
    InvalidTolerance {
        /// Absolute tolerance.
        atol: f64,
        /// Relative tolerance.
        rtol: f64,
    },

    /// Step budget must allow at least one step.
    #[error("max_steps must be at least 1")]
    InvalidMaxSteps,

    /// Fixed-step methods need a positive step size.
    #[error("fixed step size must be positive and finite, got dt = {dt}")]
    InvalidStepSize {
        /// The offending step size.
        dt: f64,
    },

    /// The initial state must evolve forward, not sideways.
    #[error("initial state must be a ket or a density matrix, not a bra")]
    BraInitialState,

    /// Method/equation mismatch.
    #[error("method {method} does not apply to {equation} evolution")]
    UnsupportedMethod {
        /// Name of the requested method.
        method: String,
        /// Name of the selected equation family.
        equation: String,
    },

    /// The stochastic master equation needs at least one jump operator.
    #[error("the stochastic master equation requires at least one jump operator")]
    MissingJumpOps,

    /// Measurement efficiencies supplied without a stochastic method.
    #[error("measurement efficiencies only apply to the stochastic master equation")]
    UnexpectedEtas,

    /// Efficiency list does not line up with the jump operators.
    #[error("got {n_etas} measurement efficiencies for {n_ops} jump operators")]
    EtasLengthMismatch {
        /// Number of efficiencies.
        n_etas: usize,
        /// Number of jump operators.
        n_ops: usize,
    },

    /// Efficiency outside the physical range.
    #[error("measurement efficiencies must lie in [0, 1], got {value}")]
    EtaOutOfRange {
        /// The offending efficiency.
        value: f64,
    },

    /// All-zero efficiencies describe deterministic evolution.
    #[error("all measurement efficiencies are zero — use a deterministic method instead")]
    AllEtasZero,

    /// Trajectory count must be positive.
    #[error("number of trajectories must be at least 1")]
    InvalidTrajectories,

    /// Multiple trajectories without a stochastic method.
    #[error("multiple trajectories only apply to the stochastic master equation")]
    UnexpectedTrajectories,

    /// A gradient mode was requested without declared parameters.
    #[error("gradient mode {mode} requires declared parameters")]
    MissingParameters {
        /// Name of the requested gradient mode.
        mode: String,
    },

    /// Gradients target expectation values, so observables are required.
    #[error("gradient computation requires at least one observable in exp_ops")]
    NoObservables,

    /// Gradients are only defined for the ODE-driven deterministic
    /// methods.
    #[error("gradients are not supported for the {method} method")]
    GradientUnsupported {
        /// Name of the requested method.
        method: String,
    },

    /// The propagator method exponentiates one fixed generator.
    #[error("the propagator method requires constant operators")]
    TimeDependentPropagator,

    /// A parameter declares the wrong number of jump-operator derivatives.
    #[error("parameter {index} declares {got} jump-operator derivatives, expected {expected}")]
    ParameterShapeMismatch {
        /// Parameter index.
        index: usize,
        /// Declared derivative count.
        got: usize,
        /// Number of jump operators.
        expected: usize,
    },
}

/// Errors surfaced by a solve call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SolveError {
    /// Input rejected before any numerical work.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// State or operator construction failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The adaptive loop exhausted its step budget.
    #[error("step budget exceeded: {max_steps} steps taken without reaching t = {t}")]
    StepBudgetExceeded {
        /// The configured budget.
        max_steps: usize,
        /// Time reached when the budget ran out.
        t: f64,
    },

    /// A step produced NaN or Inf in the state.
    #[error("state became non-finite at t = {t}")]
    NonFiniteState {
        /// Time of the offending step.
        t: f64,
    },

    /// Gradient computation failed; wraps the originating error.
    #[error("gradient computation failed: {0}")]
    Gradient(#[source] Box<SolveError>),
}

impl SolveError {
    /// True for errors raised by input validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Convenience alias for solver results.
pub type SolveResult<T> = Result<T, SolveError>;
