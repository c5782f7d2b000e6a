//! Solver configuration.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Integration method.
///
/// [`Method::Dopri5`] drives the deterministic equations with adaptive
/// step control; the fixed-step variants exist for stochastic evolution
/// (where strong convergence order beats adaptivity) and for testing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Method {
    /// Embedded Dormand–Prince 5(4), adaptive step size.
    Dopri5,
    /// Explicit Euler with fixed step size.
    Euler {
        /// Step size.
        dt: f64,
    },
    /// Classical 4th-order Runge–Kutta with fixed step size.
    Rk4 {
        /// Step size.
        dt: f64,
    },
    /// Euler–Maruyama for the diffusive stochastic master equation.
    EulerMaruyama {
        /// Step size.
        dt: f64,
    },
    /// Exact propagation by matrix exponential, one exponential per save
    /// interval. Requires constant operators; for open systems the
    /// Lindbladian is exponentiated in Liouville space, so the cost grows
    /// as dim⁶ per interval.
    Propagator,
}

impl Method {
    /// Human-readable method name, recorded on the solution.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dopri5 => "dopri5",
            Self::Euler { .. } => "euler",
            Self::Rk4 { .. } => "rk4",
            Self::EulerMaruyama { .. } => "euler-maruyama",
            Self::Propagator => "propagator",
        }
    }

    /// True for the stochastic method.
    pub fn is_stochastic(&self) -> bool {
        matches!(self, Self::EulerMaruyama { .. })
    }

    /// The fixed step size, if this is a fixed-step method.
    pub fn fixed_dt(&self) -> Option<f64> {
        match self {
            Self::Dopri5 | Self::Propagator => None,
            Self::Euler { dt } | Self::Rk4 { dt } | Self::EulerMaruyama { dt } => Some(*dt),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if let Some(dt) = self.fixed_dt() {
            if !(dt.is_finite() && dt > 0.0) {
                return Err(ValidationError::InvalidStepSize { dt });
            }
        }
        Ok(())
    }
}

/// How gradients of final-time expectation values are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradientMode {
    /// No gradient computation.
    None,
    /// Forward sensitivity: carry one sensitivity tensor per parameter
    /// through the forward pass. Memory grows with parameter count.
    Sensitivity,
    /// Adjoint state method: re-integrate the forward equation backward
    /// in time alongside the adjoint equation. Memory is O(1) in the
    /// trajectory length at the cost of a second pass.
    Adjoint,
}

impl GradientMode {
    /// Human-readable mode name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sensitivity => "sensitivity",
            Self::Adjoint => "adjoint",
        }
    }
}

/// Shared solver options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Absolute tolerance for adaptive step control.
    pub atol: f64,
    /// Relative tolerance for adaptive step control.
    pub rtol: f64,
    /// Hard cap on attempted steps (accepted + rejected) per pass.
    pub max_steps: usize,
    /// Emit progress through the default tracing observer.
    pub verbose: bool,
    /// Retain the state at every save time; when false only the final
    /// state is kept.
    pub save_states: bool,
    /// Integration start time.
    pub t0: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            atol: 1e-8,
            rtol: 1e-6,
            max_steps: 100_000,
            verbose: false,
            save_states: true,
            t0: 0.0,
        }
    }
}

impl Options {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if !(self.atol > 0.0 && self.rtol > 0.0 && self.atol.is_finite() && self.rtol.is_finite()) {
            return Err(ValidationError::InvalidTolerance {
                atol: self.atol,
                rtol: self.rtol,
            });
        }
        if self.max_steps == 0 {
            return Err(ValidationError::InvalidMaxSteps);
        }
        Ok(())
    }
}
