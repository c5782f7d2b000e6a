//! Time-dependent operators.
//!
//! A [`TimeOperator`] is an operator-valued function of time, evaluable at
//! any `t` within the integration window:
//!
//! - **Constant** — a fixed (possibly batched) tensor
//! - **Callable** — an arbitrary user closure `t → tensor`
//! - **Pwc** — piecewise-constant modulation `c_k · A` on a time grid,
//!   the natural form for control pulses
//!
//! All variants evaluate to a batched `(b, n, n)` tensor of fixed shape.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, Array3, Axis};
use num_complex::Complex64;

use crate::error::{CoreError, CoreResult};
use crate::linalg::tile_lanes;

type TimeFn = dyn Fn(f64) -> Array3<Complex64> + Send + Sync;

/// A constant or time-dependent operator with a leading batch axis.
#[derive(Clone)]
pub enum TimeOperator {
    /// Fixed operator, shape `(b, n, n)`.
    Constant(Array3<Complex64>),
    /// Arbitrary time dependence. The closure must return the same shape
    /// for every `t`.
    Callable {
        /// The operator-valued function of time.
        f: Arc<TimeFn>,
        /// Shape `(b, n, n)` of the returned tensor, sampled at construction.
        shape: (usize, usize, usize),
    },
    /// Piecewise-constant modulation: `values[k] · op` on
    /// `[times[k], times[k+1])`, zero outside the grid.
    Pwc {
        /// Interval edges, strictly increasing, `len(values) + 1` entries.
        times: Vec<f64>,
        /// Complex modulation per interval.
        values: Vec<Complex64>,
        /// The modulated operator, shape `(b, n, n)`.
        op: Array3<Complex64>,
    },
}

impl TimeOperator {
    /// Constant operator from an unbatched `(n, n)` array.
    pub fn constant(op: Array2<Complex64>) -> CoreResult<Self> {
        let (rows, cols) = op.dim();
        if rows != cols {
            return Err(CoreError::NonSquareOperator { rows, cols });
        }
        Ok(Self::Constant(op.insert_axis(Axis(0))))
    }

    /// Constant operator from a batched `(b, n, n)` array.
    pub fn constant_batched(op: Array3<Complex64>) -> CoreResult<Self> {
        Self::check_square(&op)?;
        Ok(Self::Constant(op))
    }

    /// Time-dependent operator from a closure returning an unbatched
    /// `(n, n)` array.
    ///
    /// The closure is evaluated once at `t = 0` to fix the shape, so it must
    /// be evaluable there even when integration starts at a different
    /// time.
    pub fn from_fn(f: impl Fn(f64) -> Array2<Complex64> + Send + Sync + 'static) -> CoreResult<Self> {
        Self::from_fn_batched(move |t| f(t).insert_axis(Axis(0)))
    }

    /// Time-dependent operator from a closure returning a batched
    /// `(b, n, n)` array. The closure is evaluated at `t = 0` to fix the
    /// shape.
    pub fn from_fn_batched(
        f: impl Fn(f64) -> Array3<Complex64> + Send + Sync + 'static,
    ) -> CoreResult<Self> {
        let sample = f(0.0);
        Self::check_square(&sample)?;
        Ok(Self::Callable {
            f: Arc::new(f),
            shape: sample.dim(),
        })
    }

    /// Piecewise-constant operator `values[k] · op` on
    /// `[times[k], times[k+1])`.
    pub fn pwc(times: Vec<f64>, values: Vec<Complex64>, op: Array2<Complex64>) -> CoreResult<Self> {
        let (rows, cols) = op.dim();
        if rows != cols {
            return Err(CoreError::NonSquareOperator { rows, cols });
        }
        if times.len() != values.len() + 1 {
            return Err(CoreError::PwcLengthMismatch {
                n_times: times.len(),
                n_values: values.len(),
            });
        }
        if times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(CoreError::PwcTimesNotIncreasing);
        }
        Ok(Self::Pwc {
            times,
            values,
            op: op.insert_axis(Axis(0)),
        })
    }

    /// Evaluate the operator at time `t`, returning a `(b, n, n)` tensor.
    pub fn eval(&self, t: f64) -> Array3<Complex64> {
        match self {
            Self::Constant(op) => op.clone(),
            Self::Callable { f, .. } => f(t),
            Self::Pwc { times, values, op } => {
                // index of the interval containing t, or zero modulation
                // outside the grid
                let k = times.partition_point(|&edge| edge <= t);
                let coeff = if k == 0 || k == times.len() {
                    Complex64::new(0.0, 0.0)
                } else {
                    values[k - 1]
                };
                op.mapv(|z| z * coeff)
            }
        }
    }

    /// Hilbert-space dimension.
    pub fn dim(&self) -> usize {
        match self {
            Self::Constant(op) | Self::Pwc { op, .. } => op.len_of(Axis(1)),
            Self::Callable { shape, .. } => shape.1,
        }
    }

    /// Batch size.
    pub fn batch(&self) -> usize {
        match self {
            Self::Constant(op) | Self::Pwc { op, .. } => op.len_of(Axis(0)),
            Self::Callable { shape, .. } => shape.0,
        }
    }

    /// True for the constant variant.
    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    /// Repeat the batch axis `n` times, keeping every copy of lane `i` at
    /// output lane `rep · b + i`. A size-1 batch is left alone — it
    /// broadcasts against any batch size anyway.
    pub fn tile(&self, n: usize) -> Self {
        if n == 1 || self.batch() == 1 {
            return self.clone();
        }
        match self {
            Self::Constant(op) => Self::Constant(tile_lanes(op, n)),
            Self::Callable { f, shape } => {
                let f = Arc::clone(f);
                let (b, rows, cols) = *shape;
                Self::Callable {
                    f: Arc::new(move |t| tile_lanes(&f(t), n)),
                    shape: (n * b, rows, cols),
                }
            }
            Self::Pwc { times, values, op } => Self::Pwc {
                times: times.clone(),
                values: values.clone(),
                op: tile_lanes(op, n),
            },
        }
    }

    fn check_square(op: &Array3<Complex64>) -> CoreResult<()> {
        let (_, rows, cols) = op.dim();
        if rows != cols {
            return Err(CoreError::NonSquareOperator { rows, cols });
        }
        Ok(())
    }
}

impl fmt::Debug for TimeOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(op) => f.debug_tuple("Constant").field(&op.dim()).finish(),
            Self::Callable { shape, .. } => f.debug_struct("Callable").field("shape", shape).finish(),
            Self::Pwc { times, op, .. } => f
                .debug_struct("Pwc")
                .field("n_intervals", &(times.len() - 1))
                .field("shape", &op.dim())
                .finish(),
        }
    }
}
