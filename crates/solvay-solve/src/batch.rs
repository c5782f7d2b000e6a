//! Batch-axis broadcasting.
//!
//! Every operator and state carries a leading batch axis. Sizes are
//! reconciled once at the solve-call boundary: each size must be 1
//! (broadcast) or equal to the common size.

use ndarray::{Array3, Axis};
use num_complex::Complex64;

use crate::error::ValidationError;

/// Reconcile a set of batch sizes into the common size, or reject.
pub(crate) fn common_batch(sizes: &[usize]) -> Result<usize, ValidationError> {
    let mut common = 1;
    for &s in sizes {
        if s == 1 || s == common {
            common = common.max(s);
        } else if common == 1 {
            common = s;
        } else {
            return Err(ValidationError::BatchMismatch {
                sizes: sizes.to_vec(),
            });
        }
    }
    Ok(common)
}

/// Tile a size-1 batch axis up to `batch` lanes; full-size input passes
/// through unchanged.
pub(crate) fn expand_lanes(a: &Array3<Complex64>, batch: usize) -> Array3<Complex64> {
    if a.len_of(Axis(0)) == batch {
        return a.clone();
    }
    debug_assert_eq!(a.len_of(Axis(0)), 1);
    let (_, r, c) = a.dim();
    let mut out = Array3::zeros((batch, r, c));
    let lane = a.index_axis(Axis(0), 0);
    for i in 0..batch {
        out.index_axis_mut(Axis(0), i).assign(&lane);
    }
    out
}
