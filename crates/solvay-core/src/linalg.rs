//! Batched complex linear algebra on `Array3` tensors.
//!
//! Every tensor carries a leading batch axis: an operator batch has shape
//! `(b, n, n)`, a ket batch `(b, n, 1)`. A batch of size 1 broadcasts
//! against any other batch size, trailing axes must match exactly.
//!
//! These helpers are the only tensor-engine primitives the solver layer
//! relies on.

use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use num_complex::Complex64;

/// Conjugate transpose of a single operator.
pub fn dag(m: &ArrayView2<'_, Complex64>) -> Array2<Complex64> {
    m.t().mapv(|z| z.conj())
}

/// Conjugate transpose of every batch lane.
pub fn dag_batched(m: &Array3<Complex64>) -> Array3<Complex64> {
    m.view().permuted_axes([0, 2, 1]).mapv(|z| z.conj())
}

/// Batched matrix product `a @ b` with size-1 broadcast on the batch axis.
///
/// # Panics
/// Panics if the batch sizes are incompatible or the inner dimensions do
/// not match; shapes are validated at the solve-call boundary.
pub fn bmm(a: &Array3<Complex64>, b: &Array3<Complex64>) -> Array3<Complex64> {
    let ba = a.len_of(Axis(0));
    let bb = b.len_of(Axis(0));
    assert!(
        ba == bb || ba == 1 || bb == 1,
        "incompatible batch sizes {ba} and {bb}"
    );
    let batch = ba.max(bb);
    let rows = a.len_of(Axis(1));
    let cols = b.len_of(Axis(2));

    let mut out = Array3::zeros((batch, rows, cols));
    for i in 0..batch {
        let ai = a.index_axis(Axis(0), if ba == 1 { 0 } else { i });
        let bi = b.index_axis(Axis(0), if bb == 1 { 0 } else { i });
        out.index_axis_mut(Axis(0), i).assign(&ai.dot(&bi));
    }
    out
}

/// Trace of a single operator.
pub fn trace(m: &ArrayView2<'_, Complex64>) -> Complex64 {
    m.diag().sum()
}

/// Trace of every batch lane.
pub fn trace_batched(m: &Array3<Complex64>) -> Array1<Complex64> {
    let lanes = m.len_of(Axis(0));
    Array1::from_iter((0..lanes).map(|i| trace(&m.index_axis(Axis(0), i))))
}

/// True if every element of every lane is finite.
pub fn all_finite(m: &Array3<Complex64>) -> bool {
    m.iter().all(|z| z.re.is_finite() && z.im.is_finite())
}

/// Repeat the batch axis `n` times: lane `rep · b + i` of the output
/// holds copy `rep` of input lane `i`.
pub fn tile_lanes(m: &Array3<Complex64>, n: usize) -> Array3<Complex64> {
    if n == 1 {
        return m.clone();
    }
    let (b, r, c) = m.dim();
    let mut out = Array3::zeros((n * b, r, c));
    for rep in 0..n {
        for i in 0..b {
            out.index_axis_mut(Axis(0), rep * b + i)
                .assign(&m.index_axis(Axis(0), i));
        }
    }
    out
}
