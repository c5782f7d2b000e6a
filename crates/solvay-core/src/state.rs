//! Batched quantum states with semantic tagging.
//!
//! A [`QuantumState`] wraps an `Array3<Complex64>` whose leading axis is
//! the batch axis, together with a [`StateKind`] tag:
//!
//! - kets have shape `(b, n, 1)`
//! - bras have shape `(b, 1, n)`
//! - operators (density matrices among them) have shape `(b, n, n)`
//!
//! The tag is what lets downstream code pick the right formula for norms,
//! expectation values and adjoints without re-deriving the layout from the
//! shape (which is ambiguous for n = 1).

use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use num_complex::Complex64;

use crate::error::{CoreError, CoreResult};
use crate::linalg::{all_finite, bmm, dag_batched, trace};

/// Semantic role of a state tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// Column vector |ψ⟩, shape `(b, n, 1)`.
    Ket,
    /// Row vector ⟨ψ|, shape `(b, 1, n)`.
    Bra,
    /// Square operator (e.g. a density matrix), shape `(b, n, n)`.
    Operator,
}

/// A batched state vector or density matrix.
#[derive(Debug, Clone)]
pub struct QuantumState {
    data: Array3<Complex64>,
    kind: StateKind,
}

impl QuantumState {
    /// Wrap a batched tensor with an explicit kind, validating the shape.
    pub fn new(data: Array3<Complex64>, kind: StateKind) -> CoreResult<Self> {
        let (_, rows, cols) = data.dim();
        let ok = match kind {
            StateKind::Ket => cols == 1,
            StateKind::Bra => rows == 1,
            StateKind::Operator => rows == cols,
        };
        if !ok {
            return Err(CoreError::InvalidStateShape { rows, cols });
        }
        Ok(Self { data, kind })
    }

    /// Build a single (unbatched) ket from an `(n, 1)` array.
    pub fn ket(psi: Array2<Complex64>) -> CoreResult<Self> {
        Self::new(insert_batch_axis(psi), StateKind::Ket)
    }

    /// Build a batched ket from a `(b, n, 1)` array.
    pub fn ket_batched(psi: Array3<Complex64>) -> CoreResult<Self> {
        Self::new(psi, StateKind::Ket)
    }

    /// Build a single (unbatched) density matrix from an `(n, n)` array.
    pub fn density_matrix(rho: Array2<Complex64>) -> CoreResult<Self> {
        let (rows, cols) = rho.dim();
        if rows != cols {
            return Err(CoreError::NonSquareOperator { rows, cols });
        }
        Self::new(insert_batch_axis(rho), StateKind::Operator)
    }

    /// Build a batched density matrix from a `(b, n, n)` array.
    pub fn density_matrix_batched(rho: Array3<Complex64>) -> CoreResult<Self> {
        let (_, rows, cols) = rho.dim();
        if rows != cols {
            return Err(CoreError::NonSquareOperator { rows, cols });
        }
        Self::new(rho, StateKind::Operator)
    }

    /// The semantic tag.
    pub fn kind(&self) -> StateKind {
        self.kind
    }

    /// The underlying batched tensor.
    pub fn data(&self) -> &Array3<Complex64> {
        &self.data
    }

    /// Consume and return the underlying batched tensor.
    pub fn into_data(self) -> Array3<Complex64> {
        self.data
    }

    /// Batch size.
    pub fn batch(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Hilbert-space dimension.
    pub fn dim(&self) -> usize {
        match self.kind {
            StateKind::Bra => self.data.len_of(Axis(2)),
            StateKind::Ket | StateKind::Operator => self.data.len_of(Axis(1)),
        }
    }

    /// Hermitian adjoint: ket ↔ bra, operator → operator†.
    pub fn dag(&self) -> Self {
        let kind = match self.kind {
            StateKind::Ket => StateKind::Bra,
            StateKind::Bra => StateKind::Ket,
            StateKind::Operator => StateKind::Operator,
        };
        Self {
            data: dag_batched(&self.data),
            kind,
        }
    }

    /// Per-lane ℓ² norm (kets and bras) or trace norm proxy √tr(ρ†ρ)
    /// (operators).
    pub fn norm(&self) -> Array1<f64> {
        let lanes = self.batch();
        Array1::from_iter((0..lanes).map(|i| {
            self.data
                .index_axis(Axis(0), i)
                .iter()
                .map(|z| z.norm_sqr())
                .sum::<f64>()
                .sqrt()
        }))
    }

    /// Per-lane trace. Only meaningful for operators.
    pub fn trace(&self) -> Array1<Complex64> {
        let lanes = self.batch();
        Array1::from_iter((0..lanes).map(|i| trace(&self.data.index_axis(Axis(0), i))))
    }

    /// Outer product |ψ⟩⟨ψ| of every lane. Operators pass through
    /// unchanged.
    pub fn to_density_matrix(&self) -> Self {
        match self.kind {
            StateKind::Operator => self.clone(),
            StateKind::Ket => {
                let bra = dag_batched(&self.data);
                Self {
                    data: bmm(&self.data, &bra),
                    kind: StateKind::Operator,
                }
            }
            StateKind::Bra => {
                let ket = dag_batched(&self.data);
                Self {
                    data: bmm(&ket, &self.data),
                    kind: StateKind::Operator,
                }
            }
        }
    }

    /// Restore exact hermiticity: ρ ← (ρ + ρ†)/2 on every lane.
    ///
    /// No-op for kets and bras.
    pub fn hermitize(&mut self) {
        if self.kind != StateKind::Operator {
            return;
        }
        hermitize_lanes(&mut self.data);
    }

    /// True if every element of every lane is finite.
    pub fn is_finite(&self) -> bool {
        all_finite(&self.data)
    }

    /// Per-lane expectation value of a Hermitian observable:
    /// ⟨ψ|E|ψ⟩ for kets, tr(Eρ) for operators.
    pub fn expect(&self, op: &ArrayView2<'_, Complex64>) -> Array1<Complex64> {
        expect_lanes(&self.data, self.kind, op)
    }
}

/// Per-lane expectation value on a raw batched tensor, without wrapping
/// it in a [`QuantumState`] first.
pub fn expect_lanes(
    data: &Array3<Complex64>,
    kind: StateKind,
    op: &ArrayView2<'_, Complex64>,
) -> Array1<Complex64> {
    let lanes = data.len_of(Axis(0));
    Array1::from_iter((0..lanes).map(|i| {
        let lane = data.index_axis(Axis(0), i);
        match kind {
            StateKind::Ket => {
                let e_psi = op.dot(&lane);
                lane.iter()
                    .zip(e_psi.iter())
                    .map(|(p, ep)| p.conj() * ep)
                    .sum()
            }
            StateKind::Bra => {
                let ket = lane.t().mapv(|z| z.conj());
                let e_psi = op.dot(&ket);
                ket.iter()
                    .zip(e_psi.iter())
                    .map(|(p, ep)| p.conj() * ep)
                    .sum()
            }
            StateKind::Operator => trace(&op.dot(&lane).view()),
        }
    }))
}

/// In-place ρ ← (ρ + ρ†)/2 on every lane of a batched operator tensor.
pub fn hermitize_lanes(m: &mut Array3<Complex64>) {
    let sym = dag_batched(m);
    m.zip_mut_with(&sym, |a, b| *a = (*a + b) * 0.5);
}

// `insert_axis` is layout-agnostic; a reshape would reject arrays that
// are not in standard layout (e.g. anything built through `dag`).
fn insert_batch_axis(m: Array2<Complex64>) -> Array3<Complex64> {
    m.insert_axis(Axis(0))
}
