//! Operator and state construction utilities.
//!
//! Boundary helpers for building the usual suspects of cavity and qubit
//! physics: ladder operators, Pauli matrices, Fock and coherent states.
//! Pure data construction — all solver-side algebra lives elsewhere.

use ndarray::Array2;
use num_complex::Complex64;

use crate::error::{CoreError, CoreResult};
use crate::linalg::dag;

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

/// Identity operator of dimension `dim`.
pub fn eye(dim: usize) -> Array2<Complex64> {
    Array2::eye(dim)
}

/// Bosonic annihilation operator on a `dim`-level truncated Fock space:
/// a|n⟩ = √n |n−1⟩.
pub fn destroy(dim: usize) -> Array2<Complex64> {
    let mut a = Array2::zeros((dim, dim));
    for n in 1..dim {
        a[[n - 1, n]] = c((n as f64).sqrt(), 0.0);
    }
    a
}

/// Bosonic creation operator a†.
pub fn create(dim: usize) -> Array2<Complex64> {
    dag(&destroy(dim).view())
}

/// Number operator a†a = diag(0, 1, …, dim−1).
pub fn number(dim: usize) -> Array2<Complex64> {
    Array2::from_diag(&ndarray::Array1::from_iter(
        (0..dim).map(|n| c(n as f64, 0.0)),
    ))
}

/// Pauli X.
pub fn sigmax() -> Array2<Complex64> {
    ndarray::array![[c(0.0, 0.0), c(1.0, 0.0)], [c(1.0, 0.0), c(0.0, 0.0)]]
}

/// Pauli Y.
pub fn sigmay() -> Array2<Complex64> {
    ndarray::array![[c(0.0, 0.0), c(0.0, -1.0)], [c(0.0, 1.0), c(0.0, 0.0)]]
}

/// Pauli Z, convention σz = diag(1, −1) with |0⟩ the +1 eigenstate.
pub fn sigmaz() -> Array2<Complex64> {
    ndarray::array![[c(1.0, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(-1.0, 0.0)]]
}

/// Qubit lowering operator σ⁻ = |0⟩⟨1|.
pub fn sigmam() -> Array2<Complex64> {
    ndarray::array![[c(0.0, 0.0), c(1.0, 0.0)], [c(0.0, 0.0), c(0.0, 0.0)]]
}

/// Qubit raising operator σ⁺ = |1⟩⟨0|.
pub fn sigmap() -> Array2<Complex64> {
    ndarray::array![[c(0.0, 0.0), c(0.0, 0.0)], [c(1.0, 0.0), c(0.0, 0.0)]]
}

/// Fock state |n⟩ as an `(dim, 1)` column vector.
pub fn fock(dim: usize, n: usize) -> CoreResult<Array2<Complex64>> {
    if n >= dim {
        return Err(CoreError::FockOutOfRange { index: n, dim });
    }
    let mut psi = Array2::zeros((dim, 1));
    psi[[n, 0]] = c(1.0, 0.0);
    Ok(psi)
}

/// Fock state density matrix |n⟩⟨n|.
pub fn fock_dm(dim: usize, n: usize) -> CoreResult<Array2<Complex64>> {
    if n >= dim {
        return Err(CoreError::FockOutOfRange { index: n, dim });
    }
    let mut rho = Array2::zeros((dim, dim));
    rho[[n, n]] = c(1.0, 0.0);
    Ok(rho)
}

/// Coherent state |α⟩ truncated to `dim` levels.
///
/// Built from the Fock-basis series αⁿ/√(n!) and renormalised to unit
/// norm, so truncation does not leak into norm-preservation checks.
pub fn coherent(dim: usize, alpha: Complex64) -> Array2<Complex64> {
    let mut psi = Array2::zeros((dim, 1));
    let mut amp = c(1.0, 0.0);
    for n in 0..dim {
        if n > 0 {
            amp *= alpha / c((n as f64).sqrt(), 0.0);
        }
        psi[[n, 0]] = amp;
    }
    let norm = psi.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
    psi.mapv(|z| z / norm)
}

/// Coherent state density matrix |α⟩⟨α|.
pub fn coherent_dm(dim: usize, alpha: Complex64) -> Array2<Complex64> {
    let psi = coherent(dim, alpha);
    let bra = dag(&psi.view());
    psi.dot(&bra)
}
