//! Right-hand sides of the deterministic evolution equations.
//!
//! Schrödinger: dψ/dt = −i H(t) ψ
//!
//! Lindblad:    dρ/dt = −i[H(t), ρ] + Σ_k D[L_k(t)](ρ)
//!              D[L](ρ) = L ρ L† − ½ L†L ρ − ½ ρ L†L
//!
//! Both generators are linear in the state, which the gradient engines
//! exploit: ∂f/∂y applied to a sensitivity tensor is just the RHS itself,
//! and the adjoint generator has a closed Heisenberg-picture form.
//!
//! Ref: Breuer & Petruccione, "The Theory of Open Quantum Systems"
//! (2002), Ch. 3.

use ndarray::{Array3, ArrayView2, Axis};
use num_complex::Complex64;

use solvay_core::TimeOperator;
use solvay_core::linalg::{bmm, dag_batched};
use solvay_core::state::hermitize_lanes;

use crate::gradient::Parameter;

const I: Complex64 = Complex64::new(0.0, 1.0);

/// A deterministic evolution equation, fixed for the whole solve call.
pub(crate) trait Equation {
    /// dS/dt = f(t, S).
    fn rhs(&self, t: f64, y: &Array3<Complex64>) -> Array3<Complex64>;

    /// Restore invariants after an accepted step (hermitize density
    /// matrices); default no-op.
    fn project(&self, _y: &mut Array3<Complex64>) {}

    /// Forward-time adjoint equation dλ/dt = −(∂f/∂S)† λ.
    fn adjoint_rhs(&self, t: f64, lambda: &Array3<Complex64>) -> Array3<Complex64>;

    /// Parameter derivative ∂f/∂θ evaluated at (t, S) for one declared
    /// parameter.
    fn param_rhs(&self, t: f64, y: &Array3<Complex64>, p: &Parameter) -> Array3<Complex64>;

    /// Terminal adjoint λ(tf) seeding the gradient of ⟨E⟩ at the final
    /// save time.
    fn adjoint_seed(
        &self,
        observable: &ArrayView2<'_, Complex64>,
        y_final: &Array3<Complex64>,
    ) -> Array3<Complex64>;

    /// Weight of Re⟨λ, ∂f/∂θ⟩ in the gradient accumulation: 2 for kets
    /// (the expectation is a sesquilinear form in ψ), 1 for density
    /// matrices.
    fn grad_weight(&self) -> f64;
}

// ---------------------------------------------------------------------------
// Schrödinger
// ---------------------------------------------------------------------------

/// Unitary ket evolution dψ/dt = −i H(t) ψ.
pub(crate) struct Schrodinger {
    pub h: TimeOperator,
}

impl Equation for Schrodinger {
    fn rhs(&self, t: f64, y: &Array3<Complex64>) -> Array3<Complex64> {
        let ht = self.h.eval(t);
        bmm(&ht, y).mapv(|z| z * -I)
    }

    fn adjoint_rhs(&self, t: f64, lambda: &Array3<Complex64>) -> Array3<Complex64> {
        // For Hermitian H the adjoint ket obeys the Schrödinger equation
        // itself: −(−iH)†λ = −iHλ.
        self.rhs(t, lambda)
    }

    fn param_rhs(&self, t: f64, y: &Array3<Complex64>, p: &Parameter) -> Array3<Complex64> {
        match &p.dh {
            Some(dh) => bmm(&dh.eval(t), y).mapv(|z| z * -I),
            None => Array3::zeros(y.raw_dim()),
        }
    }

    fn adjoint_seed(
        &self,
        observable: &ArrayView2<'_, Complex64>,
        y_final: &Array3<Complex64>,
    ) -> Array3<Complex64> {
        // λ(tf) = E ψ(tf), lane by lane. `insert_axis` tolerates any
        // memory layout of the observable.
        let e = observable.to_owned().insert_axis(Axis(0));
        bmm(&e, y_final)
    }

    fn grad_weight(&self) -> f64 {
        2.0
    }
}

// ---------------------------------------------------------------------------
// Lindblad
// ---------------------------------------------------------------------------

/// Open-system density-matrix evolution under the Lindblad master
/// equation. With no jump operators this reduces to the von Neumann
/// equation.
pub(crate) struct Lindblad {
    pub h: TimeOperator,
    pub jump_ops: Vec<TimeOperator>,
}

impl Lindblad {
    /// −i[H(t), ρ]
    fn commutator_term(&self, t: f64, rho: &Array3<Complex64>) -> Array3<Complex64> {
        let ht = self.h.eval(t);
        let mut out = bmm(&ht, rho);
        out.add_assign_scaled(&bmm(rho, &ht), -1.0);
        out.mapv(|z| z * -I)
    }
}

impl Equation for Lindblad {
    fn rhs(&self, t: f64, rho: &Array3<Complex64>) -> Array3<Complex64> {
        let mut out = self.commutator_term(t, rho);
        for l_op in &self.jump_ops {
            let l = l_op.eval(t);
            let ld = dag_batched(&l);
            let ldl = bmm(&ld, &l);
            // L ρ L† − ½ L†L ρ − ½ ρ L†L
            out += &bmm(&bmm(&l, rho), &ld);
            out.add_assign_scaled(&bmm(&ldl, rho), -0.5);
            out.add_assign_scaled(&bmm(rho, &ldl), -0.5);
        }
        out
    }

    fn project(&self, rho: &mut Array3<Complex64>) {
        hermitize_lanes(rho);
    }

    fn adjoint_rhs(&self, t: f64, lambda: &Array3<Complex64>) -> Array3<Complex64> {
        // dλ/dt = −L†(λ) with the Heisenberg-picture generator
        //   L†(λ) = i[H, λ] + Σ_k (L† λ L − ½{L†L, λ})
        let ht = self.h.eval(t);
        let mut acc = bmm(&ht, lambda);
        acc.add_assign_scaled(&bmm(lambda, &ht), -1.0);
        let mut acc = acc.mapv(|z| z * I);
        for l_op in &self.jump_ops {
            let l = l_op.eval(t);
            let ld = dag_batched(&l);
            let ldl = bmm(&ld, &l);
            acc += &bmm(&bmm(&ld, lambda), &l);
            acc.add_assign_scaled(&bmm(&ldl, lambda), -0.5);
            acc.add_assign_scaled(&bmm(lambda, &ldl), -0.5);
        }
        acc.mapv(|z| -z)
    }

    fn param_rhs(&self, t: f64, rho: &Array3<Complex64>, p: &Parameter) -> Array3<Complex64> {
        let mut out = match &p.dh {
            Some(dh) => {
                let dht = dh.eval(t);
                let mut c = bmm(&dht, rho);
                c.add_assign_scaled(&bmm(rho, &dht), -1.0);
                c.mapv(|z| z * -I)
            }
            None => Array3::zeros(rho.raw_dim()),
        };

        // ∂D[L_k]/∂θ for L_k depending on θ with derivative M:
        //   M ρ L† + L ρ M† − ½{M†L + L†M, ρ}
        for (l_op, dl) in self.jump_ops.iter().zip(p.dl.iter()) {
            let Some(m_op) = dl else { continue };
            let l = l_op.eval(t);
            let m = m_op.eval(t);
            let ld = dag_batched(&l);
            let md = dag_batched(&m);
            let mut cross = bmm(&md, &l);
            cross += &bmm(&ld, &m);

            out += &bmm(&bmm(&m, rho), &ld);
            out += &bmm(&bmm(&l, rho), &md);
            out.add_assign_scaled(&bmm(&cross, rho), -0.5);
            out.add_assign_scaled(&bmm(rho, &cross), -0.5);
        }
        out
    }

    fn adjoint_seed(
        &self,
        observable: &ArrayView2<'_, Complex64>,
        y_final: &Array3<Complex64>,
    ) -> Array3<Complex64> {
        // λ(tf) = E on every lane.
        let batch = y_final.len_of(Axis(0));
        let n = observable.nrows();
        let mut seed = Array3::zeros((batch, n, n));
        for i in 0..batch {
            seed.index_axis_mut(Axis(0), i).assign(observable);
        }
        seed
    }

    fn grad_weight(&self) -> f64 {
        1.0
    }
}

// ---------------------------------------------------------------------------
// Small arithmetic helper
// ---------------------------------------------------------------------------

trait AddAssignScaled {
    fn add_assign_scaled(&mut self, other: &Self, c: f64);
}

impl AddAssignScaled for Array3<Complex64> {
    fn add_assign_scaled(&mut self, other: &Self, c: f64) {
        self.scaled_add(Complex64::new(c, 0.0), other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use solvay_core::ops;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn lift(m: ndarray::Array2<Complex64>) -> Array3<Complex64> {
        let (r, k) = m.dim();
        m.into_shape_with_order((1, r, k)).unwrap()
    }

    fn damping_eq(kappa: f64) -> Lindblad {
        let l = ops::sigmam().mapv(|z| z * kappa.sqrt());
        Lindblad {
            h: TimeOperator::constant(ops::sigmaz()).unwrap(),
            jump_ops: vec![TimeOperator::constant(l).unwrap()],
        }
    }

    fn hs_inner(a: &Array3<Complex64>, b: &Array3<Complex64>) -> Complex64 {
        a.iter().zip(b.iter()).map(|(x, y)| x.conj() * y).sum()
    }

    #[test]
    fn lindblad_rhs_is_traceless() {
        // d tr(ρ)/dt = 0 for any state: the generator is trace-preserving.
        let eq = damping_eq(0.7);
        let mut rho = lift(ops::fock_dm(2, 1).unwrap());
        rho[[0, 0, 1]] = c(0.3, 0.1);
        rho[[0, 1, 0]] = c(0.3, -0.1);
        let drho = eq.rhs(0.0, &rho);
        let tr = drho[[0, 0, 0]] + drho[[0, 1, 1]];
        assert_relative_eq!(tr.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn excited_state_decays_at_rate_kappa() {
        let kappa = 0.9;
        let eq = damping_eq(kappa);
        let rho = lift(ops::fock_dm(2, 1).unwrap());
        let drho = eq.rhs(0.0, &rho);
        assert_relative_eq!(drho[[0, 1, 1]].re, -kappa, epsilon = 1e-12);
        assert_relative_eq!(drho[[0, 0, 0]].re, kappa, epsilon = 1e-12);
    }

    #[test]
    fn adjoint_generator_is_hilbert_schmidt_dual() {
        // ⟨−adjoint_rhs(λ), ρ⟩ = ⟨λ, rhs(ρ)⟩ for arbitrary λ, ρ.
        let eq = damping_eq(0.4);

        let mut rho = lift(ops::fock_dm(2, 0).unwrap());
        rho[[0, 0, 1]] = c(0.2, 0.1);
        rho[[0, 1, 0]] = c(0.2, -0.1);
        rho[[0, 1, 1]] = c(0.5, 0.0);

        let mut lambda = lift(ops::sigmaz());
        lambda[[0, 0, 1]] = c(0.1, -0.3);
        lambda[[0, 1, 0]] = c(0.1, 0.3);

        let lhs = hs_inner(&eq.adjoint_rhs(0.0, &lambda).mapv(|z| -z), &rho);
        let rhs = hs_inner(&lambda, &eq.rhs(0.0, &rho));
        assert_relative_eq!(lhs.re, rhs.re, epsilon = 1e-10);
        assert_relative_eq!(lhs.im, rhs.im, epsilon = 1e-10);
    }

    #[test]
    fn schrodinger_rhs_is_antihermitian_action() {
        // d||ψ||²/dt = 2 Re⟨ψ, -iHψ⟩ = 0.
        let eq = Schrodinger {
            h: TimeOperator::constant(ops::sigmax()).unwrap(),
        };
        let psi = lift(ops::fock(2, 0).unwrap());
        let dpsi = eq.rhs(0.0, &psi);
        let overlap = hs_inner(&psi, &dpsi);
        assert_relative_eq!(overlap.re, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn param_rhs_matches_finite_difference() {
        // Perturb κ in L = √κ σ⁻ and compare ∂f/∂κ against a central
        // finite difference of the full RHS.
        let kappa = 0.8;
        let eps = 1e-6;
        let rho = {
            let mut r = lift(ops::fock_dm(2, 1).unwrap());
            r[[0, 0, 1]] = c(0.1, 0.2);
            r[[0, 1, 0]] = c(0.1, -0.2);
            r
        };

        let plus = damping_eq(kappa + eps).rhs(0.0, &rho);
        let minus = damping_eq(kappa - eps).rhs(0.0, &rho);
        let fd = (&plus - &minus).mapv(|z| z / (2.0 * eps));

        let eq = damping_eq(kappa);
        // dL/dκ = σ⁻ / (2√κ)
        let dl = ops::sigmam().mapv(|z| z / (2.0 * kappa.sqrt()));
        let p = Parameter {
            dh: None,
            dl: vec![Some(TimeOperator::constant(dl).unwrap())],
        };
        let analytic = eq.param_rhs(0.0, &rho, &p);

        for (a, b) in analytic.iter().zip(fd.iter()) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-5);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-5);
        }
    }
}
