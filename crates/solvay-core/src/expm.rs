//! Matrix exponential by scaling-and-squaring with a Padé(13)
//! approximant.
//!
//! Ref: Higham, "The Scaling and Squaring Method for the Matrix
//! Exponential Revisited", SIAM J. Matrix Anal. Appl. 26(4) (2005).

use ndarray::Array2;
use num_complex::Complex64;

use crate::error::{CoreError, CoreResult};

/// Padé(13, 13) numerator coefficients, Higham eq. (10.33).
const B: [f64; 14] = [
    1.0,
    0.5,
    0.12,
    1.833_333_333_333_333_4e-2,
    1.992_753_623_188_405_7e-3,
    1.630_434_782_608_695_7e-4,
    1.035_196_687_370_600_4e-5,
    5.175_983_436_853_002e-7,
    2.043_151_356_652_500_8e-8,
    6.306_022_705_717_595e-10,
    1.483_770_048_404_139_6e-11,
    2.529_153_491_597_965_3e-13,
    2.810_170_546_219_962_3e-15,
    1.544_049_750_670_308_8e-17,
];

/// Scaling threshold θ₁₃ from Higham Table 10.2.
const THETA_13: f64 = 5.37;

/// exp(A) for a square complex matrix.
pub fn expm(a: &Array2<Complex64>) -> CoreResult<Array2<Complex64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(CoreError::NonSquareOperator {
            rows: n,
            cols: a.ncols(),
        });
    }
    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }

    let norm = one_norm(a);
    let s = if norm > THETA_13 {
        (norm / THETA_13).log2().ceil() as u32
    } else {
        0
    };
    let scaled = a.mapv(|z| z / (1u64 << s) as f64);

    let mut e = pade13(&scaled)?;
    for _ in 0..s {
        e = e.dot(&e);
    }
    Ok(e)
}

/// The order-(13, 13) diagonal Padé approximant of exp(A), valid for
/// ‖A‖₁ ≤ θ₁₃.
fn pade13(a: &Array2<Complex64>) -> CoreResult<Array2<Complex64>> {
    let n = a.nrows();
    let id: Array2<Complex64> = Array2::eye(n);
    let a2 = a.dot(a);
    let a4 = a2.dot(&a2);
    let a6 = a2.dot(&a4);

    // Odd part U = A(A6(b13 A6 + b11 A4 + b9 A2) + b7 A6 + b5 A4 + b3 A2 + b1 I)
    let u_hi = &a6 * cr(B[13]) + &a4 * cr(B[11]) + &a2 * cr(B[9]);
    let u_lo = &a6 * cr(B[7]) + &a4 * cr(B[5]) + &a2 * cr(B[3]) + &id * cr(B[1]);
    let u = a.dot(&(u_hi.dot(&a6) + u_lo));

    // Even part V, same nesting with the even coefficients.
    let v_hi = &a6 * cr(B[12]) + &a4 * cr(B[10]) + &a2 * cr(B[8]);
    let v_lo = &a6 * cr(B[6]) + &a4 * cr(B[4]) + &a2 * cr(B[2]) + &id * cr(B[0]);
    let v = v_hi.dot(&a6) + v_lo;

    // exp(A) ≈ (V − U)⁻¹ (V + U)
    solve(&v - &u, &v + &u)
}

fn cr(x: f64) -> Complex64 {
    Complex64::new(x, 0.0)
}

/// Solve A X = B by Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<Complex64>, mut b: Array2<Complex64>) -> CoreResult<Array2<Complex64>> {
    let n = a.nrows();
    let m = b.ncols();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| {
                a[[i, col]]
                    .norm()
                    .total_cmp(&a[[j, col]].norm())
            })
            .unwrap_or(col);
        if a[[pivot_row, col]].norm() < 1e-300 {
            return Err(CoreError::SingularMatrix);
        }
        if pivot_row != col {
            for j in 0..n {
                a.swap([col, j], [pivot_row, j]);
            }
            for j in 0..m {
                b.swap([col, j], [pivot_row, j]);
            }
        }

        let pivot = a[[col, col]];
        for row in col + 1..n {
            let factor = a[[row, col]] / pivot;
            for j in col..n {
                let v = a[[col, j]];
                a[[row, j]] -= factor * v;
            }
            for j in 0..m {
                let v = b[[col, j]];
                b[[row, j]] -= factor * v;
            }
        }
    }

    let mut x = Array2::<Complex64>::zeros((n, m));
    for col in (0..n).rev() {
        for j in 0..m {
            let mut sum = b[[col, j]];
            for k in col + 1..n {
                sum -= a[[col, k]] * x[[k, j]];
            }
            x[[col, j]] = sum / a[[col, col]];
        }
    }
    Ok(x)
}

/// ‖A‖₁: the maximum absolute column sum.
fn one_norm(a: &Array2<Complex64>) -> f64 {
    (0..a.ncols())
        .map(|j| a.column(j).iter().map(|z| z.norm()).sum::<f64>())
        .fold(0.0, f64::max)
}
