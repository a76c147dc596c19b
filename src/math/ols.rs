//! Linear least-squares kernels for the damped Gauss–Newton step.
//!
//! Each Levenberg–Marquardt iteration solves
//!
//! ```text
//! minimize ‖J δ + r‖² + λ ‖D δ‖²
//! ```
//!
//! which is the ordinary least-squares problem on the augmented system
//!
//! ```text
//! [ J      ]       [ -r ]
//! [ √λ · D ] δ  =  [  0 ]
//! ```
//!
//! Solving the augmented system by SVD avoids forming `JᵀJ` explicitly, which
//! squares the condition number; the Cyton Jacobians are often badly scaled
//! (location parameters in hours next to fractions in [0, 1]).

use nalgebra::{DMatrix, DVector};

/// Solve a tall least-squares system using SVD.
///
/// Returns `None` if no tolerance produces a finite solution.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }
    None
}

/// Damped Gauss–Newton step `δ` for Jacobian `jac`, residuals `resid`,
/// damping `lambda` and column scales `diag`.
pub fn damped_step(
    jac: &DMatrix<f64>,
    resid: &DVector<f64>,
    lambda: f64,
    diag: &DVector<f64>,
) -> Option<DVector<f64>> {
    let (m, n) = jac.shape();
    let mut a = DMatrix::<f64>::zeros(m + n, n);
    let mut b = DVector::<f64>::zeros(m + n);

    a.view_mut((0, 0), (m, n)).copy_from(jac);
    for i in 0..m {
        b[i] = -resid[i];
    }
    let root = lambda.max(0.0).sqrt();
    for j in 0..n {
        a[(m + j, j)] = root * diag[j];
    }

    solve_least_squares(&a, &b)
}

/// Gradient of `½‖r‖²`, i.e. `Jᵀ r`.
pub fn half_sse_gradient(jac: &DMatrix<f64>, resid: &DVector<f64>) -> DVector<f64> {
    jac.transpose() * resid
}

/// Largest cosine between the residual vector and any Jacobian column.
///
/// This is the MINPACK "gtol" measure: it reaches zero when the residual is
/// orthogonal to every search direction.
pub fn max_gradient_cosine(jac: &DMatrix<f64>, resid: &DVector<f64>) -> f64 {
    let r_norm = resid.norm();
    if r_norm == 0.0 {
        return 0.0;
    }
    let grad = half_sse_gradient(jac, resid);
    let mut worst = 0.0_f64;
    for (j, g) in grad.iter().enumerate() {
        let c_norm = jac.column(j).norm();
        if c_norm > 0.0 {
            worst = worst.max((g / (c_norm * r_norm)).abs());
        }
    }
    worst
}
