//! Matrix utility functions.

use faer::{Col, Mat};

/// Detect columns that are constant (zero variance).
pub fn detect_constant_columns(x: &Mat<f64>, tolerance: f64) -> Vec<bool> {
    let n_cols = x.ncols();
    let n_rows = x.nrows();

    if n_rows == 0 {
        return vec![true; n_cols];
    }

    (0..n_cols)
        .map(|j| {
            let first = x[(0, j)];
            (1..n_rows).all(|i| (x[(i, j)] - first).abs() < tolerance)
        })
        .collect()
}

/// Center a matrix by subtracting column means.
pub fn center_columns(x: &Mat<f64>) -> (Mat<f64>, Col<f64>) {
    let n_rows = x.nrows();
    let n_cols = x.ncols();

    let mut means = Col::zeros(n_cols);
    for j in 0..n_cols {
        let sum: f64 = (0..n_rows).map(|i| x[(i, j)]).sum();
        means[j] = sum / n_rows as f64;
    }

    let centered = Mat::from_fn(n_rows, n_cols, |i, j| x[(i, j)] - means[j]);
    (centered, means)
}

/// Center a vector by subtracting the mean.
pub fn center_vector(y: &Col<f64>) -> (Col<f64>, f64) {
    let n = y.nrows();
    let mean: f64 = y.iter().sum::<f64>() / n as f64;

    let centered = Col::from_fn(n, |i| y[i] - mean);

    (centered, mean)
}

/// Cholesky factor `L` (lower triangular, `A = LL'`) of a symmetric
/// positive definite matrix. Returns `None` when a pivot is not positive.
pub fn cholesky(a: &Mat<f64>) -> Option<Mat<f64>> {
    let n = a.nrows();
    let mut l = Mat::zeros(n, n);

    for j in 0..n {
        let mut d = a[(j, j)];
        for k in 0..j {
            d -= l[(j, k)] * l[(j, k)];
        }
        if !(d > 0.0) || !d.is_finite() {
            return None;
        }
        let d = d.sqrt();
        l[(j, j)] = d;

        for i in (j + 1)..n {
            let mut s = a[(i, j)];
            for k in 0..j {
                s -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = s / d;
        }
    }

    Some(l)
}

/// Cholesky factor of a positive semi-definite matrix.
///
/// Pivots at or below `tolerance` produce a zero column instead of failing,
/// so a covariance matrix on the boundary of the parameter space still
/// factors.
pub fn cholesky_semidefinite(a: &Mat<f64>, tolerance: f64) -> Mat<f64> {
    let n = a.nrows();
    let mut l = Mat::zeros(n, n);

    for j in 0..n {
        let mut d = a[(j, j)];
        for k in 0..j {
            d -= l[(j, k)] * l[(j, k)];
        }
        if d <= tolerance || !d.is_finite() {
            continue;
        }
        let d = d.sqrt();
        l[(j, j)] = d;

        for i in (j + 1)..n {
            let mut s = a[(i, j)];
            for k in 0..j {
                s -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = s / d;
        }
    }

    l
}

/// Solve `L x = b` by forward substitution.
pub fn solve_lower(l: &Mat<f64>, b: &Col<f64>) -> Col<f64> {
    let n = l.nrows();
    let mut x = Col::zeros(n);
    for i in 0..n {
        let mut s = b[i];
        for k in 0..i {
            s -= l[(i, k)] * x[k];
        }
        x[i] = s / l[(i, i)];
    }
    x
}

/// Solve `L' x = b` by back substitution.
pub fn solve_lower_transpose(l: &Mat<f64>, b: &Col<f64>) -> Col<f64> {
    let n = l.nrows();
    let mut x = Col::zeros(n);
    for i in (0..n).rev() {
        let mut s = b[i];
        for k in (i + 1)..n {
            s -= l[(k, i)] * x[k];
        }
        x[i] = s / l[(i, i)];
    }
    x
}

/// Solve `A x = b` given the Cholesky factor of `A`.
pub fn cholesky_solve(l: &Mat<f64>, b: &Col<f64>) -> Col<f64> {
    solve_lower_transpose(l, &solve_lower(l, b))
}

/// `A⁻¹` from the Cholesky factor of `A`.
pub fn cholesky_inverse(l: &Mat<f64>) -> Mat<f64> {
    let n = l.nrows();
    let mut inv = Mat::zeros(n, n);
    for col in 0..n {
        let e = Col::from_fn(n, |i| if i == col { 1.0 } else { 0.0 });
        let x = cholesky_solve(l, &e);
        for i in 0..n {
            inv[(i, col)] = x[i];
        }
    }
    inv
}

/// `A B`.
pub fn mat_mul(a: &Mat<f64>, b: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), b.ncols(), |i, j| {
        (0..a.ncols()).map(|k| a[(i, k)] * b[(k, j)]).sum::<f64>()
    })
}

/// `A' B`.
pub fn transpose_mul(a: &Mat<f64>, b: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(a.ncols(), b.ncols(), |i, j| {
        (0..a.nrows()).map(|k| a[(k, i)] * b[(k, j)]).sum::<f64>()
    })
}

/// `A' b`.
pub fn transpose_mul_vec(a: &Mat<f64>, b: &Col<f64>) -> Col<f64> {
    Col::from_fn(a.ncols(), |i| (0..a.nrows()).map(|k| a[(k, i)] * b[k]).sum::<f64>())
}

/// `L⁻¹ B` column by column.
pub fn solve_lower_mat(l: &Mat<f64>, b: &Mat<f64>) -> Mat<f64> {
    let mut out = Mat::zeros(b.nrows(), b.ncols());
    for j in 0..b.ncols() {
        let col = solve_lower(l, &Col::from_fn(b.nrows(), |i| b[(i, j)]));
        for i in 0..b.nrows() {
            out[(i, j)] = col[i];
        }
    }
    out
}

/// `log |A|` from the Cholesky factor of `A`.
pub fn log_det_from_cholesky(l: &Mat<f64>) -> f64 {
    2.0 * (0..l.nrows()).map(|i| l[(i, i)].ln()).sum::<f64>()
}

/// Number of free parameters in a `q × q` relative covariance factor.
pub fn theta_len(q: usize, correlated: bool) -> usize {
    if correlated {
        q * (q + 1) / 2
    } else {
        q
    }
}

/// Build the lower-triangular factor Λ from θ.
///
/// θ fills the lower triangle column by column. Uncorrelated structures only
/// carry the diagonal.
pub fn lower_from_theta(theta: &[f64], q: usize, correlated: bool) -> Mat<f64> {
    let mut lambda = Mat::zeros(q, q);
    let mut k = 0;
    for j in 0..q {
        if correlated {
            for i in j..q {
                lambda[(i, j)] = theta[k];
                k += 1;
            }
        } else {
            lambda[(j, j)] = theta[k];
            k += 1;
        }
    }
    lambda
}

/// Inverse of [`lower_from_theta`].
pub fn theta_from_lower(lambda: &Mat<f64>, correlated: bool) -> Vec<f64> {
    let q = lambda.nrows();
    let mut theta = Vec::with_capacity(theta_len(q, correlated));
    for j in 0..q {
        if correlated {
            for i in j..q {
                theta.push(lambda[(i, j)]);
            }
        } else {
            theta.push(lambda[(j, j)]);
        }
    }
    theta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_constant_columns() {
        let mut x = Mat::zeros(5, 3);
        for i in 0..5 {
            x[(i, 0)] = 1.0;
            x[(i, 1)] = i as f64;
            x[(i, 2)] = 2.0;
        }

        let constant = detect_constant_columns(&x, 1e-10);
        assert!(constant[0]);
        assert!(!constant[1]);
        assert!(constant[2]);
    }

    #[test]
    fn test_center_vector() {
        let y = Col::from_fn(4, |i| (i + 1) as f64);
        let (centered, mean) = center_vector(&y);

        assert!((mean - 2.5).abs() < 1e-10);
        assert!(centered.iter().sum::<f64>().abs() < 1e-10);
    }

    #[test]
    fn test_cholesky_reconstructs() {
        let a = Mat::from_fn(3, 3, |i, j| match (i, j) {
            (0, 0) => 4.0,
            (1, 1) => 5.0,
            (2, 2) => 6.0,
            (0, 1) | (1, 0) => 2.0,
            (1, 2) | (2, 1) => 1.0,
            _ => 0.5,
        });
        let l = cholesky(&a).expect("positive definite");
        for i in 0..3 {
            for j in 0..3 {
                let back: f64 = (0..3).map(|k| l[(i, k)] * l[(j, k)]).sum();
                assert!((back - a[(i, j)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 2.0 });
        assert!(cholesky(&a).is_none());
    }

    #[test]
    fn test_cholesky_solve_and_inverse() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 2.0 } else { 1.0 });
        let l = cholesky(&a).expect("positive definite");
        let b = Col::from_fn(2, |i| (i + 1) as f64);
        let x = cholesky_solve(&l, &b);
        // [2 1; 1 2] x = [1 2] -> x = [0, 1]
        assert!(x[0].abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);

        let inv = cholesky_inverse(&l);
        assert!((inv[(0, 0)] - 2.0 / 3.0).abs() < 1e-12);
        assert!((inv[(0, 1)] + 1.0 / 3.0).abs() < 1e-12);
        assert!((log_det_from_cholesky(&l) - 3.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_products() {
        let a = Mat::from_fn(3, 2, |i, j| (i * 2 + j) as f64);
        let b = Mat::from_fn(2, 2, |i, j| if i == j { 2.0 } else { 1.0 });
        let ab = mat_mul(&a, &b);
        assert_eq!(ab[(1, 0)], 2.0 * 2.0 + 3.0);
        let ata = transpose_mul(&a, &a);
        assert_eq!(ata[(0, 1)], 0.0 * 1.0 + 2.0 * 3.0 + 4.0 * 5.0);
        let v = transpose_mul_vec(&a, &Col::from_fn(3, |_| 1.0));
        assert_eq!(v[1], 9.0);
    }

    #[test]
    fn test_semidefinite_keeps_zero_column() {
        let a = Mat::from_fn(2, 2, |i, j| if i == 0 && j == 0 { 4.0 } else { 0.0 });
        let l = cholesky_semidefinite(&a, 1e-12);
        assert!((l[(0, 0)] - 2.0).abs() < 1e-12);
        assert_eq!(l[(1, 1)], 0.0);
    }

    #[test]
    fn test_theta_round_trip() {
        let theta = [1.0, 0.5, 2.0];
        let lambda = lower_from_theta(&theta, 2, true);
        assert_eq!(lambda[(0, 0)], 1.0);
        assert_eq!(lambda[(1, 0)], 0.5);
        assert_eq!(lambda[(1, 1)], 2.0);
        assert_eq!(lambda[(0, 1)], 0.0);
        assert_eq!(theta_from_lower(&lambda, true), theta.to_vec());

        let diag = lower_from_theta(&[1.5, 0.25], 2, false);
        assert_eq!(diag[(1, 0)], 0.0);
        assert_eq!(theta_from_lower(&diag, false), vec![1.5, 0.25]);
        assert_eq!(theta_len(3, true), 6);
        assert_eq!(theta_len(3, false), 3);
    }
}
