//! Shared numerical helpers.

mod matrix;

pub use matrix::{
    center_columns, center_vector, cholesky, cholesky_inverse, cholesky_semidefinite,
    cholesky_solve, detect_constant_columns, log_det_from_cholesky, lower_from_theta, mat_mul,
    solve_lower, solve_lower_mat, solve_lower_transpose, theta_from_lower, theta_len,
    transpose_mul, transpose_mul_vec,
};
