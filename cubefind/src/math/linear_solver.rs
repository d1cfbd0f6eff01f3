//! Cholesky solve for the damped normal equations of Levenberg-Marquardt.
//!
//! `JᵀJ` is symmetric positive semi-definite; once damped it is positive
//! definite unless a parameter has no influence on the model at all.

/// Solve `a * x = b` for a symmetric positive-definite `a`.
///
/// Only the lower triangle of `a` is read. Returns `None` when `a` is not
/// positive definite to working precision.
#[allow(clippy::needless_range_loop)]
pub fn cholesky_solve<const N: usize>(a: &[[f64; N]; N], b: &[f64; N]) -> Option<[f64; N]> {
    // a = l * lᵀ, l lower triangular
    let mut l = [[0.0f64; N]; N];
    for i in 0..N {
        for j in 0..=i {
            let dot: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            let value = a[i][j] - dot;
            if i == j {
                if !(value > f64::EPSILON * a[i][i].abs()) || !value.is_finite() {
                    return None;
                }
                l[i][i] = value.sqrt();
            } else {
                l[i][j] = value / l[j][j];
            }
        }
    }

    // l * y = b
    let mut y = [0.0f64; N];
    for i in 0..N {
        let dot: f64 = (0..i).map(|k| l[i][k] * y[k]).sum();
        y[i] = (b[i] - dot) / l[i][i];
    }

    // lᵀ * x = y
    let mut x = [0.0f64; N];
    for i in (0..N).rev() {
        let dot: f64 = (i + 1..N).map(|k| l[k][i] * x[k]).sum();
        x[i] = (y[i] - dot) / l[i][i];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_system() {
        let a = [[2.0, 0.0], [0.0, 4.0]];
        let x = cholesky_solve(&a, &[3.0, -2.0]).unwrap();
        assert_eq!(x, [1.5, -0.5]);
    }

    #[test]
    fn test_dense_system() {
        let a = [[4.0, 2.0, 0.4], [2.0, 5.0, 1.0], [0.4, 1.0, 3.0]];
        let expected = [1.0, -2.0, 3.0];
        let b: [f64; 3] = std::array::from_fn(|i| (0..3).map(|j| a[i][j] * expected[j]).sum());
        let x = cholesky_solve(&a, &b).unwrap();
        for (xi, ei) in x.iter().zip(expected) {
            assert!((xi - ei).abs() < 1e-12, "{:?}", x);
        }
    }

    #[test]
    fn test_singular_and_indefinite_rejected() {
        assert!(cholesky_solve(&[[1.0, 2.0], [2.0, 4.0]], &[1.0, 2.0]).is_none());
        assert!(cholesky_solve(&[[1.0, 3.0], [3.0, 1.0]], &[1.0, 0.0]).is_none());
        assert!(cholesky_solve(&[[0.0, 0.0], [0.0, 1.0]], &[0.0, 1.0]).is_none());
    }
}
