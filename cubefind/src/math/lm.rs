//! Levenberg-Marquardt least squares for curves `y = f(x; p)` with a
//! handful of parameters.

use super::linear_solver::cholesky_solve;

/// Damping stops growing past this value; the fit is then at a minimum to
/// working precision.
const MAX_DAMPING: f64 = 1e10;

#[derive(Debug, Clone)]
pub struct FitConfig {
    pub max_iterations: usize,
    /// Converged once every relative parameter step is below this.
    pub tolerance: f64,
    pub initial_damping: f64,
    /// Damping multiplier after a rejected step.
    pub damping_increase: f64,
    /// Damping multiplier after an accepted step.
    pub damping_decrease: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
            initial_damping: 1e-3,
            damping_increase: 10.0,
            damping_decrease: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FitResult<const N: usize> {
    pub params: [f64; N],
    /// Sum of squared residuals at `params`.
    pub residual: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// Curve with `N` parameters.
pub trait CurveModel<const N: usize> {
    /// Value at `x` and its gradient with respect to the parameters.
    fn eval(&self, x: f64, params: &[f64; N]) -> (f64, [f64; N]);

    /// Project `params` back into the valid domain after a step.
    fn clamp(&self, _params: &mut [f64; N]) {}
}

/// Fit `model` to the samples `(xs[i], ys[i])` starting from `initial`.
pub fn fit_curve<const N: usize, M: CurveModel<N>>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    initial: [f64; N],
    config: &FitConfig,
) -> FitResult<N> {
    debug_assert_eq!(xs.len(), ys.len());

    let mut result = FitResult {
        params: initial,
        residual: sum_squares(model, xs, ys, &initial),
        converged: false,
        iterations: 0,
    };
    let mut damping = config.initial_damping;

    while result.iterations < config.max_iterations {
        result.iterations += 1;

        let (mut normal, rhs) = normal_equations(model, xs, ys, &result.params);
        for (i, row) in normal.iter_mut().enumerate() {
            row[i] *= 1.0 + damping;
        }
        let Some(step) = cholesky_solve(&normal, &rhs) else {
            break;
        };

        let mut trial = result.params;
        for (p, s) in trial.iter_mut().zip(step) {
            *p += s;
        }
        model.clamp(&mut trial);
        let trial_residual = sum_squares(model, xs, ys, &trial);

        if trial_residual >= result.residual {
            damping *= config.damping_increase;
            if damping > MAX_DAMPING {
                result.converged = true;
                break;
            }
            continue;
        }

        result.params = trial;
        result.residual = trial_residual;
        damping *= config.damping_decrease;
        let largest_step = step
            .iter()
            .zip(&trial)
            .map(|(s, p)| s.abs() / p.abs().max(1.0))
            .fold(0.0, f64::max);
        if largest_step < config.tolerance {
            result.converged = true;
            break;
        }
    }

    result
}

fn sum_squares<const N: usize, M: CurveModel<N>>(model: &M, xs: &[f64], ys: &[f64], params: &[f64; N]) -> f64 {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = y - model.eval(x, params).0;
            r * r
        })
        .sum()
}

/// `JᵀJ` and `Jᵀr` accumulated over all samples.
fn normal_equations<const N: usize, M: CurveModel<N>>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    params: &[f64; N],
) -> ([[f64; N]; N], [f64; N]) {
    let mut jtj = [[0.0; N]; N];
    let mut jtr = [0.0; N];
    for (&x, &y) in xs.iter().zip(ys) {
        let (value, grad) = model.eval(x, params);
        let r = y - value;
        for i in 0..N {
            jtr[i] += grad[i] * r;
            for j in 0..=i {
                jtj[i][j] += grad[i] * grad[j];
            }
        }
    }
    for i in 0..N {
        for j in i + 1..N {
            jtj[i][j] = jtj[j][i];
        }
    }
    (jtj, jtr)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Line;

    impl CurveModel<2> for Line {
        fn eval(&self, x: f64, p: &[f64; 2]) -> (f64, [f64; 2]) {
            (p[0] + p[1] * x, [1.0, x])
        }
    }

    struct Decay;

    impl CurveModel<2> for Decay {
        fn eval(&self, x: f64, p: &[f64; 2]) -> (f64, [f64; 2]) {
            let e = (-x / p[1]).exp();
            (p[0] * e, [e, p[0] * e * x / (p[1] * p[1])])
        }

        fn clamp(&self, p: &mut [f64; 2]) {
            p[1] = p[1].max(1e-6);
        }
    }

    #[test]
    fn test_fit_line_exact() {
        let xs: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 - 0.5 * x).collect();
        let result = fit_curve(&Line, &xs, &ys, [0.0, 0.0], &FitConfig::default());
        assert!(result.converged);
        assert!((result.params[0] - 3.0).abs() < 1e-6);
        assert!((result.params[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_fit_decay_from_rough_guess() {
        let xs: Vec<f64> = (0..50).map(|i| i as f64 * 0.2).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 40.0 * (-x / 2.5).exp()).collect();
        let result = fit_curve(&Decay, &xs, &ys, [30.0, 1.0], &FitConfig::default());
        assert!((result.params[0] - 40.0).abs() < 1e-4);
        assert!((result.params[1] - 2.5).abs() < 1e-5);
        assert!(result.residual < 1e-8);
    }

    #[test]
    fn test_normal_equations_symmetric() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 0.0, 2.0, 5.0];
        let (jtj, jtr) = normal_equations(&Line, &xs, &ys, &[0.0, 0.0]);
        assert_eq!(jtj, [[4.0, 6.0], [6.0, 14.0]]);
        assert_eq!(jtr, [8.0, 19.0]);
    }
}
