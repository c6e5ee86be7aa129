//! Nonlinear least-squares calibration of a formula's named parameters.
//!
//! The sampler only depends on the [Fitter] contract: given a model that
//! maps a parameter vector to predictions, measured targets, an initial
//! guess and an evaluation budget, produce a fitted parameter vector or
//! fail. Failure is local to one proposal: the energy model prices it as
//! infinite SSE and the chain moves on.

use conjecture_error::{ConjectureResult, ensure};

/// Calibrates the free parameters of a formula against observations.
pub trait Fitter {
    /// Minimizes the sum of squared residuals between `y` and
    /// `model(theta)`. The model returns one prediction per observation
    /// and may fail on structurally unevaluable input. `max_fev` caps the
    /// number of model evaluations.
    fn fit(
        &self,
        model: &dyn Fn(&[f64]) -> ConjectureResult<Vec<f64>>,
        y: &[f64],
        theta0: &[f64],
        max_fev: usize,
    ) -> ConjectureResult<Vec<f64>>;
}

/// Damped least squares with a forward-difference Jacobian. The damped
/// normal equations are solved directly; the damping factor shrinks on
/// accepted steps and grows on rejected ones.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    /// Relative drop in cost below which the fit counts as converged.
    pub ftol: f64,
    /// Relative step size below which the fit counts as converged.
    pub xtol: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        LevenbergMarquardt {
            ftol: 1e-10,
            xtol: 1e-10,
        }
    }
}

impl Fitter for LevenbergMarquardt {
    fn fit(
        &self,
        model: &dyn Fn(&[f64]) -> ConjectureResult<Vec<f64>>,
        y: &[f64],
        theta0: &[f64],
        max_fev: usize,
    ) -> ConjectureResult<Vec<f64>> {
        let k = theta0.len();
        let n = y.len();
        ensure!(k > 0, Fit: "no parameters to fit");
        ensure!(n > 0, Fit: "no observations to fit against");

        let eval = |theta: &[f64], fev: &mut usize| -> ConjectureResult<Vec<f64>> {
            *fev += 1;
            let f = model(theta)?;
            ensure!(
                f.len() == n,
                Fit: "model returned {} predictions for {} observations",
                f.len(),
                n
            );
            Ok(f)
        };

        let mut fev = 0usize;
        let mut theta = theta0.to_vec();
        let mut f0 = eval(&theta, &mut fev)?;
        let mut cost = sse(y, &f0);
        ensure!(cost.is_finite(), Fit: "residuals are not finite at the initial guess");
        if cost <= f64::MIN_POSITIVE {
            return Ok(theta);
        }

        let mut lambda = 1e-3;
        while fev + k < max_fev {
            // Forward-difference Jacobian, one column per parameter.
            let mut jac = vec![vec![0.0; k]; n];
            for j in 0..k {
                let h = f64::EPSILON.sqrt() * theta[j].abs().max(1.0);
                let mut tj = theta.clone();
                tj[j] += h;
                let fj = eval(&tj, &mut fev)?;
                for i in 0..n {
                    jac[i][j] = (fj[i] - f0[i]) / h;
                }
            }

            let residuals: Vec<f64> = y.iter().zip(&f0).map(|(yi, fi)| yi - fi).collect();

            // Normal equations: (JᵀJ + λ·diag(JᵀJ)) δ = Jᵀr.
            let mut a = vec![vec![0.0; k]; k];
            let mut g = vec![0.0; k];
            for i in 0..n {
                for p in 0..k {
                    g[p] += jac[i][p] * residuals[i];
                    for q in p..k {
                        a[p][q] += jac[i][p] * jac[i][q];
                    }
                }
            }
            for p in 0..k {
                for q in 0..p {
                    a[p][q] = a[q][p];
                }
            }
            ensure!(
                g.iter().all(|v| v.is_finite()) && a.iter().flatten().all(|v| v.is_finite()),
                Fit: "Jacobian is not finite"
            );

            let mut improved = false;
            while fev < max_fev {
                let mut damped = a.clone();
                for j in 0..k {
                    damped[j][j] += lambda * a[j][j].max(1e-12);
                }

                // A rejected or unsolvable step raises the damping; an
                // accepted one lowers it and moves to a fresh Jacobian.
                let trial = solve(damped, g.clone()).map(|step| {
                    let trial: Vec<f64> = theta.iter().zip(&step).map(|(t, d)| t + d).collect();
                    (step, trial)
                });
                let accepted = trial.and_then(|(step, trial)| {
                    let f_trial = eval(&trial, &mut fev).ok()?;
                    let c = sse(y, &f_trial);
                    (c.is_finite() && c < cost).then_some((step, trial, f_trial, c))
                });

                match accepted {
                    Some((step, trial, f_trial, c)) => {
                        let converged = (cost - c) <= self.ftol * cost
                            || norm(&step) <= self.xtol * (norm(&trial) + self.xtol);
                        theta = trial;
                        f0 = f_trial;
                        cost = c;
                        lambda = (lambda * 0.1).max(1e-12);
                        improved = true;
                        if converged || cost <= f64::MIN_POSITIVE {
                            return Ok(theta);
                        }
                        break;
                    }
                    None => {
                        lambda *= 10.0;
                        if lambda > 1e12 {
                            return Ok(theta);
                        }
                    }
                }
            }

            if !improved {
                return Ok(theta);
            }
        }

        Ok(theta)
    }
}

fn sse(y: &[f64], f: &[f64]) -> f64 {
    y.iter()
        .zip(f)
        .map(|(yi, fi)| {
            let r = yi - fi;
            r * r
        })
        .sum()
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Solves `a · x = b` by Gaussian elimination with partial pivoting.
/// Returns `None` when the system is singular or the solution overflows.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let k = b.len();
    for col in 0..k {
        let mut pivot = col;
        for row in (col + 1)..k {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..k {
            let factor = a[row][col] / a[col][col];
            for c in col..k {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; k];
    for row in (0..k).rev() {
        let mut sum = b[row];
        for c in (row + 1)..k {
            sum -= a[row][c] * x[c];
        }
        x[row] = sum / a[row][row];
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_linear_model() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|xi| 2.0 * xi + 1.0).collect();
        let model = |theta: &[f64]| -> ConjectureResult<Vec<f64>> {
            Ok(x.iter().map(|xi| theta[0] + theta[1] * xi).collect())
        };

        let theta = LevenbergMarquardt::default()
            .fit(&model, &y, &[1.0, 1.0], 10_000)
            .unwrap();

        assert!((theta[0] - 1.0).abs() < 1e-6, "intercept {}", theta[0]);
        assert!((theta[1] - 2.0).abs() < 1e-6, "slope {}", theta[1]);
    }

    #[test]
    fn test_fits_exponential_model() {
        let x: [f64; 5] = [0.0, 0.5, 1.0, 1.5, 2.0];
        let y: Vec<f64> = x.iter().map(|xi| 3.0 * (0.5 * xi).exp()).collect();
        let model = |theta: &[f64]| -> ConjectureResult<Vec<f64>> {
            Ok(x.iter().map(|xi| theta[0] * (theta[1] * xi).exp()).collect())
        };

        let theta = LevenbergMarquardt::default()
            .fit(&model, &y, &[1.0, 1.0], 10_000)
            .unwrap();

        assert!((theta[0] - 3.0).abs() < 1e-5);
        assert!((theta[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_unused_parameter_does_not_break_the_fit() {
        let y = [4.0, 4.0, 4.0];
        let model = |theta: &[f64]| -> ConjectureResult<Vec<f64>> {
            Ok(vec![theta[0]; 3])
        };

        let theta = LevenbergMarquardt::default()
            .fit(&model, &y, &[1.0, 1.0], 10_000)
            .unwrap();

        assert!((theta[0] - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_non_finite_initial_residuals_fail() {
        let y = [1.0, 2.0];
        let model = |_: &[f64]| -> ConjectureResult<Vec<f64>> {
            Ok(vec![f64::NAN, 1.0])
        };

        assert!(
            LevenbergMarquardt::default()
                .fit(&model, &y, &[1.0], 100)
                .is_err()
        );
    }

    #[test]
    fn test_empty_parameters_fail() {
        let y = [1.0];
        let model = |_: &[f64]| -> ConjectureResult<Vec<f64>> { Ok(vec![1.0]) };
        assert!(
            LevenbergMarquardt::default()
                .fit(&model, &y, &[], 100)
                .is_err()
        );
    }
}
