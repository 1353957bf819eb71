use std::collections::VecDeque;

use ndarray::{Array1, Zip};

const ARMIJO: f64 = 1e-4;
const BACKTRACK: f64 = 0.5;
const MAX_LINE_SEARCH: usize = 40;
const MIN_CURVATURE: f64 = 1e-10;

/// Where a minimization ended.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Array1<f64>,
    pub f: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Limited-memory BFGS with a backtracking Armijo line search.
///
/// Stops when the relative reduction of the objective falls below `factr * EPSILON`,
/// when the largest gradient component falls below `pgtol`, or after `max_iter`
/// iterations.
#[derive(Debug, Clone)]
pub struct Lbfgs {
    corrections: usize,
    max_iter: usize,
    factr: f64,
    pgtol: f64,
}

impl Lbfgs {
    /// Creates a new `Lbfgs`.
    ///
    /// # Arguments
    /// * `corrections` - The amount of curvature pairs kept to approximate the hessian.
    /// * `max_iter` - The maximum amount of iterations.
    /// * `factr` - The relative reduction threshold in multiples of machine epsilon.
    /// * `pgtol` - The gradient threshold.
    pub fn new(corrections: usize, max_iter: usize, factr: f64, pgtol: f64) -> Self {
        Self {
            corrections: corrections.max(1),
            max_iter,
            factr,
            pgtol,
        }
    }

    /// Minimizes `objective` starting from `x0`.
    ///
    /// # Arguments
    /// * `x0` - The starting point.
    /// * `objective` - Evaluates the function at a point, writing its gradient into the
    ///   second argument.
    pub fn minimize<F>(&self, x0: Array1<f64>, mut objective: F) -> Minimum
    where
        F: FnMut(&Array1<f64>, &mut Array1<f64>) -> f64,
    {
        let n = x0.len();
        let mut x = x0;
        let mut grad = Array1::zeros(n);
        let mut f = objective(&x, &mut grad);

        let mut history: VecDeque<(Array1<f64>, Array1<f64>, f64)> =
            VecDeque::with_capacity(self.corrections);
        let mut next_x = Array1::zeros(n);
        let mut next_grad = Array1::zeros(n);

        if max_abs(&grad) <= self.pgtol {
            return Minimum {
                x,
                f,
                iterations: 0,
                converged: true,
            };
        }

        for iteration in 1..=self.max_iter {
            let mut direction = self.direction(&grad, &history);
            let mut slope = grad.dot(&direction);

            if slope >= 0. {
                history.clear();
                direction = grad.mapv(|g| -g);
                slope = grad.dot(&direction);
            }

            let mut step = if history.is_empty() {
                (1. / max_abs(&grad)).min(1.)
            } else {
                1.
            };

            let mut next_f = f64::INFINITY;
            let mut accepted = false;
            for _ in 0..MAX_LINE_SEARCH {
                Zip::from(&mut next_x)
                    .and(&x)
                    .and(&direction)
                    .for_each(|nx, &xi, &di| *nx = xi + step * di);
                next_f = objective(&next_x, &mut next_grad);

                if next_f.is_finite() && next_f <= f + ARMIJO * step * slope {
                    accepted = true;
                    break;
                }
                step *= BACKTRACK;
            }

            if !accepted {
                return Minimum {
                    x,
                    f,
                    iterations: iteration,
                    converged: false,
                };
            }

            let s = &next_x - &x;
            let y = &next_grad - &grad;
            let sy = s.dot(&y);
            if sy > MIN_CURVATURE {
                if history.len() == self.corrections {
                    history.pop_front();
                }
                history.push_back((s, y, 1. / sy));
            }

            let reduction = (f - next_f) / f.abs().max(next_f.abs()).max(1.);

            std::mem::swap(&mut x, &mut next_x);
            std::mem::swap(&mut grad, &mut next_grad);
            f = next_f;

            if reduction <= self.factr * f64::EPSILON || max_abs(&grad) <= self.pgtol {
                return Minimum {
                    x,
                    f,
                    iterations: iteration,
                    converged: true,
                };
            }
        }

        Minimum {
            x,
            f,
            iterations: self.max_iter,
            converged: false,
        }
    }

    /// Two-loop recursion: approximates `-H * grad` from the stored curvature pairs.
    fn direction(
        &self,
        grad: &Array1<f64>,
        history: &VecDeque<(Array1<f64>, Array1<f64>, f64)>,
    ) -> Array1<f64> {
        let mut q = grad.mapv(|g| -g);
        let mut alphas = Vec::with_capacity(history.len());

        for (s, y, rho) in history.iter().rev() {
            let alpha = rho * s.dot(&q);
            q.scaled_add(-alpha, y);
            alphas.push(alpha);
        }

        if let Some((s, y, _)) = history.back() {
            let gamma = s.dot(y) / y.dot(y);
            q *= gamma;
        }

        for ((s, y, rho), alpha) in history.iter().zip(alphas.into_iter().rev()) {
            let beta = rho * y.dot(&q);
            q.scaled_add(alpha - beta, s);
        }

        q
    }
}

fn max_abs(v: &Array1<f64>) -> f64 {
    v.iter().fold(0., |acc: f64, x| acc.max(x.abs()))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn quadratic(x: &Array1<f64>, grad: &mut Array1<f64>) -> f64 {
        // (x0 - 3)^2 + 10 (x1 + 1)^2
        grad[0] = 2. * (x[0] - 3.);
        grad[1] = 20. * (x[1] + 1.);
        (x[0] - 3.).powi(2) + 10. * (x[1] + 1.).powi(2)
    }

    #[test]
    fn test_minimizes_quadratic() {
        let lbfgs = Lbfgs::new(10, 100, 1e7, 1e-8);
        let min = lbfgs.minimize(array![0., 0.], quadratic);

        assert!(min.converged);
        assert!((min.x[0] - 3.).abs() < 1e-3, "x0 = {}", min.x[0]);
        assert!((min.x[1] + 1.).abs() < 1e-3, "x1 = {}", min.x[1]);
    }

    #[test]
    fn test_starting_at_optimum_takes_no_iterations() {
        let lbfgs = Lbfgs::new(10, 100, 1e7, 1e-8);
        let min = lbfgs.minimize(array![3., -1.], quadratic);

        assert!(min.converged);
        assert_eq!(min.iterations, 0);
    }

    #[test]
    fn test_iteration_budget_is_respected() {
        let lbfgs = Lbfgs::new(3, 1, 0., 0.);
        let min = lbfgs.minimize(array![100., 100.], quadratic);

        assert_eq!(min.iterations, 1);
        assert!(!min.converged);
    }

    #[test]
    fn test_rosenbrock() {
        let rosenbrock = |x: &Array1<f64>, grad: &mut Array1<f64>| {
            let (a, b) = (x[0], x[1]);
            grad[0] = -2. * (1. - a) - 400. * a * (b - a * a);
            grad[1] = 200. * (b - a * a);
            (1. - a).powi(2) + 100. * (b - a * a).powi(2)
        };

        let lbfgs = Lbfgs::new(10, 1000, 10., 1e-10);
        let min = lbfgs.minimize(array![-1.2, 1.], rosenbrock);

        assert!((min.x[0] - 1.).abs() < 1e-2, "x0 = {}", min.x[0]);
        assert!((min.x[1] - 1.).abs() < 1e-2, "x1 = {}", min.x[1]);
    }
}
