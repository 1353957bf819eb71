use ndarray::{Array1, ArrayView1, ArrayView2, Zip, s};

use super::{Fit, Lbfgs, ModelTrainer};
use crate::{
    config::TrainerConfig,
    error::{Result, TrainErr},
};

const PGTOL: f64 = 1e-5;

/// Weighted binary logistic regression with an L2 penalty and offsets.
///
/// The intercept is appended as the last coefficient and is only penalized when
/// `regularize_bias` is set. Labels may be encoded as `{0, 1}` or `{-1, 1}`.
#[derive(Debug, Clone)]
pub struct LogisticRegressionTrainer {
    cfg: TrainerConfig,
    lbfgs: Lbfgs,
}

impl LogisticRegressionTrainer {
    /// Creates a new `LogisticRegressionTrainer`.
    pub fn new(cfg: TrainerConfig) -> Self {
        let lbfgs = Lbfgs::new(cfg.num_corrections, cfg.max_iterations, cfg.precision, PGTOL);
        Self { cfg, lbfgs }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.cfg
    }
}

impl Default for LogisticRegressionTrainer {
    fn default() -> Self {
        Self::new(TrainerConfig::default())
    }
}

impl ModelTrainer for LogisticRegressionTrainer {
    fn fit(
        &self,
        features: ArrayView2<'_, f64>,
        labels: ArrayView1<'_, f64>,
        weights: ArrayView1<'_, f64>,
        offsets: ArrayView1<'_, f64>,
        initial: Option<ArrayView1<'_, f64>>,
    ) -> Result<Fit> {
        let (rows, cols) = features.dim();
        check_len("labels", labels.len(), rows)?;
        check_len("weights", weights.len(), rows)?;
        check_len("offsets", offsets.len(), rows)?;

        let x0 = match initial {
            Some(theta) => {
                check_len("initial", theta.len(), cols + 1)?;
                theta.to_owned()
            }
            None => Array1::zeros(cols + 1),
        };

        let labels = normalize_labels(labels)?;
        check_inputs(features, weights, offsets)?;

        let lambda = self.cfg.lambda_l2;
        let regularize_bias = self.cfg.regularize_bias;
        let mut margins: Array1<f64> = Array1::zeros(rows);
        let mut residuals: Array1<f64> = Array1::zeros(rows);

        let objective = |theta: &Array1<f64>, grad: &mut Array1<f64>| -> f64 {
            let coef = theta.slice(s![..cols]);
            let bias = theta[cols];

            // z = X w + b + offset
            margins.assign(&features.dot(&coef));
            margins += &offsets;
            margins += bias;

            let mut loss = 0.;
            Zip::from(&mut residuals)
                .and(&margins)
                .and(&labels)
                .and(&weights)
                .for_each(|r, &z, &y, &w| {
                    loss += w * (softplus(z) - y * z);
                    *r = w * (sigmoid(z) - y);
                });

            grad.slice_mut(s![..cols])
                .assign(&features.t().dot(&residuals));
            grad[cols] = residuals.sum();

            let penalized = if regularize_bias { cols + 1 } else { cols };
            let theta_pen = theta.slice(s![..penalized]);
            loss += 0.5 * lambda * theta_pen.dot(&theta_pen);
            grad.slice_mut(s![..penalized])
                .scaled_add(lambda, &theta_pen);

            loss
        };

        let min = self.lbfgs.minimize(x0, objective);

        if !min.converged && self.cfg.strict_convergence {
            return Err(TrainErr::NonConvergence {
                iterations: min.iterations,
            });
        }

        Ok(Fit {
            coefficients: min.x,
            loss: min.f,
            iterations: min.iterations,
            converged: min.converged,
        })
    }
}

fn check_len(what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(TrainErr::ShapeMismatch {
            what,
            got,
            expected,
        });
    }
    Ok(())
}

fn normalize_labels(labels: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
    labels
        .iter()
        .map(|&y| {
            if y == 1. {
                Ok(1.)
            } else if y == 0. || y == -1. {
                Ok(0.)
            } else {
                Err(TrainErr::InvalidInput(format!(
                    "labels must be binary, got {y}"
                )))
            }
        })
        .collect()
}

fn check_inputs(
    features: ArrayView2<'_, f64>,
    weights: ArrayView1<'_, f64>,
    offsets: ArrayView1<'_, f64>,
) -> Result<()> {
    if features.iter().any(|v| !v.is_finite()) {
        return Err(TrainErr::InvalidInput("features must be finite".into()));
    }

    if weights.iter().any(|w| !w.is_finite() || *w < 0.) {
        return Err(TrainErr::InvalidInput(
            "weights must be finite and non-negative".into(),
        ));
    }

    if offsets.iter().any(|v| !v.is_finite()) {
        return Err(TrainErr::InvalidInput("offsets must be finite".into()));
    }

    Ok(())
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0. {
        1. / (1. + (-z).exp())
    } else {
        let e = z.exp();
        e / (1. + e)
    }
}

/// `ln(1 + e^z)` without overflowing for large `z`.
fn softplus(z: f64) -> f64 {
    z.max(0.) + (-z.abs()).exp().ln_1p()
}
