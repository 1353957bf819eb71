mod lbfgs;
mod logistic;

pub use lbfgs::{Lbfgs, Minimum};
pub use logistic::LogisticRegressionTrainer;

use std::sync::Arc;

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::Result;

/// The outcome of fitting a single model.
#[derive(Debug, Clone)]
pub struct Fit {
    /// One weight per feature followed by the intercept.
    pub coefficients: Array1<f64>,
    pub loss: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Fits a model to the data of one entity.
///
/// Implementations must be deterministic: the same inputs always produce the same
/// coefficients. They are shared by every consumer, so `fit` only borrows `self`.
pub trait ModelTrainer: Send + Sync {
    /// Fits the model.
    ///
    /// # Arguments
    /// * `features` - The design matrix, one row per sample.
    /// * `labels` - The binary responses.
    /// * `weights` - The sample weights.
    /// * `offsets` - Additive offsets to the linear predictor.
    /// * `initial` - Where to start the optimization, zeros when `None`.
    ///
    /// # Returns
    /// The fitted coefficients, intercept last.
    ///
    /// # Errors
    /// Returns `TrainErr` when inputs violate shape invariants or are invalid.
    fn fit(
        &self,
        features: ArrayView2<'_, f64>,
        labels: ArrayView1<'_, f64>,
        weights: ArrayView1<'_, f64>,
        offsets: ArrayView1<'_, f64>,
        initial: Option<ArrayView1<'_, f64>>,
    ) -> Result<Fit>;
}

impl<T: ModelTrainer + ?Sized> ModelTrainer for Box<T> {
    fn fit(
        &self,
        features: ArrayView2<'_, f64>,
        labels: ArrayView1<'_, f64>,
        weights: ArrayView1<'_, f64>,
        offsets: ArrayView1<'_, f64>,
        initial: Option<ArrayView1<'_, f64>>,
    ) -> Result<Fit> {
        (**self).fit(features, labels, weights, offsets, initial)
    }
}

impl<T: ModelTrainer + ?Sized> ModelTrainer for Arc<T> {
    fn fit(
        &self,
        features: ArrayView2<'_, f64>,
        labels: ArrayView1<'_, f64>,
        weights: ArrayView1<'_, f64>,
        offsets: ArrayView1<'_, f64>,
        initial: Option<ArrayView1<'_, f64>>,
    ) -> Result<Fit> {
        (**self).fit(features, labels, weights, offsets, initial)
    }
}
