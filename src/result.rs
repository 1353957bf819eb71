use ndarray::{Array1, ArrayView1};

use crate::error::{Result, TrainErr};

/// The trained model of a single entity.
///
/// `coefficients` holds one weight per local feature followed by the intercept, and
/// `unique_global_indices` maps each local position back to the global feature space.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingResult {
    coefficients: Array1<f64>,
    unique_global_indices: Vec<usize>,
}

impl TrainingResult {
    /// Creates a new `TrainingResult`.
    ///
    /// # Returns
    /// A `ShapeMismatch` unless there is exactly one coefficient per index plus the intercept.
    pub fn new(coefficients: Array1<f64>, unique_global_indices: Vec<usize>) -> Result<Self> {
        let expected = unique_global_indices.len() + 1;
        if coefficients.len() != expected {
            return Err(TrainErr::ShapeMismatch {
                what: "coefficients",
                got: coefficients.len(),
                expected,
            });
        }

        Ok(Self {
            coefficients,
            unique_global_indices,
        })
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn unique_global_indices(&self) -> &[usize] {
        &self.unique_global_indices
    }

    /// The bias term, always stored last.
    pub fn intercept(&self) -> f64 {
        self.coefficients[self.coefficients.len() - 1]
    }

    /// The feature weights without the intercept.
    pub fn weights(&self) -> ArrayView1<'_, f64> {
        self.coefficients
            .slice(ndarray::s![..self.unique_global_indices.len()])
    }

    /// Pairs every feature weight with its global feature index.
    pub fn to_global_pairs(&self) -> Vec<(usize, f64)> {
        self.unique_global_indices
            .iter()
            .copied()
            .zip(self.weights().iter().copied())
            .collect()
    }

    /// Linear predictor of one sample expressed in local feature positions.
    pub fn predict_logit(&self, row: ArrayView1<'_, f64>) -> Result<f64> {
        if row.len() != self.unique_global_indices.len() {
            return Err(TrainErr::ShapeMismatch {
                what: "row",
                got: row.len(),
                expected: self.unique_global_indices.len(),
            });
        }

        Ok(self.weights().dot(&row) + self.intercept())
    }
}
