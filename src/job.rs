use std::{fmt::Debug, hash::Hash};

use ndarray::{Array1, Array2};

use crate::error::{Result, TrainErr};

/// Anything usable as the grouping key of a random effect.
pub trait EntityId: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> EntityId for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// One training task: the data of a single entity.
///
/// Built through `Job::new`, which enforces that every per-sample vector has one entry
/// per row of `features` and that every column maps to a global feature index.
#[derive(Debug, Clone)]
pub struct Job<K> {
    entity_id: K,
    features: Array2<f64>,
    labels: Array1<f64>,
    weights: Array1<f64>,
    offsets: Array1<f64>,
    unique_global_indices: Vec<usize>,
}

impl<K: EntityId> Job<K> {
    /// Creates a new `Job`.
    ///
    /// # Arguments
    /// * `entity_id` - The entity this job trains a model for.
    /// * `features` - The local design matrix, one row per sample.
    /// * `labels` - The binary responses.
    /// * `weights` - The sample weights, all ones when `None`.
    /// * `offsets` - The per-sample offsets, all zeros when `None`.
    /// * `unique_global_indices` - The global feature index of each column of `features`.
    ///
    /// # Returns
    /// A new `Job` or a `ShapeMismatch` if the dimensions disagree.
    pub fn new(
        entity_id: K,
        features: Array2<f64>,
        labels: Array1<f64>,
        weights: Option<Array1<f64>>,
        offsets: Option<Array1<f64>>,
        unique_global_indices: Vec<usize>,
    ) -> Result<Self> {
        let rows = features.nrows();
        let weights = weights.unwrap_or_else(|| Array1::ones(rows));
        let offsets = offsets.unwrap_or_else(|| Array1::zeros(rows));

        let job = Self {
            entity_id,
            features,
            labels,
            weights,
            offsets,
            unique_global_indices,
        };

        job.validate()?;
        Ok(job)
    }

    /// Checks the dimensional invariants of the job.
    pub fn validate(&self) -> Result<()> {
        let rows = self.features.nrows();

        for (what, got) in [
            ("labels", self.labels.len()),
            ("weights", self.weights.len()),
            ("offsets", self.offsets.len()),
        ] {
            if got != rows {
                return Err(TrainErr::ShapeMismatch {
                    what,
                    got,
                    expected: rows,
                });
            }
        }

        if self.unique_global_indices.len() != self.features.ncols() {
            return Err(TrainErr::ShapeMismatch {
                what: "unique_global_indices",
                got: self.unique_global_indices.len(),
                expected: self.features.ncols(),
            });
        }

        Ok(())
    }
}

impl<K> Job<K> {
    pub fn entity_id(&self) -> &K {
        &self.entity_id
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn labels(&self) -> &Array1<f64> {
        &self.labels
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn offsets(&self) -> &Array1<f64> {
        &self.offsets
    }

    pub fn unique_global_indices(&self) -> &[usize] {
        &self.unique_global_indices
    }

    /// Number of samples in the job.
    pub fn rows(&self) -> usize {
        self.features.nrows()
    }

    /// Consumes the job, keeping only what outlives training.
    pub fn into_parts(self) -> (K, Vec<usize>) {
        (self.entity_id, self.unique_global_indices)
    }
}
