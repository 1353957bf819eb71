use std::{fs, num::NonZeroUsize, path::Path, thread, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TrainErr},
    storage::DEFAULT_SHARDS,
};

/// What a consumer does when fitting a job fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the consumer and return the error.
    #[default]
    Abort,
    /// Report the failure and move on to the next job.
    Skip,
}

/// Settings of a single `TrainingJobConsumer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub regularize_bias: bool,
    pub lambda_l2: f64,
    pub tolerance: f64,
    pub num_curvature_pairs: usize,
    pub max_iterations: usize,
    /// How long a consumer waits on an empty queue before concluding there's no more work.
    pub timeout_seconds: f64,
    pub on_failure: FailurePolicy,
    /// Treat running out of iterations as a failed fit.
    pub strict_convergence: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            regularize_bias: false,
            lambda_l2: 1.0,
            tolerance: 1e-8,
            num_curvature_pairs: 10,
            max_iterations: 100,
            timeout_seconds: 300.0,
            on_failure: FailurePolicy::Abort,
            strict_convergence: false,
        }
    }
}

impl ConsumerConfig {
    /// Checks every value is within its domain.
    pub fn validate(&self) -> Result<()> {
        if !self.timeout_seconds.is_finite() || self.timeout_seconds <= 0. {
            return Err(TrainErr::InvalidConfig(format!(
                "timeout_seconds must be positive, got {}",
                self.timeout_seconds
            )));
        }

        if !self.lambda_l2.is_finite() || self.lambda_l2 < 0. {
            return Err(TrainErr::InvalidConfig(format!(
                "lambda_l2 must be non-negative, got {}",
                self.lambda_l2
            )));
        }

        if !self.tolerance.is_finite() || self.tolerance <= 0. {
            return Err(TrainErr::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }

        if self.num_curvature_pairs == 0 {
            return Err(TrainErr::InvalidConfig(
                "num_curvature_pairs must be at least 1".into(),
            ));
        }

        if self.max_iterations == 0 {
            return Err(TrainErr::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// The queue wait window.
    ///
    /// # Errors
    /// `InvalidConfig` if `timeout_seconds` can't be represented as a `Duration`.
    pub fn timeout(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.timeout_seconds)
            .map_err(|e| TrainErr::InvalidConfig(format!("timeout_seconds: {e}")))
    }

    /// The optimizer settings derived from this configuration.
    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            regularize_bias: self.regularize_bias,
            lambda_l2: self.lambda_l2,
            precision: self.tolerance / f64::EPSILON,
            num_corrections: self.num_curvature_pairs,
            max_iterations: self.max_iterations,
            strict_convergence: self.strict_convergence,
        }
    }
}

/// Settings of the logistic regression trainer.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub regularize_bias: bool,
    pub lambda_l2: f64,
    /// Relative reduction threshold in multiples of machine epsilon.
    pub precision: f64,
    pub num_corrections: usize,
    pub max_iterations: usize,
    pub strict_convergence: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        ConsumerConfig::default().trainer_config()
    }
}

/// Settings of a whole `ConsumerPool` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub consumers: NonZeroUsize,
    pub queue_capacity: Option<NonZeroUsize>,
    pub store_shards: NonZeroUsize,
    pub consumer: ConsumerConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            consumers: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            queue_capacity: None,
            store_shards: DEFAULT_SHARDS,
            consumer: ConsumerConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.consumer.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
