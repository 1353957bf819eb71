pub mod config;
pub mod consumer;
pub mod error;
pub mod export;
pub mod job;
pub mod pool;
pub mod queue;
pub mod result;
pub mod storage;
pub mod trainer;

pub use config::{ConsumerConfig, FailurePolicy, PoolConfig, TrainerConfig};
pub use consumer::{ConsumerReport, ConsumerSink, LogSink, TrainingJobConsumer};
pub use error::{Result, TrainErr};
pub use job::{EntityId, Job};
pub use pool::ConsumerPool;
pub use queue::{Exhaustion, JobQueue, Pop};
pub use result::TrainingResult;
pub use storage::ResultStore;
pub use trainer::{Fit, LogisticRegressionTrainer, ModelTrainer};
