use std::{sync::Arc, thread};

use log::{error, info};

use crate::{
    config::PoolConfig,
    consumer::{ConsumerReport, ConsumerSink, LogSink, TrainingJobConsumer},
    error::{Result, TrainErr},
    job::EntityId,
    queue::JobQueue,
    storage::ResultStore,
    trainer::{LogisticRegressionTrainer, ModelTrainer},
};

/// A set of consumers draining the same queue concurrently, one OS thread each.
///
/// Consumers don't coordinate with each other: each one decides on its own when the
/// queue is exhausted. The exception is failure: a consumer that returns an error or
/// panics closes the queue, so the others drain what is pending and stop instead of
/// waiting out their timeout.
pub struct ConsumerPool<T, S = LogSink> {
    consumers: Vec<TrainingJobConsumer<T, S>>,
}

impl ConsumerPool<Arc<LogisticRegressionTrainer>, LogSink> {
    /// Creates `cfg.consumers` consumers sharing one `LogisticRegressionTrainer`.
    pub fn new(cfg: &PoolConfig) -> Result<Self> {
        let trainer = Arc::new(LogisticRegressionTrainer::new(cfg.consumer.trainer_config()));

        Self::with_factory(cfg.consumers.get(), |id| {
            TrainingJobConsumer::with_parts(id, &cfg.consumer, Arc::clone(&trainer), LogSink)
        })
    }
}

impl<T: ModelTrainer, S: ConsumerSink> ConsumerPool<T, S> {
    /// Creates a pool of `n` consumers built by `factory`, which receives each consumer's id.
    pub fn with_factory<F>(n: usize, factory: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<TrainingJobConsumer<T, S>>,
    {
        let consumers = (0..n).map(factory).collect::<Result<Vec<_>>>()?;
        Ok(Self { consumers })
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Runs every consumer until each one observes exhaustion.
    ///
    /// # Arguments
    /// * `queue` - The queue shared by every consumer.
    /// * `store` - The store shared by every consumer.
    ///
    /// # Returns
    /// One report per consumer, ordered by consumer id.
    ///
    /// # Errors
    /// The first error returned by a consumer, or `ConsumerPanicked`. Every consumer is
    /// joined before returning. If a consumer thread can't be spawned the queue is closed
    /// and the ones already running stop once it is drained.
    pub fn run<K: EntityId>(
        &self,
        queue: &JobQueue<K>,
        store: &ResultStore<K>,
    ) -> Result<Vec<ConsumerReport>> {
        info!("starting {} training job consumers", self.consumers.len());

        let outcomes = thread::scope(|s| {
            let mut handles = Vec::with_capacity(self.consumers.len());

            for consumer in &self.consumers {
                let handle = thread::Builder::new()
                    .name(format!("consumer-{}", consumer.id()))
                    .spawn_scoped(s, move || {
                        let mut guard = CloseOnFailure { queue, armed: true };
                        let report = consumer.run(queue, store);
                        guard.armed = report.is_err();
                        report
                    });

                match handle {
                    Ok(handle) => handles.push((consumer.id(), handle)),
                    Err(e) => {
                        error!("failed to spawn consumer {}: {e}", consumer.id());
                        // Already running consumers stop once the queue is drained.
                        queue.close();
                        return vec![Err(TrainErr::Io(e))];
                    }
                }
            }

            handles
                .into_iter()
                .map(|(consumer_id, handle)| {
                    handle
                        .join()
                        .unwrap_or(Err(TrainErr::ConsumerPanicked { consumer_id }))
                })
                .collect::<Vec<_>>()
        });

        let reports = outcomes.into_iter().collect::<Result<Vec<_>>>()?;
        let processed: usize = reports.iter().map(|r| r.processed).sum();
        info!("all consumers terminated, {processed} training jobs processed");

        Ok(reports)
    }
}

/// Closes the queue when dropped while armed, which includes unwinding from a panic.
struct CloseOnFailure<'a, K> {
    queue: &'a JobQueue<K>,
    armed: bool,
}

impl<K> Drop for CloseOnFailure<'_, K> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.close();
        }
    }
}
