use std::time::Duration;

use log::debug;
use ndarray::Array1;

use super::{ConsumerReport, ConsumerSink, LogSink};
use crate::{
    config::{ConsumerConfig, FailurePolicy},
    error::Result,
    job::{EntityId, Job},
    queue::{Exhaustion, JobQueue, Pop},
    result::TrainingResult,
    storage::ResultStore,
    trainer::{LogisticRegressionTrainer, ModelTrainer},
};

/// How many processed jobs between two progress observations.
pub const PROGRESS_EVERY: usize = 1000;

enum State {
    Running,
    Terminated(Exhaustion),
}

/// Drains a shared `JobQueue`, training one model per job and publishing it into a
/// shared `ResultStore`.
///
/// If the store already holds a result for the job's entity, its coefficients are used
/// as the starting point of the fit. This is only meaningful when at most one job per
/// entity is in flight across all consumers at any time, which the producer has to
/// guarantee: the consumer does not lock entities.
///
/// A consumer stops once the queue hands it an end marker or stays empty for the whole
/// timeout window. The timeout lets consumers finish without the producer knowing how
/// many of them there are, at the cost of a final idle wait and of terminating early if
/// the producer stalls for longer than the window.
pub struct TrainingJobConsumer<T, S = LogSink> {
    id: usize,
    timeout: Duration,
    on_failure: FailurePolicy,
    trainer: T,
    sink: S,
}

impl TrainingJobConsumer<LogisticRegressionTrainer, LogSink> {
    /// Creates a consumer backed by a `LogisticRegressionTrainer` that logs through `log`.
    ///
    /// # Arguments
    /// * `id` - Identifier used for observability.
    /// * `cfg` - The consumer's configuration.
    ///
    /// # Returns
    /// A new consumer or an `InvalidConfig` error.
    pub fn new(id: usize, cfg: &ConsumerConfig) -> Result<Self> {
        let trainer = LogisticRegressionTrainer::new(cfg.trainer_config());
        Self::with_parts(id, cfg, trainer, LogSink)
    }
}

impl<T: ModelTrainer, S: ConsumerSink> TrainingJobConsumer<T, S> {
    /// Creates a consumer with a custom trainer and observation sink.
    ///
    /// # Arguments
    /// * `id` - Identifier used for observability.
    /// * `cfg` - The consumer's configuration, only its queue and failure settings are
    ///   read here.
    /// * `trainer` - Fits the model of each job.
    /// * `sink` - Receives the consumer's observations.
    ///
    /// # Returns
    /// A new consumer or an `InvalidConfig` error.
    pub fn with_parts(id: usize, cfg: &ConsumerConfig, trainer: T, sink: S) -> Result<Self> {
        cfg.validate()?;

        Ok(Self {
            id,
            timeout: cfg.timeout()?,
            on_failure: cfg.on_failure,
            trainer,
            sink,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Processes jobs until the queue is exhausted.
    ///
    /// # Arguments
    /// * `queue` - Where jobs are taken from.
    /// * `store` - Where results are read from for warm starts and written to.
    ///
    /// # Returns
    /// A report of the run once the queue signals exhaustion.
    ///
    /// # Errors
    /// The first failed fit when the failure policy is `Abort`, after reporting it to the
    /// sink as an abort.
    pub fn run<K: EntityId>(
        &self,
        queue: &JobQueue<K>,
        store: &ResultStore<K>,
    ) -> Result<ConsumerReport> {
        let mut processed = 0;
        let mut failed = 0;
        let mut state = State::Running;

        self.sink.started(self.id);

        while let State::Running = state {
            let job = match queue.pop_with_timeout(self.timeout) {
                Pop::Job(job) => job,
                Pop::Exhausted(why) => {
                    state = State::Terminated(why);
                    continue;
                }
            };

            let (entity_id, outcome) = match self.train(&job, store) {
                Ok(coefficients) => {
                    let (entity_id, indices) = job.into_parts();
                    (entity_id, TrainingResult::new(coefficients, indices))
                }
                Err(e) => (job.into_parts().0, Err(e)),
            };

            match outcome {
                Ok(result) => {
                    store.set(entity_id, result);
                }
                Err(e) => match self.on_failure {
                    FailurePolicy::Abort => {
                        self.sink.aborted(self.id, &entity_id, &e);
                        return Err(e);
                    }
                    FailurePolicy::Skip => {
                        self.sink.failed(self.id, &entity_id, &e);
                        failed += 1;
                        continue;
                    }
                },
            }

            processed += 1;
            if processed % PROGRESS_EVERY == 0 {
                self.sink.progress(self.id, processed);
            }
        }

        let State::Terminated(exhaustion) = state else {
            unreachable!("the loop only exits once terminated");
        };

        let report = ConsumerReport {
            consumer_id: self.id,
            processed,
            failed,
            exhaustion,
        };

        self.sink.terminated(&report);
        Ok(report)
    }

    /// Fits the job's model, warm starting from the entity's stored result if any.
    fn train<K: EntityId>(&self, job: &Job<K>, store: &ResultStore<K>) -> Result<Array1<f64>> {
        let previous = store.get(job.entity_id());
        let initial = previous.as_ref().map(|result| result.coefficients().view());

        let fit = self.trainer.fit(
            job.features().view(),
            job.labels().view(),
            job.weights().view(),
            job.offsets().view(),
            initial,
        )?;

        if !fit.converged {
            debug!(
                consumer_id = self.id, iterations = fit.iterations;
                "fit for entity {:?} stopped before converging",
                job.entity_id()
            );
        }

        Ok(fit.coefficients)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fmt::Debug,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Instant,
    };

    use ndarray::{Array1, Array2, ArrayView1, ArrayView2, array};
    use parking_lot::Mutex;

    use super::*;
    use crate::{error::TrainErr, trainer::Fit};

    /// Records the initial vector of every call and returns `initial + 1` (or ones).
    #[derive(Default)]
    struct RecordingTrainer {
        initials: Mutex<Vec<Option<Vec<f64>>>>,
    }

    impl ModelTrainer for RecordingTrainer {
        fn fit(
            &self,
            features: ArrayView2<'_, f64>,
            _labels: ArrayView1<'_, f64>,
            _weights: ArrayView1<'_, f64>,
            _offsets: ArrayView1<'_, f64>,
            initial: Option<ArrayView1<'_, f64>>,
        ) -> crate::error::Result<Fit> {
            self.initials.lock().push(initial.map(|v| v.to_vec()));

            let coefficients = match initial {
                Some(theta) => &theta + 1.,
                None => Array1::ones(features.ncols() + 1),
            };

            Ok(Fit {
                coefficients,
                loss: 0.,
                iterations: 1,
                converged: true,
            })
        }
    }

    /// Fails on any job carrying a label of 0.5.
    struct FlakyTrainer;

    impl ModelTrainer for FlakyTrainer {
        fn fit(
            &self,
            features: ArrayView2<'_, f64>,
            labels: ArrayView1<'_, f64>,
            _weights: ArrayView1<'_, f64>,
            _offsets: ArrayView1<'_, f64>,
            _initial: Option<ArrayView1<'_, f64>>,
        ) -> crate::error::Result<Fit> {
            if labels.iter().any(|&y| y == 0.5) {
                return Err(TrainErr::InvalidInput("poisoned".into()));
            }

            Ok(Fit {
                coefficients: Array1::zeros(features.ncols() + 1),
                loss: 0.,
                iterations: 1,
                converged: true,
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        started: AtomicUsize,
        progress: Mutex<Vec<usize>>,
        failed: Mutex<Vec<String>>,
        aborted: Mutex<Vec<String>>,
        terminated: Mutex<Vec<ConsumerReport>>,
    }

    impl ConsumerSink for RecordingSink {
        fn started(&self, _consumer_id: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn progress(&self, _consumer_id: usize, processed: usize) {
            self.progress.lock().push(processed);
        }

        fn failed(&self, _consumer_id: usize, entity_id: &dyn Debug, _err: &TrainErr) {
            self.failed.lock().push(format!("{entity_id:?}"));
        }

        fn aborted(&self, _consumer_id: usize, entity_id: &dyn Debug, _err: &TrainErr) {
            self.aborted.lock().push(format!("{entity_id:?}"));
        }

        fn terminated(&self, report: &ConsumerReport) {
            self.terminated.lock().push(report.clone());
        }
    }

    const SHORT: f64 = 0.05;

    fn cfg(timeout_seconds: f64, on_failure: FailurePolicy) -> ConsumerConfig {
        ConsumerConfig {
            timeout_seconds,
            on_failure,
            ..Default::default()
        }
    }

    fn job(entity: &'static str, label: f64) -> Job<&'static str> {
        Job::new(
            entity,
            array![[1., 0.], [0., 1.], [1., 1.]],
            array![0., 1., label],
            None,
            None,
            vec![5, 7],
        )
        .unwrap()
    }

    #[test]
    fn test_first_job_has_no_warm_start_then_second_reuses_result() {
        let trainer = Arc::new(RecordingTrainer::default());
        let consumer = TrainingJobConsumer::with_parts(
            0,
            &cfg(SHORT, FailurePolicy::Abort),
            Arc::clone(&trainer),
            RecordingSink::default(),
        )
        .unwrap();

        let queue = JobQueue::unbounded();
        let store = ResultStore::default();
        queue.push(job("E1", 1.)).unwrap();
        queue.push(job("E1", 1.)).unwrap();
        queue.push_end().unwrap();

        let report = consumer.run(&queue, &store).unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.exhaustion, Exhaustion::EndOfStream);

        let initials = trainer.initials.lock();
        assert_eq!(initials[0], None);
        assert_eq!(initials[1], Some(vec![1., 1., 1.]));

        let stored = store.get(&"E1").unwrap();
        assert_eq!(stored.coefficients(), &array![2., 2., 2.]);
    }

    #[test]
    fn test_result_keeps_indices_and_shape() {
        let consumer = TrainingJobConsumer::new(3, &cfg(SHORT, FailurePolicy::Abort)).unwrap();
        let queue = JobQueue::unbounded();
        let store = ResultStore::default();
        queue.push(job("E1", 1.)).unwrap();
        queue.push_end().unwrap();

        consumer.run(&queue, &store).unwrap();

        let result = store.get(&"E1").unwrap();
        assert_eq!(result.coefficients().len(), 3);
        assert_eq!(result.unique_global_indices(), &[5, 7]);
    }

    #[test]
    fn test_empty_queue_terminates_after_timeout() {
        let trainer = Arc::new(RecordingTrainer::default());
        let sink = Arc::new(RecordingSink::default());
        let consumer = TrainingJobConsumer::with_parts(
            1,
            &cfg(0.2, FailurePolicy::Abort),
            Arc::clone(&trainer),
            Arc::clone(&sink),
        )
        .unwrap();

        let queue: JobQueue<&'static str> = JobQueue::unbounded();
        let store = ResultStore::default();

        let start = Instant::now();
        let report = consumer.run(&queue, &store).unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(200), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");
        assert_eq!(report.exhaustion, Exhaustion::TimedOut);
        assert_eq!(report.processed, 0);
        assert!(trainer.initials.lock().is_empty());
        assert!(store.is_empty());
        assert_eq!(sink.started.load(Ordering::SeqCst), 1);
        assert_eq!(sink.terminated.lock().as_slice(), &[report]);
    }

    #[test]
    fn test_end_marker_skips_the_timeout() {
        let consumer = TrainingJobConsumer::with_parts(
            0,
            &cfg(60., FailurePolicy::Abort),
            RecordingTrainer::default(),
            RecordingSink::default(),
        )
        .unwrap();

        let queue: JobQueue<&'static str> = JobQueue::unbounded();
        queue.push_end().unwrap();

        let start = Instant::now();
        let report = consumer.run(&queue, &ResultStore::default()).unwrap();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(report.exhaustion, Exhaustion::EndOfStream);
    }

    #[test]
    fn test_progress_is_reported_every_thousand_jobs() {
        let sink = Arc::new(RecordingSink::default());
        let consumer = TrainingJobConsumer::with_parts(
            0,
            &cfg(SHORT, FailurePolicy::Abort),
            RecordingTrainer::default(),
            Arc::clone(&sink),
        )
        .unwrap();

        let queue = JobQueue::unbounded();
        let store = ResultStore::default();
        for i in 0..2500u64 {
            let job = Job::new(i, Array2::zeros((1, 1)), array![1.], None, None, vec![0]).unwrap();
            queue.push(job).unwrap();
        }
        queue.push_end().unwrap();

        let report = consumer.run(&queue, &store).unwrap();

        assert_eq!(report.processed, 2500);
        assert_eq!(*sink.progress.lock(), vec![1000, 2000]);
        assert_eq!(store.len(), 2500);
    }

    #[test]
    fn test_abort_policy_propagates_the_failure() {
        let sink = Arc::new(RecordingSink::default());
        let consumer = TrainingJobConsumer::with_parts(
            0,
            &cfg(SHORT, FailurePolicy::Abort),
            FlakyTrainer,
            Arc::clone(&sink),
        )
        .unwrap();

        let queue = JobQueue::unbounded();
        let store = ResultStore::default();
        queue.push(job("bad", 0.5)).unwrap();
        queue.push(job("good", 1.)).unwrap();

        let err = consumer.run(&queue, &store).unwrap_err();

        assert!(matches!(err, TrainErr::InvalidInput(_)));
        assert!(store.is_empty());
        assert_eq!(queue.len(), 1);
        assert_eq!(*sink.aborted.lock(), vec!["\"bad\"".to_string()]);
        assert!(sink.failed.lock().is_empty());
        assert!(sink.terminated.lock().is_empty());
    }

    #[test]
    fn test_skip_policy_continues_after_failure() {
        let sink = Arc::new(RecordingSink::default());
        let consumer = TrainingJobConsumer::with_parts(
            0,
            &cfg(SHORT, FailurePolicy::Skip),
            FlakyTrainer,
            Arc::clone(&sink),
        )
        .unwrap();

        let queue = JobQueue::unbounded();
        let store = ResultStore::default();
        queue.push(job("bad", 0.5)).unwrap();
        queue.push(job("good", 1.)).unwrap();
        queue.push_end().unwrap();

        let report = consumer.run(&queue, &store).unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert!(store.contains(&"good"));
        assert!(!store.contains(&"bad"));
        assert_eq!(*sink.failed.lock(), vec!["\"bad\"".to_string()]);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = TrainingJobConsumer::new(0, &cfg(0., FailurePolicy::Abort)).err();
        assert!(matches!(err, Some(TrainErr::InvalidConfig(_))));
    }
}
