use std::{fmt::Debug, sync::Arc};

use log::{error, info, warn};

use super::ConsumerReport;
use crate::error::TrainErr;

/// Receives the observations a consumer emits while running.
///
/// Handed to each consumer on construction so runs can be observed without a global
/// logger.
pub trait ConsumerSink: Send + Sync {
    /// The consumer is about to take its first job.
    fn started(&self, consumer_id: usize);

    /// Called every `PROGRESS_EVERY` processed jobs.
    fn progress(&self, consumer_id: usize, processed: usize);

    /// A job failed and was skipped.
    fn failed(&self, consumer_id: usize, entity_id: &dyn Debug, err: &TrainErr);

    /// A job failed and the consumer stops with its error. `terminated` is not called.
    fn aborted(&self, consumer_id: usize, entity_id: &dyn Debug, err: &TrainErr);

    /// The consumer left its loop without errors.
    fn terminated(&self, report: &ConsumerReport);
}

impl<S: ConsumerSink + ?Sized> ConsumerSink for Arc<S> {
    fn started(&self, consumer_id: usize) {
        (**self).started(consumer_id)
    }

    fn progress(&self, consumer_id: usize, processed: usize) {
        (**self).progress(consumer_id, processed)
    }

    fn failed(&self, consumer_id: usize, entity_id: &dyn Debug, err: &TrainErr) {
        (**self).failed(consumer_id, entity_id, err)
    }

    fn aborted(&self, consumer_id: usize, entity_id: &dyn Debug, err: &TrainErr) {
        (**self).aborted(consumer_id, entity_id, err)
    }

    fn terminated(&self, report: &ConsumerReport) {
        (**self).terminated(report)
    }
}

/// Forwards every observation to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ConsumerSink for LogSink {
    fn started(&self, consumer_id: usize) {
        info!(consumer_id = consumer_id; "kicking off training job consumer {consumer_id}");
    }

    fn progress(&self, consumer_id: usize, processed: usize) {
        info!(
            consumer_id = consumer_id, processed = processed;
            "consumer {consumer_id} has completed {processed} training jobs so far"
        );
    }

    fn failed(&self, consumer_id: usize, entity_id: &dyn Debug, err: &TrainErr) {
        warn!(
            consumer_id = consumer_id;
            "consumer {consumer_id} skipped entity {entity_id:?}: {err}"
        );
    }

    fn aborted(&self, consumer_id: usize, entity_id: &dyn Debug, err: &TrainErr) {
        error!(
            consumer_id = consumer_id;
            "terminating consumer {consumer_id} after entity {entity_id:?} failed: {err}"
        );
    }

    fn terminated(&self, report: &ConsumerReport) {
        info!(
            consumer_id = report.consumer_id, processed = report.processed, failed = report.failed;
            "terminating consumer {}: {:?}",
            report.consumer_id,
            report.exhaustion
        );
    }
}
