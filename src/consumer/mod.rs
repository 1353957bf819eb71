mod consumer;
mod report;
mod sink;

pub use consumer::{PROGRESS_EVERY, TrainingJobConsumer};
pub use report::ConsumerReport;
pub use sink::{ConsumerSink, LogSink};
