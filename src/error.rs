use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used across the whole crate.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Failures raised while validating, training or exporting random effect models.
#[derive(Debug)]
pub enum TrainErr {
    /// Two buffers that must agree in length don't.
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// The job carries values the trainer can't work with.
    InvalidInput(String),
    /// A configuration value is out of its domain.
    InvalidConfig(String),
    /// The optimizer gave up before reaching the requested precision.
    NonConvergence { iterations: usize },
    /// A consumer thread panicked before returning its report.
    ConsumerPanicked { consumer_id: usize },
    /// Pushing into a queue that was already closed.
    QueueClosed,
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch in {what}: got {got}, expected {expected}"),
            TrainErr::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            TrainErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            TrainErr::NonConvergence { iterations } => {
                write!(f, "optimizer did not converge after {iterations} iterations")
            }
            TrainErr::ConsumerPanicked { consumer_id } => {
                write!(f, "consumer {consumer_id} panicked")
            }
            TrainErr::QueueClosed => f.write_str("the job queue is closed"),
            TrainErr::Io(e) => write!(f, "io error: {e}"),
            TrainErr::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Io(e) => Some(e),
            TrainErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
