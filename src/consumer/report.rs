use crate::queue::Exhaustion;

/// What a consumer did before terminating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerReport {
    pub consumer_id: usize,
    /// Jobs whose result made it into the store.
    pub processed: usize,
    /// Jobs skipped because fitting them failed.
    pub failed: usize,
    pub exhaustion: Exhaustion,
}
