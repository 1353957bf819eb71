mod shard;
mod store;

pub(super) use shard::ResultShard;
pub use store::{DEFAULT_SHARDS, ResultStore};
