//! Sink side of the loader: pushes aggregated entries into the sharded store.

pub mod writer;

pub use writer::{ShardWriter, WriteSummary};
