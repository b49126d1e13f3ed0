//! A [`Gate`](engine::Gate) backed by a star of framed channels.
//!
//! Rank 0 is the coordinator: it holds one link per peer, folds every
//! contribution in rank order and sends the result back, so all ranks observe
//! bit-identical values.

mod cluster;
mod env;
mod tcp;

pub use cluster::{ClusterGate, MemoryGate, in_process};
pub use env::{ClusterEnv, DEFAULT_MASTER_ADDR};
pub use tcp::TcpGate;
