//! Interfaces of the collaborators the engine orchestrates but doesn't implement.

mod data;
mod loss;
mod model;
mod optimizer;

pub use data::{Batch, Collate, Dataset, Loader, Sample, default_collate, shard_range};
pub use loss::{LossFn, Metric};
pub use model::Model;
pub use optimizer::Optimizer;
