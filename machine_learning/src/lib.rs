//! Small reference implementations of the collaborators a [`engine::Trainer`]
//! orchestrates: a dense sequential network, losses, metrics, optimizers and an
//! in-memory dataset, plus the JSON specs that build them.

pub mod arch;
pub mod dataset;
pub mod error;
pub mod initialization;
pub mod loss;
pub mod optimization;
pub mod specs;

pub use error::{MlErr, Result};
