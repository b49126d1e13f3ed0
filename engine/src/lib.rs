//! A hook based training loop.
//!
//! A [`Trainer`] drives epochs and batches over a shared [`RunState`] and
//! delegates every concrete behaviour to [`Pipe`]s attached to its lifecycle
//! points. Checkpointing lives in [`checkpoint`] and multi-process coordination
//! behind the [`Gate`] trait.

pub mod checkpoint;
pub mod collab;
pub mod config;
pub mod error;
pub mod gate;
pub mod hooks;
pub mod pipe;
pub mod state;
mod trainer;

pub use config::TrainerConfig;
pub use error::{Result, TrainErr};
pub use gate::{Gate, LocalGate, ReduceOp};
pub use hooks::{HookRegistry, Point, Priority};
pub use pipe::{Hooks, Lambda, Pipe, Stateful};
pub use state::{Metrics, Mode, RunState, Status};
pub use trainer::{Trainer, TrainerBuilder};
