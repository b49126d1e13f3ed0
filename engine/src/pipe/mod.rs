//! The extension contract: a pipe declares the lifecycle points it takes part in
//! and reacts to them by reading and writing the shared [`RunState`].

mod lambda;

pub use lambda::Lambda;

use crate::{
    hooks::{Point, Priority},
    state::RunState,
};

/// The points a pipe listens to together with the priority for each one.
pub type Hooks = Vec<(Point, Priority)>;

/// A pluggable unit of behaviour attached to the trainer.
///
/// Every point method defaults to a no-op, a pipe only overrides the ones it
/// declares in [`Pipe::hooks`]. Points missing from `hooks` are never dispatched
/// to the pipe even if the method is overridden.
pub trait Pipe: Send {
    /// The stable identity of the pipe. It keys the pipe's checkpoint state
    /// and must be unique within a trainer.
    fn name(&self) -> &str;

    /// The points this pipe participates in and at which priority.
    fn hooks(&self) -> Hooks;

    fn on_init(&mut self, _state: &mut RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn before_epoch(&mut self, _state: &mut RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn before_batch(&mut self, _state: &mut RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn compute_step(&mut self, _state: &mut RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_batch(&mut self, _state: &mut RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_epoch(&mut self, _state: &mut RunState) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_checkpoint(&mut self, _state: &mut RunState) -> anyhow::Result<()> {
        Ok(())
    }

    /// Opts the pipe into checkpointing. Pipes returning `None` are skipped
    /// on both save and restore.
    fn stateful(&mut self) -> Option<&mut dyn Stateful> {
        None
    }
}

/// The checkpointable part of a pipe. The blob format is owned by the pipe.
pub trait Stateful {
    fn export_state(&self) -> anyhow::Result<Vec<u8>>;

    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()>;
}

impl Point {
    /// Runs the method of `pipe` matching this point.
    pub(crate) fn invoke(self, pipe: &mut dyn Pipe, state: &mut RunState) -> anyhow::Result<()> {
        match self {
            Point::OnInit => pipe.on_init(state),
            Point::BeforeEpoch => pipe.before_epoch(state),
            Point::BeforeBatch => pipe.before_batch(state),
            Point::ComputeStep => pipe.compute_step(state),
            Point::AfterBatch => pipe.after_batch(state),
            Point::AfterEpoch => pipe.after_epoch(state),
            Point::OnCheckpoint => pipe.on_checkpoint(state),
        }
    }
}
