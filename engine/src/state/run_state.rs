use std::sync::Arc;

use ndarray::Array2;

use super::{Metrics, Mode, Status};
use crate::{
    checkpoint::CheckpointRequest,
    collab::{Batch, Dataset, Loader, Model, Optimizer},
    error::{Result, TrainErr},
    gate::Gate,
};

/// The single mutable record shared by every pipe of a training process.
///
/// Pipes never talk to each other directly, everything they exchange goes
/// through here.
pub struct RunState {
    /// Completed training epochs.
    pub epoch: usize,
    /// Batches processed in the current epoch.
    pub iteration: usize,
    pub mode: Mode,
    pub subset: String,
    pub status: Status,
    pub metrics: Metrics,

    pub batch: Option<Batch>,
    pub output: Option<Array2<f32>>,
    pub loss: Option<f32>,
    pub grad: Vec<f32>,

    pub model: Option<Box<dyn Model>>,
    pub dataset: Option<Arc<dyn Dataset>>,
    pub loader: Option<Loader>,
    pub optimizers: Vec<Box<dyn Optimizer>>,
    pub gate: Box<dyn Gate>,

    /// Set by a pipe during `on_checkpoint` to have the trainer write a snapshot.
    pub checkpoint: Option<CheckpointRequest>,
}

impl RunState {
    /// Creates a new `RunState` with zeroed counters and nothing bound.
    pub fn new(gate: Box<dyn Gate>) -> Self {
        Self {
            epoch: 0,
            iteration: 0,
            mode: Mode::Train,
            subset: String::new(),
            status: Status::default(),
            metrics: Metrics::default(),
            batch: None,
            output: None,
            loss: None,
            grad: Vec::new(),
            model: None,
            dataset: None,
            loader: None,
            optimizers: Vec::new(),
            gate,
            checkpoint: None,
        }
    }

    pub fn model(&self) -> Result<&dyn Model> {
        self.model
            .as_deref()
            .ok_or(TrainErr::MissingCollaborator("model"))
    }

    pub fn model_mut(&mut self) -> Result<&mut (dyn Model + 'static)> {
        self.model
            .as_deref_mut()
            .ok_or(TrainErr::MissingCollaborator("model"))
    }

    pub fn batch(&self) -> Result<&Batch> {
        self.batch
            .as_ref()
            .ok_or(TrainErr::MissingCollaborator("batch"))
    }

    pub fn is_designated_actor(&self) -> bool {
        self.gate.is_designated_actor()
    }

    /// Drops everything tied to the current batch.
    pub(crate) fn clear_batch(&mut self) {
        self.batch = None;
        self.output = None;
        self.loss = None;
    }
}
