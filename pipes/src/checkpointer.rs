use std::path::PathBuf;

use anyhow::anyhow;
use engine::{
    Hooks, Pipe, Point, RunState, Stateful,
    checkpoint::{CheckpointRequest, Objective},
};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Best {
    value: Option<f64>,
}

/// Asks the trainer for a snapshot at the end of every checkpoint cycle.
///
/// The comparison value is `metrics[metric][subset]`. Only the designated actor
/// requests the write, but every rank tracks the best value so any of them can
/// take over after a restore.
pub struct Checkpointer {
    name: String,
    prefix: PathBuf,
    metric: String,
    subset: String,
    objective: Objective,
    best: Best,
}

impl Checkpointer {
    /// Creates a new `Checkpointer` comparing on the `"valid"` subset of `metric`.
    pub fn new(prefix: impl Into<PathBuf>, metric: impl Into<String>) -> Self {
        Self {
            name: "checkpointer".to_string(),
            prefix: prefix.into(),
            metric: metric.into(),
            subset: "valid".to_string(),
            objective: Objective::default(),
            best: Best::default(),
        }
    }

    /// Renames the pipe, needed to attach more than one checkpointer.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn subset(mut self, subset: impl Into<String>) -> Self {
        self.subset = subset.into();
        self
    }

    pub fn objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    /// The best comparison value seen so far.
    pub fn best(&self) -> Option<f64> {
        self.best.value
    }
}

impl Pipe for Checkpointer {
    fn name(&self) -> &str {
        &self.name
    }

    fn hooks(&self) -> Hooks {
        vec![(Point::OnCheckpoint, 0)]
    }

    fn on_checkpoint(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        let value = state.metrics.get(&self.metric, &self.subset).ok_or_else(|| {
            anyhow!(
                "no `{}` value for subset `{}` to compare checkpoints on",
                self.metric,
                self.subset
            )
        })?;

        if state.is_designated_actor() {
            state.checkpoint = Some(CheckpointRequest {
                prefix: self.prefix.clone(),
                value,
                previous_best: self.best.value,
                objective: self.objective,
            });
        }

        if self.objective.improves(value, self.best.value) {
            debug!(value = value; "new best `{}`", self.metric);
            self.best.value = Some(value);
        }

        Ok(())
    }

    fn stateful(&mut self) -> Option<&mut dyn Stateful> {
        Some(self)
    }
}

impl Stateful for Checkpointer {
    fn export_state(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.best)?)
    }

    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()> {
        self.best = serde_json::from_slice(blob)?;
        Ok(())
    }
}
