use anyhow::{anyhow, ensure};
use engine::{Hooks, Pipe, Point, ReduceOp, RunState, Stateful, checkpoint::Objective};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Plateau {
    best: Option<f64>,
    bad_epochs: usize,
}

/// Scales the learning rate of every optimizer down once the monitored metric
/// stops improving for `patience` evaluations.
///
/// The metric is reduced across ranks before it's looked at, so every process
/// takes the same decision.
pub struct ReduceLrOnPlateau {
    metric: String,
    subset: String,
    objective: Objective,
    factor: f32,
    patience: usize,
    min_lr: f32,
    plateau: Plateau,
}

impl ReduceLrOnPlateau {
    /// Creates a new `ReduceLrOnPlateau` minimizing `metric` on `"valid"`.
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            subset: "valid".to_string(),
            objective: Objective::Minimize,
            factor: 0.1,
            patience: 10,
            min_lr: 0.0,
            plateau: Plateau::default(),
        }
    }

    pub fn subset(mut self, subset: impl Into<String>) -> Self {
        self.subset = subset.into();
        self
    }

    pub fn objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    /// # Errors
    /// Fails unless `0 < factor < 1`.
    pub fn factor(mut self, factor: f32) -> anyhow::Result<Self> {
        ensure!(factor > 0.0 && factor < 1.0, "factor must lie in (0, 1), got {factor}");
        self.factor = factor;
        Ok(self)
    }

    pub fn patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn min_lr(mut self, min_lr: f32) -> Self {
        self.min_lr = min_lr;
        self
    }

    fn step(&mut self, value: f64, state: &mut RunState) {
        if self.objective.improves(value, self.plateau.best) {
            self.plateau.best = Some(value);
            self.plateau.bad_epochs = 0;
            return;
        }

        self.plateau.bad_epochs += 1;
        if self.plateau.bad_epochs <= self.patience {
            return;
        }

        self.plateau.bad_epochs = 0;
        for optimizer in state.optimizers.iter_mut() {
            let lr = (optimizer.learning_rate() * self.factor).max(self.min_lr);
            optimizer.set_learning_rate(lr);
        }

        if let Some(first) = state.optimizers.first() {
            let lr = first.learning_rate();
            state.status.insert("lr", lr);

            if state.is_designated_actor() {
                info!(epoch = state.epoch, lr = lr; "learning rate reduced");
            }
        }
    }
}

impl Pipe for ReduceLrOnPlateau {
    fn name(&self) -> &str {
        "scheduler"
    }

    fn hooks(&self) -> Hooks {
        vec![(Point::AfterEpoch, 50)]
    }

    fn after_epoch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        if state.mode.is_training() || state.subset != self.subset {
            return Ok(());
        }

        let local = state.metrics.get(&self.metric, &self.subset).ok_or_else(|| {
            anyhow!("no `{}` value for subset `{}` to schedule on", self.metric, self.subset)
        })?;

        let value = state.gate.reduce_metric(local, ReduceOp::Mean)?;
        state.status.insert("scheduler.metric", value);

        self.step(value, state);
        Ok(())
    }

    fn stateful(&mut self) -> Option<&mut dyn Stateful> {
        Some(self)
    }
}

impl Stateful for ReduceLrOnPlateau {
    fn export_state(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.plateau)?)
    }

    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()> {
        self.plateau = serde_json::from_slice(blob)?;
        Ok(())
    }
}
