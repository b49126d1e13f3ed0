use anyhow::{Context, bail, ensure};
use engine::{Hooks, Pipe, Point, ReduceOp, RunState, collab::Optimizer};
use log::debug;

/// Binds the optimizers and applies one update per training batch.
///
/// With more than one process the gradient is averaged across ranks before any
/// optimizer sees it, so every rank applies the same update.
pub struct OneStepOptimizers {
    pending: Vec<Box<dyn Optimizer>>,
}

impl OneStepOptimizers {
    pub fn new(optimizers: Vec<Box<dyn Optimizer>>) -> Self {
        Self {
            pending: optimizers,
        }
    }

    pub fn single(optimizer: Box<dyn Optimizer>) -> Self {
        Self::new(vec![optimizer])
    }
}

impl Pipe for OneStepOptimizers {
    fn name(&self) -> &str {
        "optimizers"
    }

    fn hooks(&self) -> Hooks {
        vec![
            (Point::OnInit, 10),
            (Point::BeforeBatch, 0),
            (Point::ComputeStep, 20),
        ]
    }

    fn on_init(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        if self.pending.is_empty() {
            bail!("no optimizers to bind");
        }

        let size = state.model()?.size();
        for (i, optimizer) in self.pending.iter().enumerate() {
            if let Some(range) = optimizer.param_range() {
                ensure!(
                    range.end <= size,
                    "optimizer {i} owns parameters {range:?} of a model with {size}"
                );
            }
        }

        state.optimizers.append(&mut self.pending);
        Ok(())
    }

    fn before_batch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        if state.mode.is_training() {
            state.grad.fill(0.0);
        }

        Ok(())
    }

    fn compute_step(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        if !state.mode.is_training() {
            return Ok(());
        }

        let RunState {
            status,
            grad,
            model,
            optimizers,
            gate,
            ..
        } = state;

        if gate.world_size() > 1 {
            gate.all_reduce(grad, ReduceOp::Mean)?;
        }

        let params = model.as_deref_mut().context("no model bound")?.params_mut();
        ensure!(
            params.len() == grad.len(),
            "gradient has {} values for {} parameters",
            grad.len(),
            params.len()
        );

        for optimizer in optimizers.iter_mut() {
            match optimizer.param_range() {
                Some(range) => optimizer.step(&mut params[range.clone()], &grad[range])?,
                None => optimizer.step(params, grad)?,
            }
        }

        if let Some(first) = optimizers.first() {
            status.insert("lr", first.learning_rate());
        }

        debug!(optimizers = optimizers.len(); "stepped");
        Ok(())
    }
}
