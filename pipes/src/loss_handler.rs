use anyhow::{Context, ensure};
use engine::{Hooks, Pipe, Point, RunState, collab::LossFn};

/// Scores the model output of every batch and, while training, backpropagates
/// the loss into the shared gradient buffer.
pub struct LossHandler {
    loss_fn: Box<dyn LossFn>,
}

impl LossHandler {
    pub fn new(loss_fn: Box<dyn LossFn>) -> Self {
        Self { loss_fn }
    }
}

impl Pipe for LossHandler {
    fn name(&self) -> &str {
        "loss_handler"
    }

    fn hooks(&self) -> Hooks {
        vec![(Point::ComputeStep, 10)]
    }

    fn compute_step(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        let RunState {
            mode,
            status,
            batch,
            output,
            loss,
            grad,
            model,
            ..
        } = state;

        let batch = batch.as_ref().context("no batch to score")?;
        let y_pred = output
            .as_ref()
            .context("no model output, is a model handler attached?")?;

        ensure!(
            y_pred.dim() == batch.y.dim(),
            "model output has shape {:?}, expected {:?}",
            y_pred.dim(),
            batch.y.dim()
        );

        let value = self.loss_fn.loss(y_pred.view(), batch.y.view());
        *loss = Some(value);
        status.insert("loss", value);

        if !mode.is_training() {
            return Ok(());
        }

        let model = model.as_deref_mut().context("no model bound")?;
        if grad.len() != model.size() {
            grad.resize(model.size(), 0.0);
        }

        let d_out = self.loss_fn.loss_prime(y_pred.view(), batch.y.view());
        model.backward(d_out.view(), grad)
    }
}
