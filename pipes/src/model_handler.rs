use anyhow::{Context, bail};
use engine::{Hooks, Pipe, Point, RunState, collab::Model};

/// Binds the model and runs its forward pass on every batch.
pub struct ModelHandler {
    model: Option<Box<dyn Model>>,
}

impl ModelHandler {
    pub fn new(model: Box<dyn Model>) -> Self {
        Self { model: Some(model) }
    }
}

impl Pipe for ModelHandler {
    fn name(&self) -> &str {
        "model_handler"
    }

    fn hooks(&self) -> Hooks {
        vec![
            (Point::OnInit, 0),
            (Point::BeforeEpoch, 0),
            (Point::ComputeStep, 0),
        ]
    }

    fn on_init(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        let Some(model) = self.model.take() else {
            bail!("the model was already handed over");
        };

        if state.model.is_some() {
            bail!("another pipe already bound a model");
        }

        state.grad = vec![0.0; model.size()];
        state.model = Some(model);
        Ok(())
    }

    fn before_epoch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        let training = state.mode.is_training();
        state.model_mut()?.set_training(training);
        Ok(())
    }

    fn compute_step(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        let RunState {
            model,
            batch,
            output,
            ..
        } = state;

        let model = model.as_deref_mut().context("no model bound")?;
        let batch = batch.as_ref().context("no batch to forward")?;

        *output = Some(model.forward(batch.x.view())?);
        Ok(())
    }
}
