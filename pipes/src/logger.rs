use engine::{Hooks, Pipe, Point, RunState};

use crate::sink::TelemetrySink;

/// Forwards the metrics of every evaluation epoch to a telemetry sink.
///
/// Tags read `metrics/<name>`, followed by the run label when one is set, and
/// the step is the amount of completed training epochs. Training epochs are
/// skipped, so the train series only gets points when the trainer validates on
/// train. Only the designated actor writes.
pub struct Logger {
    sink: Box<dyn TelemetrySink>,
    label: Option<String>,
}

impl Logger {
    pub fn new(sink: Box<dyn TelemetrySink>) -> Self {
        Self { sink, label: None }
    }

    /// Groups this run's tags under `label`.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn tag(&self, name: &str) -> String {
        match &self.label {
            Some(label) => format!("metrics/{name}/{label}"),
            None => format!("metrics/{name}"),
        }
    }
}

impl Pipe for Logger {
    fn name(&self) -> &str {
        "logger"
    }

    fn hooks(&self) -> Hooks {
        vec![(Point::AfterEpoch, 100)]
    }

    fn after_epoch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        if state.mode.is_training() || !state.is_designated_actor() {
            return Ok(());
        }

        let subset = state.subset.as_str();
        for name in state.metrics.names() {
            if let Some(value) = state.metrics.get(name, subset) {
                let tag = self.tag(name);
                self.sink.add_scalar(&tag, subset, value, state.epoch)?;
            }
        }

        self.sink.flush()?;
        Ok(())
    }
}
