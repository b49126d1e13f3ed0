use anyhow::Context;
use engine::{Hooks, Pipe, Point, ReduceOp, RunState, collab::Metric};

#[derive(Debug, Default, Clone, Copy)]
struct Running {
    weighted: f64,
    weight: f64,
}

impl Running {
    fn mean(self) -> Option<f64> {
        (self.weight > 0.0).then(|| self.weighted / self.weight)
    }
}

/// Accumulates metrics over the batches of an epoch.
///
/// Running values are published as `status["metrics.<name>"]` after every
/// batch, and the epoch values land in `metrics[<name>][<subset>]`.
pub struct ComputeMetrics {
    metrics: Vec<Box<dyn Metric>>,
    running: Vec<Running>,
    reduce: Option<ReduceOp>,
}

impl ComputeMetrics {
    pub fn new(metrics: Vec<Box<dyn Metric>>) -> Self {
        let running = vec![Running::default(); metrics.len()];

        Self {
            metrics,
            running,
            reduce: None,
        }
    }

    /// Combines every epoch value across ranks before storing it, so every
    /// rank holds the same metrics.
    pub fn reduced(mut self, op: ReduceOp) -> Self {
        self.reduce = Some(op);
        self
    }
}

impl Pipe for ComputeMetrics {
    fn name(&self) -> &str {
        "compute_metrics"
    }

    fn hooks(&self) -> Hooks {
        vec![
            (Point::BeforeEpoch, 0),
            (Point::AfterBatch, 0),
            (Point::AfterEpoch, 0),
        ]
    }

    fn before_epoch(&mut self, _state: &mut RunState) -> anyhow::Result<()> {
        self.running.fill(Running::default());
        Ok(())
    }

    fn after_batch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        let y_pred = state
            .output
            .as_ref()
            .context("no model output to evaluate")?;
        let y = &state.batch.as_ref().context("no batch to evaluate")?.y;

        for (metric, running) in self.metrics.iter().zip(&mut self.running) {
            let (value, weight) = metric.evaluate(y_pred.view(), y.view());
            running.weighted += value * weight;
            running.weight += weight;

            if let Some(mean) = running.mean() {
                state.status.insert(format!("metrics.{}", metric.name()), mean);
            }
        }

        Ok(())
    }

    fn after_epoch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        for (metric, running) in self.metrics.iter().zip(&self.running) {
            let local = running.mean();

            let value = match self.reduce {
                // Every rank has to enter the collective, even with no batches.
                Some(op) => Some(state.gate.reduce_metric(local.unwrap_or(0.0), op)?),
                None => local,
            };

            if let Some(value) = value {
                state.metrics.set(metric.name(), &state.subset, value);
            }
        }

        Ok(())
    }
}
