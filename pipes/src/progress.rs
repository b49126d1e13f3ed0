use std::time::Instant;

use engine::{Hooks, Pipe, Point, RunState};
use log::info;

/// Reports progress through the `log` facade on the designated actor.
///
/// A negative verbosity silences it, zero reports finished epochs only and a
/// positive `n` also reports every `n`-th batch.
pub struct ProgressLog {
    verbosity: i32,
    started: Option<Instant>,
}

impl ProgressLog {
    pub fn new(verbosity: i32) -> Self {
        Self {
            verbosity,
            started: None,
        }
    }

    fn enabled(&self, state: &RunState) -> bool {
        self.verbosity >= 0 && state.is_designated_actor()
    }
}

impl Pipe for ProgressLog {
    fn name(&self) -> &str {
        "progress"
    }

    fn hooks(&self) -> Hooks {
        vec![
            (Point::BeforeEpoch, 100),
            (Point::AfterBatch, 100),
            (Point::AfterEpoch, 100),
        ]
    }

    fn before_epoch(&mut self, _state: &mut RunState) -> anyhow::Result<()> {
        self.started = Some(Instant::now());
        Ok(())
    }

    fn after_batch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        if !self.enabled(state) || self.verbosity == 0 {
            return Ok(());
        }

        let step = state.iteration + 1;
        if step % self.verbosity as usize != 0 {
            return Ok(());
        }

        let total = state.status.get_f64("dataset.batches").unwrap_or(0.0) as usize;
        let loss = state.loss.map(f64::from).unwrap_or(f64::NAN);

        info!(
            epoch = state.epoch,
            loss = loss;
            "{} `{}` {step}/{total}", state.mode.as_str(), state.subset
        );
        Ok(())
    }

    fn after_epoch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        if !self.enabled(state) {
            return Ok(());
        }

        let elapsed = self.started.take().map(|t| t.elapsed()).unwrap_or_default();

        let summary: Vec<String> = state
            .metrics
            .names()
            .filter_map(|name| {
                let value = state.metrics.get(name, &state.subset)?;
                Some(format!("{name}={value:.4}"))
            })
            .collect();

        info!(
            epoch = state.epoch,
            batches = state.iteration;
            "{} `{}` done in {elapsed:.2?} {}", state.mode.as_str(), state.subset, summary.join(" ")
        );
        Ok(())
    }
}
