use std::collections::HashMap;

use super::{Hooks, Pipe};
use crate::{
    hooks::{Point, Priority},
    state::RunState,
};

type Callback = Box<dyn FnMut(&mut RunState) -> anyhow::Result<()> + Send>;

/// A pipe assembled from closures, one per point.
///
/// ```
/// use engine::{hooks::Point, pipe::Lambda};
///
/// let pipe = Lambda::new("count").on(Point::AfterBatch, 0, |state| {
///     state.status.insert("seen", state.iteration + 1);
///     Ok(())
/// });
/// ```
pub struct Lambda {
    name: String,
    callbacks: HashMap<Point, (Priority, Callback)>,
}

impl Lambda {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            callbacks: HashMap::new(),
        }
    }

    /// Attaches `f` to `point`, replacing any previous closure for that point.
    pub fn on<F>(mut self, point: Point, priority: Priority, f: F) -> Self
    where
        F: FnMut(&mut RunState) -> anyhow::Result<()> + Send + 'static,
    {
        self.callbacks.insert(point, (priority, Box::new(f)));
        self
    }

    fn call(&mut self, point: Point, state: &mut RunState) -> anyhow::Result<()> {
        match self.callbacks.get_mut(&point) {
            Some((_, f)) => f(state),
            None => Ok(()),
        }
    }
}

impl Pipe for Lambda {
    fn name(&self) -> &str {
        &self.name
    }

    fn hooks(&self) -> Hooks {
        let mut hooks: Hooks = self
            .callbacks
            .iter()
            .map(|(point, (priority, _))| (*point, *priority))
            .collect();

        hooks.sort();
        hooks
    }

    fn on_init(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        self.call(Point::OnInit, state)
    }

    fn before_epoch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        self.call(Point::BeforeEpoch, state)
    }

    fn before_batch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        self.call(Point::BeforeBatch, state)
    }

    fn compute_step(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        self.call(Point::ComputeStep, state)
    }

    fn after_batch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        self.call(Point::AfterBatch, state)
    }

    fn after_epoch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        self.call(Point::AfterEpoch, state)
    }

    fn on_checkpoint(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        self.call(Point::OnCheckpoint, state)
    }
}
