use std::{
    collections::BTreeSet,
    path::Path,
};

use log::{debug, info, warn};

use crate::{
    checkpoint::{self, PipeStates, SaveOutcome, Snapshot},
    collab::Batch,
    config::TrainerConfig,
    error::{Result, TrainErr},
    gate::{self, Gate, LocalGate},
    hooks::{HookRegistry, Point},
    pipe::Pipe,
    state::{Mode, RunState},
};

/// Builds a [`Trainer`] out of its pipes, gate and config.
pub struct TrainerBuilder {
    pipes: Vec<Box<dyn Pipe>>,
    gate: Box<dyn Gate>,
    config: TrainerConfig,
}

impl Default for TrainerBuilder {
    fn default() -> Self {
        Self {
            pipes: Vec::new(),
            gate: Box::new(LocalGate),
            config: TrainerConfig::default(),
        }
    }
}

impl TrainerBuilder {
    pub fn pipe<P: Pipe + 'static>(self, pipe: P) -> Self {
        self.boxed_pipe(Box::new(pipe))
    }

    pub fn boxed_pipe(mut self, pipe: Box<dyn Pipe>) -> Self {
        self.pipes.push(pipe);
        self
    }

    pub fn pipes<I>(mut self, pipes: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Pipe>>,
    {
        self.pipes.extend(pipes);
        self
    }

    pub fn gate<G: Gate + 'static>(self, gate: G) -> Self {
        self.boxed_gate(Box::new(gate))
    }

    pub fn boxed_gate(mut self, gate: Box<dyn Gate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn config(mut self, config: TrainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches the pipes, fires `on_init` and syncs the initial parameters.
    ///
    /// # Errors
    /// `TrainErr::Configuration` on an invalid config or conflicting pipes, before
    /// any pipe runs. Any failure of an `on_init` hook.
    pub fn build(self) -> Result<Trainer> {
        let Self {
            pipes,
            gate,
            config,
        } = self;

        config.validate()?;

        let mut registry = HookRegistry::new();
        for pipe in pipes {
            registry.attach(pipe)?;
        }

        let mut trainer = Trainer {
            registry,
            state: RunState::new(gate),
            config,
        };

        trainer.init()?;
        Ok(trainer)
    }
}

/// The epoch and batch driver.
///
/// Owns the pipes and the run state and walks the lifecycle points in order:
/// `on_init` once, then for each epoch `before_epoch`, every batch's
/// `before_batch`, `compute_step` and `after_batch`, `after_epoch` and, after
/// the first training cycle and every `dump_period` cycles from there,
/// `on_checkpoint`.
pub struct Trainer {
    registry: HookRegistry,
    state: RunState,
    config: TrainerConfig,
}

impl std::fmt::Debug for Trainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Trainer {
    pub fn builder() -> TrainerBuilder {
        TrainerBuilder::default()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }

    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    fn init(&mut self) -> Result<()> {
        let Self {
            registry, state, ..
        } = self;

        registry.dispatch(Point::OnInit, state)?;
        Self::sync_parameters(state)?;

        info!(
            rank = state.gate.rank(),
            world_size = state.gate.world_size(),
            pipes = registry.len();
            "trainer ready"
        );

        Ok(())
    }

    fn sync_parameters(state: &mut RunState) -> Result<()> {
        let RunState { gate, model, .. } = state;

        if let Some(model) = model.as_deref_mut() {
            gate::broadcast_initial_parameters(gate.as_mut(), model).map_err(TrainErr::Collective)?;
        }

        Ok(())
    }

    /// Runs a single epoch over `subset`.
    ///
    /// # Arguments
    /// * `mode` - Whether parameters get updated.
    /// * `subset` - The dataset subset to iterate.
    /// * `max_iterations` - Stops the epoch early after this many batches.
    ///
    /// # Errors
    /// Any pipe failure aborts the epoch immediately and is returned unchanged.
    pub fn run_epoch(&mut self, mode: Mode, subset: &str, max_iterations: Option<usize>) -> Result<()> {
        let Self {
            registry, state, ..
        } = self;

        state.mode = mode;
        state.subset = subset.to_string();
        state.iteration = 0;

        info!(epoch = state.epoch; "starting {mode} epoch over `{subset}`");
        registry.dispatch(Point::BeforeEpoch, state)?;

        loop {
            if max_iterations.is_some_and(|cap| state.iteration >= cap) {
                debug!(iteration = state.iteration; "iteration cap reached, ending the epoch");
                break;
            }

            let Some(batch) = Self::next_batch(state)? else {
                break;
            };

            state.batch = Some(batch);
            registry.dispatch(Point::BeforeBatch, state)?;
            registry.dispatch(Point::ComputeStep, state)?;
            registry.dispatch(Point::AfterBatch, state)?;
            state.iteration += 1;
        }

        state.loader = None;
        state.clear_batch();

        if mode.is_training() {
            state.epoch += 1;
        }

        registry.dispatch(Point::AfterEpoch, state)?;
        debug!(epoch = state.epoch, iterations = state.iteration; "finished {mode} epoch");
        Ok(())
    }

    fn next_batch(state: &mut RunState) -> Result<Option<Batch>> {
        match state.loader.as_mut() {
            Some(loader) => loader.next_batch().map_err(TrainErr::Dataset),
            None => Ok(None),
        }
    }

    /// Runs `n_epochs` training cycles. Each one trains, validates and
    /// checkpoints when the dump period is due.
    pub fn run_train(&mut self, n_epochs: usize) -> Result<()> {
        let train_subset = self.config.train_subset.clone();
        let max_train = self.config.max_train_iterations;
        let max_valid = self.config.max_valid_iterations;

        for _ in 0..n_epochs {
            self.run_epoch(Mode::Train, &train_subset, max_train)?;

            if self.config.validate_on_train {
                self.run_epoch(Mode::Validate, &train_subset, max_valid)?;
            }

            for subset in self.validation_subsets() {
                self.run_epoch(Mode::Validate, &subset, max_valid)?;
            }

            // Cycle indices are 0-based: the first cycle always dumps.
            let cycle = self.state.epoch.saturating_sub(1);
            if cycle % self.config.dump_period == 0 {
                self.checkpoint()?;
            }
        }

        Ok(())
    }

    /// The configured validation subsets the bound dataset actually has.
    fn validation_subsets(&self) -> Vec<String> {
        let subsets = self.config.validation_subsets.iter();

        match &self.state.dataset {
            Some(dataset) => subsets
                .filter(|subset| dataset.len(subset).is_some())
                .cloned()
                .collect(),
            None => subsets.cloned().collect(),
        }
    }

    /// Fires `on_checkpoint` and writes the snapshot a pipe asked for, if any.
    ///
    /// # Returns
    /// Where the snapshot was written, `None` when no pipe asked for one.
    pub fn checkpoint(&mut self) -> Result<Option<SaveOutcome>> {
        self.state.checkpoint = None;
        self.registry.dispatch(Point::OnCheckpoint, &mut self.state)?;

        let Some(request) = self.state.checkpoint.take() else {
            return Ok(None);
        };

        let pipes = self.export_pipe_states()?;
        let outcome = checkpoint::save(&request, &self.state, &pipes)?;
        self.state.status.insert("checkpoint.is_best", outcome.is_best());

        Ok(Some(outcome))
    }

    /// Exports the state of every stateful pipe.
    pub fn export_pipe_states(&mut self) -> Result<PipeStates> {
        self.registry
            .stateful()
            .map(|(name, pipe)| match pipe.export_state() {
                Ok(blob) => Ok((name, blob)),
                Err(source) => Err(TrainErr::StateExport {
                    owner: format!("pipe `{name}`"),
                    source,
                }),
            })
            .collect()
    }

    /// Restores a checkpoint written by a trainer with the same pipes, optimizers
    /// and model shape. Must be called on every rank since it resyncs the
    /// parameters afterwards.
    ///
    /// # Errors
    /// `TrainErr::CheckpointCorrupt` if the snapshot doesn't fit what's attached,
    /// in which case nothing is modified. `TrainErr::StateImport` if an optimizer
    /// or pipe rejects its blob: the ones imported before it keep the restored
    /// state, the parameters, counters and metrics are left untouched.
    pub fn restore(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = checkpoint::load(path)?;

        self.check_compatible(path, &snapshot)?;
        self.apply(snapshot)?;
        Self::sync_parameters(&mut self.state)?;

        info!(epoch = self.state.epoch; "restored {}", path.display());
        Ok(())
    }

    fn check_compatible(&mut self, path: &Path, snapshot: &Snapshot) -> Result<()> {
        let attached: BTreeSet<String> = self.registry.stateful().map(|(name, _)| name).collect();
        let saved: BTreeSet<String> = snapshot.pipes.keys().cloned().collect();

        if attached != saved {
            return Err(TrainErr::corrupt(
                path,
                format!("saved stateful pipes {saved:?} but {attached:?} are attached"),
            ));
        }

        if snapshot.optimizers.len() != self.state.optimizers.len() {
            return Err(TrainErr::corrupt(
                path,
                format!(
                    "saved {} optimizer states but {} optimizers are bound",
                    snapshot.optimizers.len(),
                    self.state.optimizers.len()
                ),
            ));
        }

        match (&snapshot.model, self.state.model.as_deref()) {
            (Some(params), Some(model)) if params.len() != model.size() => Err(TrainErr::corrupt(
                path,
                format!(
                    "saved {} parameters but the model has {}",
                    params.len(),
                    model.size()
                ),
            )),
            (Some(_), None) => Err(TrainErr::corrupt(path, "saved a model but none is bound")),
            (None, Some(_)) => Err(TrainErr::corrupt(path, "a model is bound but none was saved")),
            _ => Ok(()),
        }
    }

    fn apply(&mut self, snapshot: Snapshot) -> Result<()> {
        let Snapshot {
            epoch,
            iteration,
            metrics,
            model,
            optimizers,
            pipes,
            ..
        } = snapshot;

        for (i, (optimizer, blob)) in self.state.optimizers.iter_mut().zip(&optimizers).enumerate() {
            optimizer
                .import_state(blob)
                .map_err(|source| TrainErr::StateImport {
                    owner: format!("optimizer {i}"),
                    source,
                })?;
        }

        for (name, pipe) in self.registry.stateful() {
            let Some(blob) = pipes.get(&name) else {
                warn!("no saved state for pipe `{name}`");
                continue;
            };

            pipe.import_state(blob)
                .map_err(|source| TrainErr::StateImport {
                    owner: format!("pipe `{name}`"),
                    source,
                })?;
        }

        if let (Some(params), Some(model)) = (model, self.state.model.as_deref_mut()) {
            model.params_mut().copy_from_slice(&params);
        }

        self.state.epoch = epoch;
        self.state.iteration = iteration;
        self.state.metrics = metrics;
        Ok(())
    }
}
