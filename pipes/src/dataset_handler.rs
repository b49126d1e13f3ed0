use std::{collections::HashMap, num::NonZeroUsize, sync::Arc};

use anyhow::anyhow;
use engine::{
    Hooks, Pipe, Point, RunState,
    collab::{Collate, Dataset, Loader, default_collate, shard_range},
};
use log::debug;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

/// Binds a dataset and hands out a fresh batch sequence every epoch.
///
/// Each rank reads its own shard of the subset. Shards are padded by wrapping
/// around the subset so every rank sees the same amount of batches, which
/// keeps the per-batch collectives in lockstep.
pub struct DatasetHandler {
    dataset: Arc<dyn Dataset>,
    batch_size: NonZeroUsize,
    shuffle: bool,
    seed: u64,
    drop_last: bool,
    workers: usize,
    limits: HashMap<String, usize>,
    collate: Collate,
}

impl DatasetHandler {
    pub fn new(dataset: Arc<dyn Dataset>, batch_size: NonZeroUsize) -> Self {
        Self {
            dataset,
            batch_size,
            shuffle: true,
            seed: 0,
            drop_last: true,
            workers: 0,
            limits: HashMap::new(),
            collate: default_collate,
        }
    }

    /// Whether training epochs visit their shard in a seeded random order.
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Whether training epochs drop their last, incomplete batch.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// The amount of batches prepared ahead on a background thread.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Caps the amount of batches of every epoch over `subset`.
    pub fn limit(mut self, subset: impl Into<String>, batches: usize) -> Self {
        self.limits.insert(subset.into(), batches);
        self
    }

    pub fn collate(mut self, collate: Collate) -> Self {
        self.collate = collate;
        self
    }

    /// The sample indices of every batch of the upcoming epoch.
    fn plan(&self, state: &RunState) -> anyhow::Result<Vec<Vec<usize>>> {
        let total = self
            .dataset
            .len(&state.subset)
            .ok_or_else(|| anyhow!("the dataset has no `{}` subset", state.subset))?;

        let training = state.mode.is_training();
        let mut indices = shard(total, state.gate.rank(), state.gate.world_size());

        if training && self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(state.epoch as u64));
            indices.shuffle(&mut rng);
        }

        let size = self.batch_size.get();
        let drop_last = training && self.drop_last;

        let mut plan: Vec<Vec<usize>> = indices
            .chunks(size)
            .filter(|chunk| !drop_last || chunk.len() == size)
            .map(<[usize]>::to_vec)
            .collect();

        if let Some(&limit) = self.limits.get(&state.subset) {
            plan.truncate(limit);
        }

        Ok(plan)
    }
}

/// This rank's sample indices, padded from the start of the subset up to
/// `ceil(total / world_size)`.
fn shard(total: usize, rank: usize, world_size: usize) -> Vec<usize> {
    let range = shard_range(total, rank, world_size);
    let target = total.div_ceil(world_size);
    let mut indices: Vec<usize> = range.clone().collect();

    if total > 0 {
        let missing = target - indices.len();
        indices.extend((0..total).cycle().take(missing));
    }

    indices
}

impl Pipe for DatasetHandler {
    fn name(&self) -> &str {
        "dataset_handler"
    }

    fn hooks(&self) -> Hooks {
        vec![(Point::OnInit, 0), (Point::BeforeEpoch, 0)]
    }

    fn on_init(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        state.dataset = Some(Arc::clone(&self.dataset));
        Ok(())
    }

    fn before_epoch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        let plan = self.plan(state)?;
        let batches = plan.len();

        debug!(batches = batches, rank = state.gate.rank(); "planned `{}`", state.subset);

        let loader = Loader::new(Arc::clone(&self.dataset), state.subset.clone(), plan, self.collate);
        state.loader = Some(loader.prefetch(self.workers));
        state.status.insert("dataset.batches", batches);
        Ok(())
    }
}
