use std::{
    ops::Range,
    sync::{Arc, mpsc},
    thread,
};

use anyhow::{anyhow, ensure};
use log::debug;
use ndarray::Array2;

/// One dataset row split into its input and expected output.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
}

/// A batch of samples, one per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub x: Array2<f32>,
    pub y: Array2<f32>,
}

impl Batch {
    pub fn new(x: Array2<f32>, y: Array2<f32>) -> Self {
        Self { x, y }
    }

    /// Returns the amount of samples in the batch.
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns a group of samples into a batch.
pub type Collate = fn(&[Sample]) -> anyhow::Result<Batch>;

/// Stacks the samples' inputs and outputs row by row.
///
/// # Errors
/// Fails on an empty group or when the samples disagree on their widths.
pub fn default_collate(samples: &[Sample]) -> anyhow::Result<Batch> {
    let first = samples.first().ok_or_else(|| anyhow!("cannot collate an empty batch"))?;
    let (x_size, y_size) = (first.x.len(), first.y.len());

    let mut x = Vec::with_capacity(samples.len() * x_size);
    let mut y = Vec::with_capacity(samples.len() * y_size);

    for (i, sample) in samples.iter().enumerate() {
        ensure!(
            sample.x.len() == x_size && sample.y.len() == y_size,
            "sample {i} has shape ({}, {}), expected ({x_size}, {y_size})",
            sample.x.len(),
            sample.y.len(),
        );

        x.extend_from_slice(&sample.x);
        y.extend_from_slice(&sample.y);
    }

    Ok(Batch::new(
        Array2::from_shape_vec((samples.len(), x_size), x)?,
        Array2::from_shape_vec((samples.len(), y_size), y)?,
    ))
}

/// A source of samples organized in named subsets (`"train"`, `"valid"`, ...).
pub trait Dataset: Send + Sync {
    fn subsets(&self) -> Vec<String>;

    /// The amount of samples in `subset`, or `None` if there's no such subset.
    fn len(&self, subset: &str) -> Option<usize>;

    fn sample(&self, subset: &str, index: usize) -> anyhow::Result<Sample>;
}

/// Splits `total` samples among `world_size` ranks and returns the shard for `rank`.
///
/// Ranges are contiguous, disjoint, cover `0..total` and their sizes differ by
/// at most one.
pub fn shard_range(total: usize, rank: usize, world_size: usize) -> Range<usize> {
    debug_assert!(rank < world_size);

    let base = total / world_size;
    let rem = total % world_size;

    let start = rank * base + rank.min(rem);
    let extra = usize::from(rank < rem);

    start..start + base + extra
}

type Batches = Box<dyn Iterator<Item = anyhow::Result<Batch>> + Send>;

/// The lazy batch sequence of a single epoch.
///
/// Samples are fetched and collated only when the next batch is requested, so an
/// epoch stopped early by an iteration cap never reads the rest of the subset.
pub struct Loader {
    batches: Batches,
    remaining: usize,
}

impl Loader {
    /// Creates a new `Loader`.
    ///
    /// # Arguments
    /// * `dataset` - The dataset to read samples from.
    /// * `subset` - The subset the indices refer to.
    /// * `plan` - The sample indices of every batch, in order.
    /// * `collate` - The function building a batch out of its samples.
    pub fn new(
        dataset: Arc<dyn Dataset>,
        subset: impl Into<String>,
        plan: Vec<Vec<usize>>,
        collate: Collate,
    ) -> Self {
        let subset = subset.into();
        let remaining = plan.len();

        let batches = plan.into_iter().map(move |indices| {
            let samples = indices
                .into_iter()
                .map(|i| dataset.sample(&subset, i))
                .collect::<anyhow::Result<Vec<_>>>()?;

            collate(&samples)
        });

        Self {
            batches: Box::new(batches),
            remaining,
        }
    }

    /// Moves batch production to a background thread that stays up to `depth`
    /// batches ahead. A depth of zero keeps the loader synchronous.
    pub fn prefetch(self, depth: usize) -> Self {
        if depth == 0 || self.remaining == 0 {
            return self;
        }

        let Self {
            batches,
            remaining,
        } = self;

        let (tx, rx) = mpsc::sync_channel(depth);

        thread::spawn(move || {
            for batch in batches {
                // The receiving end hung up, the epoch was cut short.
                if tx.send(batch).is_err() {
                    debug!("loader dropped, stopping prefetch");
                    break;
                }
            }
        });

        Self {
            batches: Box::new(rx.into_iter()),
            remaining,
        }
    }

    /// Returns the amount of batches not yet yielded.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Fetches the next batch, `None` once the epoch's batches are exhausted.
    pub fn next_batch(&mut self) -> anyhow::Result<Option<Batch>> {
        let next = self.batches.next().transpose()?;

        if next.is_some() {
            self.remaining = self.remaining.saturating_sub(1);
        }

        Ok(next)
    }
}
