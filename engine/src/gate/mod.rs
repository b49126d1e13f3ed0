//! Rank awareness for data-parallel runs.
//!
//! Every process runs the same driver loop. The [`Gate`] tells a pipe whether its
//! process is the one that should perform side effects, and offers the collective
//! operations needed to keep every process agreeing on parameters and control
//! decisions.

mod local;

use std::io;

use serde::{Deserialize, Serialize};

pub use local::LocalGate;

use crate::collab::Model;

/// How per-process values are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceOp {
    #[default]
    Mean,
    Sum,
    Max,
    Min,
}

impl ReduceOp {
    /// Folds `value` into the running accumulator `acc`.
    pub fn fold(self, acc: f64, value: f64) -> f64 {
        match self {
            ReduceOp::Mean | ReduceOp::Sum => acc + value,
            ReduceOp::Max => acc.max(value),
            ReduceOp::Min => acc.min(value),
        }
    }

    /// Turns an accumulator that folded `count` values into the final result.
    pub fn finish(self, acc: f64, count: usize) -> f64 {
        match self {
            ReduceOp::Mean => acc / count as f64,
            _ => acc,
        }
    }
}

/// The collective backend seen by the engine.
///
/// Every collective call blocks until all processes of the run have entered it,
/// so they must be issued in the same order on every rank.
pub trait Gate: Send {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// Whether this process should perform side effects (telemetry, checkpoints).
    fn is_designated_actor(&self) -> bool {
        self.rank() == 0
    }

    /// Overwrites `values` on every rank with the designated actor's copy.
    fn broadcast(&mut self, values: &mut [f32]) -> io::Result<()>;

    /// Combines `values` element-wise across ranks, every rank receives the result.
    fn all_reduce(&mut self, values: &mut [f32], op: ReduceOp) -> io::Result<()>;

    /// Combines a per-process scalar into a value identical on every rank.
    fn reduce_metric(&mut self, value: f64, op: ReduceOp) -> io::Result<f64>;
}

/// Makes every process start from the designated actor's parameters.
pub fn broadcast_initial_parameters(gate: &mut dyn Gate, model: &mut dyn Model) -> io::Result<()> {
    if gate.world_size() < 2 {
        return Ok(());
    }

    gate.broadcast(model.params_mut())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_three() {
        let op = ReduceOp::Mean;
        let acc = [1.0, 2.0, 3.0].into_iter().fold(0.0, |acc, v| op.fold(acc, v));
        assert_eq!(op.finish(acc, 3), 2.0);
    }

    #[test]
    fn max_and_min() {
        let values = [4.0, -1.0, 2.5];

        let max = values.iter().skip(1).fold(values[0], |acc, &v| ReduceOp::Max.fold(acc, v));
        let min = values.iter().skip(1).fold(values[0], |acc, &v| ReduceOp::Min.fold(acc, v));

        assert_eq!(ReduceOp::Max.finish(max, 3), 4.0);
        assert_eq!(ReduceOp::Min.finish(min, 3), -1.0);
    }
}
