use std::io;

use super::{Gate, ReduceOp};

/// The gate of a single process run. Every collective is the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalGate;

impl Gate for LocalGate {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn broadcast(&mut self, _values: &mut [f32]) -> io::Result<()> {
        Ok(())
    }

    fn all_reduce(&mut self, _values: &mut [f32], _op: ReduceOp) -> io::Result<()> {
        Ok(())
    }

    fn reduce_metric(&mut self, value: f64, _op: ReduceOp) -> io::Result<f64> {
        Ok(value)
    }
}
