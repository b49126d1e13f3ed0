use std::ops::Range;

use engine::collab::Optimizer;
use serde::{Deserialize, Serialize};

use super::check_sizes;

/// Gradient descent with classical momentum, `v = mu * v + g; p -= lr * v`.
#[derive(Debug, Clone)]
pub struct GradientDescentWithMomentum {
    state: State,
    range: Option<Range<usize>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct State {
    learning_rate: f32,
    momentum: f32,
    velocity: Vec<f32>,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - Hyperparameter to the optimization algorithm.
    pub fn new(len: usize, learning_rate: f32, momentum: f32) -> Self {
        Self {
            state: State {
                learning_rate,
                momentum,
                velocity: vec![0.; len],
            },
            range: None,
        }
    }

    /// Restricts the optimizer to `range` of the model parameters.
    pub fn owning(mut self, range: Range<usize>) -> Self {
        self.range = Some(range);
        self
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn step(&mut self, params: &mut [f32], grad: &[f32]) -> anyhow::Result<()> {
        let State {
            learning_rate: lr,
            momentum: mu,
            velocity,
        } = &mut self.state;

        check_sizes(params.len(), grad.len(), Some(velocity.len()))?;

        params
            .iter_mut()
            .zip(grad)
            .zip(velocity.iter_mut())
            .for_each(|((p, g), v)| {
                *v = (*mu * *v) + g;
                *p -= *lr * *v;
            });

        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.state.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.state.learning_rate = learning_rate;
    }

    fn param_range(&self) -> Option<Range<usize>> {
        self.range.clone()
    }

    fn export_state(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.state)?)
    }

    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()> {
        let state: State = serde_json::from_slice(blob)?;
        check_sizes(self.state.velocity.len(), state.velocity.len(), None)?;

        self.state = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_builds_up() {
        let mut optimizer = GradientDescentWithMomentum::new(1, 0.1, 0.5);
        let mut params = [0.];

        optimizer.step(&mut params, &[1.]).unwrap();
        optimizer.step(&mut params, &[1.]).unwrap();

        // v = 1 then 1.5
        assert!((params[0] + 0.25).abs() < 1e-6);
    }

    #[test]
    fn resumes_from_exported_velocity() {
        let mut optimizer = GradientDescentWithMomentum::new(2, 0.1, 0.9);
        optimizer.step(&mut [0., 0.], &[1., -1.]).unwrap();

        let mut resumed = GradientDescentWithMomentum::new(2, 0.1, 0.9);
        resumed.import_state(&optimizer.export_state().unwrap()).unwrap();
        assert_eq!(resumed.state.velocity, [1., -1.]);

        let mut other = GradientDescentWithMomentum::new(3, 0.1, 0.9);
        assert!(other.import_state(&optimizer.export_state().unwrap()).is_err());
    }
}
