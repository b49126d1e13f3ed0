use std::ops::Range;

use engine::collab::Optimizer;
use serde::{Deserialize, Serialize};

use super::check_sizes;

#[derive(Debug, Clone)]
pub struct Adam {
    state: State,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    range: Option<Range<usize>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct State {
    learning_rate: f32,
    beta1_t: f32,
    beta2_t: f32,
    v: Vec<f32>,
    s: Vec<f32>,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            state: State {
                learning_rate,
                beta1_t: 1.,
                beta2_t: 1.,
                v: vec![0.; len],
                s: vec![0.; len],
            },
            beta1,
            beta2,
            epsilon,
            range: None,
        }
    }

    /// Restricts the optimizer to `range` of the model parameters.
    pub fn owning(mut self, range: Range<usize>) -> Self {
        self.range = Some(range);
        self
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [f32], grad: &[f32]) -> anyhow::Result<()> {
        check_sizes(params.len(), grad.len(), Some(self.state.v.len()))?;

        let Self {
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        let state = &mut self.state;
        state.beta1_t *= b1;
        state.beta2_t *= b2;

        let bc1 = 1. - state.beta1_t;
        let bc2 = 1. - state.beta2_t;
        let step_size = state.learning_rate * (bc2.sqrt() / bc1);

        params
            .iter_mut()
            .zip(grad)
            .zip(state.v.iter_mut())
            .zip(state.s.iter_mut())
            .for_each(|(((p, g), v), s)| {
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *p -= step_size * *v / (s.sqrt() + eps);
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
        check_sizes(self.state.v.len(), state.v.len(), Some(state.s.len()))?;

        self.state = state;
        Ok(())
    }
}
