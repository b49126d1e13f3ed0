use std::ops::Range;

use engine::collab::Optimizer;
use serde::{Deserialize, Serialize};

use super::check_sizes;

/// Plain gradient descent, `p -= lr * g`.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f32,
    range: Option<Range<usize>>,
}

#[derive(Serialize, Deserialize)]
struct State {
    learning_rate: f32,
}

impl GradientDescent {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            range: None,
        }
    }

    /// Restricts the optimizer to `range` of the model parameters.
    pub fn owning(mut self, range: Range<usize>) -> Self {
        self.range = Some(range);
        self
    }
}

impl Optimizer for GradientDescent {
    fn step(&mut self, params: &mut [f32], grad: &[f32]) -> anyhow::Result<()> {
        check_sizes(params.len(), grad.len(), None)?;

        let lr = self.learning_rate;
        params.iter_mut().zip(grad).for_each(|(p, g)| *p -= lr * g);
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    fn param_range(&self) -> Option<Range<usize>> {
        self.range.clone()
    }

    fn export_state(&self) -> anyhow::Result<Vec<u8>> {
        let state = State {
            learning_rate: self.learning_rate,
        };
        Ok(serde_json::to_vec(&state)?)
    }

    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()> {
        let state: State = serde_json::from_slice(blob)?;
        self.learning_rate = state.learning_rate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_against_the_gradient() {
        let mut optimizer = GradientDescent::new(0.5);
        let mut params = [1., 2.];

        optimizer.step(&mut params, &[2., -2.]).unwrap();
        assert_eq!(params, [0., 3.]);
        assert!(optimizer.step(&mut params, &[1.]).is_err());
    }
}
