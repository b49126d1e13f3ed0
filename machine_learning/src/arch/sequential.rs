use engine::collab::Model;
use ndarray::{Array2, ArrayView2};

use super::Dense;
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// Every layer's parameters live in one flat buffer, laid out in layer order.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Dense>,
    params: Vec<f32>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    /// * `params` - The initial parameters of every layer, in layer order.
    ///
    /// # Returns
    /// A new `Sequential` or an error if the layers don't chain or the amount of
    /// parameters doesn't match them.
    pub fn new(layers: Vec<Dense>, params: Vec<f32>) -> Result<Self> {
        for (i, pair) in layers.windows(2).enumerate() {
            let (out, next_in) = (pair[0].dim().1, pair[1].dim().0);

            if out != next_in {
                return Err(MlErr::InvalidSpec(format!(
                    "layer {i} outputs {out} values but layer {} takes {next_in}",
                    i + 1
                )));
            }
        }

        let size: usize = layers.iter().map(Dense::size).sum();
        if params.len() != size {
            return Err(MlErr::SizeMismatch {
                what: "sequential parameters",
                got: params.len(),
                expected: size,
            });
        }

        Ok(Self { layers, params })
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.params.len()
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    fn forward(&mut self, x: ArrayView2<f32>) -> anyhow::Result<Array2<f32>> {
        let mut params = self.params.as_slice();
        let mut x = x.to_owned();

        for layer in self.layers.iter_mut() {
            let (head, tail) = params.split_at(layer.size());
            x = layer.forward(head, x.view())?;
            params = tail;
        }

        Ok(x)
    }

    fn backward(&mut self, d_out: ArrayView2<f32>, grad: &mut [f32]) -> anyhow::Result<()> {
        if grad.len() != self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: self.params.len(),
            }
            .into());
        }

        let mut end = self.params.len();
        let mut d = d_out.to_owned();

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&self.params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }
}
