use ndarray::{Array2, ArrayView2};

/// A trainable model whose parameters live in one flat buffer.
pub trait Model: Send {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize {
        self.params().len()
    }

    fn params(&self) -> &[f32];

    fn params_mut(&mut self) -> &mut [f32];

    /// Switches between training and evaluation behaviour.
    fn set_training(&mut self, _training: bool) {}

    /// Makes a forward pass through the model.
    ///
    /// # Arguments
    /// * `x` - A batch of inputs, one sample per row.
    ///
    /// # Returns
    /// The model output for the batch, one row per sample.
    fn forward(&mut self, x: ArrayView2<f32>) -> anyhow::Result<Array2<f32>>;

    /// Backpropagates the loss derivative of the last forward pass.
    ///
    /// # Arguments
    /// * `d_out` - The derivative of the loss with respect to the last output.
    /// * `grad` - A buffer of `size()` values the parameter gradient is added into.
    fn backward(&mut self, d_out: ArrayView2<f32>, grad: &mut [f32]) -> anyhow::Result<()>;
}
