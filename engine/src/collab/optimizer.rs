use std::ops::Range;

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer: Send {
    /// Updates `params` in place using `grad`.
    ///
    /// # Arguments
    /// * `params` - The parameters owned by this optimizer.
    /// * `grad` - The gradient matching `params` element by element.
    ///
    /// # Errors
    /// Fails if the sizes of `params` and `grad` differ or don't match the optimizer state.
    fn step(&mut self, params: &mut [f32], grad: &[f32]) -> anyhow::Result<()>;

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, learning_rate: f32);

    /// The slice of the model parameters this optimizer owns, `None` for all of them.
    fn param_range(&self) -> Option<Range<usize>> {
        None
    }

    /// Serializes the internal state (moments, step counters, ...).
    fn export_state(&self) -> anyhow::Result<Vec<u8>>;

    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()>;
}
