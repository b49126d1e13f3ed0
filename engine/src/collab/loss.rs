use ndarray::{Array2, ArrayView2};

/// A differentiable loss over a batch.
pub trait LossFn: Send {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}

/// A scalar quality measure accumulated over the batches of an epoch.
pub trait Metric: Send {
    fn name(&self) -> &str;

    /// Evaluates one batch.
    ///
    /// # Returns
    /// The batch value and its weight (usually the amount of samples it averages over),
    /// so the epoch value is `sum(value * weight) / sum(weight)`.
    fn evaluate(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> (f64, f64);
}
