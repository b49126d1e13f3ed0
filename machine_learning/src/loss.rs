//! Losses and epoch metrics.

use engine::collab::{LossFn, Metric};
use ndarray::{Array2, ArrayView2, Axis};

/// Mean squared error, usable both as the loss and as a metric.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        (&y_pred - &y)
            .mapv(|x| x.powi(2))
            .mean()
            .unwrap_or_default()
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        (&y_pred - &y) * (2.0 / y_pred.len() as f32)
    }
}

impl Metric for Mse {
    fn name(&self) -> &str {
        "mse"
    }

    fn evaluate(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> (f64, f64) {
        (f64::from(self.loss(y_pred, y)), y.nrows() as f64)
    }
}

/// The fraction of correctly classified samples.
///
/// Single column outputs are thresholded at `0.5`, wider ones are compared by
/// their largest column.
#[derive(Debug, Default, Clone, Copy)]
pub struct Accuracy;

fn argmax(row: ndarray::ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or_default()
}

impl Metric for Accuracy {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn evaluate(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> (f64, f64) {
        let n = y.nrows();
        if n == 0 {
            return (0.0, 0.0);
        }

        let hits = if y.ncols() == 1 {
            y_pred
                .iter()
                .zip(y.iter())
                .filter(|&(p, t)| (*p >= 0.5) == (*t >= 0.5))
                .count()
        } else {
            y_pred
                .axis_iter(Axis(0))
                .zip(y.axis_iter(Axis(0)))
                .filter(|(p, t)| argmax(p.view()) == argmax(t.view()))
                .count()
        };

        (hits as f64 / n as f64, n as f64)
    }
}
