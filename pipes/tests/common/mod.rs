#![allow(dead_code)]

use std::{
    io,
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use anyhow::{Context, ensure};
use engine::{
    Lambda, Point,
    collab::{Dataset, LossFn, Metric, Model, Optimizer, Sample},
};
use ndarray::{Array2, ArrayView2};
use pipes::{
    ComputeMetrics, DatasetHandler, LossHandler, ModelHandler, OneStepOptimizers, TelemetrySink,
};

/// Samples of `y = 3x + 1` over `x` in `[0, 1)`.
pub struct Line {
    pub train_len: usize,
    pub valid_len: usize,
}

impl Dataset for Line {
    fn subsets(&self) -> Vec<String> {
        vec!["train".into(), "valid".into()]
    }

    fn len(&self, subset: &str) -> Option<usize> {
        match subset {
            "train" => Some(self.train_len),
            "valid" => Some(self.valid_len),
            _ => None,
        }
    }

    fn sample(&self, subset: &str, index: usize) -> anyhow::Result<Sample> {
        let len = self.len(subset).context("unknown subset")?;
        ensure!(index < len, "index {index} out of range");

        let x = index as f32 / len as f32;
        Ok(Sample {
            x: vec![x],
            y: vec![3.0 * x + 1.0],
        })
    }
}

/// `y = w * x + b`, parameters laid out as `[w, b]`.
pub struct Affine {
    params: Vec<f32>,
    x: Option<Array2<f32>>,
}

impl Affine {
    pub fn new(w: f32, b: f32) -> Self {
        Self {
            params: vec![w, b],
            x: None,
        }
    }
}

impl Model for Affine {
    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    fn forward(&mut self, x: ArrayView2<f32>) -> anyhow::Result<Array2<f32>> {
        self.x = Some(x.to_owned());
        Ok(x.mapv(|v| self.params[0] * v + self.params[1]))
    }

    fn backward(&mut self, d_out: ArrayView2<f32>, grad: &mut [f32]) -> anyhow::Result<()> {
        let x = self.x.as_ref().context("backward before forward")?;
        grad[0] += (&d_out * x).sum();
        grad[1] += d_out.sum();
        Ok(())
    }
}

pub struct Mse;

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        (&y_pred - &y).mapv(|d| d * d).mean().unwrap_or(0.0)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y.len() as f32;
        (&y_pred - &y).mapv(|d| 2.0 * d / n)
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

pub struct Sgd {
    pub learning_rate: f32,
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [f32], grad: &[f32]) -> anyhow::Result<()> {
        ensure!(params.len() == grad.len(), "size mismatch");
        for (p, g) in params.iter_mut().zip(grad) {
            *p -= self.learning_rate * g;
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    fn export_state(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.learning_rate.to_le_bytes().to_vec())
    }

    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()> {
        let bytes: [u8; 4] = blob.try_into().context("expected 4 bytes")?;
        self.learning_rate = f32::from_le_bytes(bytes);
        Ok(())
    }
}

/// Dataset, model, loss, optimizer and mse metric pipes over [`Line`].
pub fn regression(train_len: usize, batch_size: usize) -> Vec<Box<dyn engine::Pipe>> {
    let dataset = Arc::new(Line {
        train_len,
        valid_len: 8,
    });
    let batch_size = NonZeroUsize::new(batch_size).unwrap();

    vec![
        Box::new(DatasetHandler::new(dataset, batch_size).seed(7)),
        Box::new(ModelHandler::new(Box::new(Affine::new(0.0, 0.0)))),
        Box::new(LossHandler::new(Box::new(Mse))),
        Box::new(OneStepOptimizers::single(Box::new(Sgd { learning_rate: 0.3 }))),
        Box::new(ComputeMetrics::new(vec![Box::new(Mse)])),
    ]
}

/// Collects `metrics[name][subset]` after every epoch over `subset`.
pub fn watcher(name: &'static str, subset: &'static str, seen: &Arc<Mutex<Vec<f64>>>) -> Lambda {
    let seen = Arc::clone(seen);

    Lambda::new(format!("watch_{name}_{subset}")).on(Point::AfterEpoch, 200, move |state| {
        if state.subset == subset {
            if let Some(value) = state.metrics.get(name, subset) {
                seen.lock().unwrap().push(value);
            }
        }
        Ok(())
    })
}

pub type Scalars = Arc<Mutex<Vec<(String, String, f64, usize)>>>;

/// Keeps every scalar in memory.
#[derive(Default, Clone)]
pub struct Recording {
    pub scalars: Scalars,
}

impl TelemetrySink for Recording {
    fn add_scalar(&mut self, tag: &str, subset: &str, value: f64, step: usize) -> io::Result<()> {
        self.scalars
            .lock()
            .unwrap()
            .push((tag.to_string(), subset.to_string(), value, step));
        Ok(())
    }
}
