#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Context, ensure};
use engine::{
    Lambda, Point, Stateful,
    collab::{Dataset, Loader, Model, Optimizer, Sample, default_collate},
    pipe::{Hooks, Pipe},
    state::RunState,
};
use ndarray::{Array2, ArrayView2};

pub type Events = Arc<Mutex<Vec<String>>>;

/// `train` has `train_len` samples, `valid` has 4. Sample `i` is `x = i, y = 2i`.
pub struct Counting {
    pub train_len: usize,
}

impl Dataset for Counting {
    fn subsets(&self) -> Vec<String> {
        vec!["train".into(), "valid".into()]
    }

    fn len(&self, subset: &str) -> Option<usize> {
        match subset {
            "train" => Some(self.train_len),
            "valid" => Some(4),
            _ => None,
        }
    }

    fn sample(&self, subset: &str, index: usize) -> anyhow::Result<Sample> {
        let len = self.len(subset).context("unknown subset")?;
        ensure!(index < len, "index {index} out of range");

        Ok(Sample {
            x: vec![index as f32],
            y: vec![2.0 * index as f32],
        })
    }
}

/// `y = w * x` with a single parameter.
pub struct Scale {
    pub params: Vec<f32>,
    x: Option<Array2<f32>>,
}

impl Scale {
    pub fn new(w: f32) -> Self {
        Self {
            params: vec![w],
            x: None,
        }
    }
}

impl Model for Scale {
    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    fn forward(&mut self, x: ArrayView2<f32>) -> anyhow::Result<Array2<f32>> {
        self.x = Some(x.to_owned());
        Ok(x.mapv(|v| v * self.params[0]))
    }

    fn backward(&mut self, d_out: ArrayView2<f32>, grad: &mut [f32]) -> anyhow::Result<()> {
        let x = self.x.as_ref().context("backward before forward")?;
        grad[0] += (&d_out * x).sum();
        Ok(())
    }
}

/// Plain gradient descent that counts its steps.
pub struct CountingSgd {
    pub learning_rate: f32,
    pub steps: u64,
}

impl Optimizer for CountingSgd {
    fn step(&mut self, params: &mut [f32], grad: &[f32]) -> anyhow::Result<()> {
        ensure!(params.len() == grad.len(), "size mismatch");
        params
            .iter_mut()
            .zip(grad)
            .for_each(|(p, g)| *p -= self.learning_rate * g);
        self.steps += 1;
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    fn export_state(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.steps.to_le_bytes().to_vec())
    }

    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()> {
        let bytes: [u8; 8] = blob.try_into().context("expected 8 bytes")?;
        self.steps = u64::from_le_bytes(bytes);
        Ok(())
    }
}

/// Binds a `Counting` dataset and builds a one-sample-per-batch loader each epoch.
pub fn feeder(train_len: usize) -> Lambda {
    Lambda::new("feeder")
        .on(Point::OnInit, 0, move |state| {
            state.dataset = Some(Arc::new(Counting { train_len }));
            Ok(())
        })
        .on(Point::BeforeEpoch, 0, |state| {
            let dataset = state.dataset.clone().context("no dataset")?;
            let len = dataset.len(&state.subset).unwrap_or_default();
            let plan = (0..len).map(|i| vec![i]).collect();

            state.loader = Some(Loader::new(dataset, state.subset.clone(), plan, default_collate));
            Ok(())
        })
}

/// Records `"<point>:<subset>"` for every point it sees.
pub fn recorder(events: &Events) -> Lambda {
    let mut lambda = Lambda::new("recorder");

    for point in Point::ALL {
        let events = Arc::clone(events);
        lambda = lambda.on(point, 100, move |state| {
            events
                .lock()
                .unwrap()
                .push(format!("{point}:{}", state.subset));
            Ok(())
        });
    }

    lambda
}

pub fn count(events: &Events, entry: &str) -> usize {
    events.lock().unwrap().iter().filter(|e| *e == entry).count()
}

/// A stateful pipe that counts the batches it saw.
pub struct Tally {
    pub name: String,
    pub seen: u32,
}

impl Tally {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            seen: 0,
        }
    }
}

impl Pipe for Tally {
    fn name(&self) -> &str {
        &self.name
    }

    fn hooks(&self) -> Hooks {
        vec![(Point::AfterBatch, 0)]
    }

    fn after_batch(&mut self, _state: &mut RunState) -> anyhow::Result<()> {
        self.seen += 1;
        Ok(())
    }

    fn stateful(&mut self) -> Option<&mut dyn Stateful> {
        Some(self)
    }
}

impl Stateful for Tally {
    fn export_state(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.seen)?)
    }

    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()> {
        self.seen = serde_json::from_slice(blob)?;
        Ok(())
    }
}
