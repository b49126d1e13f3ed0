//! Serializable descriptions of the collaborators and the `key=value`
//! arguments that tweak them.

use std::{collections::BTreeMap, fmt::Display, fs, path::Path, str::FromStr};

use engine::collab::{LossFn, Metric, Optimizer};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    MlErr, Result,
    arch::{ActFn, Dense, Sequential},
    initialization::Init,
    loss::{Accuracy, Mse},
    optimization::{Adam, GradientDescent, GradientDescentWithMomentum},
};

/// The specification for the `ActFn` enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFnSpec {
    Sigmoid { amp: f32 },
}

/// The specification for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSpec {
    Dense {
        dim: (usize, usize),
        act_fn: Option<ActFnSpec>,
        #[serde(default)]
        init: Init,
    },
}

/// The specification for a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSpec {
    Sequential { layers: Vec<LayerSpec> },
}

/// The specification for an optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
    GradientDescentWithMomentum {
        learning_rate: f32,
        momentum: f32,
    },
}

/// The specification for a loss function.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFnSpec {
    #[default]
    Mse,
}

/// The specification for an epoch metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSpec {
    Mse,
    Accuracy,
}

/// Everything needed to train a model on a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupSpec {
    pub model: ModelSpec,
    pub optimizer: OptimizerSpec,
    #[serde(default)]
    pub loss: LossFnSpec,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricSpec>,
}

fn default_metrics() -> Vec<MetricSpec> {
    vec![MetricSpec::Mse]
}

impl SetupSpec {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl ModelSpec {
    /// Builds the model with freshly initialized parameters.
    ///
    /// # Arguments
    /// * `seed` - Makes the initialization reproducible when set.
    pub fn build(&self, seed: Option<u64>) -> Result<Sequential> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let ModelSpec::Sequential { layers } = self;
        if layers.is_empty() {
            return Err(MlErr::InvalidSpec("a model needs at least one layer".to_string()));
        }

        let mut dense = Vec::with_capacity(layers.len());
        let mut params = Vec::new();

        for layer in layers {
            let LayerSpec::Dense { dim, act_fn, init } = *layer;
            let act_fn = act_fn.map(|ActFnSpec::Sigmoid { amp }| ActFn::sigmoid(amp));
            let layer = Dense::new(dim, act_fn);

            params.extend(init.sample(&mut rng, layer.size(), dim.0, dim.1)?);
            dense.push(layer);
        }

        Sequential::new(dense, params)
    }
}

impl OptimizerSpec {
    pub fn learning_rate(&self) -> f32 {
        match *self {
            OptimizerSpec::Adam { learning_rate, .. }
            | OptimizerSpec::GradientDescent { learning_rate }
            | OptimizerSpec::GradientDescentWithMomentum { learning_rate, .. } => learning_rate,
        }
    }

    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        match &mut self {
            OptimizerSpec::Adam { learning_rate, .. }
            | OptimizerSpec::GradientDescent { learning_rate }
            | OptimizerSpec::GradientDescentWithMomentum { learning_rate, .. } => {
                *learning_rate = lr
            }
        }

        self
    }

    /// Builds an optimizer for `len` parameters.
    pub fn build(&self, len: usize) -> Box<dyn Optimizer> {
        match *self {
            OptimizerSpec::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon)),
            OptimizerSpec::GradientDescent { learning_rate } => {
                Box::new(GradientDescent::new(learning_rate))
            }
            OptimizerSpec::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => Box::new(GradientDescentWithMomentum::new(len, learning_rate, momentum)),
        }
    }
}

impl LossFnSpec {
    pub fn build(&self) -> Box<dyn LossFn> {
        match self {
            LossFnSpec::Mse => Box::new(Mse),
        }
    }
}

impl MetricSpec {
    pub fn build(&self) -> Box<dyn Metric> {
        match self {
            MetricSpec::Mse => Box::new(Mse),
            MetricSpec::Accuracy => Box::new(Accuracy),
        }
    }
}

/// Free-form `key=value` arguments forwarded to a constructor.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Kwargs(BTreeMap<String, String>);

impl Kwargs {
    /// Parses `key=value` pairs. Later pairs override earlier ones.
    pub fn parse<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = BTreeMap::new();

        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| MlErr::InvalidArg {
                key: pair.to_string(),
                reason: "expected `key=value`".to_string(),
            })?;

            let key = key.trim();
            if key.is_empty() {
                return Err(MlErr::InvalidArg {
                    key: pair.to_string(),
                    reason: "empty key".to_string(),
                });
            }

            map.insert(key.to_string(), value.trim().to_string());
        }

        Ok(Self(map))
    }

    /// Parses the value of `key`, `None` if absent.
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.0
            .get(key)
            .map(|value| {
                value.parse::<T>().map_err(|e| MlErr::InvalidArg {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    pub fn require<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)?.ok_or_else(|| MlErr::InvalidArg {
            key: key.to_string(),
            reason: "missing".to_string(),
        })
    }

    /// Fails on the first key not in `known`, catching typos early.
    pub fn ensure_known(&self, known: &[&str]) -> Result<()> {
        match self.0.keys().find(|key| !known.contains(&key.as_str())) {
            Some(key) => Err(MlErr::InvalidArg {
                key: key.clone(),
                reason: format!("unknown argument, expected one of {known:?}"),
            }),
            None => Ok(()),
        }
    }
}
