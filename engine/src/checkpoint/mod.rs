//! Snapshots of a run written as safetensors archives.
//!
//! An archive holds the model parameters as an `f32` tensor named `model`, every
//! optimizer state as a byte tensor `optimizer.<i>`, every stateful pipe as a
//! byte tensor `pipe.<name>` and the counters and metrics as JSON in the
//! `run_state` metadata entry.
//!
//! Each prefix owns two files, `<prefix>_last.safetensors` rewritten on every
//! save and `<prefix>_best.safetensors` rewritten when the comparison value
//! strictly improves.

mod atomic;
mod objective;

use std::{
    collections::{BTreeMap, HashMap},
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, info};
use safetensors::{
    SafeTensors,
    tensor::{Dtype, TensorView},
};
use serde::{Deserialize, Serialize};

pub use objective::Objective;

use crate::{
    error::{Result, TrainErr},
    state::{Metrics, RunState},
};

const FORMAT_VERSION: u32 = 1;
const HEADER_KEY: &str = "run_state";
const MODEL_TENSOR: &str = "model";
const OPTIMIZER_PREFIX: &str = "optimizer.";
const PIPE_PREFIX: &str = "pipe.";

/// Exported pipe states keyed by pipe name.
pub type PipeStates = BTreeMap<String, Vec<u8>>;

/// Asks the trainer to write a snapshot once the `on_checkpoint` dispatch ends.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRequest {
    pub prefix: PathBuf,
    /// The comparison metric of this snapshot.
    pub value: f64,
    /// The best comparison value seen before this snapshot.
    pub previous_best: Option<f64>,
    pub objective: Objective,
}

/// Where a save landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub last: PathBuf,
    /// Set when the snapshot also became the new best.
    pub best: Option<PathBuf>,
}

impl SaveOutcome {
    pub fn is_best(&self) -> bool {
        self.best.is_some()
    }
}

/// A decoded checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub epoch: usize,
    pub iteration: usize,
    pub metrics: Metrics,
    pub is_best: bool,
    pub value: Option<f64>,
    pub model: Option<Vec<f32>>,
    pub optimizers: Vec<Vec<u8>>,
    pub pipes: PipeStates,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    format: u32,
    epoch: usize,
    iteration: usize,
    metrics: Metrics,
    is_best: bool,
    value: Option<f64>,
    has_model: bool,
    optimizers: usize,
    pipes: Vec<String>,
}

/// Returns the `(last, best)` file paths for `prefix`.
pub fn paths(prefix: &Path) -> (PathBuf, PathBuf) {
    let with_suffix = |suffix: &str| {
        let mut name = OsString::from(prefix.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    };

    (
        with_suffix("_last.safetensors"),
        with_suffix("_best.safetensors"),
    )
}

/// Writes `<prefix>_last` and, when `request.value` strictly improves on
/// `request.previous_best`, `<prefix>_best`.
///
/// # Arguments
/// * `request` - The prefix and the comparison values.
/// * `state` - The run state to snapshot.
/// * `pipes` - The exported state of every stateful pipe.
///
/// # Errors
/// `TrainErr::StateExport` if an optimizer can't export its state and
/// `TrainErr::CheckpointIo` if a file can't be written. Files already on disk
/// are never left half written.
pub fn save(
    request: &CheckpointRequest,
    state: &RunState,
    pipes: &PipeStates,
) -> Result<SaveOutcome> {
    let is_best = request.objective.improves(request.value, request.previous_best);
    let snapshot = Snapshot::capture(state, pipes, is_best, Some(request.value))?;
    let (last, best) = paths(&request.prefix);

    let bytes = snapshot
        .encode()
        .map_err(|e| TrainErr::checkpoint_io(&last, e))?;

    atomic::write(&last, &bytes).map_err(|e| TrainErr::checkpoint_io(&last, e))?;
    debug!(epoch = snapshot.epoch; "wrote {}", last.display());

    let best = if is_best {
        atomic::write(&best, &bytes).map_err(|e| TrainErr::checkpoint_io(&best, e))?;
        info!(epoch = snapshot.epoch, value = request.value; "new best checkpoint {}", best.display());
        Some(best)
    } else {
        None
    };

    Ok(SaveOutcome { last, best })
}

/// Reads and decodes a snapshot.
///
/// # Errors
/// `TrainErr::CheckpointIo` if the file can't be read and
/// `TrainErr::CheckpointCorrupt` if its content is malformed.
pub fn load(path: &Path) -> Result<Snapshot> {
    let bytes = fs::read(path).map_err(|e| TrainErr::checkpoint_io(path, e))?;
    Snapshot::decode(&bytes).map_err(|reason| TrainErr::corrupt(path, reason))
}

impl Snapshot {
    /// Copies everything checkpointable out of `state`.
    pub fn capture(
        state: &RunState,
        pipes: &PipeStates,
        is_best: bool,
        value: Option<f64>,
    ) -> Result<Self> {
        let optimizers = state
            .optimizers
            .iter()
            .enumerate()
            .map(|(i, optimizer)| {
                optimizer
                    .export_state()
                    .map_err(|source| TrainErr::StateExport {
                        owner: format!("optimizer {i}"),
                        source,
                    })
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            epoch: state.epoch,
            iteration: state.iteration,
            metrics: state.metrics.clone(),
            is_best,
            value,
            model: state.model.as_ref().map(|model| model.params().to_vec()),
            optimizers,
            pipes: pipes.clone(),
        })
    }

    fn encode(&self) -> io::Result<Vec<u8>> {
        let header = Header {
            format: FORMAT_VERSION,
            epoch: self.epoch,
            iteration: self.iteration,
            metrics: self.metrics.clone(),
            is_best: self.is_best,
            value: self.value,
            has_model: self.model.is_some(),
            optimizers: self.optimizers.len(),
            pipes: self.pipes.keys().cloned().collect(),
        };

        let model: Vec<u8> = self
            .model
            .iter()
            .flatten()
            .flat_map(|p| p.to_le_bytes())
            .collect();

        let invalid = |e: safetensors::SafeTensorError| {
            io::Error::new(io::ErrorKind::InvalidData, e.to_string())
        };

        let mut tensors = Vec::with_capacity(1 + self.optimizers.len() + self.pipes.len());

        if let Some(params) = &self.model {
            let view = TensorView::new(Dtype::F32, vec![params.len()], &model).map_err(invalid)?;
            tensors.push((MODEL_TENSOR.to_string(), view));
        }

        for (i, blob) in self.optimizers.iter().enumerate() {
            let view = TensorView::new(Dtype::U8, vec![blob.len()], blob).map_err(invalid)?;
            tensors.push((format!("{OPTIMIZER_PREFIX}{i}"), view));
        }

        for (name, blob) in &self.pipes {
            let view = TensorView::new(Dtype::U8, vec![blob.len()], blob).map_err(invalid)?;
            tensors.push((format!("{PIPE_PREFIX}{name}"), view));
        }

        let metadata = HashMap::from([(HEADER_KEY.to_string(), serde_json::to_string(&header)?)]);
        safetensors::tensor::serialize(tensors, &Some(metadata)).map_err(invalid)
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let (_, metadata) =
            SafeTensors::read_metadata(bytes).map_err(|e| format!("unreadable archive: {e}"))?;
        let tensors =
            SafeTensors::deserialize(bytes).map_err(|e| format!("unreadable archive: {e}"))?;

        let raw_header = metadata
            .metadata()
            .as_ref()
            .and_then(|entries| entries.get(HEADER_KEY))
            .ok_or_else(|| format!("missing `{HEADER_KEY}` metadata"))?;

        let header: Header =
            serde_json::from_str(raw_header).map_err(|e| format!("invalid header: {e}"))?;

        if header.format != FORMAT_VERSION {
            return Err(format!("unsupported format version {}", header.format));
        }

        let bytes_of = |name: &str, dtype: Dtype| -> std::result::Result<Vec<u8>, String> {
            let view = tensors
                .tensor(name)
                .map_err(|e| format!("tensor `{name}`: {e}"))?;

            if view.dtype() != dtype {
                return Err(format!(
                    "tensor `{name}` has dtype {:?}, expected {dtype:?}",
                    view.dtype()
                ));
            }

            Ok(view.data().to_vec())
        };

        let model = if header.has_model {
            let raw = bytes_of(MODEL_TENSOR, Dtype::F32)?;
            let params = raw
                .chunks_exact(size_of::<f32>())
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect();

            Some(params)
        } else {
            None
        };

        let optimizers = (0..header.optimizers)
            .map(|i| bytes_of(&format!("{OPTIMIZER_PREFIX}{i}"), Dtype::U8))
            .collect::<std::result::Result<_, _>>()?;

        let pipes = header
            .pipes
            .iter()
            .map(|name| {
                let blob = bytes_of(&format!("{PIPE_PREFIX}{name}"), Dtype::U8)?;
                Ok((name.clone(), blob))
            })
            .collect::<std::result::Result<_, String>>()?;

        Ok(Self {
            epoch: header.epoch,
            iteration: header.iteration,
            metrics: header.metrics,
            is_best: header.is_best,
            value: header.value,
            model,
            optimizers,
            pipes,
        })
    }
}
