use std::{io, path::PathBuf};

use thiserror::Error;

use crate::hooks::Point;

/// The engine's result type.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Failures surfaced by the training engine.
#[derive(Debug, Error)]
pub enum TrainErr {
    /// Conflicting pipe names or hook registrations. Raised before any epoch runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A pipe failed while handling a lifecycle point. `source` is the pipe's own error.
    #[error("pipe `{pipe}` failed at {point}: {source}")]
    Extension {
        pipe: String,
        point: Point,
        #[source]
        source: anyhow::Error,
    },

    /// The checkpoint doesn't fit what is attached to the trainer, or can't be parsed.
    #[error("corrupt checkpoint {path}: {reason}")]
    CheckpointCorrupt { path: PathBuf, reason: String },

    #[error("checkpoint io error on {path}: {source}")]
    CheckpointIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{owner} failed to export its state: {source}")]
    StateExport {
        owner: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{owner} failed to import its state: {source}")]
    StateImport {
        owner: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("collective operation failed: {0}")]
    Collective(#[source] io::Error),

    #[error("dataset error: {0}")]
    Dataset(#[source] anyhow::Error),

    #[error("no {0} is bound to the run state")]
    MissingCollaborator(&'static str),
}

impl TrainErr {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CheckpointCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn checkpoint_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::CheckpointIo {
            path: path.into(),
            source,
        }
    }
}
