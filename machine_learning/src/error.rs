use std::{io, path::PathBuf};

use thiserror::Error;

/// The result type used in the entire machine learning crate.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning crate's error type.
#[derive(Debug, Error)]
pub enum MlErr {
    #[error("size mismatch in {what}, got {got} and expected {expected}")]
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("invalid distribution: {0}")]
    Distribution(String),

    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("invalid argument `{key}`: {reason}")]
    InvalidArg { key: String, reason: String },

    #[error("{path}:{line}: {reason}")]
    Csv {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<rand_distr::uniform::Error> for MlErr {
    fn from(e: rand_distr::uniform::Error) -> Self {
        Self::Distribution(e.to_string())
    }
}

impl From<rand_distr::NormalError> for MlErr {
    fn from(e: rand_distr::NormalError) -> Self {
        Self::Distribution(e.to_string())
    }
}

impl From<ndarray::ShapeError> for MlErr {
    fn from(e: ndarray::ShapeError) -> Self {
        Self::InvalidSpec(e.to_string())
    }
}
