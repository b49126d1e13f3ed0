use std::fmt;

use serde::{Deserialize, Serialize};

/// The lifecycle points a pipe can attach to, in the order they fire within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Point {
    OnInit,
    BeforeEpoch,
    BeforeBatch,
    ComputeStep,
    AfterBatch,
    AfterEpoch,
    OnCheckpoint,
}

impl Point {
    pub const ALL: [Point; 7] = [
        Point::OnInit,
        Point::BeforeEpoch,
        Point::BeforeBatch,
        Point::ComputeStep,
        Point::AfterBatch,
        Point::AfterEpoch,
        Point::OnCheckpoint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Point::OnInit => "on_init",
            Point::BeforeEpoch => "before_epoch",
            Point::BeforeBatch => "before_batch",
            Point::ComputeStep => "compute_step",
            Point::AfterBatch => "after_batch",
            Point::AfterEpoch => "after_epoch",
            Point::OnCheckpoint => "on_checkpoint",
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
