use std::fmt;

use serde::{Deserialize, Serialize};

/// What the current epoch is for. Only `Train` updates parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Train,
    Validate,
    Test,
}

impl Mode {
    pub fn is_training(self) -> bool {
        matches!(self, Mode::Train)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Validate => "validate",
            Mode::Test => "test",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
