use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainErr};

/// Knobs of the epoch driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Stop each training epoch after this many batches.
    pub max_train_iterations: Option<usize>,
    /// Stop each validation epoch after this many batches.
    pub max_valid_iterations: Option<usize>,
    /// Fire `on_checkpoint` after the first training cycle and every this many
    /// cycles from there.
    pub dump_period: usize,
    /// Also run a validation pass over the training subset.
    pub validate_on_train: bool,
    pub train_subset: String,
    /// Validated after every training epoch, if the dataset has them.
    pub validation_subsets: Vec<String>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_train_iterations: None,
            max_valid_iterations: None,
            dump_period: 1,
            validate_on_train: false,
            train_subset: "train".to_string(),
            validation_subsets: vec!["valid".to_string()],
        }
    }
}

impl TrainerConfig {
    /// Loads a config from a JSON file, missing fields take their default.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            TrainErr::Configuration(format!("cannot read '{}': {e}", path.display()))
        })?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| TrainErr::Configuration(format!("invalid JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dump_period == 0 {
            return Err(TrainErr::Configuration(
                "dump_period must be at least 1".to_string(),
            ));
        }

        if self.train_subset.is_empty() {
            return Err(TrainErr::Configuration(
                "train_subset must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: TrainerConfig =
            serde_json::from_str(r#"{ "max_train_iterations": 2, "dump_period": 5 }"#).unwrap();

        assert_eq!(config.max_train_iterations, Some(2));
        assert_eq!(config.max_valid_iterations, None);
        assert_eq!(config.dump_period, 5);
        assert_eq!(config.validation_subsets, ["valid"]);
    }

    #[test]
    fn zero_dump_period_is_rejected() {
        let config = TrainerConfig {
            dump_period: 0,
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(TrainErr::Configuration(_))));
    }
}
