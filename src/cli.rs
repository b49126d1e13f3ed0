use std::{num::NonZeroUsize, path::PathBuf};

use clap::{Parser, ValueEnum};
use engine::checkpoint::Objective;

/// Trains a model described by a JSON setup on a CSV dataset.
///
/// Distributed runs are configured through the `RANK`, `WORLD_SIZE` and
/// `MASTER_ADDR` environment variables.
#[derive(Parser, Debug, Clone)]
#[command(name = "train", version, about, long_about = None)]
pub struct Cli {
    /// JSON file with the model, optimizer, loss and metrics
    #[arg(short, long)]
    pub model: PathBuf,

    /// `key=value` arguments for the model (seed, lr)
    #[arg(long, num_args = 1..)]
    pub model_args: Vec<String>,

    /// CSV file with one sample per row
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// `key=value` arguments for the dataset (x_size, y_size, valid_fraction, seed)
    #[arg(long, num_args = 1..)]
    pub dataset_args: Vec<String>,

    #[arg(short, long, default_value = "32")]
    pub batch_size: NonZeroUsize,

    /// Batches prepared ahead on a background thread
    #[arg(short, long, default_value_t = 0)]
    pub workers: usize,

    #[arg(short, long, default_value_t = 10)]
    pub epochs: usize,

    /// Checkpoint to resume from
    #[arg(short, long)]
    pub checkpoint: Option<PathBuf>,

    /// Request the CUDA backend (only the CPU backend is available)
    #[arg(long)]
    pub use_cuda: bool,

    /// JSON trainer config, command line flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub max_train_iterations: Option<usize>,

    #[arg(long)]
    pub max_valid_iterations: Option<usize>,

    /// -1 silent, 0 per epoch, n every n batches
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    pub verbosity: i32,

    /// Writes `<prefix>_last` and `<prefix>_best` checkpoints when set
    #[arg(short, long)]
    pub prefix: Option<PathBuf>,

    /// Checkpoint after the first epoch and every this many epochs from there
    #[arg(long)]
    pub dump_period: Option<usize>,

    /// Also validate on the training subset
    #[arg(long)]
    pub validate_on_train: bool,

    /// Metric the best checkpoint is chosen by
    #[arg(long, default_value = "mse")]
    pub checkpoint_metric: String,

    #[arg(long, value_enum, default_value_t = Goal::Minimize)]
    pub objective: Goal,

    /// JSON lines file receiving the epoch metrics
    #[arg(long)]
    pub telemetry: Option<PathBuf>,

    #[arg(long)]
    pub run_label: Option<String>,

    /// Reduce the learning rate after this many epochs without improvement
    #[arg(long)]
    pub lr_patience: Option<usize>,

    #[arg(long, default_value_t = 0.1)]
    pub lr_factor: f32,

    /// Evaluate with an exponential moving average of the parameters
    #[arg(long)]
    pub ema_decay: Option<f32>,

    #[arg(long, default_value_t = 0)]
    pub ema_start: usize,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Goal {
    Maximize,
    Minimize,
}

impl From<Goal> for Objective {
    fn from(goal: Goal) -> Self {
        match goal {
            Goal::Maximize => Objective::Maximize,
            Goal::Minimize => Objective::Minimize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_invocation() {
        let cli = Cli::try_parse_from(["train", "-m", "setup.json", "-d", "data.csv"]).unwrap();

        assert_eq!(cli.batch_size.get(), 32);
        assert_eq!(cli.epochs, 10);
        assert_eq!(cli.verbosity, 0);
        assert!(cli.prefix.is_none());
        assert_eq!(Objective::from(cli.objective), Objective::Minimize);
    }

    #[test]
    fn argument_blocks_and_negative_verbosity() {
        let cli = Cli::try_parse_from([
            "train",
            "-m",
            "setup.json",
            "--model-args",
            "seed=1",
            "lr=0.5",
            "-d",
            "data.csv",
            "--dataset-args",
            "x_size=2",
            "y_size=1",
            "-v",
            "-1",
            "--use-cuda",
        ])
        .unwrap();

        assert_eq!(cli.model_args, ["seed=1", "lr=0.5"]);
        assert_eq!(cli.dataset_args, ["x_size=2", "y_size=1"]);
        assert_eq!(cli.verbosity, -1);
        assert!(cli.use_cuda);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(Cli::try_parse_from(["train", "-m", "a", "-d", "b", "-b", "0"]).is_err());
    }
}
