//! The `train` command: builds a model, a dataset and the standard pipes from
//! the command line and drives them with an [`engine::Trainer`].

pub mod cli;
pub mod run;

pub use cli::Cli;
