use std::sync::Arc;

use anyhow::Context;
use collective::{ClusterEnv, TcpGate};
use engine::{Gate, LocalGate, Pipe, ReduceOp, Trainer, TrainerConfig, collab::Model};
use log::{info, warn};
use machine_learning::{
    dataset::InMemoryDataset,
    specs::{Kwargs, SetupSpec},
};
use pipes::{
    Checkpointer, ComputeMetrics, DatasetHandler, JsonLinesSink, Logger, LossHandler,
    ModelHandler, OneStepOptimizers, ProgressLog, ReduceLrOnPlateau, WeightAveraging,
};

use crate::Cli;

const MODEL_ARGS: &[&str] = &["seed", "lr"];
const DATASET_ARGS: &[&str] = &["x_size", "y_size", "valid_fraction", "seed"];
const DEFAULT_VALID_FRACTION: f32 = 0.2;

/// Joins the cluster described by the environment, or runs alone.
pub fn gate_from_env() -> anyhow::Result<Box<dyn Gate>> {
    match ClusterEnv::from_env()? {
        Some(env) if env.world_size > 1 => {
            info!(rank = env.rank, world_size = env.world_size; "joining cluster at {}", env.master_addr);
            Ok(Box::new(TcpGate::connect(env)?))
        }
        _ => Ok(Box::new(LocalGate)),
    }
}

/// The trainer config file, if any, overridden by the command line flags.
pub fn trainer_config(cli: &Cli) -> anyhow::Result<TrainerConfig> {
    let mut config = match &cli.config {
        Some(path) => TrainerConfig::from_json_file(path)?,
        None => TrainerConfig::default(),
    };

    if cli.max_train_iterations.is_some() {
        config.max_train_iterations = cli.max_train_iterations;
    }

    if cli.max_valid_iterations.is_some() {
        config.max_valid_iterations = cli.max_valid_iterations;
    }

    if let Some(dump_period) = cli.dump_period {
        config.dump_period = dump_period;
    }

    config.validate_on_train |= cli.validate_on_train;
    Ok(config)
}

/// Builds every pipe the command line asks for.
pub fn build_pipes(cli: &Cli) -> anyhow::Result<Vec<Box<dyn Pipe>>> {
    let setup = SetupSpec::from_json_file(&cli.model)
        .with_context(|| format!("cannot load the setup at {}", cli.model.display()))?;

    let model_args = Kwargs::parse(&cli.model_args)?;
    model_args.ensure_known(MODEL_ARGS)?;

    let model = setup.model.build(model_args.get("seed")?)?;
    let mut optimizer = setup.optimizer;
    if let Some(lr) = model_args.get("lr")? {
        optimizer = optimizer.with_learning_rate(lr);
    }

    let dataset_args = Kwargs::parse(&cli.dataset_args)?;
    dataset_args.ensure_known(DATASET_ARGS)?;

    let dataset = InMemoryDataset::from_csv(
        &cli.dataset,
        dataset_args.require("x_size")?,
        dataset_args.require("y_size")?,
        dataset_args
            .get("valid_fraction")?
            .unwrap_or(DEFAULT_VALID_FRACTION),
        dataset_args.get("seed")?,
    )
    .with_context(|| format!("cannot load the dataset at {}", cli.dataset.display()))?;

    let metrics = setup.metrics.iter().map(|spec| spec.build()).collect();
    let size = model.size();

    let mut pipes: Vec<Box<dyn Pipe>> = vec![
        Box::new(
            DatasetHandler::new(Arc::new(dataset), cli.batch_size)
                .seed(cli.seed)
                .workers(cli.workers),
        ),
        Box::new(ModelHandler::new(Box::new(model))),
        Box::new(LossHandler::new(setup.loss.build())),
        Box::new(OneStepOptimizers::single(optimizer.build(size))),
        Box::new(ComputeMetrics::new(metrics).reduced(ReduceOp::Mean)),
        Box::new(ProgressLog::new(cli.verbosity)),
    ];

    if let Some(path) = &cli.telemetry {
        let mut logger = Logger::new(Box::new(JsonLinesSink::new(path)));
        if let Some(label) = &cli.run_label {
            logger = logger.label(label);
        }
        pipes.push(Box::new(logger));
    }

    if let Some(prefix) = &cli.prefix {
        let checkpointer = Checkpointer::new(prefix, &cli.checkpoint_metric)
            .objective(cli.objective.into());
        pipes.push(Box::new(checkpointer));
    }

    if let Some(patience) = cli.lr_patience {
        let scheduler = ReduceLrOnPlateau::new(&cli.checkpoint_metric)
            .objective(cli.objective.into())
            .patience(patience)
            .factor(cli.lr_factor)?;
        pipes.push(Box::new(scheduler));
    }

    if let Some(decay) = cli.ema_decay {
        pipes.push(Box::new(WeightAveraging::new(decay, cli.ema_start)?));
    }

    Ok(pipes)
}

/// Builds the trainer on `gate`, resumes from the requested checkpoint and
/// trains for the requested amount of epochs.
pub fn train(cli: &Cli, gate: Box<dyn Gate>) -> anyhow::Result<Trainer> {
    if cli.use_cuda {
        warn!("CUDA was requested but only the CPU backend is available, running on the CPU");
    }

    let mut trainer = Trainer::builder()
        .boxed_gate(gate)
        .pipes(build_pipes(cli)?)
        .config(trainer_config(cli)?)
        .build()?;

    if let Some(path) = &cli.checkpoint {
        trainer.restore(path)?;
    }

    trainer.run_train(cli.epochs)?;

    let state = trainer.state();
    if state.is_designated_actor() {
        let summary = serde_json::to_string(&state.metrics)?;
        info!(epoch = state.epoch; "training finished {summary}");
    }

    Ok(trainer)
}
