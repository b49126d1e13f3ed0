use clap::Parser;
use training_orchestration::{Cli, run};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbosity {
        v if v < 0 => "warn",
        0 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let gate = run::gate_from_env()?;
    run::train(&cli, gate)?;
    Ok(())
}
