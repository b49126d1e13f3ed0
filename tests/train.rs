use std::{
    fs,
    path::{Path, PathBuf},
    thread,
};

use clap::Parser;
use collective::in_process;
use engine::{LocalGate, checkpoint, collab::Model};
use training_orchestration::{Cli, run};

const SETUP: &str = r#"{
    "model": { "sequential": { "layers": [ { "dense": { "dim": [1, 1], "act_fn": null } } ] } },
    "optimizer": { "gradient_descent": { "learning_rate": 0.3 } },
    "metrics": ["mse"]
}"#;

/// Writes the setup and 40 samples of `y = 2x + 1`.
fn fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let setup = dir.join("setup.json");
    fs::write(&setup, SETUP).unwrap();

    let data = dir.join("line.csv");
    let rows: String = (0..40)
        .map(|i| {
            let x = i as f32 / 40.;
            format!("{x},{}\n", 2. * x + 1.)
        })
        .collect();
    fs::write(&data, rows).unwrap();

    (setup, data)
}

fn cli(dir: &Path, extra: &[&str]) -> Cli {
    let (setup, data) = fixture(dir);
    let prefix = dir.join("ckpt").join("line");
    let telemetry = dir.join("telemetry.jsonl");

    let mut args = vec![
        "train".to_string(),
        "-m".into(),
        setup.display().to_string(),
        "--model-args".into(),
        "seed=1".into(),
        "-d".into(),
        data.display().to_string(),
        "--dataset-args".into(),
        "x_size=1".into(),
        "y_size=1".into(),
        "seed=3".into(),
        "-b".into(),
        "4".into(),
        "-p".into(),
        prefix.display().to_string(),
        "--telemetry".into(),
        telemetry.display().to_string(),
        "-v".into(),
        "-1".into(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));

    Cli::try_parse_from(args).unwrap()
}

fn telemetry(dir: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(dir.join("telemetry.jsonl"))
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn end_to_end_run_learns_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let cli = cli(dir.path(), &["-e", "15"]);

    let trainer = run::train(&cli, Box::new(LocalGate)).unwrap();
    assert_eq!(trainer.state().epoch, 15);

    let records = telemetry(dir.path());
    assert_eq!(records.len(), 15);
    assert!(records.iter().all(|r| r["subset"] == "valid"));

    let valid: Vec<f64> = records
        .iter()
        .filter(|r| r["subset"] == "valid")
        .map(|r| r["value"].as_f64().unwrap())
        .collect();
    assert!(valid[14] < valid[0], "{valid:?}");

    let (last, best) = checkpoint::paths(&dir.path().join("ckpt").join("line"));
    assert_eq!(checkpoint::load(&last).unwrap().epoch, 15);
    assert!(checkpoint::load(&best).unwrap().is_best);
}

#[test]
fn resumed_run_continues_the_epoch_count() {
    let dir = tempfile::tempdir().unwrap();
    run::train(&cli(dir.path(), &["-e", "3"]), Box::new(LocalGate)).unwrap();

    let (last, _) = checkpoint::paths(&dir.path().join("ckpt").join("line"));
    let last = last.display().to_string();

    let cli = cli(dir.path(), &["-e", "2", "-c", &last]);
    let resumed = run::train(&cli, Box::new(LocalGate)).unwrap();
    assert_eq!(resumed.state().epoch, 5);
    assert_eq!(checkpoint::load(Path::new(&last)).unwrap().epoch, 5);
}

#[test]
fn data_parallel_run_has_a_single_writer() {
    let dir = tempfile::tempdir().unwrap();
    let cli = cli(dir.path(), &["-e", "4"]);

    let handles: Vec<_> = in_process(3)
        .unwrap()
        .into_iter()
        .map(|gate| {
            let cli = cli.clone();
            thread::spawn(move || {
                let trainer = run::train(&cli, Box::new(gate)).unwrap();
                trainer.state().model().unwrap().params().to_vec()
            })
        })
        .collect();

    let params: Vec<Vec<f32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(params.iter().all(|p| *p == params[0]));

    // One valid record per epoch, written by rank 0 only.
    assert_eq!(telemetry(dir.path()).len(), 4);
}

#[test]
fn unknown_arguments_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let cli = cli(dir.path(), &["--model-args", "seeed=1"]);

    let err = run::train(&cli, Box::new(LocalGate)).unwrap_err();
    assert!(err.to_string().contains("seeed"), "{err:#}");
}
