mod common;

use engine::{Lambda, Mode, Point, Stateful, Trainer};
use pipes::ReduceLrOnPlateau;

use common::regression;

fn flat_loss() -> Lambda {
    Lambda::new("flat").on(Point::AfterEpoch, 0, |state| {
        if state.mode == Mode::Validate {
            state.metrics.set("loss", &state.subset, 1.0);
        }
        Ok(())
    })
}

fn lr(trainer: &Trainer) -> f32 {
    trainer.state().optimizers[0].learning_rate()
}

#[test]
fn plateau_halves_the_learning_rate_after_patience() {
    let scheduler = ReduceLrOnPlateau::new("loss")
        .patience(2)
        .factor(0.5)
        .unwrap();

    let mut trainer = Trainer::builder()
        .pipes(regression(8, 4))
        .pipe(flat_loss())
        .pipe(scheduler)
        .build()
        .unwrap();

    // The first evaluation sets the best, the next two are tolerated.
    for _ in 0..3 {
        trainer.run_epoch(Mode::Validate, "valid", None).unwrap();
    }
    assert_eq!(lr(&trainer), 0.3);

    trainer.run_epoch(Mode::Validate, "valid", None).unwrap();
    assert_eq!(lr(&trainer), 0.15);
    assert_eq!(trainer.state().status.get_f64("scheduler.metric"), Some(1.0));

    // Training epochs and other subsets are ignored.
    trainer.run_epoch(Mode::Train, "train", None).unwrap();
    trainer.run_epoch(Mode::Validate, "train", None).unwrap();
    assert_eq!(lr(&trainer), 0.15);
}

#[test]
fn learning_rate_never_drops_below_the_floor() {
    let scheduler = ReduceLrOnPlateau::new("loss")
        .patience(0)
        .factor(0.1)
        .unwrap()
        .min_lr(0.01);

    let mut trainer = Trainer::builder()
        .pipes(regression(8, 4))
        .pipe(flat_loss())
        .pipe(scheduler)
        .build()
        .unwrap();

    for _ in 0..5 {
        trainer.run_epoch(Mode::Validate, "valid", None).unwrap();
    }

    assert_eq!(lr(&trainer), 0.01);
}

#[test]
fn plateau_progress_survives_export() {
    let mut scheduler = ReduceLrOnPlateau::new("loss").patience(3);
    let blob = scheduler.export_state().unwrap();

    let mut restored = ReduceLrOnPlateau::new("loss");
    restored.import_state(&blob).unwrap();
    assert_eq!(restored.export_state().unwrap(), blob);

    assert!(scheduler.import_state(b"not json").is_err());
}

#[test]
fn invalid_factor_is_rejected() {
    assert!(ReduceLrOnPlateau::new("loss").factor(1.5).is_err());
    assert!(ReduceLrOnPlateau::new("loss").factor(0.0).is_err());
}
