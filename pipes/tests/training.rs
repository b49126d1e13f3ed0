mod common;

use std::sync::{Arc, Mutex};

use common::{Recording, regression, watcher};
use engine::{Lambda, Mode, Point, Trainer, TrainerConfig};
use pipes::Logger;

#[test]
fn full_pipeline_fits_a_line() {
    let valid = Arc::new(Mutex::new(Vec::new()));

    let mut trainer = Trainer::builder()
        .pipes(regression(32, 4))
        .pipe(watcher("mse", "valid", &valid))
        .build()
        .unwrap();

    trainer.run_train(30).unwrap();

    let valid = valid.lock().unwrap();
    assert_eq!(valid.len(), 30);
    assert!(valid[29] < valid[0] / 10.0, "{valid:?}");
    assert!(trainer.state().metrics.get("mse", "train").is_some());
    assert!(trainer.state().status.get_f64("lr").is_some());
}

#[test]
fn drop_last_and_limits_shape_the_epochs() {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&batches);

    let spy = Lambda::new("spy").on(Point::AfterEpoch, 0, move |state| {
        seen.lock()
            .unwrap()
            .push((state.subset.clone(), state.iteration));
        Ok(())
    });

    // 10 train samples in batches of 4 drop the trailing pair, the 8
    // validation samples fit exactly.
    let mut trainer = Trainer::builder()
        .pipes(regression(10, 4))
        .pipe(spy)
        .build()
        .unwrap();
    trainer.run_train(1).unwrap();

    assert_eq!(
        *batches.lock().unwrap(),
        [("train".to_string(), 2), ("valid".to_string(), 2)]
    );
}

#[test]
fn validation_epochs_leave_parameters_untouched() {
    let mut trainer = Trainer::builder().pipes(regression(8, 2)).build().unwrap();
    trainer.run_epoch(Mode::Train, "train", None).unwrap();

    let before = trainer.state().model().unwrap().params().to_vec();
    trainer.run_epoch(Mode::Validate, "valid", None).unwrap();

    assert_eq!(trainer.state().model().unwrap().params(), before.as_slice());
    assert!(trainer.state().loss.is_none());
    assert!(trainer.state().status.get_f64("loss").is_some());
}

#[test]
fn seeded_shuffle_is_reproducible() {
    fn first_batches() -> Vec<Vec<f32>> {
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);

        let spy = Lambda::new("spy").on(Point::BeforeBatch, 0, move |state| {
            if state.iteration == 0 && state.mode == Mode::Train {
                let x = state.batch.as_ref().unwrap().x.column(0).to_vec();
                seen.lock().unwrap().push(x);
            }
            Ok(())
        });

        let config = TrainerConfig {
            validation_subsets: Vec::new(),
            ..TrainerConfig::default()
        };

        let mut trainer = Trainer::builder()
            .pipes(regression(12, 12))
            .pipe(spy)
            .config(config)
            .build()
            .unwrap();
        trainer.run_train(2).unwrap();
        drop(trainer);

        Arc::try_unwrap(order).unwrap().into_inner().unwrap()
    }

    let first = first_batches();
    assert_eq!(first, first_batches());
    assert_ne!(first[0], first[1]);

    let mut sorted = first[0].clone();
    sorted.sort_by(f32::total_cmp);
    let expected: Vec<f32> = (0..12).map(|i| i as f32 / 12.0).collect();
    assert_eq!(sorted, expected);
}

#[test]
fn logger_only_reports_evaluation_epochs() {
    let sink = Recording::default();
    let scalars = Arc::clone(&sink.scalars);

    let mut trainer = Trainer::builder()
        .pipes(regression(8, 4))
        .pipe(Logger::new(Box::new(sink)).label("baseline"))
        .build()
        .unwrap();
    trainer.run_train(2).unwrap();

    let scalars = scalars.lock().unwrap();
    let summary: Vec<_> = scalars
        .iter()
        .map(|(tag, subset, _, step)| (tag.as_str(), subset.as_str(), *step))
        .collect();

    assert_eq!(
        summary,
        [
            ("metrics/mse/baseline", "valid", 1),
            ("metrics/mse/baseline", "valid", 2),
        ]
    );
}

#[test]
fn validating_on_train_gives_one_train_point_per_epoch() {
    let sink = Recording::default();
    let scalars = Arc::clone(&sink.scalars);
    let config = TrainerConfig {
        validate_on_train: true,
        ..Default::default()
    };

    let mut trainer = Trainer::builder()
        .pipes(regression(8, 4))
        .pipe(Logger::new(Box::new(sink)))
        .config(config)
        .build()
        .unwrap();
    trainer.run_train(2).unwrap();

    let scalars = scalars.lock().unwrap();
    let summary: Vec<_> = scalars
        .iter()
        .map(|(tag, subset, _, step)| (tag.as_str(), subset.as_str(), *step))
        .collect();

    assert_eq!(
        summary,
        [
            ("metrics/mse", "train", 1),
            ("metrics/mse", "valid", 1),
            ("metrics/mse", "train", 2),
            ("metrics/mse", "valid", 2),
        ]
    );

    // The train point is the evaluation pass, recorded after the training one.
    let state = trainer.state();
    assert_eq!(scalars[2].2, state.metrics.get("mse", "train").unwrap());
}
