use anyhow::ensure;
use engine::{Hooks, Pipe, Point, RunState, Stateful};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Average {
    params: Option<Vec<f32>>,
}

/// Keeps an exponential moving average of the model parameters.
///
/// Averaging starts once `start_epoch` training epochs are complete. During
/// non-training epochs the averaged parameters are swapped into the model and
/// the trained ones are put back when the epoch ends.
pub struct WeightAveraging {
    decay: f32,
    start_epoch: usize,
    average: Average,
    stash: Option<Vec<f32>>,
}

impl WeightAveraging {
    /// # Errors
    /// Fails unless `0 <= decay < 1`.
    pub fn new(decay: f32, start_epoch: usize) -> anyhow::Result<Self> {
        ensure!((0.0..1.0).contains(&decay), "decay must lie in [0, 1), got {decay}");

        Ok(Self {
            decay,
            start_epoch,
            average: Average::default(),
            stash: None,
        })
    }

    /// The current averaged parameters, if averaging has started.
    pub fn averaged(&self) -> Option<&[f32]> {
        self.average.params.as_deref()
    }
}

impl Pipe for WeightAveraging {
    fn name(&self) -> &str {
        "weight_averaging"
    }

    fn hooks(&self) -> Hooks {
        vec![
            (Point::BeforeEpoch, 10),
            (Point::AfterBatch, 10),
            (Point::AfterEpoch, -10),
        ]
    }

    fn before_epoch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        if state.mode.is_training() {
            return Ok(());
        }

        let Some(average) = self.average.params.as_deref() else {
            return Ok(());
        };

        let params = state.model_mut()?.params_mut();
        ensure!(
            params.len() == average.len(),
            "averaged {} parameters, the model has {}",
            average.len(),
            params.len()
        );

        self.stash = Some(params.to_vec());
        params.copy_from_slice(average);
        Ok(())
    }

    fn after_batch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        if !state.mode.is_training() || state.epoch < self.start_epoch {
            return Ok(());
        }

        let params = state.model()?.params();
        match self.average.params.as_mut() {
            Some(average) if average.len() == params.len() => {
                let decay = self.decay;
                for (avg, &p) in average.iter_mut().zip(params) {
                    *avg = decay * *avg + (1.0 - decay) * p;
                }
            }
            _ => self.average.params = Some(params.to_vec()),
        }

        Ok(())
    }

    fn after_epoch(&mut self, state: &mut RunState) -> anyhow::Result<()> {
        if let Some(trained) = self.stash.take() {
            state.model_mut()?.params_mut().copy_from_slice(&trained);
        }

        Ok(())
    }

    fn stateful(&mut self) -> Option<&mut dyn Stateful> {
        Some(self)
    }
}

impl Stateful for WeightAveraging {
    fn export_state(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.average)?)
    }

    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()> {
        self.average = serde_json::from_slice(blob)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use engine::LocalGate;
    use ndarray::{Array2, ArrayView2};

    use super::*;

    struct Fixed(Vec<f32>);

    impl engine::collab::Model for Fixed {
        fn params(&self) -> &[f32] {
            &self.0
        }

        fn params_mut(&mut self) -> &mut [f32] {
            &mut self.0
        }

        fn forward(&mut self, x: ArrayView2<f32>) -> anyhow::Result<Array2<f32>> {
            Ok(x.to_owned())
        }

        fn backward(&mut self, _d_out: ArrayView2<f32>, _grad: &mut [f32]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn state(params: Vec<f32>) -> RunState {
        let mut state = RunState::new(Box::new(LocalGate));
        state.model = Some(Box::new(Fixed(params)));
        state
    }

    fn set_params(state: &mut RunState, params: &[f32]) {
        state.model_mut().unwrap().params_mut().copy_from_slice(params);
    }

    #[test]
    fn averages_only_after_the_start_epoch() {
        let mut ema = WeightAveraging::new(0.5, 1).unwrap();
        let mut state = state(vec![4.0]);

        ema.after_batch(&mut state).unwrap();
        assert!(ema.averaged().is_none());

        state.epoch = 1;
        ema.after_batch(&mut state).unwrap();
        assert_eq!(ema.averaged(), Some([4.0].as_slice()));

        set_params(&mut state, &[0.0]);
        ema.after_batch(&mut state).unwrap();
        assert_eq!(ema.averaged(), Some([2.0].as_slice()));
    }

    #[test]
    fn evaluation_epochs_see_the_average() {
        let mut ema = WeightAveraging::new(0.5, 0).unwrap();
        let mut state = state(vec![2.0, 2.0]);

        ema.after_batch(&mut state).unwrap();
        set_params(&mut state, &[4.0, 6.0]);
        ema.after_batch(&mut state).unwrap();

        state.mode = engine::Mode::Validate;
        ema.before_epoch(&mut state).unwrap();
        assert_eq!(state.model().unwrap().params(), [3.0, 4.0]);

        ema.after_epoch(&mut state).unwrap();
        assert_eq!(state.model().unwrap().params(), [4.0, 6.0]);
    }

    #[test]
    fn average_survives_export() {
        let mut ema = WeightAveraging::new(0.9, 0).unwrap();
        let mut state = state(vec![1.5, -0.25]);
        ema.after_batch(&mut state).unwrap();

        let mut restored = WeightAveraging::new(0.9, 0).unwrap();
        restored.import_state(&ema.export_state().unwrap()).unwrap();
        assert_eq!(restored.averaged(), Some([1.5, -0.25].as_slice()));
    }

    #[test]
    fn decay_must_be_below_one() {
        assert!(WeightAveraging::new(1.0, 0).is_err());
        assert!(WeightAveraging::new(-0.1, 0).is_err());
    }
}
