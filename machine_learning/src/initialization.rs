//! Parameter initialization schemes.

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::Result;

/// How the parameters of a layer are drawn. Fans are taken from the layer shape.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Init {
    Const { value: f32 },
    Uniform { low: f32, high: f32 },
    UniformInclusive { low: f32, high: f32 },
    #[default]
    XavierUniform,
    LecunUniform,
    Normal { mean: f32, std_dev: f32 },
    Kaiming,
    Xavier,
    Lecun,
}

impl Init {
    /// Draws `n` parameters for a layer with `fan_in` inputs and `fan_out` outputs.
    ///
    /// # Errors
    /// If the resulting distribution is invalid (empty range, non finite deviation).
    pub fn sample<R: Rng>(
        &self,
        rng: &mut R,
        n: usize,
        fan_in: usize,
        fan_out: usize,
    ) -> Result<Vec<f32>> {
        let (fan_in, fan_out) = (fan_in.max(1) as f32, fan_out.max(1) as f32);

        let params = match *self {
            Init::Const { value } => vec![value; n],
            Init::Uniform { low, high } => draw(rng, Uniform::new(low, high)?, n),
            Init::UniformInclusive { low, high } => {
                draw(rng, Uniform::new_inclusive(low, high)?, n)
            }
            Init::XavierUniform => {
                let range = (6. / (fan_in + fan_out)).sqrt();
                draw(rng, Uniform::new(-range, range)?, n)
            }
            Init::LecunUniform => {
                let range = (3. / fan_in).sqrt();
                draw(rng, Uniform::new(-range, range)?, n)
            }
            Init::Normal { mean, std_dev } => draw(rng, Normal::new(mean, std_dev)?, n),
            Init::Kaiming => draw(rng, Normal::new(0., (2. / fan_in).sqrt())?, n),
            Init::Xavier => draw(rng, Normal::new(0., (2. / (fan_in + fan_out)).sqrt())?, n),
            Init::Lecun => draw(rng, Normal::new(0., (1. / fan_in).sqrt())?, n),
        };

        Ok(params)
    }
}

fn draw<R: Rng, D: Distribution<f32>>(rng: &mut R, distribution: D, n: usize) -> Vec<f32> {
    distribution.sample_iter(rng).take(n).collect()
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn same_seed_same_parameters() {
        let init = Init::XavierUniform;

        let a = init.sample(&mut StdRng::seed_from_u64(3), 16, 4, 4).unwrap();
        let b = init.sample(&mut StdRng::seed_from_u64(3), 16, 4, 4).unwrap();

        assert_eq!(a, b);
        assert!(a.iter().all(|p| p.abs() <= (6f32 / 8.).sqrt()));
    }

    #[test]
    fn constant() {
        let params = Init::Const { value: 0.5 }
            .sample(&mut StdRng::seed_from_u64(0), 3, 1, 1)
            .unwrap();

        assert_eq!(params, [0.5; 3]);
    }

    #[test]
    fn invalid_ranges_fail() {
        let mut rng = StdRng::seed_from_u64(0);

        assert!(Init::Uniform { low: 1., high: 0. }.sample(&mut rng, 1, 1, 1).is_err());
        assert!(
            Init::Normal {
                mean: 0.,
                std_dev: f32::NAN
            }
            .sample(&mut rng, 1, 1, 1)
            .is_err()
        );
    }
}
