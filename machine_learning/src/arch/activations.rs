/// Element-wise activation functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActFn {
    /// `amp / (1 + e^-z)`
    Sigmoid { amp: f32 },
}

impl ActFn {
    pub fn sigmoid(amp: f32) -> Self {
        Self::Sigmoid { amp }
    }

    pub fn f(&self, z: f32) -> f32 {
        match *self {
            ActFn::Sigmoid { amp } => amp / (1. + (-z).exp()),
        }
    }

    pub fn df(&self, z: f32) -> f32 {
        match *self {
            ActFn::Sigmoid { amp } => {
                let e = (-z).exp();
                amp * e / (1. + e).powi(2)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_at_zero() {
        let act = ActFn::sigmoid(2.);
        assert_eq!(act.f(0.), 1.);
        assert_eq!(act.df(0.), 0.5);
    }

    #[test]
    fn derivative_matches_finite_differences() {
        let act = ActFn::sigmoid(1.);
        let h = 1e-3;

        for z in [-2., -0.5, 0.3, 1.7] {
            let numeric = (act.f(z + h) - act.f(z - h)) / (2. * h);
            assert!((numeric - act.df(z)).abs() < 1e-3);
        }
    }
}
