use serde::{Deserialize, Serialize};

/// Which direction of the comparison metric counts as better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Greater is better, e.g. accuracy.
    #[default]
    Maximize,
    /// Smaller is better, e.g. a loss.
    Minimize,
}

impl Objective {
    /// Whether `candidate` strictly improves on `best`. Ties never do, and
    /// anything improves on a missing best.
    pub fn improves(self, candidate: f64, best: Option<f64>) -> bool {
        let Some(best) = best else {
            return true;
        };

        match self {
            Objective::Maximize => candidate > best,
            Objective::Minimize => candidate < best,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_are_not_improvements() {
        assert!(!Objective::Maximize.improves(0.5, Some(0.5)));
        assert!(!Objective::Minimize.improves(0.5, Some(0.5)));
    }

    #[test]
    fn first_value_always_improves() {
        assert!(Objective::Maximize.improves(-1.0, None));
        assert!(Objective::Minimize.improves(1e9, None));
    }

    #[test]
    fn directions() {
        assert!(Objective::Maximize.improves(0.9, Some(0.5)));
        assert!(!Objective::Maximize.improves(0.1, Some(0.5)));
        assert!(Objective::Minimize.improves(0.1, Some(0.5)));
        assert!(!Objective::Minimize.improves(0.9, Some(0.5)));
    }
}
