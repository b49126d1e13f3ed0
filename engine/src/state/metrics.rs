use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Epoch level metrics, keyed by metric name and then by dataset subset.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metrics(BTreeMap<String, BTreeMap<String, f64>>);

impl Metrics {
    pub fn set(&mut self, name: &str, subset: &str, value: f64) {
        self.0
            .entry(name.to_string())
            .or_default()
            .insert(subset.to_string(), value);
    }

    pub fn get(&self, name: &str, subset: &str) -> Option<f64> {
        self.0.get(name)?.get(subset).copied()
    }

    /// Every subset value recorded for `name`.
    pub fn subsets(&self, name: &str) -> Option<&BTreeMap<String, f64>> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_only_the_given_subset() {
        let mut metrics = Metrics::default();
        metrics.set("mse", "train", 0.5);
        metrics.set("mse", "valid", 0.7);
        metrics.set("mse", "train", 0.25);

        assert_eq!(metrics.get("mse", "train"), Some(0.25));
        assert_eq!(metrics.get("mse", "valid"), Some(0.7));
        assert_eq!(metrics.get("accuracy", "train"), None);
    }

    #[test]
    fn serializes_as_nested_map() {
        let mut metrics = Metrics::default();
        metrics.set("main", "valid", 0.9);

        let json = serde_json::to_string(&metrics).unwrap();
        assert_eq!(json, r#"{"main":{"valid":0.9}}"#);

        let back: Metrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metrics);
    }
}
