use std::collections::HashMap;

use serde_json::Value;

/// Free-form store shared between pipes. Last writer wins.
///
/// Keys are conventionally namespaced by their producer, e.g. `"loss"`,
/// `"metrics.mse"` or `"scheduler.lr"`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Status {
    values: HashMap<String, Value>,
}

impl Status {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
