//! A single INI section, keyed case-insensitively, matching the original
//! configurator's `Configuration` dict subclass.

use std::collections::HashMap;

use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct Section {
    values: HashMap<String, Value>,
}

impl Section {
    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_ascii_lowercase(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(&key.to_ascii_lowercase())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    /// Read `required`, falling back to the deprecated `used` key with a
    /// warning if `required` is absent.
    pub fn get_deprecated(&self, used: &str, required: &str) -> Option<&Value> {
        match self.get(required) {
            Some(value) if !value.is_null() => Some(value),
            _ => {
                let fallback = self.get(used);
                if fallback.is_some() {
                    tracing::warn!(
                        used, required,
                        "parameter [{used}] is deprecated, use [{required}] instead",
                    );
                }
                fallback
            }
        }
    }
}
