//! Backend-neutral `userData` bag.
//!
//! The teacher's handler contexts grow an ad-hoc grab-bag of fields over
//! time (see §9's "dynamic handler arguments" redesign flag); `Request`
//! instead carries one `userData` map of `serde_json::Value`s so extension
//! data survives (de)serialization and retries without widening the
//! `Request` struct itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserData(HashMap<String, Value>);

impl UserData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_as<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_typed_values() {
        let mut data = UserData::new();
        data.insert("depth", 3);
        assert_eq!(data.get_as::<u32>("depth"), Some(3));
        assert_eq!(data.get_as::<u32>("missing"), None);
    }
}
