use bevy::prelude::*;
use std::collections::HashMap;

/// Scratch key/value memory for game code. Semantics-free to the engine;
/// values are JSON so they survive the script boundary unchanged.
#[derive(Resource, Default, Clone)]
pub struct ScratchStore {
    values: HashMap<String, serde_json::Value>,
}

impl ScratchStore {
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_persist_and_overwrite() {
        let mut store = ScratchStore::default();
        store.set("score", serde_json::json!(0));
        store.set("score", serde_json::json!(10));
        assert_eq!(store.get("score"), Some(&serde_json::json!(10)));
        assert_eq!(store.get("missing"), None);
        assert_eq!(store.len(), 1);
        store.remove("score");
        assert!(store.is_empty());
    }
}
