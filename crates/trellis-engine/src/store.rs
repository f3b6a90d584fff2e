use std::collections::HashMap;

use serde_json::Value;

/// Per-run mapping from node id to that node's produced output.
///
/// Owned exclusively by the engine for the lifetime of one run; observers
/// only ever see clone snapshots. Doubles as the substitution source for
/// variable resolution.
#[derive(Debug, Clone, Default)]
pub struct OutputStore {
    entries: HashMap<String, Value>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node's output, overwriting any previous value for the id.
    pub fn insert(&mut self, node_id: impl Into<String>, output: Value) {
        self.entries.insert(node_id.into(), output);
    }

    pub fn get(&self, node_id: &str) -> Option<&Value> {
        self.entries.get(node_id)
    }

    /// Walk a field-access path into a node's stored output.
    ///
    /// Traversal follows nested objects only; any missing segment yields
    /// `None`.
    pub fn lookup(&self, node_id: &str, path: &[String]) -> Option<&Value> {
        let mut value = self.entries.get(node_id)?;
        for segment in path {
            value = value.as_object()?.get(segment)?;
        }
        Some(value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}
