//! Data loaders: fetch result items by ID, one batch per class.

use indexmap::IndexMap;
use serde_json::Value;

/// Loads the objects of one class.
pub trait TypeDataLoader: Send + Sync {
    /// Loads the objects with the given IDs. Missing IDs are omitted.
    fn load(&self, ids: &[String]) -> IndexMap<String, Value>;

    /// Returns the ID of an object, read from its `id` property by default.
    fn id_of(&self, item: &Value) -> Option<String> {
        normalize_id(item.get("id")?)
    }
}

/// Normalizes an ID value to its string form.
#[must_use]
pub fn normalize_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Loader over a fixed set of objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    items: IndexMap<String, Value>,
}

impl MemoryLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a loader from objects carrying an `id` property. Objects
    /// without one are skipped.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = Value>) -> Self {
        items.into_iter().fold(Self::new(), Self::with_item)
    }

    /// Adds an object.
    #[must_use]
    pub fn with_item(mut self, item: Value) -> Self {
        if let Some(id) = self.id_of(&item) {
            self.items.insert(id, item);
        }
        self
    }

    /// Returns the number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the loader holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl TypeDataLoader for MemoryLoader {
    fn load(&self, ids: &[String]) -> IndexMap<String, Value> {
        ids.iter()
            .filter_map(|id| Some((id.clone(), self.items.get(id)?.clone())))
            .collect()
    }
}
