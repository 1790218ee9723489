//! Union classes.
//!
//! A union has no resolvers or loader of its own. Pickers, attached to the
//! union with a priority, each claim the items of one concrete class; an
//! item is handled by the first picker that accepts it.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Claims the items of one concrete class for a union.
pub trait TypeResolverPicker: Send + Sync {
    /// The concrete class whose resolvers handle the picked items.
    fn target_class(&self) -> &str;

    /// Returns true if `item` belongs to the target class.
    fn is_instance_of(&self, item: &Value) -> bool;
}

type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A picker built from a predicate.
#[derive(Clone)]
pub struct FnPicker {
    target: String,
    predicate: Predicate,
}

impl FnPicker {
    /// Creates a picker for `target`.
    pub fn new<F>(target: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            target: target.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Creates a picker that accepts items whose `property` equals `value`.
    pub fn by_property(target: impl Into<String>, property: &str, value: impl Into<Value>) -> Self {
        let property = property.to_string();
        let value = value.into();
        Self::new(target, move |item| item.get(&property) == Some(&value))
    }
}

impl fmt::Debug for FnPicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPicker")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl TypeResolverPicker for FnPicker {
    fn target_class(&self) -> &str {
        &self.target
    }

    fn is_instance_of(&self, item: &Value) -> bool {
        (self.predicate)(item)
    }
}
