//! Component and Field Identity
//!
//! Every replicated field is addressed by a [`StateKey`]: the id of the
//! component that owns it plus the field's property key. Ids are plain
//! strings so that every participant can derive the same key for the
//! same logical component without coordination.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one replicated component instance.
///
/// Unique per session; at most one component per id may be registered
/// with a given state manager at a time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// Create an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id (UUID v4).
    ///
    /// Only useful when the id is communicated out of band, since
    /// other participants cannot derive it on their own.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Address of one replicated field: `(component id, property key)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey {
    /// Owning component.
    pub component: ComponentId,
    /// Field name within the component.
    pub property: String,
}

impl StateKey {
    /// Create a key.
    pub fn new(component: impl Into<ComponentId>, property: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            property: property.into(),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.component, self.property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_key_display() {
        let key = StateKey::new("inventory", "items");
        assert_eq!(key.to_string(), "inventory:items");
    }

    #[test]
    fn test_random_ids_differ() {
        let a = ComponentId::random();
        let b = ComponentId::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_component_id_serializes_as_string() {
        let id = ComponentId::new("chat-room");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"chat-room\"");
    }
}
