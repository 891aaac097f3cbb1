//! Protocol Messages
//!
//! Wire envelope for replicated state traffic. One [`StateUpdate`] carries
//! one [`StateChange`] addressed by its [`StateKey`].
//! Messages serialize as JSON for debugging ease,
//! with optional binary (bincode) for production.

use serde::{Deserialize, Serialize};

use crate::core::{CodecError, StateChange, StateKey};

/// Who may observe a field's changes.
///
/// Visibility only; no participant is prevented from mutating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Delivered to every other participant.
    #[default]
    KnownToAll,
    /// Never leaves the participant that made the change.
    Private,
}

impl SyncPolicy {
    /// Whether updates under this policy go to other participants.
    pub fn is_shared(self) -> bool {
        matches!(self, SyncPolicy::KnownToAll)
    }
}

/// One outgoing or incoming change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Target field.
    pub key: StateKey,
    /// The mutation.
    pub change: StateChange,
    /// Visibility of the change.
    #[serde(default)]
    pub policy: SyncPolicy,
}

impl StateUpdate {
    /// Package a change for delivery.
    pub fn new(key: StateKey, change: StateChange, policy: SyncPolicy) -> Self {
        Self { key, change, policy }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to binary (bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NetworkValue;

    fn sample() -> StateUpdate {
        StateUpdate::new(
            StateKey::new("inventory", "items"),
            StateChange::ListSet {
                value: NetworkValue::new("\"Large Shield\""),
                index: 1,
            },
            SyncPolicy::KnownToAll,
        )
    }

    #[test]
    fn test_json_shape() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"component\":\"inventory\""));
        assert!(json.contains("\"list_set\""));
        assert!(json.contains("\"policy\":\"known_to_all\""));
        assert_eq!(StateUpdate::from_json(&json).unwrap(), sample());
    }

    #[test]
    fn test_policy_defaults_when_absent() {
        let json = r#"{"key":{"component":"c","property":"p"},"change":"collection_clear"}"#;
        let update = StateUpdate::from_json(json).unwrap();
        assert_eq!(update.policy, SyncPolicy::KnownToAll);
        assert_eq!(update.change, StateChange::CollectionClear);
    }

    #[test]
    fn test_binary_round_trip() {
        let update = StateUpdate {
            policy: SyncPolicy::Private,
            ..sample()
        };
        let bytes = update.to_bytes().unwrap();
        assert_eq!(StateUpdate::from_bytes(&bytes).unwrap(), update);
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        assert!(StateUpdate::from_json("{\"key\":").is_err());
        assert!(StateUpdate::from_bytes(&[0xff]).is_err());
    }
}
