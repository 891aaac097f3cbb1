//! Replicated Set
//!
//! Unordered collection with uniqueness by equality, stored ordered so
//! snapshots are deterministic.

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{warn_mismatched_change, FieldLink, Replicable, ReplicatedState};
use crate::core::{Codec, JsonCodec, NetworkValue, OpCategory, StateChange, StateKey};
use crate::error::ReplicaError;
use crate::network::protocol::SyncPolicy;

struct SetCell<T, C> {
    key: StateKey,
    items: Mutex<BTreeSet<T>>,
    _codec: PhantomData<fn() -> C>,
}

impl<T: Replicable + Ord, C: Codec> ReplicatedState for SetCell<T, C> {
    fn category(&self) -> OpCategory {
        OpCategory::Set
    }

    fn apply_change(&self, change: &StateChange) -> Result<(), ReplicaError> {
        if !change.belongs_to(OpCategory::Set) {
            warn_mismatched_change(&self.key, change, OpCategory::Set);
            return Ok(());
        }

        match change {
            StateChange::CollectionClear => self.items.lock().clear(),
            StateChange::CollectionAdd { value } => {
                let value: T = C::decode(value)?;
                self.items.lock().insert(value);
            }
            StateChange::CollectionRemove { value } => {
                let value: T = C::decode(value)?;
                self.items.lock().remove(&value);
            }
            StateChange::CollectionAddAll { values } => {
                let values: Vec<T> = C::decode(values)?;
                self.items.lock().extend(values);
            }
            StateChange::CollectionRemoveAll { values } => {
                let values: BTreeSet<T> = C::decode(values)?;
                self.items.lock().retain(|item| !values.contains(item));
            }
            StateChange::CollectionRetainAll { values } => {
                let values: BTreeSet<T> = C::decode(values)?;
                self.items.lock().retain(|item| values.contains(item));
            }
            // filtered above
            _ => {}
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<NetworkValue, ReplicaError> {
        Ok(C::encode(&*self.items.lock())?)
    }
}

/// A replicated set.
pub struct ReplicatedSet<T, C = JsonCodec> {
    link: FieldLink,
    cell: Arc<SetCell<T, C>>,
}

impl<T: Replicable + Ord, C: Codec> ReplicatedSet<T, C> {
    /// Build and register a set holding `initial`.
    pub fn new(link: FieldLink, initial: BTreeSet<T>) -> Result<Self, ReplicaError> {
        let cell = Arc::new(SetCell {
            key: link.key().clone(),
            items: Mutex::new(initial),
            _codec: PhantomData,
        });
        let state: Arc<dyn ReplicatedState> = cell.clone();
        link.manager().register_state(link.key(), state)?;
        Ok(Self { link, cell })
    }

    /// Set the visibility of this set's outgoing changes.
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.link.set_policy(policy);
        self
    }

    /// Field address.
    pub fn key(&self) -> &StateKey {
        self.link.key()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.cell.items.lock().len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.cell.items.lock().is_empty()
    }

    /// Whether `value` is present.
    pub fn contains(&self, value: &T) -> bool {
        self.cell.items.lock().contains(value)
    }

    /// Copy of the current contents.
    pub fn to_set(&self) -> BTreeSet<T> {
        self.cell.items.lock().clone()
    }

    /// Insert an element. Returns whether it was new.
    pub fn add(&self, value: T) -> Result<bool, ReplicaError> {
        self.link.check_writable()?;
        let payload = C::encode(&value)?;
        let added = self.cell.items.lock().insert(value);
        self.link.send(StateChange::CollectionAdd { value: payload })?;
        Ok(added)
    }

    /// Remove an element. Returns whether it was present.
    pub fn remove(&self, value: &T) -> Result<bool, ReplicaError> {
        self.link.check_writable()?;
        let payload = C::encode(value)?;
        let removed = self.cell.items.lock().remove(value);
        self.link.send(StateChange::CollectionRemove { value: payload })?;
        Ok(removed)
    }

    /// Insert every element of `values`.
    pub fn add_all(&self, values: impl IntoIterator<Item = T>) -> Result<bool, ReplicaError> {
        self.link.check_writable()?;
        let values: Vec<T> = values.into_iter().collect();
        let payload = C::encode(&values)?;
        let changed = {
            let mut items = self.cell.items.lock();
            let before = items.len();
            items.extend(values);
            items.len() != before
        };
        self.link.send(StateChange::CollectionAddAll { values: payload })?;
        Ok(changed)
    }

    /// Remove every element contained in `values`.
    pub fn remove_all(&self, values: &BTreeSet<T>) -> Result<bool, ReplicaError> {
        self.link.check_writable()?;
        let payload = C::encode(values)?;
        let changed = {
            let mut items = self.cell.items.lock();
            let before = items.len();
            items.retain(|item| !values.contains(item));
            items.len() != before
        };
        self.link.send(StateChange::CollectionRemoveAll { values: payload })?;
        Ok(changed)
    }

    /// Keep only elements contained in `values`.
    pub fn retain_all(&self, values: &BTreeSet<T>) -> Result<bool, ReplicaError> {
        self.link.check_writable()?;
        let payload = C::encode(values)?;
        let changed = {
            let mut items = self.cell.items.lock();
            let before = items.len();
            items.retain(|item| values.contains(item));
            items.len() != before
        };
        self.link.send(StateChange::CollectionRetainAll { values: payload })?;
        Ok(changed)
    }

    /// Remove every element.
    pub fn clear(&self) -> Result<(), ReplicaError> {
        self.link.check_writable()?;
        self.cell.items.lock().clear();
        self.link.send(StateChange::CollectionClear)
    }
}

impl<T, C> Clone for ReplicatedSet<T, C> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<T: fmt::Debug, C> fmt::Debug for ReplicatedSet<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.link.key().property, &*self.cell.items.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::local::LocalMultiplayer;
    use crate::network::manager::Component;

    fn set_of(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_set_operations_replicate() {
        let multiplayer = LocalMultiplayer::new(2);
        let a = Component::new("lobby", &multiplayer.managers()[0]).unwrap();
        let b = Component::new("lobby", &multiplayer.managers()[1]).unwrap();
        let players_a = a.set::<String>("players", BTreeSet::new()).unwrap();
        let players_b = b.set::<String>("players", BTreeSet::new()).unwrap();

        assert!(players_a.add("alice".into()).unwrap());
        assert!(!players_a.add("alice".into()).unwrap());
        players_b.add_all(vec!["bob".to_string(), "carol".to_string(), "dave".to_string()]).unwrap();
        assert_eq!(players_a.to_set(), set_of(&["alice", "bob", "carol", "dave"]));

        assert!(players_a.remove(&"bob".into()).unwrap());
        assert!(!players_b.contains(&"bob".into()));

        players_b.remove_all(&set_of(&["carol"])).unwrap();
        players_a.retain_all(&set_of(&["alice", "zed"])).unwrap();
        assert_eq!(players_b.to_set(), set_of(&["alice"]));

        players_b.clear().unwrap();
        assert!(players_a.is_empty());
    }

    #[test]
    fn test_list_only_op_on_set_is_discarded() {
        let multiplayer = LocalMultiplayer::new(1);
        let component = Component::new("c", &multiplayer.managers()[0]).unwrap();
        let set = component.set("s", set_of(&["x"])).unwrap();

        let change = StateChange::ListSet { value: JsonCodec::encode("y").unwrap(), index: 0 };
        multiplayer.managers()[0].receive_update(set.key(), change).unwrap();
        assert_eq!(set.to_set(), set_of(&["x"]));
    }
}
