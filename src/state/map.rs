//! Replicated Map
//!
//! Key-value mapping with unique keys, kept in key order. Batch puts are
//! encoded as a list of `(key, value)` pairs rather than a map so that
//! non-string keys survive text codecs.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{warn_mismatched_change, FieldLink, Replicable, ReplicatedState};
use crate::core::{Codec, JsonCodec, NetworkValue, OpCategory, StateChange, StateKey};
use crate::error::ReplicaError;
use crate::network::protocol::SyncPolicy;

struct MapCell<K, V, C> {
    key: StateKey,
    entries: Mutex<BTreeMap<K, V>>,
    _codec: PhantomData<fn() -> C>,
}

impl<K, V, C> ReplicatedState for MapCell<K, V, C>
where
    K: Replicable + Ord,
    V: Replicable,
    C: Codec,
{
    fn category(&self) -> OpCategory {
        OpCategory::Map
    }

    fn apply_change(&self, change: &StateChange) -> Result<(), ReplicaError> {
        match change {
            StateChange::CollectionClear => self.entries.lock().clear(),
            StateChange::MapRemove { key } => {
                let key: K = C::decode(key)?;
                self.entries.lock().remove(&key);
            }
            StateChange::MapPut { key, value } => {
                let key: K = C::decode(key)?;
                let value: V = C::decode(value)?;
                self.entries.lock().insert(key, value);
            }
            StateChange::MapPutAll { entries } => {
                let entries: Vec<(K, V)> = C::decode(entries)?;
                self.entries.lock().extend(entries);
            }
            other => warn_mismatched_change(&self.key, other, OpCategory::Map),
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<NetworkValue, ReplicaError> {
        let entries = self.entries.lock();
        let pairs: Vec<(&K, &V)> = entries.iter().collect();
        Ok(C::encode(&pairs)?)
    }
}

/// A replicated key-value map.
pub struct ReplicatedMap<K, V, C = JsonCodec> {
    link: FieldLink,
    cell: Arc<MapCell<K, V, C>>,
}

impl<K, V, C> ReplicatedMap<K, V, C>
where
    K: Replicable + Ord,
    V: Replicable,
    C: Codec,
{
    /// Build and register a map holding `initial`.
    pub fn new(link: FieldLink, initial: BTreeMap<K, V>) -> Result<Self, ReplicaError> {
        let cell = Arc::new(MapCell {
            key: link.key().clone(),
            entries: Mutex::new(initial),
            _codec: PhantomData,
        });
        let state: Arc<dyn ReplicatedState> = cell.clone();
        link.manager().register_state(link.key(), state)?;
        Ok(Self { link, cell })
    }

    /// Set the visibility of this map's outgoing changes.
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.link.set_policy(policy);
        self
    }

    /// Field address.
    pub fn key(&self) -> &StateKey {
        self.link.key()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.cell.entries.lock().len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.cell.entries.lock().is_empty()
    }

    /// Value for `key`, if present.
    pub fn get(&self, key: &K) -> Option<V> {
        self.cell.entries.lock().get(key).cloned()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.cell.entries.lock().contains_key(key)
    }

    /// Keys in order.
    pub fn keys(&self) -> Vec<K> {
        self.cell.entries.lock().keys().cloned().collect()
    }

    /// Copy of the current contents.
    pub fn to_map(&self) -> BTreeMap<K, V> {
        self.cell.entries.lock().clone()
    }

    /// Insert or replace an entry, returning the previous value.
    pub fn put(&self, key: K, value: V) -> Result<Option<V>, ReplicaError> {
        self.link.check_writable()?;
        let change = StateChange::MapPut {
            key: C::encode(&key)?,
            value: C::encode(&value)?,
        };
        let previous = self.cell.entries.lock().insert(key, value);
        self.link.send(change)?;
        Ok(previous)
    }

    /// Remove an entry, returning its value.
    pub fn remove(&self, key: &K) -> Result<Option<V>, ReplicaError> {
        self.link.check_writable()?;
        let change = StateChange::MapRemove { key: C::encode(key)? };
        let previous = self.cell.entries.lock().remove(key);
        self.link.send(change)?;
        Ok(previous)
    }

    /// Insert or replace every entry of `entries`.
    pub fn put_all(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<(), ReplicaError> {
        self.link.check_writable()?;
        let entries: Vec<(K, V)> = entries.into_iter().collect();
        let change = StateChange::MapPutAll { entries: C::encode(&entries)? };
        self.cell.entries.lock().extend(entries);
        self.link.send(change)
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<(), ReplicaError> {
        self.link.check_writable()?;
        self.cell.entries.lock().clear();
        self.link.send(StateChange::CollectionClear)
    }
}

impl<K, V, C> Clone for ReplicatedMap<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for ReplicatedMap<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.link.key().property, &*self.cell.entries.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::local::LocalMultiplayer;
    use crate::network::manager::Component;

    #[test]
    fn test_puts_from_both_participants() {
        let multiplayer = LocalMultiplayer::new(2);
        let a = Component::new("test-inventory", &multiplayer.managers()[0]).unwrap();
        let b = Component::new("test-inventory", &multiplayer.managers()[1]).unwrap();
        let props_a = a.map::<String, i32>("properties", BTreeMap::new()).unwrap();
        let props_b = b.map::<String, i32>("properties", BTreeMap::new()).unwrap();

        props_a.put("Sword".into(), 10).unwrap();
        assert_eq!(props_b.get(&"Sword".into()), Some(10));

        props_b.put("Shield".into(), 20).unwrap();
        assert_eq!(props_a.len(), 2);
        assert_eq!(props_a.get(&"Shield".into()), Some(20));
    }

    #[test]
    fn test_update_remove_put_all_clear() {
        let multiplayer = LocalMultiplayer::new(2);
        let a = Component::new("inv", &multiplayer.managers()[0]).unwrap();
        let b = Component::new("inv", &multiplayer.managers()[1]).unwrap();
        let map_a = a.map::<String, i32>("props", BTreeMap::new()).unwrap();
        let map_b = b.map::<String, i32>("props", BTreeMap::new()).unwrap();

        map_a.put("Sword".into(), 10).unwrap();
        let previous = map_a.put("Sword".into(), 15).unwrap();
        assert_eq!(previous, Some(10));
        assert_eq!(map_b.get(&"Sword".into()), Some(15));

        map_b.put_all(vec![("Bow".to_string(), 7), ("Axe".to_string(), 9)]).unwrap();
        assert_eq!(map_a.keys(), vec!["Axe".to_string(), "Bow".to_string(), "Sword".to_string()]);

        assert_eq!(map_a.remove(&"Bow".into()).unwrap(), Some(7));
        assert!(!map_b.contains_key(&"Bow".into()));

        map_b.clear().unwrap();
        assert!(map_a.is_empty());
    }

    #[test]
    fn test_non_string_keys() {
        let multiplayer = LocalMultiplayer::new(2);
        let a = Component::new("grid", &multiplayer.managers()[0]).unwrap();
        let b = Component::new("grid", &multiplayer.managers()[1]).unwrap();
        let cells_a = a.map::<(i32, i32), String>("cells", BTreeMap::new()).unwrap();
        let cells_b = b.map::<(i32, i32), String>("cells", BTreeMap::new()).unwrap();

        cells_a
            .put_all(vec![((0, 0), "stone".to_string()), ((1, -1), "dirt".to_string())])
            .unwrap();
        assert_eq!(cells_b.to_map(), cells_a.to_map());
    }

    #[test]
    fn test_list_op_on_map_is_discarded() {
        let multiplayer = LocalMultiplayer::new(1);
        let component = Component::new("c", &multiplayer.managers()[0]).unwrap();
        let map = component
            .map("m", BTreeMap::from([("a".to_string(), 1)]))
            .unwrap();

        multiplayer.managers()[0]
            .receive_update(map.key(), StateChange::ListRemoveAt { index: 0 })
            .unwrap();
        assert_eq!(map.get(&"a".to_string()), Some(1));
    }
}
