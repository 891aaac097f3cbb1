//! Replicated List
//!
//! An ordered, index-addressable sequence. Local calls mutate the list and
//! then send the matching change; remote changes replay with the same
//! semantics (`CollectionAdd` appends, `ListRemoveAt` removes by index).
//!
//! Index-based operations are bounds-checked on both paths. A failed local
//! call sends nothing; a failed remote change leaves the list untouched.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{check_index, warn_mismatched_change, FieldLink, Replicable, ReplicatedState};
use crate::core::{Codec, JsonCodec, NetworkValue, OpCategory, StateChange, StateKey};
use crate::error::ReplicaError;
use crate::network::protocol::SyncPolicy;

struct ListCell<T, C> {
    key: StateKey,
    items: Mutex<Vec<T>>,
    _codec: PhantomData<fn() -> C>,
}

impl<T: Replicable + PartialEq, C: Codec> ReplicatedState for ListCell<T, C> {
    fn category(&self) -> OpCategory {
        OpCategory::List
    }

    fn apply_change(&self, change: &StateChange) -> Result<(), ReplicaError> {
        if !change.belongs_to(OpCategory::List) {
            warn_mismatched_change(&self.key, change, OpCategory::List);
            return Ok(());
        }

        match change {
            StateChange::CollectionClear => self.items.lock().clear(),
            StateChange::ListRemoveAt { index } => {
                let mut items = self.items.lock();
                check_index(*index, items.len())?;
                items.remove(*index);
            }
            StateChange::CollectionAdd { value } => {
                let value: T = C::decode(value)?;
                self.items.lock().push(value);
            }
            StateChange::ListIndexedAdd { value, index } => {
                let value: T = C::decode(value)?;
                let mut items = self.items.lock();
                check_index(*index, items.len() + 1)?;
                items.insert(*index, value);
            }
            StateChange::CollectionRemove { value } => {
                let value: T = C::decode(value)?;
                remove_first(&mut self.items.lock(), &value);
            }
            StateChange::ListSet { value, index } => {
                let value: T = C::decode(value)?;
                let mut items = self.items.lock();
                check_index(*index, items.len())?;
                items[*index] = value;
            }
            StateChange::CollectionAddAll { values } => {
                let values: Vec<T> = C::decode(values)?;
                self.items.lock().extend(values);
            }
            StateChange::ListIndexedAddAll { values, index } => {
                let values: Vec<T> = C::decode(values)?;
                let mut items = self.items.lock();
                check_index(*index, items.len() + 1)?;
                items.splice(*index..*index, values);
            }
            StateChange::CollectionRemoveAll { values } => {
                let values: Vec<T> = C::decode(values)?;
                self.items.lock().retain(|item| !values.contains(item));
            }
            StateChange::CollectionRetainAll { values } => {
                let values: Vec<T> = C::decode(values)?;
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

fn remove_first<T: PartialEq>(items: &mut Vec<T>, value: &T) -> bool {
    match items.iter().position(|item| item == value) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

/// A replicated ordered list.
///
/// Registered with its component as soon as it is built.
pub struct ReplicatedList<T, C = JsonCodec> {
    link: FieldLink,
    cell: Arc<ListCell<T, C>>,
}

impl<T: Replicable + PartialEq, C: Codec> ReplicatedList<T, C> {
    /// Build and register a list holding `initial`.
    pub fn new(link: FieldLink, initial: Vec<T>) -> Result<Self, ReplicaError> {
        let cell = Arc::new(ListCell {
            key: link.key().clone(),
            items: Mutex::new(initial),
            _codec: PhantomData,
        });
        let state: Arc<dyn ReplicatedState> = cell.clone();
        link.manager().register_state(link.key(), state)?;
        Ok(Self { link, cell })
    }

    /// Set the visibility of this list's outgoing changes.
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.link.set_policy(policy);
        self
    }

    /// Field address.
    pub fn key(&self) -> &StateKey {
        self.link.key()
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.cell.items.lock().len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.cell.items.lock().is_empty()
    }

    /// Element at `index`, if any.
    pub fn get(&self, index: usize) -> Option<T> {
        self.cell.items.lock().get(index).cloned()
    }

    /// Whether an equal element is present.
    pub fn contains(&self, value: &T) -> bool {
        self.cell.items.lock().contains(value)
    }

    /// Index of the first equal element.
    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.cell.items.lock().iter().position(|item| item == value)
    }

    /// Copy of the current contents.
    pub fn to_vec(&self) -> Vec<T> {
        self.cell.items.lock().clone()
    }

    /// Read the contents in place.
    ///
    /// `f` runs under the list's lock and must not touch this list.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.cell.items.lock())
    }

    // =========================================================================
    // TRACKED MUTATIONS
    // =========================================================================

    /// Append an element.
    pub fn add(&self, value: T) -> Result<(), ReplicaError> {
        self.link.check_writable()?;
        let payload = C::encode(&value)?;
        self.cell.items.lock().push(value);
        self.link.send(StateChange::CollectionAdd { value: payload })
    }

    /// Insert an element at `index` (`index == len` appends).
    pub fn insert(&self, index: usize, value: T) -> Result<(), ReplicaError> {
        self.link.check_writable()?;
        let payload = C::encode(&value)?;
        {
            let mut items = self.cell.items.lock();
            check_index(index, items.len() + 1)?;
            items.insert(index, value);
        }
        self.link.send(StateChange::ListIndexedAdd { value: payload, index })
    }

    /// Replace the element at `index`, returning the old one.
    pub fn set(&self, index: usize, value: T) -> Result<T, ReplicaError> {
        self.link.check_writable()?;
        let payload = C::encode(&value)?;
        let old = {
            let mut items = self.cell.items.lock();
            check_index(index, items.len())?;
            std::mem::replace(&mut items[index], value)
        };
        self.link.send(StateChange::ListSet { value: payload, index })?;
        Ok(old)
    }

    /// Remove the first element equal to `value`.
    pub fn remove(&self, value: &T) -> Result<bool, ReplicaError> {
        self.link.check_writable()?;
        let payload = C::encode(value)?;
        let removed = remove_first(&mut self.cell.items.lock(), value);
        self.link.send(StateChange::CollectionRemove { value: payload })?;
        Ok(removed)
    }

    /// Remove and return the element at `index`.
    pub fn remove_at(&self, index: usize) -> Result<T, ReplicaError> {
        self.link.check_writable()?;
        let removed = {
            let mut items = self.cell.items.lock();
            check_index(index, items.len())?;
            items.remove(index)
        };
        self.link.send(StateChange::ListRemoveAt { index })?;
        Ok(removed)
    }

    /// Append every element of `values`.
    pub fn add_all(&self, values: impl IntoIterator<Item = T>) -> Result<bool, ReplicaError> {
        self.link.check_writable()?;
        let values: Vec<T> = values.into_iter().collect();
        let payload = C::encode(&values)?;
        let changed = !values.is_empty();
        self.cell.items.lock().extend(values);
        self.link.send(StateChange::CollectionAddAll { values: payload })?;
        Ok(changed)
    }

    /// Insert every element of `values` starting at `index`.
    pub fn insert_all(
        &self,
        index: usize,
        values: impl IntoIterator<Item = T>,
    ) -> Result<bool, ReplicaError> {
        self.link.check_writable()?;
        let values: Vec<T> = values.into_iter().collect();
        let payload = C::encode(&values)?;
        let changed = !values.is_empty();
        {
            let mut items = self.cell.items.lock();
            check_index(index, items.len() + 1)?;
            items.splice(index..index, values);
        }
        self.link.send(StateChange::ListIndexedAddAll { values: payload, index })?;
        Ok(changed)
    }

    /// Remove every element equal to one in `values`.
    pub fn remove_all(&self, values: &[T]) -> Result<bool, ReplicaError> {
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

    /// Keep only elements equal to one in `values`.
    pub fn retain_all(&self, values: &[T]) -> Result<bool, ReplicaError> {
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

impl<T, C> Clone for ReplicatedList<T, C> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<T: fmt::Debug, C> fmt::Debug for ReplicatedList<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.link.key().property, &*self.cell.items.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::local::LocalMultiplayer;
    use crate::network::manager::Component;

    fn inventories(multiplayer: &LocalMultiplayer) -> (Component, Component) {
        let a = Component::new("inventory", &multiplayer.managers()[0]).unwrap();
        let b = Component::new("inventory", &multiplayer.managers()[1]).unwrap();
        (a, b)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_inventory_scenario() {
        let multiplayer = LocalMultiplayer::new(2);
        let (a, b) = inventories(&multiplayer);
        let items_a = a.list::<String>("items", Vec::new()).unwrap();
        let items_b = b.list::<String>("items", Vec::new()).unwrap();

        items_a.add_all(strings(&["Sword", "Shield", "Potion"])).unwrap();
        assert_eq!(items_b.to_vec(), strings(&["Sword", "Shield", "Potion"]));

        items_b.set(1, "Large Shield".to_string()).unwrap();
        items_a.remove(&"Potion".to_string()).unwrap();
        items_b.remove_at(0).unwrap();

        assert_eq!(items_a.to_vec(), strings(&["Large Shield"]));
        assert_eq!(items_b.to_vec(), strings(&["Large Shield"]));
    }

    #[test]
    fn test_chat_room_operations() {
        let multiplayer = LocalMultiplayer::new(3);
        let rooms: Vec<Component> = multiplayer
            .managers()
            .iter()
            .map(|m| Component::new("chat-room", m).unwrap())
            .collect();
        let lists: Vec<ReplicatedList<String>> = rooms
            .iter()
            .map(|room| room.list("messages", strings(&["Welcome to the chat!"])).unwrap())
            .collect();

        lists[2].add("Hello from server".to_string()).unwrap();
        lists[2].add("Another message from server".to_string()).unwrap();
        lists[2].set(0, "Updated welcome message".to_string()).unwrap();
        lists[2].remove_at(1).unwrap();
        lists[2].add_all(strings(&["Message 3", "Message 4"])).unwrap();

        let expected = strings(&[
            "Updated welcome message",
            "Another message from server",
            "Message 3",
            "Message 4",
        ]);
        for list in &lists {
            assert_eq!(list.to_vec(), expected);
        }

        lists[0].clear().unwrap();
        for list in &lists {
            assert!(list.is_empty());
        }
    }

    #[test]
    fn test_add_then_remove_round_trip() {
        let multiplayer = LocalMultiplayer::new(2);
        let (a, b) = inventories(&multiplayer);
        let list_a = a.list("numbers", vec![1, 2, 3]).unwrap();
        let list_b = b.list("numbers", vec![1, 2, 3]).unwrap();

        list_a.add(9).unwrap();
        list_a.remove(&9).unwrap();

        assert_eq!(list_b.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_add_is_not_deduplicated() {
        let multiplayer = LocalMultiplayer::new(2);
        let (a, b) = inventories(&multiplayer);
        let list_a = a.list::<i32>("numbers", Vec::new()).unwrap();
        let list_b = b.list::<i32>("numbers", Vec::new()).unwrap();

        list_a.add(5).unwrap();
        list_a.add(5).unwrap();
        assert_eq!(list_b.to_vec(), vec![5, 5]);

        let change = StateChange::CollectionAdd { value: JsonCodec::encode(&5).unwrap() };
        multiplayer.managers()[1]
            .receive_update(list_b.key(), change)
            .unwrap();
        assert_eq!(list_b.len(), 3);
    }

    #[test]
    fn test_indexed_and_bulk_operations() {
        let multiplayer = LocalMultiplayer::new(2);
        let (a, b) = inventories(&multiplayer);
        let list_a = a.list("numbers", vec![1, 2, 3, 2]).unwrap();
        let list_b = b.list("numbers", vec![1, 2, 3, 2]).unwrap();

        list_a.insert(0, 0).unwrap();
        list_a.insert_all(2, vec![7, 8]).unwrap();
        assert_eq!(list_b.to_vec(), vec![0, 1, 7, 8, 2, 3, 2]);

        assert!(list_a.remove_all(&[2, 8]).unwrap());
        assert_eq!(list_b.to_vec(), vec![0, 1, 7, 3]);

        assert!(list_b.retain_all(&[1, 3]).unwrap());
        assert_eq!(list_a.to_vec(), vec![1, 3]);
        assert_eq!(list_a.index_of(&3), Some(1));
    }

    #[test]
    fn test_out_of_bounds_local_call_sends_nothing() {
        let multiplayer = LocalMultiplayer::new(2);
        let (a, b) = inventories(&multiplayer);
        let list_a = a.list("numbers", vec![1]).unwrap();
        let list_b = b.list("numbers", vec![1, 2]).unwrap();

        let result = list_a.remove_at(1);
        assert!(matches!(result, Err(ReplicaError::IndexOutOfBounds { index: 1, len: 1 })));
        assert_eq!(list_b.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_out_of_bounds_remote_change_leaves_list_untouched() {
        let multiplayer = LocalMultiplayer::new(1);
        let component = Component::new("c", &multiplayer.managers()[0]).unwrap();
        let list = component.list("numbers", vec![1, 2]).unwrap();

        let result = multiplayer.managers()[0]
            .receive_update(list.key(), StateChange::ListRemoveAt { index: 5 });
        assert!(matches!(result, Err(ReplicaError::IndexOutOfBounds { .. })));
        assert_eq!(list.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_map_op_on_list_is_discarded() {
        let multiplayer = LocalMultiplayer::new(1);
        let component = Component::new("c", &multiplayer.managers()[0]).unwrap();
        let list = component.list("numbers", vec![1, 2]).unwrap();

        let change = StateChange::MapPut {
            key: JsonCodec::encode(&0).unwrap(),
            value: JsonCodec::encode(&9).unwrap(),
        };
        multiplayer.managers()[0].receive_update(list.key(), change).unwrap();
        assert_eq!(list.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_undecodable_remote_change_is_an_error() {
        let multiplayer = LocalMultiplayer::new(1);
        let component = Component::new("c", &multiplayer.managers()[0]).unwrap();
        let list = component.list("numbers", vec![1]).unwrap();

        let change = StateChange::CollectionAdd { value: NetworkValue::new("\"text\"") };
        let result = multiplayer.managers()[0].receive_update(list.key(), change);
        assert!(matches!(result, Err(ReplicaError::Codec(_))));
        assert_eq!(list.to_vec(), vec![1]);
    }
}
