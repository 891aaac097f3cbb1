//! Replicated Property
//!
//! A single replicated value with an explicit two-phase lifecycle:
//!
//! ```text
//! Constructed ──first get()/set()──► Registered
//!      │                                 │
//!      │ remote SetProperty is buffered  │ remote SetProperty applies directly
//!      ▼ in the holder as pending        ▼
//! ```
//!
//! On the transition the property registers with its component's holder
//! and then flushes any pending value exactly once. The transition runs with
//! delivery to the holder held back, so no other thread reads the value
//! before the flush.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{warn_mismatched_change, FieldLink, Replicable, ReplicatedState};
use crate::core::{Codec, JsonCodec, NetworkValue, OpCategory, StateChange, StateKey};
use crate::error::ReplicaError;
use crate::network::protocol::SyncPolicy;

/// Registration phase of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Built but not yet wired to its holder.
    Constructed,
    /// Wired to its holder, pending value not yet flushed.
    Registering,
    /// Wired to its holder; remote changes reach it directly.
    Registered,
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct PropertyCell<T, C> {
    key: StateKey,
    value: Mutex<T>,
    phase: Mutex<Phase>,
    before_change: Mutex<Vec<Listener<T>>>,
    after_change: Mutex<Vec<Listener<T>>>,
    _codec: PhantomData<fn() -> C>,
}

impl<T: Replicable, C: Codec> PropertyCell<T, C> {
    /// Store a new value, notifying listeners outside of any lock.
    fn store(&self, value: T) {
        let before = self.before_change.lock().clone();
        for listener in &before {
            listener(&value);
        }

        *self.value.lock() = value.clone();

        let after = self.after_change.lock().clone();
        for listener in &after {
            listener(&value);
        }
    }
}

impl<T: Replicable, C: Codec> ReplicatedState for PropertyCell<T, C> {
    fn category(&self) -> OpCategory {
        OpCategory::Property
    }

    fn apply_change(&self, change: &StateChange) -> Result<(), ReplicaError> {
        match change {
            StateChange::SetProperty { value } => {
                let value: T = C::decode(value)?;
                self.store(value);
                Ok(())
            }
            other => {
                warn_mismatched_change(&self.key, other, OpCategory::Property);
                Ok(())
            }
        }
    }

    fn snapshot(&self) -> Result<NetworkValue, ReplicaError> {
        Ok(C::encode(&*self.value.lock())?)
    }
}

/// A replicated single value.
///
/// Cloning yields another handle to the same field.
pub struct Property<T, C = JsonCodec> {
    link: FieldLink,
    cell: Arc<PropertyCell<T, C>>,
}

impl<T: Replicable, C: Codec> Property<T, C> {
    /// Build a property in the [`Phase::Constructed`] phase.
    ///
    /// Nothing is registered until the first [`get`](Self::get) or
    /// [`set`](Self::set).
    pub fn new(link: FieldLink, initial: T) -> Self {
        let cell = PropertyCell {
            key: link.key().clone(),
            value: Mutex::new(initial),
            phase: Mutex::new(Phase::Constructed),
            before_change: Mutex::new(Vec::new()),
            after_change: Mutex::new(Vec::new()),
            _codec: PhantomData,
        };
        Self {
            link,
            cell: Arc::new(cell),
        }
    }

    /// Set the visibility of this property's outgoing changes.
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.link.set_policy(policy);
        self
    }

    /// Field address.
    pub fn key(&self) -> &StateKey {
        self.link.key()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        *self.cell.phase.lock()
    }

    /// Current value.
    ///
    /// The first access registers the property and applies any value that
    /// arrived before it existed locally.
    pub fn get(&self) -> Result<T, ReplicaError> {
        self.ensure_registered()?;
        Ok(self.cell.value.lock().clone())
    }

    /// Replace the value locally and send it to the other participants.
    ///
    /// The value is encoded first, so a codec failure leaves the local
    /// value untouched.
    pub fn set(&self, value: T) -> Result<(), ReplicaError> {
        self.ensure_registered()?;
        self.link.check_writable()?;
        let payload = C::encode(&value)?;
        self.cell.store(value);
        self.link.send(StateChange::SetProperty { value: payload })
    }

    /// Compute a new value from the current one and [`set`](Self::set) it.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<(), ReplicaError> {
        let next = f(&self.get()?);
        self.set(next)
    }

    /// Run `listener` with the new value just before it is stored.
    ///
    /// Fires for local sets and remote changes alike.
    pub fn on_before_change(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        self.cell.before_change.lock().push(Arc::new(listener));
    }

    /// Run `listener` with the new value right after it is stored.
    pub fn on_after_change(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        self.cell.after_change.lock().push(Arc::new(listener));
    }

    /// Move to [`Phase::Registered`] if not already there.
    fn ensure_registered(&self) -> Result<(), ReplicaError> {
        if self.phase() == Phase::Registered {
            return Ok(());
        }

        let key = self.link.key();
        let holder = self.link.manager().holder_for(key)?;
        holder.exclusive(|| {
            // registered meanwhile, or re-entered from a listener mid-flush
            if self.phase() != Phase::Constructed {
                return Ok(());
            }

            let state: Arc<dyn ReplicatedState> = self.cell.clone();
            holder.register_state(&key.property, state)?;
            *self.cell.phase.lock() = Phase::Registering;
            debug!("Property '{}' registered", key);

            let flushed = holder.set_pending_value(&key.property, self.cell.as_ref());
            *self.cell.phase.lock() = Phase::Registered;
            flushed.map(|_| ())
        })
    }
}

impl<T, C> Clone for Property<T, C> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<T: fmt::Debug, C> fmt::Debug for Property<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("key", self.link.key())
            .field("value", &*self.cell.value.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BincodeCodec;
    use crate::network::local::LocalMultiplayer;
    use crate::network::manager::{Component, StateManager};
    use crate::network::synchronizer::BlockingSynchronizer;
    use crate::network::protocol::StateUpdate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn isolated_manager() -> Arc<StateManager> {
        StateManager::new(
            "isolated",
            BlockingSynchronizer::new(|_batch: Vec<StateUpdate>| Ok(())),
        )
    }

    #[test]
    fn test_shared_property_converges() {
        let multiplayer = LocalMultiplayer::new(2);
        let a = Component::new("session", &multiplayer.managers()[0]).unwrap();
        let b = Component::new("session", &multiplayer.managers()[1]).unwrap();

        let mana_a = a.property("mana", 3);
        let mana_b = b.property("mana", 3);
        assert_eq!(mana_a.get().unwrap(), 3);
        assert_eq!(mana_b.get().unwrap(), 3);

        mana_a.set(1000).unwrap();

        assert_eq!(mana_a.get().unwrap(), 1000);
        assert_eq!(mana_b.get().unwrap(), 1000);
    }

    #[test]
    fn test_lazy_registration() {
        let manager = isolated_manager();
        let component = Component::new("lazy", &manager).unwrap();
        let value = component.property("v", 1);

        assert_eq!(value.phase(), Phase::Constructed);
        assert!(component.holder().registered_keys().is_empty());

        value.get().unwrap();
        assert_eq!(value.phase(), Phase::Registered);
        assert_eq!(component.holder().registered_keys(), vec!["v".to_string()]);
    }

    #[test]
    fn test_pending_value_applied_on_first_access() {
        let manager = isolated_manager();
        let component = Component::new("late", &manager).unwrap();
        let value = component.property("score", 0);

        let payload = JsonCodec::encode(&42).unwrap();
        manager
            .receive_update(&StateKey::new("late", "score"), StateChange::SetProperty { value: payload })
            .unwrap();
        assert!(component.holder().has_pending("score"));

        assert_eq!(value.get().unwrap(), 42);
        assert!(!component.holder().has_pending("score"));
    }

    #[test]
    fn test_local_set_before_first_get_wins_over_pending() {
        let manager = isolated_manager();
        let component = Component::new("late", &manager).unwrap();
        let value = component.property("score", 0);

        let payload = JsonCodec::encode(&42).unwrap();
        manager
            .receive_update(&StateKey::new("late", "score"), StateChange::SetProperty { value: payload })
            .unwrap();

        value.set(7).unwrap();
        assert_eq!(value.get().unwrap(), 7);
        assert!(!component.holder().has_pending("score"));
    }

    #[test]
    fn test_listeners_fire_for_local_and_remote_changes() {
        let multiplayer = LocalMultiplayer::new(2);
        let a = Component::new("turn", &multiplayer.managers()[0]).unwrap();
        let b = Component::new("turn", &multiplayer.managers()[1]).unwrap();
        let current_a = a.property("current", "playerA".to_string());
        let current_b = b.property("current", "playerA".to_string());
        current_b.get().unwrap();

        let before_calls = Arc::new(AtomicUsize::new(0));
        let seen_old = Arc::new(Mutex::new(String::new()));
        {
            let before_calls = before_calls.clone();
            let seen_old = seen_old.clone();
            let observer = current_b.clone();
            current_b.on_before_change(move |_new| {
                before_calls.fetch_add(1, Ordering::SeqCst);
                *seen_old.lock() = observer.get().unwrap();
            });
        }
        let after_value = Arc::new(Mutex::new(String::new()));
        {
            let after_value = after_value.clone();
            current_b.on_after_change(move |new| *after_value.lock() = new.clone());
        }

        current_a.set("playerB".to_string()).unwrap();
        assert_eq!(before_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen_old.lock(), "playerA");
        assert_eq!(*after_value.lock(), "playerB");

        current_b.set("playerA".to_string()).unwrap();
        assert_eq!(before_calls.load(Ordering::SeqCst), 2);
        assert_eq!(current_a.get().unwrap(), "playerA");
    }

    #[test]
    fn test_update_reads_then_writes() {
        let multiplayer = LocalMultiplayer::new(2);
        let a = Component::new("duel", &multiplayer.managers()[0]).unwrap();
        let b = Component::new("duel", &multiplayer.managers()[1]).unwrap();
        let mana_a = a.property("mana", 3);
        let mana_b = b.property("mana", 3);

        mana_a.update(|m| m - 2).unwrap();
        mana_b.update(|m| m + 2).unwrap();

        assert_eq!(mana_a.get().unwrap(), 3);
        assert_eq!(mana_b.get().unwrap(), 3);
    }

    #[test]
    fn test_mismatched_change_is_ignored() {
        let manager = isolated_manager();
        let component = Component::new("c", &manager).unwrap();
        let value = component.property("v", 5);
        value.get().unwrap();

        manager
            .receive_update(&StateKey::new("c", "v"), StateChange::CollectionClear)
            .unwrap();
        assert_eq!(value.get().unwrap(), 5);
    }

    #[test]
    fn test_bincode_property() {
        let multiplayer = LocalMultiplayer::new(2);
        let a = Component::new("pos", &multiplayer.managers()[0]).unwrap();
        let b = Component::new("pos", &multiplayer.managers()[1]).unwrap();
        let pos_a = a.property_with::<(i32, i32), BincodeCodec>("xy", (0, 0));
        let pos_b = b.property_with::<(i32, i32), BincodeCodec>("xy", (0, 0));

        pos_a.set((4, -2)).unwrap();
        assert_eq!(pos_b.get().unwrap(), (4, -2));
    }

    #[test]
    fn test_duplicate_property_key_is_rejected() {
        let manager = isolated_manager();
        let component = Component::new("c", &manager).unwrap();
        let first = component.property("v", 1);
        let second = component.property("v", 2);

        first.get().unwrap();
        let result = second.get();
        assert!(matches!(result, Err(ReplicaError::DuplicateProperty(_))));
    }

    #[test]
    fn test_concurrent_first_access_sees_pending_value() {
        for _ in 0..50 {
            let manager = isolated_manager();
            let component = Component::new("late", &manager).unwrap();
            let value = component.property("score", 0);
            let payload = JsonCodec::encode(&42).unwrap();
            manager
                .receive_update(&StateKey::new("late", "score"), StateChange::SetProperty { value: payload })
                .unwrap();

            let barrier = Arc::new(std::sync::Barrier::new(8));
            let readers: Vec<_> = (0..8)
                .map(|_| {
                    let (value, barrier) = (value.clone(), barrier.clone());
                    std::thread::spawn(move || {
                        barrier.wait();
                        value.get().unwrap()
                    })
                })
                .collect();

            for reader in readers {
                assert_eq!(reader.join().unwrap(), 42);
            }
            assert_eq!(value.phase(), Phase::Registered);
        }
    }

    #[test]
    fn test_listener_reads_during_first_flush() {
        let manager = isolated_manager();
        let component = Component::new("late", &manager).unwrap();
        let value = component.property("score", 0);
        let payload = JsonCodec::encode(&42).unwrap();
        manager
            .receive_update(&StateKey::new("late", "score"), StateChange::SetProperty { value: payload })
            .unwrap();

        let observed = Arc::new(Mutex::new(None));
        {
            let observed = observed.clone();
            let observer = value.clone();
            value.on_after_change(move |_| *observed.lock() = Some(observer.get().unwrap()));
        }

        assert_eq!(value.get().unwrap(), 42);
        assert_eq!(*observed.lock(), Some(42));
    }
}
