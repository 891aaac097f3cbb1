//! State Change Taxonomy
//!
//! One [`StateChange`] describes exactly one mutation of one replicated
//! field. Variants are grouped two ways:
//!
//! - by payload shape ([`ChangeShape`]): a single encoded value, a batch
//!   encoded as one payload, or neither;
//! - by op-category ([`OpCategory`]): which kinds of field may legally
//!   receive the variant. A variant can belong to several categories
//!   (`CollectionAdd` is both a list and a set op).
//!
//! Applying a change to a field whose category it does not belong to is a
//! detectable mismatch; fields log and ignore such changes.

use serde::{Deserialize, Serialize};

use super::codec::NetworkValue;

/// Kind of replicated field a change may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCategory {
    /// Single-value property.
    Property,
    /// Ordered, index-addressable list.
    List,
    /// Key-value map.
    Map,
    /// Set with uniqueness by equality.
    Set,
}

impl OpCategory {
    /// Upper-case label used in log output.
    pub fn label(self) -> &'static str {
        match self {
            OpCategory::Property => "PROPERTY",
            OpCategory::List => "LIST",
            OpCategory::Map => "MAP",
            OpCategory::Set => "SET",
        }
    }
}

/// Payload shape of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeShape<'a> {
    /// Carries exactly one encoded element.
    Single(&'a NetworkValue),
    /// Carries an encoded batch of elements (or entries).
    Bulk(&'a NetworkValue),
    /// Carries no element payload (`CollectionClear`, `ListRemoveAt`,
    /// and the keyed map ops).
    Other,
}

/// One wire-level mutation of one replicated field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateChange {
    /// Overwrite a property value.
    SetProperty {
        /// Encoded new value.
        value: NetworkValue,
    },

    /// Replace the list element at `index`.
    ListSet {
        /// Encoded element.
        value: NetworkValue,
        /// Target index.
        index: usize,
    },
    /// Insert an element at `index`.
    ListIndexedAdd {
        /// Encoded element.
        value: NetworkValue,
        /// Insert position.
        index: usize,
    },
    /// Remove the element at `index`.
    ListRemoveAt {
        /// Index to remove.
        index: usize,
    },
    /// Insert a batch of elements at `index`.
    ListIndexedAddAll {
        /// Encoded element list.
        values: NetworkValue,
        /// Insert position.
        index: usize,
    },

    /// Insert or replace one map entry.
    MapPut {
        /// Encoded key.
        key: NetworkValue,
        /// Encoded value.
        value: NetworkValue,
    },
    /// Remove one map entry.
    MapRemove {
        /// Encoded key.
        key: NetworkValue,
    },
    /// Insert or replace a batch of entries.
    MapPutAll {
        /// Encoded list of `(key, value)` pairs.
        entries: NetworkValue,
    },

    /// Remove every element (list, set) or entry (map).
    CollectionClear,
    /// Append (list) or insert (set) one element.
    CollectionAdd {
        /// Encoded element.
        value: NetworkValue,
    },
    /// Remove the first equal element.
    CollectionRemove {
        /// Encoded element.
        value: NetworkValue,
    },
    /// Append (list) or insert (set) a batch of elements.
    CollectionAddAll {
        /// Encoded element list.
        values: NetworkValue,
    },
    /// Remove every element equal to one in the batch.
    CollectionRemoveAll {
        /// Encoded element list.
        values: NetworkValue,
    },
    /// Keep only elements equal to one in the batch.
    CollectionRetainAll {
        /// Encoded element list.
        values: NetworkValue,
    },
}

use OpCategory::{List, Map, Property, Set};

impl StateChange {
    /// Every op-category this variant belongs to. Never empty.
    pub fn categories(&self) -> &'static [OpCategory] {
        match self {
            StateChange::SetProperty { .. } => &[Property],
            StateChange::ListSet { .. }
            | StateChange::ListIndexedAdd { .. }
            | StateChange::ListRemoveAt { .. }
            | StateChange::ListIndexedAddAll { .. } => &[List],
            StateChange::MapPut { .. }
            | StateChange::MapRemove { .. }
            | StateChange::MapPutAll { .. } => &[Map],
            StateChange::CollectionClear => &[List, Map, Set],
            StateChange::CollectionAdd { .. }
            | StateChange::CollectionRemove { .. }
            | StateChange::CollectionAddAll { .. }
            | StateChange::CollectionRemoveAll { .. }
            | StateChange::CollectionRetainAll { .. } => &[List, Set],
        }
    }

    /// Whether this variant may be applied to a field of `category`.
    pub fn belongs_to(&self, category: OpCategory) -> bool {
        self.categories().contains(&category)
    }

    /// Payload shape of this variant.
    pub fn shape(&self) -> ChangeShape<'_> {
        match self {
            StateChange::SetProperty { value }
            | StateChange::ListSet { value, .. }
            | StateChange::ListIndexedAdd { value, .. }
            | StateChange::CollectionAdd { value }
            | StateChange::CollectionRemove { value } => ChangeShape::Single(value),
            StateChange::ListIndexedAddAll { values, .. }
            | StateChange::CollectionAddAll { values }
            | StateChange::CollectionRemoveAll { values }
            | StateChange::CollectionRetainAll { values } => ChangeShape::Bulk(values),
            StateChange::MapPutAll { entries } => ChangeShape::Bulk(entries),
            StateChange::ListRemoveAt { .. }
            | StateChange::MapPut { .. }
            | StateChange::MapRemove { .. }
            | StateChange::CollectionClear => ChangeShape::Other,
        }
    }

    /// Variant name, for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            StateChange::SetProperty { .. } => "SetProperty",
            StateChange::ListSet { .. } => "ListSet",
            StateChange::ListIndexedAdd { .. } => "ListIndexedAdd",
            StateChange::ListRemoveAt { .. } => "ListRemoveAt",
            StateChange::ListIndexedAddAll { .. } => "ListIndexedAddAll",
            StateChange::MapPut { .. } => "MapPut",
            StateChange::MapRemove { .. } => "MapRemove",
            StateChange::MapPutAll { .. } => "MapPutAll",
            StateChange::CollectionClear => "CollectionClear",
            StateChange::CollectionAdd { .. } => "CollectionAdd",
            StateChange::CollectionRemove { .. } => "CollectionRemove",
            StateChange::CollectionAddAll { .. } => "CollectionAddAll",
            StateChange::CollectionRemoveAll { .. } => "CollectionRemoveAll",
            StateChange::CollectionRetainAll { .. } => "CollectionRetainAll",
        }
    }
}
