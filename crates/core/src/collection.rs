//! Keyed collection abstraction consumed by reducers.
//!
//! A reducer never owns its collection by value: it shares a [`DataCell`], a
//! single mutable slot that the reducer, its index and all derived views read
//! from. Swapping the collection in the slot is visible to every reader
//! without re-registration.

use crate::hash::HashUnknown;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::hash::{BuildHasher, Hash};
use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::HashMap;
use indexmap::IndexMap;

/// Shared single-slot cell holding the current collection, if any.
pub type DataCell<C> = Rc<RefCell<Option<C>>>;

/// Insertion-ordered map used as the default reducer collection.
pub type DataMap<K, V> = IndexMap<K, V, DefaultHashBuilder>;

/// Creates an empty [`DataMap`].
pub fn data_map<K, V>() -> DataMap<K, V> {
    IndexMap::with_hasher(DefaultHashBuilder::default())
}

/// A mapping from unique keys to record values.
pub trait KeyedCollection: 'static {
    /// Key type; keys are cloned into the index and hashed for change detection.
    type Key: Clone + PartialEq + HashUnknown + 'static;
    /// Record type.
    type Value: 'static;

    /// Returns the value stored for `key`.
    fn get(&self, key: &Self::Key) -> Option<&Self::Value>;

    /// Inserts or overwrites the value stored for `key`.
    fn insert(&mut self, key: Self::Key, value: Self::Value);

    /// Removes `key`, returning its value.
    fn remove(&mut self, key: &Self::Key) -> Option<Self::Value>;

    /// Returns the number of entries.
    fn len(&self) -> usize;

    /// Iterates keys in the collection's natural order.
    fn keys(&self) -> impl Iterator<Item = &Self::Key>;

    /// Iterates values in the collection's natural order.
    fn values(&self) -> impl Iterator<Item = &Self::Value>;

    /// Consumes the collection into its entries.
    fn into_entries(self) -> impl Iterator<Item = (Self::Key, Self::Value)>
    where
        Self: Sized;

    /// Returns true if `key` is present.
    fn contains_key(&self, key: &Self::Key) -> bool {
        self.get(key).is_some()
    }

    /// Returns true if there are no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reconciles this collection in place with `other`.
    ///
    /// Keys missing from `other` are removed, every entry of `other` is
    /// inserted or overwritten. The collection object itself is kept.
    fn reconcile(&mut self, other: Self)
    where
        Self: Sized,
    {
        let stale: Vec<Self::Key> = self
            .keys()
            .filter(|key| !other.contains_key(key))
            .cloned()
            .collect();
        for key in &stale {
            self.remove(key);
        }
        for (key, value) in other.into_entries() {
            self.insert(key, value);
        }
    }
}

impl<K, V, S> KeyedCollection for IndexMap<K, V, S>
where
    K: Hash + Eq + Clone + HashUnknown + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    type Key = K;
    type Value = V;

    fn get(&self, key: &K) -> Option<&V> {
        IndexMap::get(self, key)
    }

    fn insert(&mut self, key: K, value: V) {
        IndexMap::insert(self, key, value);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        // Shifting keeps the insertion order of the remaining entries.
        IndexMap::shift_remove(self, key)
    }

    fn len(&self) -> usize {
        IndexMap::len(self)
    }

    fn keys(&self) -> impl Iterator<Item = &K> {
        IndexMap::keys(self)
    }

    fn values(&self) -> impl Iterator<Item = &V> {
        IndexMap::values(self)
    }

    fn into_entries(self) -> impl Iterator<Item = (K, V)> {
        self.into_iter()
    }

    fn contains_key(&self, key: &K) -> bool {
        IndexMap::contains_key(self, key)
    }
}

impl<K, V, S> KeyedCollection for HashMap<K, V, S>
where
    K: Hash + Eq + Clone + HashUnknown + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    type Key = K;
    type Value = V;

    fn get(&self, key: &K) -> Option<&V> {
        HashMap::get(self, key)
    }

    fn insert(&mut self, key: K, value: V) {
        HashMap::insert(self, key, value);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        HashMap::remove(self, key)
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn keys(&self) -> impl Iterator<Item = &K> {
        HashMap::keys(self)
    }

    fn values(&self) -> impl Iterator<Item = &V> {
        HashMap::values(self)
    }

    fn into_entries(self) -> impl Iterator<Item = (K, V)> {
        self.into_iter()
    }

    fn contains_key(&self, key: &K) -> bool {
        HashMap::contains_key(self, key)
    }
}

impl<K, V> KeyedCollection for BTreeMap<K, V>
where
    K: Ord + Clone + HashUnknown + 'static,
    V: 'static,
{
    type Key = K;
    type Value = V;

    fn get(&self, key: &K) -> Option<&V> {
        BTreeMap::get(self, key)
    }

    fn insert(&mut self, key: K, value: V) {
        BTreeMap::insert(self, key, value);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        BTreeMap::remove(self, key)
    }

    fn len(&self) -> usize {
        BTreeMap::len(self)
    }

    fn keys(&self) -> impl Iterator<Item = &K> {
        BTreeMap::keys(self)
    }

    fn values(&self) -> impl Iterator<Item = &V> {
        BTreeMap::values(self)
    }

    fn into_entries(self) -> impl Iterator<Item = (K, V)> {
        self.into_iter()
    }

    fn contains_key(&self, key: &K) -> bool {
        BTreeMap::contains_key(self, key)
    }
}
