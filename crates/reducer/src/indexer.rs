//! Index engine: the ordered key list behind a reducer.
//!
//! The engine recomputes the list of visible keys from the shared collection,
//! the registered filters, the comparator and an optional parent index. Each
//! recomputation is hashed so the host is notified only when the observable
//! order actually changes.

use crate::derived::AdapterDerived;
use crate::filters::FilterEntry;
use crate::sort::Comparator;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::cmp::Ordering;
use core::fmt;
use keyview_core::{array_equals, index_hash, DataCell, Error, KeyedCollection, Result};

pub(crate) struct IndexState<C: KeyedCollection> {
    index: Option<Vec<C::Key>>,
    hash: Option<i32>,
    reversed: bool,
    parent: Option<IndexHandle<C>>,
}

pub(crate) struct IndexEngine<C: KeyedCollection> {
    data: RefCell<Option<DataCell<C>>>,
    state: RefCell<IndexState<C>>,
    filters: Rc<RefCell<Vec<FilterEntry<C::Value>>>>,
    compare: Rc<RefCell<Option<Comparator<C::Value>>>>,
    derived: RefCell<Weak<AdapterDerived<C>>>,
    host_update: RefCell<Option<Rc<dyn Fn()>>>,
    updating: Cell<bool>,
    destroyed: Cell<bool>,
}

/// Clears the updating flag when an update returns or unwinds.
struct UpdateGuard<'a>(&'a Cell<bool>);

impl<'a> UpdateGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<C: KeyedCollection> IndexEngine<C> {
    pub(crate) fn new(data: DataCell<C>, parent: Option<IndexHandle<C>>) -> Self {
        Self {
            data: RefCell::new(Some(data)),
            state: RefCell::new(IndexState {
                index: None,
                hash: None,
                reversed: false,
                parent,
            }),
            filters: Rc::new(RefCell::new(Vec::new())),
            compare: Rc::new(RefCell::new(None)),
            derived: RefCell::new(Weak::new()),
            host_update: RefCell::new(None),
            updating: Cell::new(false),
            destroyed: Cell::new(false),
        }
    }

    /// Connects the derived registry to cascade into and the host callback.
    pub(crate) fn attach(&self, derived: &Rc<AdapterDerived<C>>, host_update: Rc<dyn Fn()>) {
        *self.derived.borrow_mut() = Rc::downgrade(derived);
        *self.host_update.borrow_mut() = Some(host_update);
    }

    pub(crate) fn filters_cell(&self) -> Rc<RefCell<Vec<FilterEntry<C::Value>>>> {
        Rc::clone(&self.filters)
    }

    pub(crate) fn sort_cell(&self) -> Rc<RefCell<Option<Comparator<C::Value>>>> {
        Rc::clone(&self.compare)
    }

    pub(crate) fn is_active(&self) -> bool {
        if !self.filters.borrow().is_empty() || self.compare.borrow().is_some() {
            return true;
        }
        let parent = self.state.borrow().parent.clone();
        parent.is_some_and(|parent| parent.is_active())
    }

    pub(crate) fn len(&self) -> usize {
        self.state.borrow().index.as_ref().map_or(0, Vec::len)
    }

    pub(crate) fn set_reversed(&self, reversed: bool) {
        self.state.borrow_mut().reversed = reversed;
    }

    /// Drops the cached key list so the next update rebuilds it.
    pub(crate) fn reset_index(&self) {
        self.state.borrow_mut().index = None;
    }

    /// Recomputes the key list and notifies the host when it changed.
    pub(crate) fn update(&self, force: bool) -> Result<()> {
        if self.destroyed.get() {
            return Ok(());
        }
        let Some(_guard) = UpdateGuard::enter(&self.updating) else {
            return Err(Error::reentrant_update());
        };

        let data = self.data.borrow().clone();
        let parent = self.state.borrow().parent.clone();
        let parent = parent.filter(|parent| parent.is_active());
        let filters = self.filters.borrow().clone();
        let compare = self.compare.borrow().clone();

        let (old_index, old_hash) = {
            let mut state = self.state.borrow_mut();
            (state.index.take(), state.hash)
        };

        let index = {
            let slot = data.as_ref().map(|cell| cell.borrow());
            let collection = slot.as_ref().and_then(|slot| Option::as_ref(slot));
            compute_index(
                collection,
                parent.as_ref(),
                &filters,
                compare.as_ref(),
                old_index.as_ref(),
            )
        };

        let hash = index_hash(index.as_deref());
        let changed =
            force || old_hash != hash || !array_equals(old_index.as_deref(), index.as_deref());

        tracing::trace!(
            len = index.as_ref().map_or(0, Vec::len),
            hash = ?hash,
            force,
            changed,
            "index recomputed"
        );

        {
            let mut state = self.state.borrow_mut();
            state.index = index;
            state.hash = hash;
        }

        if changed {
            let host_update = self.host_update.borrow().clone();
            if let Some(host_update) = host_update {
                host_update();
            }
        }

        let derived = self.derived.borrow().upgrade();
        match derived {
            Some(derived) => derived.update(force),
            None => Ok(()),
        }
    }

    pub(crate) fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.data.borrow_mut().take();
        {
            let mut state = self.state.borrow_mut();
            state.index = None;
            state.hash = None;
            state.reversed = false;
            state.parent = None;
        }
        self.host_update.borrow_mut().take();
        *self.derived.borrow_mut() = Weak::new();
    }
}

/// Builds the key list for one update.
///
/// The previous list is reused only when a comparator will reorder it, it
/// still matches the collection size and no active parent supplies the keys.
fn compute_index<C: KeyedCollection>(
    collection: Option<&C>,
    parent: Option<&IndexHandle<C>>,
    filters: &[FilterEntry<C::Value>],
    compare: Option<&Comparator<C::Value>>,
    previous: Option<&Vec<C::Key>>,
) -> Option<Vec<C::Key>> {
    let mut index = previous
        .filter(|_| (!filters.is_empty() || compare.is_some()) && parent.is_none())
        .filter(|previous| collection.map(KeyedCollection::len) == Some(previous.len()))
        .cloned();

    if !filters.is_empty() {
        index = Some(reduce(collection, parent, filters));
    }

    if index.is_none() {
        if let Some(parent) = parent {
            index = Some(parent.iter().collect());
        }
    }

    if let (Some(compare), Some(collection)) = (compare, collection) {
        let keys = index.get_or_insert_with(|| collection.keys().cloned().collect());
        keys.sort_by(|a, b| match (collection.get(a), collection.get(b)) {
            (Some(a), Some(b)) => compare(a, b),
            _ => Ordering::Equal,
        });
    }

    index
}

/// Runs the filters over the parent's order, or over every collection key.
fn reduce<C: KeyedCollection>(
    collection: Option<&C>,
    parent: Option<&IndexHandle<C>>,
    filters: &[FilterEntry<C::Value>],
) -> Vec<C::Key> {
    let Some(collection) = collection else {
        return Vec::new();
    };
    let accept = |key: &C::Key| match collection.get(key) {
        Some(value) => filters.iter().all(|filter| filter.test(value)),
        None => false,
    };

    match parent {
        Some(parent) => parent.iter().filter(|key| accept(key)).collect(),
        None => collection
            .keys()
            .filter(|key| accept(*key))
            .cloned()
            .collect(),
    }
}

/// Read-only view of a reducer index.
pub struct IndexHandle<C: KeyedCollection> {
    engine: Rc<IndexEngine<C>>,
}

impl<C: KeyedCollection> Clone for IndexHandle<C> {
    fn clone(&self) -> Self {
        Self {
            engine: Rc::clone(&self.engine),
        }
    }
}

impl<C: KeyedCollection> IndexHandle<C> {
    pub(crate) fn new(engine: IndexEngine<C>) -> Self {
        Self {
            engine: Rc::new(engine),
        }
    }

    pub(crate) fn engine(&self) -> &IndexEngine<C> {
        &self.engine
    }

    /// Runs an update on behalf of an adapter.
    pub(crate) fn refresh(&self, force: bool) -> Result<()> {
        self.engine.update(force)
    }

    /// Rejects mutations requested while this index is updating.
    ///
    /// Adapters call this before touching shared state, so a rejected
    /// mutation leaves the registries and the cached list unchanged.
    pub(crate) fn ensure_idle(&self) -> Result<()> {
        if self.engine.updating.get() {
            return Err(Error::reentrant_update());
        }
        Ok(())
    }

    /// Returns a callback that requests an unforced update.
    ///
    /// The callback is handed to reactive sources. It holds the engine
    /// weakly, and reports failures through `tracing` since the source
    /// owns the calling stack.
    pub(crate) fn trigger(&self) -> Rc<dyn Fn()> {
        let engine = Rc::downgrade(&self.engine);
        Rc::new(move || {
            if let Some(engine) = engine.upgrade() {
                if let Err(err) = engine.update(false) {
                    tracing::warn!(error = %err, "reactive index update failed");
                }
            }
        })
    }

    /// Returns true if filters, a comparator or an active parent shape the view.
    pub fn is_active(&self) -> bool {
        self.engine.is_active()
    }

    /// Returns the number of keys in the index.
    pub fn len(&self) -> usize {
        self.engine.len()
    }

    /// Returns true if the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the hash of the current key list.
    pub fn hash(&self) -> Option<i32> {
        self.engine.state.borrow().hash
    }

    /// Returns true if iteration runs back to front.
    pub fn is_reversed(&self) -> bool {
        self.engine.state.borrow().reversed
    }

    /// Returns true once the owning view has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.engine.destroyed.get()
    }

    /// Recomputes the index; `force` notifies subscribers even without changes.
    ///
    /// Call this after mutating the collection in place.
    pub fn update(&self, force: bool) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::destroyed("IndexHandle"));
        }
        self.engine.update(force)
    }

    /// Iterates the indexed keys, honoring the reversed flag.
    ///
    /// Yields nothing while the index is unset.
    pub fn iter(&self) -> IndexIter<C> {
        let state = self.engine.state.borrow();
        IndexIter {
            engine: Rc::clone(&self.engine),
            pos: 0,
            len: state.index.as_ref().map_or(0, Vec::len),
            reversed: state.reversed,
        }
    }
}

impl<C: KeyedCollection> fmt::Debug for IndexHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHandle")
            .field("active", &self.is_active())
            .field("len", &self.len())
            .field("hash", &self.hash())
            .field("reversed", &self.is_reversed())
            .finish()
    }
}

impl<C: KeyedCollection> IntoIterator for &IndexHandle<C> {
    type Item = C::Key;
    type IntoIter = IndexIter<C>;

    fn into_iter(self) -> IndexIter<C> {
        self.iter()
    }
}

/// Cursor over the keys of an index.
///
/// Each step reads the live list; the cursor ends early if the list shrinks.
pub struct IndexIter<C: KeyedCollection> {
    engine: Rc<IndexEngine<C>>,
    pos: usize,
    len: usize,
    reversed: bool,
}

impl<C: KeyedCollection> Iterator for IndexIter<C> {
    type Item = C::Key;

    fn next(&mut self) -> Option<C::Key> {
        if self.pos >= self.len {
            return None;
        }
        let slot = if self.reversed {
            self.len - 1 - self.pos
        } else {
            self.pos
        };
        self.pos += 1;

        let state = self.engine.state.borrow();
        let key = state.index.as_ref().and_then(|index| index.get(slot)).cloned();
        if key.is_none() {
            self.pos = self.len;
        }
        key
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.len - self.pos))
    }
}

#[cfg(test)]
mod tests {
    use crate::{Filter, MapReducer};
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use keyview_core::{data_map, index_hash, DataMap, Error, Writable};

    fn scores() -> MapReducer<DataMap<&'static str, u32>> {
        let mut map = data_map();
        map.insert("x", 3);
        map.insert("y", 1);
        map.insert("z", 2);
        MapReducer::with_data(map)
    }

    fn notifications(reducer: &MapReducer<DataMap<&'static str, u32>>) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let _ = reducer
            .subscribe(move |_| count_clone.set(count_clone.get() + 1))
            .unwrap();
        count
    }

    #[test]
    fn test_passive_index() {
        let reducer = scores();
        let index = reducer.index();

        assert!(!index.is_active());
        assert!(index.is_empty());
        assert_eq!(index.hash(), None);
        assert_eq!(index.iter().count(), 0);
    }

    #[test]
    fn test_unforced_update_without_change() {
        let reducer = scores();
        reducer.filters().add(|v: &u32| *v > 1).unwrap();
        let count = notifications(&reducer);

        reducer.index().update(false).unwrap();
        reducer.index().update(false).unwrap();
        assert_eq!(count.get(), 1);

        reducer.index().update(true).unwrap();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_hash_matches_key_list() {
        let reducer = scores();
        reducer.sort().set(|a: &u32, b: &u32| a.cmp(b)).unwrap();

        let keys: Vec<&str> = reducer.index().iter().collect();
        assert_eq!(keys, vec!["y", "z", "x"]);
        assert_eq!(reducer.index().hash(), index_hash(Some(&keys[..])));

        let first = reducer.index().hash();
        reducer.index().update(true).unwrap();
        assert_eq!(reducer.index().hash(), first);
    }

    #[test]
    fn test_external_mutation_requires_update() {
        let reducer = scores();
        reducer.filters().add(|v: &u32| *v >= 2).unwrap();
        assert_eq!(reducer.len(), 2);

        reducer.data_mut().unwrap().insert("w", 9);
        assert_eq!(reducer.len(), 2);

        reducer.index().update(false).unwrap();
        assert_eq!(reducer.len(), 3);
        assert_eq!(reducer.index().iter().collect::<Vec<_>>(), vec!["x", "z", "w"]);
    }

    #[test]
    fn test_reversed_index_iteration() {
        let reducer = scores();
        reducer.sort().set(|a: &u32, b: &u32| a.cmp(b)).unwrap();
        reducer.set_reversed(true).unwrap();

        assert!(reducer.index().is_reversed());
        assert_eq!(reducer.index().iter().collect::<Vec<_>>(), vec!["x", "z", "y"]);
    }

    #[test]
    fn test_iter_restartable() {
        let reducer = scores();
        reducer.filters().add(|v: &u32| *v != 1).unwrap();
        let index = reducer.index();

        let first: Vec<_> = index.iter().collect();
        let second: Vec<_> = index.into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reentrant_update_rejected() {
        let reducer = scores();
        reducer.filters().add(|v: &u32| *v > 0).unwrap();

        let result = Rc::new(Cell::new(None));
        let result_clone = result.clone();
        let index = reducer.index().clone();
        let _ = reducer
            .subscribe(move |_| result_clone.set(Some(index.update(false))))
            .unwrap();

        assert_eq!(result.take(), Some(Ok(()))); // Immediate call is outside any update
        reducer.index().update(true).unwrap();
        assert_eq!(result.take(), Some(Err(Error::ReentrantUpdate)));
    }

    #[test]
    fn test_reactive_trigger_is_unforced() {
        let reducer = scores();
        let tick = Writable::new(0u32);
        reducer
            .filters()
            .add(Filter::new(|v: &u32| *v > 1).subscribe_to(tick.clone()))
            .unwrap();
        let count = notifications(&reducer);

        tick.set(1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_update_after_destroy() {
        let reducer = scores();
        let index = reducer.index().clone();
        reducer.destroy();

        assert!(index.is_destroyed());
        assert!(index.update(false).unwrap_err().is_destroyed());
        assert_eq!(index.len(), 0);
        assert_eq!(index.hash(), None);
    }
}
