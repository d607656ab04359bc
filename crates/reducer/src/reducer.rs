//! Reactive views over a keyed collection.
//!
//! [`MapReducer`] owns a collection and exposes a filtered, sorted and
//! observable view of it. Both it and [`DerivedMapReducer`] are thin handles
//! over a shared core that wires the index engine, the filter,
//! sort and derived registries, and the subscriber list together.
//!
//! [`DerivedMapReducer`]: crate::DerivedMapReducer

use crate::derived::{AdapterDerived, KindTable};
use crate::filters::{AdapterFilters, Filter, IntoFilter};
use crate::indexer::{IndexEngine, IndexHandle, IndexIter};
use crate::sort::{AdapterSort, IntoSort, Sort};
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, Ref, RefCell, RefMut};
use core::fmt;
use keyview_core::{DataCell, Error, KeyedCollection, Result, Subscriber, SubscriberList, Unsubscribe};

/// Constructs a view handle around its core.
pub(crate) trait FromCore<C: KeyedCollection>: Sized + 'static {
    fn from_core(core: Rc<ReducerCore<C, Self>>) -> Self;
}

/// State shared by a view handle and its clones.
pub(crate) struct ReducerCore<C: KeyedCollection, R> {
    data: DataCell<C>,
    index: IndexHandle<C>,
    filters: AdapterFilters<C>,
    sort: AdapterSort<C>,
    derived: Rc<AdapterDerived<C>>,
    subscribers: RefCell<SubscriberList<R>>,
    destroyed: Cell<bool>,
    component: &'static str,
}

impl<C: KeyedCollection, R: FromCore<C>> ReducerCore<C, R> {
    /// Builds a core over `data`, chained to `parent` when given.
    pub(crate) fn build(
        data: DataCell<C>,
        parent: Option<IndexHandle<C>>,
        kinds: KindTable<C>,
        component: &'static str,
    ) -> Rc<Self> {
        let index = IndexHandle::new(IndexEngine::new(Rc::clone(&data), parent));
        let derived = Rc::new(AdapterDerived::new(Rc::clone(&data), index.clone(), kinds));

        let core = Rc::new(Self {
            filters: AdapterFilters::new(index.clone()),
            sort: AdapterSort::new(index.clone()),
            data,
            index,
            derived,
            subscribers: RefCell::new(SubscriberList::new()),
            destroyed: Cell::new(false),
            component,
        });

        let weak = Rc::downgrade(&core);
        core.index.engine().attach(
            &core.derived,
            Rc::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.notify();
                }
            }),
        );
        core
    }

    /// Applies initial filters and comparator.
    pub(crate) fn configure(&self, filters: Vec<Filter<C::Value>>, sort: Option<Sort<C::Value>>) -> Result<()> {
        if !filters.is_empty() {
            self.filters.extend(filters)?;
        }
        if sort.is_some() {
            self.sort.replace(sort)?;
        }
        Ok(())
    }

    fn notify(self: &Rc<Self>) {
        let subscribers = self.subscribers.borrow().snapshot();
        if subscribers.is_empty() {
            return;
        }
        let view = R::from_core(Rc::clone(self));
        for subscriber in &subscribers {
            subscriber.call(&view);
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.get() {
            return Err(Error::destroyed(self.component));
        }
        Ok(())
    }

    pub(crate) fn data(&self) -> Option<Ref<'_, C>> {
        if self.destroyed.get() {
            return None;
        }
        Ref::filter_map(self.data.borrow(), Option::as_ref).ok()
    }

    pub(crate) fn data_mut(&self) -> Option<RefMut<'_, C>> {
        if self.destroyed.get() {
            return None;
        }
        RefMut::filter_map(self.data.borrow_mut(), Option::as_mut).ok()
    }

    /// Installs or merges a collection, then forces an update.
    pub(crate) fn set_data(&self, data: Option<C>, replace: bool) -> Result<()> {
        self.ensure_alive()?;
        self.index.ensure_idle()?;
        {
            let Ok(mut slot) = self.data.try_borrow_mut() else {
                return Err(Error::contract_violation(
                    self.component,
                    "data cannot be set while the collection is borrowed",
                ));
            };
            match data {
                Some(incoming) if !replace && slot.is_some() => {
                    if let Some(current) = slot.as_mut() {
                        current.reconcile(incoming);
                    }
                }
                incoming => *slot = incoming,
            }
        }
        tracing::debug!(component = self.component, replace, "data set");

        self.index.engine().reset_index();
        self.index.refresh(true)
    }

    pub(crate) fn len(&self) -> usize {
        if self.destroyed.get() {
            return 0;
        }
        if self.index.is_active() {
            self.index.len()
        } else {
            self.data.borrow().as_ref().map_or(0, |data| data.len())
        }
    }

    pub(crate) fn set_reversed(&self, reversed: bool) -> Result<()> {
        self.ensure_alive()?;
        self.index.ensure_idle()?;
        self.index.engine().set_reversed(reversed);
        self.index.refresh(true)
    }

    pub(crate) fn filters(&self) -> &AdapterFilters<C> {
        &self.filters
    }

    pub(crate) fn sort(&self) -> &AdapterSort<C> {
        &self.sort
    }

    pub(crate) fn derived(&self) -> &AdapterDerived<C> {
        &self.derived
    }

    pub(crate) fn index(&self) -> &IndexHandle<C> {
        &self.index
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Registers `subscriber` and calls it once with the current view.
    pub(crate) fn subscribe(self: &Rc<Self>, subscriber: &Subscriber<R>) -> Result<Unsubscribe> {
        self.ensure_alive()?;
        let id = self.subscribers.borrow_mut().add(subscriber.clone());
        let Some(id) = id else {
            return Ok(Unsubscribe::noop());
        };

        subscriber.call(&R::from_core(Rc::clone(self)));

        let weak = Rc::downgrade(self);
        Ok(Unsubscribe::new(move || {
            if let Some(core) = weak.upgrade() {
                core.subscribers.borrow_mut().remove(id);
            }
        }))
    }

    /// Tears the view down; idempotent.
    ///
    /// `release_data` drops the collection from the shared slot, which only
    /// the owning reducer does.
    pub(crate) fn destroy(&self, release_data: bool) {
        if self.destroyed.replace(true) {
            return;
        }
        if release_data {
            let released = self.data.borrow_mut().take();
            drop(released);
        }
        if let Err(err) = self.index.refresh(true) {
            tracing::warn!(component = self.component, error = %err, "final update failed");
        }
        self.subscribers.borrow_mut().clear();
        self.derived.destroy();
        if let Err(err) = self.filters.clear() {
            tracing::warn!(component = self.component, error = %err, "filter teardown failed");
        }
        if let Err(err) = self.sort.clear() {
            tracing::warn!(component = self.component, error = %err, "sort teardown failed");
        }
        self.index.engine().destroy();
        tracing::debug!(component = self.component, "view destroyed");
    }

    /// Returns an iterator over the visible values.
    pub(crate) fn iter(&self) -> ReducerIter<C> {
        let empty = || ReducerIter {
            data: None,
            keys: KeySource::Snapshot(Vec::new().into_iter()),
        };
        if self.destroyed.get() {
            return empty();
        }

        let keys = if self.index.is_active() {
            KeySource::Index(self.index.iter())
        } else {
            let slot = self.data.borrow();
            let Some(data) = slot.as_ref() else {
                return empty();
            };
            let mut keys: Vec<C::Key> = data.keys().cloned().collect();
            if self.index.is_reversed() {
                keys.reverse();
            }
            KeySource::Snapshot(keys.into_iter())
        };

        ReducerIter {
            data: Some(Rc::clone(&self.data)),
            keys,
        }
    }
}

enum KeySource<C: KeyedCollection> {
    Index(IndexIter<C>),
    Snapshot(alloc::vec::IntoIter<C::Key>),
}

/// Iterator over the values of a view.
///
/// Active views yield values in index order. Passive views yield the
/// collection's values in its natural order, or reversed. Keys are fixed when
/// the iterator is created; values are looked up as it advances.
pub struct ReducerIter<C: KeyedCollection> {
    data: Option<DataCell<C>>,
    keys: KeySource<C>,
}

impl<C: KeyedCollection> Iterator for ReducerIter<C>
where
    C::Value: Clone,
{
    type Item = C::Value;

    fn next(&mut self) -> Option<C::Value> {
        let data = self.data.as_ref()?;
        loop {
            let key = match &mut self.keys {
                KeySource::Index(keys) => keys.next(),
                KeySource::Snapshot(keys) => keys.next(),
            }?;
            let slot = data.borrow();
            if let Some(value) = slot.as_ref().and_then(|data| data.get(&key)) {
                return Some(value.clone());
            }
        }
    }
}

/// Options for [`MapReducer::with_options`].
pub struct ReducerOptions<C: KeyedCollection> {
    /// Initial collection.
    pub data: Option<C>,
    /// Initial filters.
    pub filters: Vec<Filter<C::Value>>,
    /// Initial comparator.
    pub sort: Option<Sort<C::Value>>,
}

impl<C: KeyedCollection> Default for ReducerOptions<C> {
    fn default() -> Self {
        Self {
            data: None,
            filters: Vec::new(),
            sort: None,
        }
    }
}

impl<C: KeyedCollection> ReducerOptions<C> {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial collection.
    pub fn data(mut self, data: C) -> Self {
        self.data = Some(data);
        self
    }

    /// Adds an initial filter.
    pub fn filter(mut self, filter: impl IntoFilter<C::Value>) -> Self {
        self.filters.push(filter.into_filter());
        self
    }

    /// Sets the initial comparator.
    pub fn sort(mut self, sort: impl IntoSort<C::Value>) -> Self {
        self.sort = Some(sort.into_sort());
        self
    }
}

/// A reactive, filtered and sorted view over an owned keyed collection.
///
/// Handles are cheap to clone and share one view.
///
/// # Example
///
/// ```rust
/// use keyview_core::{data_map, DataMap};
/// use keyview_reducer::{MapReducer, Order, Sort};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let mut map: DataMap<&str, &str> = data_map();
/// map.insert("a", "x");
/// map.insert("b", "y");
/// map.insert("c", "z");
///
/// let reducer = MapReducer::with_data(map);
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let seen_clone = seen.clone();
/// let _ = reducer
///     .subscribe(move |view| seen_clone.borrow_mut().push(view.iter().collect::<Vec<_>>()))
///     .unwrap();
///
/// reducer.filters().add(|v: &&str| *v != "y").unwrap();
/// reducer.sort().set(Sort::by_key(|v: &&str| *v, Order::Desc)).unwrap();
///
/// assert_eq!(seen.borrow().last().unwrap(), &vec!["z", "x"]);
/// ```
pub struct MapReducer<C: KeyedCollection> {
    core: Rc<ReducerCore<C, MapReducer<C>>>,
}

impl<C: KeyedCollection> FromCore<C> for MapReducer<C> {
    fn from_core(core: Rc<ReducerCore<C, Self>>) -> Self {
        Self { core }
    }
}

impl<C: KeyedCollection> Clone for MapReducer<C> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<C: KeyedCollection> Default for MapReducer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: KeyedCollection> MapReducer<C> {
    const COMPONENT: &'static str = "MapReducer";

    /// Creates a reducer without a collection.
    pub fn new() -> Self {
        Self::from_slot(None)
    }

    /// Creates a reducer over `data`.
    pub fn with_data(data: C) -> Self {
        Self::from_slot(Some(data))
    }

    /// Creates a reducer with initial data, filters and comparator.
    pub fn with_options(options: ReducerOptions<C>) -> Result<Self> {
        let ReducerOptions { data, filters, sort } = options;
        let reducer = Self::from_slot(data);
        reducer.core.configure(filters, sort)?;
        Ok(reducer)
    }

    fn from_slot(data: Option<C>) -> Self {
        let core = ReducerCore::build(
            Rc::new(RefCell::new(data)),
            None,
            AdapterDerived::default_kinds(),
            Self::COMPONENT,
        );
        Self { core }
    }

    /// Returns the collection, if any.
    ///
    /// Drop the guard before updating the view: index updates read the
    /// collection and panic while it is mutably borrowed, and
    /// [`MapReducer::set_data`] fails while any guard is held.
    pub fn data(&self) -> Option<Ref<'_, C>> {
        self.core.data()
    }

    /// Returns the collection mutably, if any.
    ///
    /// Drop the guard, then call `index().update(true)` so the view picks up
    /// the changes.
    pub fn data_mut(&self) -> Option<RefMut<'_, C>> {
        self.core.data_mut()
    }

    /// Sets the collection.
    ///
    /// With `replace` false and a collection already held, the current
    /// collection is reconciled in place: keys absent from `data` are
    /// removed, all others inserted or overwritten. Otherwise `data`
    /// replaces it wholesale. Always forces an update.
    ///
    /// Fails with [`Error::ContractViolation`] while a guard returned by
    /// [`MapReducer::data`] or [`MapReducer::data_mut`] is alive, and with
    /// [`Error::ReentrantUpdate`] when called from inside an update.
    pub fn set_data(&self, data: Option<C>, replace: bool) -> Result<()> {
        self.core.set_data(data, replace)
    }

    /// Returns the number of visible values.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Returns true if no values are visible.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if iteration runs back to front.
    pub fn is_reversed(&self) -> bool {
        self.core.index().is_reversed()
    }

    /// Sets the reversed flag and forces an update.
    pub fn set_reversed(&self, reversed: bool) -> Result<()> {
        self.core.set_reversed(reversed)
    }

    /// Returns the filter registry.
    pub fn filters(&self) -> &AdapterFilters<C> {
        self.core.filters()
    }

    /// Returns the sort registry.
    pub fn sort(&self) -> &AdapterSort<C> {
        self.core.sort()
    }

    /// Returns the derived view registry.
    pub fn derived(&self) -> &AdapterDerived<C> {
        self.core.derived()
    }

    /// Returns the index.
    pub fn index(&self) -> &IndexHandle<C> {
        self.core.index()
    }

    /// Returns true once the reducer has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }

    /// Subscribes to view changes; `handler` runs immediately.
    pub fn subscribe<F>(&self, handler: F) -> Result<Unsubscribe>
    where
        F: Fn(&MapReducer<C>) + 'static,
    {
        self.core.subscribe(&Subscriber::new(handler))
    }

    /// Subscribes an existing subscriber; a duplicate registration is a no-op.
    pub fn subscribe_handler(&self, subscriber: &Subscriber<MapReducer<C>>) -> Result<Unsubscribe> {
        self.core.subscribe(subscriber)
    }

    /// Destroys the reducer, its derived views and its subscriptions; idempotent.
    pub fn destroy(&self) {
        self.core.destroy(true);
    }

    /// Iterates the visible values.
    pub fn iter(&self) -> ReducerIter<C>
    where
        C::Value: Clone,
    {
        self.core.iter()
    }

    /// Returns true if both handles share one reducer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl<C: KeyedCollection> IntoIterator for &MapReducer<C>
where
    C::Value: Clone,
{
    type Item = C::Value;
    type IntoIter = ReducerIter<C>;

    fn into_iter(self) -> ReducerIter<C> {
        self.iter()
    }
}

impl<C: KeyedCollection> fmt::Debug for MapReducer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapReducer")
            .field("len", &self.len())
            .field("index", self.index())
            .field("filters", &self.filters().len())
            .field("derived", &self.derived().len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
