//! Derived views chained to a parent index.

use crate::derived::{AdapterDerived, KindTable};
use crate::filters::{AdapterFilters, Filter};
use crate::indexer::IndexHandle;
use crate::reducer::{FromCore, ReducerCore, ReducerIter};
use crate::sort::{AdapterSort, Sort};
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::Ref;
use core::fmt;
use keyview_core::{DataCell, KeyedCollection, Result, Subscriber, Unsubscribe};

/// A view refining its parent's order with its own filters and comparator.
///
/// Derived views read the parent's collection and never modify it. They are
/// created through [`AdapterDerived::create`].
pub struct DerivedMapReducer<C: KeyedCollection> {
    core: Rc<ReducerCore<C, DerivedMapReducer<C>>>,
}

impl<C: KeyedCollection> FromCore<C> for DerivedMapReducer<C> {
    fn from_core(core: Rc<ReducerCore<C, Self>>) -> Self {
        Self { core }
    }
}

impl<C: KeyedCollection> Clone for DerivedMapReducer<C> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<C: KeyedCollection> DerivedMapReducer<C> {
    const COMPONENT: &'static str = "DerivedMapReducer";

    pub(crate) fn build(
        data: DataCell<C>,
        parent: IndexHandle<C>,
        kinds: KindTable<C>,
        filters: Vec<Filter<C::Value>>,
        sort: Option<Sort<C::Value>>,
    ) -> Result<Self> {
        let core = ReducerCore::build(data, Some(parent), kinds, Self::COMPONENT);
        let view = Self { core };

        let configured = if filters.is_empty() && sort.is_none() {
            // Pick up an already active parent order.
            view.core.index().refresh(false)
        } else {
            view.core.configure(filters, sort)
        };
        if let Err(err) = configured {
            view.destroy();
            return Err(err);
        }
        Ok(view)
    }

    /// Returns the shared collection, if any.
    pub fn data(&self) -> Option<Ref<'_, C>> {
        self.core.data()
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

    /// Returns the registry of views derived from this one.
    pub fn derived(&self) -> &AdapterDerived<C> {
        self.core.derived()
    }

    /// Returns the index.
    pub fn index(&self) -> &IndexHandle<C> {
        self.core.index()
    }

    /// Returns true once the view has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }

    /// Subscribes to view changes; `handler` runs immediately.
    pub fn subscribe<F>(&self, handler: F) -> Result<Unsubscribe>
    where
        F: Fn(&DerivedMapReducer<C>) + 'static,
    {
        self.core.subscribe(&Subscriber::new(handler))
    }

    /// Subscribes an existing subscriber; a duplicate registration is a no-op.
    pub fn subscribe_handler(
        &self,
        subscriber: &Subscriber<DerivedMapReducer<C>>,
    ) -> Result<Unsubscribe> {
        self.core.subscribe(subscriber)
    }

    /// Destroys the view and everything derived from it; idempotent.
    ///
    /// The parent's collection is left untouched.
    pub fn destroy(&self) {
        self.core.destroy(false);
    }

    /// Iterates the visible values.
    pub fn iter(&self) -> ReducerIter<C>
    where
        C::Value: Clone,
    {
        self.core.iter()
    }

    /// Returns true if both handles share one view.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl<C: KeyedCollection> IntoIterator for &DerivedMapReducer<C>
where
    C::Value: Clone,
{
    type Item = C::Value;
    type IntoIter = ReducerIter<C>;

    fn into_iter(self) -> ReducerIter<C> {
        self.iter()
    }
}

impl<C: KeyedCollection> fmt::Debug for DerivedMapReducer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedMapReducer")
            .field("len", &self.len())
            .field("index", self.index())
            .field("filters", &self.filters().len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
