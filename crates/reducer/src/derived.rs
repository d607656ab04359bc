//! Derived view registry.
//!
//! A reducer owns a registry of named derived views. Every derived view
//! shares the reducer's collection and chains its index to the reducer's
//! index, so it refines the parent's order instead of the raw collection.

use crate::derived_reducer::DerivedMapReducer;
use crate::filters::{Filter, IntoFilter};
use crate::indexer::IndexHandle;
use crate::sort::{IntoSort, Sort};
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;
use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::HashMap;
use indexmap::IndexMap;
use keyview_core::{DataCell, Error, Extras, KeyedCollection, Result, Value};

const COMPONENT: &str = "AdapterDerived";

/// Name of the kind used when none is requested.
pub const DEFAULT_KIND: &str = "derived";

/// Hook run once after a derived view of a kind is created.
pub type InitializeHook<C> = Rc<dyn Fn(&DerivedMapReducer<C>, &Extras) -> Result<()>>;

pub(crate) type KindTable<C> = Rc<RefCell<HashMap<String, DerivedKind<C>>>>;

struct KindInner<C: KeyedCollection> {
    name: String,
    initialize: Option<InitializeHook<C>>,
}

/// A registered flavor of derived view.
///
/// Kinds are compared by identity: a clone is the same kind, a second kind
/// built with the same name is a different one.
pub struct DerivedKind<C: KeyedCollection> {
    inner: Rc<KindInner<C>>,
}

impl<C: KeyedCollection> DerivedKind<C> {
    /// Creates a kind without an initialize hook.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(KindInner {
                name: name.into(),
                initialize: None,
            }),
        }
    }

    /// Creates a kind whose views run `initialize` with the extra options.
    pub fn with_initialize<F>(name: impl Into<String>, initialize: F) -> Self
    where
        F: Fn(&DerivedMapReducer<C>, &Extras) -> Result<()> + 'static,
    {
        Self {
            inner: Rc::new(KindInner {
                name: name.into(),
                initialize: Some(Rc::new(initialize)),
            }),
        }
    }

    /// Returns the kind name, also the default view name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns true if both handles are the same kind.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn initialize(&self) -> Option<&InitializeHook<C>> {
        self.inner.initialize.as_ref()
    }
}

impl<C: KeyedCollection> Clone for DerivedKind<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: KeyedCollection> fmt::Debug for DerivedKind<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKind")
            .field("name", &self.inner.name)
            .field("initialize", &self.inner.initialize.is_some())
            .finish()
    }
}

/// Options for [`AdapterDerived::create`].
///
/// # Example
///
/// ```rust
/// use keyview_core::{data_map, DataMap};
/// use keyview_reducer::{DerivedOptions, MapReducer, Order, Sort};
///
/// let mut map: DataMap<u32, i64> = data_map();
/// map.insert(1, 5);
/// map.insert(2, -3);
/// map.insert(3, 8);
/// let reducer = MapReducer::with_data(map);
///
/// let positive = reducer
///     .derived()
///     .create(
///         DerivedOptions::new()
///             .name("positive")
///             .filter(|v: &i64| *v > 0)
///             .sort(Sort::by_key(|v: &i64| *v, Order::Desc)),
///     )
///     .unwrap();
///
/// assert_eq!(positive.iter().collect::<Vec<_>>(), vec![8, 5]);
/// ```
pub struct DerivedOptions<C: KeyedCollection> {
    /// View name; defaults to the kind name.
    pub name: Option<String>,
    /// Registered kind; defaults to the `"derived"` kind.
    pub kind: Option<DerivedKind<C>>,
    /// Initial filters.
    pub filters: Vec<Filter<C::Value>>,
    /// Initial comparator.
    pub sort: Option<Sort<C::Value>>,
    /// Everything forwarded to the kind's initialize hook.
    pub extra: Extras,
}

impl<C: KeyedCollection> Default for DerivedOptions<C> {
    fn default() -> Self {
        Self {
            name: None,
            kind: None,
            filters: Vec::new(),
            sort: None,
            extra: Extras::new(),
        }
    }
}

impl<C: KeyedCollection> DerivedOptions<C> {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the view name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the kind.
    pub fn kind(mut self, kind: DerivedKind<C>) -> Self {
        self.kind = Some(kind);
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

    /// Adds an extra option for the initialize hook.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// The accepted shapes of a derived view request.
pub enum DerivedSpec<C: KeyedCollection> {
    /// A view of the default kind with this name.
    Name(String),
    /// A view of a registered kind, named after it.
    Kind(DerivedKind<C>),
    /// A fully specified view.
    Options(DerivedOptions<C>),
}

impl<C: KeyedCollection> From<&str> for DerivedSpec<C> {
    fn from(name: &str) -> Self {
        DerivedSpec::Name(name.into())
    }
}

impl<C: KeyedCollection> From<String> for DerivedSpec<C> {
    fn from(name: String) -> Self {
        DerivedSpec::Name(name)
    }
}

impl<C: KeyedCollection> From<DerivedKind<C>> for DerivedSpec<C> {
    fn from(kind: DerivedKind<C>) -> Self {
        DerivedSpec::Kind(kind)
    }
}

impl<C: KeyedCollection> From<DerivedOptions<C>> for DerivedSpec<C> {
    fn from(options: DerivedOptions<C>) -> Self {
        DerivedSpec::Options(options)
    }
}

/// Registry of the derived views chained to one index.
pub struct AdapterDerived<C: KeyedCollection> {
    data: RefCell<Option<DataCell<C>>>,
    parent: RefCell<Option<IndexHandle<C>>>,
    kinds: KindTable<C>,
    derived: RefCell<IndexMap<String, DerivedMapReducer<C>, DefaultHashBuilder>>,
    destroyed: Cell<bool>,
}

impl<C: KeyedCollection> AdapterDerived<C> {
    pub(crate) fn new(data: DataCell<C>, parent: IndexHandle<C>, kinds: KindTable<C>) -> Self {
        Self {
            data: RefCell::new(Some(data)),
            parent: RefCell::new(Some(parent)),
            kinds,
            derived: RefCell::new(IndexMap::with_hasher(DefaultHashBuilder::default())),
            destroyed: Cell::new(false),
        }
    }

    /// Creates a kind table holding the default kind.
    pub(crate) fn default_kinds() -> KindTable<C> {
        let mut kinds = HashMap::new();
        kinds.insert(DEFAULT_KIND.to_string(), DerivedKind::new(DEFAULT_KIND));
        Rc::new(RefCell::new(kinds))
    }

    /// Registers a kind so it can be requested by [`AdapterDerived::create`].
    ///
    /// Registering the same kind twice is a no-op; a different kind under a
    /// taken name is rejected.
    pub fn register_kind(&self, kind: DerivedKind<C>) -> Result<()> {
        self.ensure_alive()?;
        if kind.name().is_empty() {
            return Err(Error::invalid_argument(COMPONENT, "kind 'name' is empty"));
        }

        let mut kinds = self.kinds.borrow_mut();
        match kinds.get(kind.name()) {
            Some(existing) if existing.ptr_eq(&kind) => Ok(()),
            Some(_) => Err(Error::invalid_argument(
                COMPONENT,
                "a different kind is already registered under this name",
            )),
            None => {
                tracing::debug!(kind = kind.name(), "derived kind registered");
                kinds.insert(kind.name().to_string(), kind);
                Ok(())
            }
        }
    }

    /// Creates a derived view, or returns the existing view of that name.
    pub fn create(&self, spec: impl Into<DerivedSpec<C>>) -> Result<DerivedMapReducer<C>> {
        self.ensure_alive()?;

        let (name, kind, options) = match spec.into() {
            DerivedSpec::Name(name) => (Some(name), self.default_kind()?, DerivedOptions::new()),
            DerivedSpec::Kind(kind) => (None, self.resolve_kind(&kind)?, DerivedOptions::new()),
            DerivedSpec::Options(mut options) => {
                let kind = match options.kind.take() {
                    Some(kind) => self.resolve_kind(&kind)?,
                    None => self.default_kind()?,
                };
                (options.name.take(), kind, options)
            }
        };

        let name = name.unwrap_or_else(|| kind.name().to_string());
        if name.is_empty() {
            return Err(Error::invalid_argument(COMPONENT, "'name' is empty"));
        }

        let existing = self.derived.borrow().get(&name).cloned();
        if let Some(existing) = existing {
            if !existing.is_destroyed() {
                return Ok(existing);
            }
            // Destroyed directly through its handle; the name is free again.
            self.derived.borrow_mut().shift_remove(&name);
        }

        let (data, parent) = match (self.data.borrow().clone(), self.parent.borrow().clone()) {
            (Some(data), Some(parent)) => (data, parent),
            _ => return Err(Error::destroyed(COMPONENT)),
        };

        let DerivedOptions {
            filters,
            sort,
            extra,
            ..
        } = options;
        let view = DerivedMapReducer::build(data, parent, Rc::clone(&self.kinds), filters, sort)?;
        self.derived.borrow_mut().insert(name.clone(), view.clone());

        if let Some(initialize) = kind.initialize() {
            if let Err(err) = initialize(&view, &extra) {
                self.derived.borrow_mut().shift_remove(&name);
                view.destroy();
                tracing::debug!(name = %name, error = %err, "derived view initialize failed");
                return Err(err);
            }
        }

        tracing::debug!(name = %name, kind = kind.name(), "derived view created");
        Ok(view)
    }

    /// Returns the derived view registered under `name`.
    pub fn get(&self, name: &str) -> Result<Option<DerivedMapReducer<C>>> {
        self.ensure_alive()?;
        Ok(self.derived.borrow().get(name).cloned())
    }

    /// Destroys and removes the derived view registered under `name`.
    ///
    /// Returns true if a view was removed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        self.ensure_alive()?;
        let removed = self.derived.borrow_mut().shift_remove(name);
        match removed {
            Some(view) => {
                view.destroy();
                tracing::debug!(name, "derived view deleted");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Destroys and removes every derived view.
    pub fn clear(&self) {
        if self.destroyed.get() {
            return;
        }
        let views: Vec<DerivedMapReducer<C>> = self
            .derived
            .borrow_mut()
            .drain(..)
            .map(|(_, view)| view)
            .collect();
        for view in &views {
            view.destroy();
        }
    }

    /// Clears the registry and releases the parent references; idempotent.
    pub fn destroy(&self) {
        if self.destroyed.get() {
            return;
        }
        self.clear();
        self.data.borrow_mut().take();
        self.parent.borrow_mut().take();
        self.destroyed.set(true);
    }

    /// Returns true once the registry has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Returns the number of derived views.
    pub fn len(&self) -> usize {
        self.derived.borrow().len()
    }

    /// Returns true if there are no derived views.
    pub fn is_empty(&self) -> bool {
        self.derived.borrow().is_empty()
    }

    /// Returns the view names in creation order.
    pub fn names(&self) -> Vec<String> {
        self.derived.borrow().keys().cloned().collect()
    }

    /// Updates every derived index; the first error is returned after all ran.
    pub fn update(&self, force: bool) -> Result<()> {
        if self.destroyed.get() {
            return Ok(());
        }
        let views: Vec<DerivedMapReducer<C>> = self.derived.borrow().values().cloned().collect();
        let mut outcome = Ok(());
        for view in &views {
            if let Err(err) = view.index().refresh(force) {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
        outcome
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.get() {
            return Err(Error::destroyed(COMPONENT));
        }
        Ok(())
    }

    fn default_kind(&self) -> Result<DerivedKind<C>> {
        self.kinds
            .borrow()
            .get(DEFAULT_KIND)
            .cloned()
            .ok_or_else(|| Error::invalid_argument(COMPONENT, "default kind is not registered"))
    }

    fn resolve_kind(&self, kind: &DerivedKind<C>) -> Result<DerivedKind<C>> {
        match self.kinds.borrow().get(kind.name()) {
            Some(registered) if registered.ptr_eq(kind) => Ok(registered.clone()),
            _ => Err(Error::invalid_argument(
                COMPONENT,
                "'kind' is not a registered derived kind",
            )),
        }
    }
}

impl<C: KeyedCollection> fmt::Debug for AdapterDerived<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterDerived")
            .field("names", &self.names())
            .field("destroyed", &self.destroyed.get())
            .finish()
    }
}
