//! Filter registry for a reducer index.
//!
//! Filters are predicates over collection values kept in ascending weight
//! order. A filter may carry a [`Reactive`] source; the source is subscribed
//! with the index update trigger on registration and released on removal.

use crate::indexer::IndexHandle;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use hashbrown::HashMap;
use keyview_core::{Error, KeyedCollection, Reactive, Result, Unsubscribe};

/// Shared predicate type.
pub type Predicate<V> = Rc<dyn Fn(&V) -> bool>;

const COMPONENT: &str = "AdapterFilters";

/// Default weight of a filter added without an explicit weight.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// A filter definition passed to [`AdapterFilters::add`].
///
/// # Example
///
/// ```rust
/// use keyview_reducer::Filter;
///
/// let even = Filter::new(|v: &u32| v % 2 == 0).id("even").weight(0.5);
/// assert_eq!(even.get_id(), Some("even"));
/// ```
pub struct Filter<V> {
    predicate: Predicate<V>,
    id: Option<String>,
    weight: Option<f64>,
    source: Option<Rc<dyn Reactive>>,
}

impl<V: 'static> Filter<V> {
    /// Creates a new filter from a predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&V) -> bool + 'static,
    {
        Self::from_predicate(Rc::new(predicate))
    }

    /// Creates a new filter sharing an existing predicate.
    pub fn from_predicate(predicate: Predicate<V>) -> Self {
        Self {
            predicate,
            id: None,
            weight: None,
            source: None,
        }
    }
}

impl<V> Filter<V> {
    /// Sets the filter id used by [`AdapterFilters::remove_by_id`].
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the filter weight; it must be within `[0, 1]`.
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Makes the filter reactive: `source` triggers index updates.
    pub fn subscribe_to<S>(mut self, source: S) -> Self
    where
        S: Reactive + 'static,
    {
        self.source = Some(Rc::new(source));
        self
    }

    /// Returns the filter id.
    pub fn get_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the explicit weight, if any.
    pub fn get_weight(&self) -> Option<f64> {
        self.weight
    }

    /// Returns true if the filter carries a reactive source.
    pub fn is_reactive(&self) -> bool {
        self.source.is_some()
    }

    /// Evaluates the predicate.
    #[inline]
    pub fn test(&self, value: &V) -> bool {
        (self.predicate)(value)
    }
}

impl<V> Clone for Filter<V> {
    fn clone(&self) -> Self {
        Self {
            predicate: Rc::clone(&self.predicate),
            id: self.id.clone(),
            weight: self.weight,
            source: self.source.clone(),
        }
    }
}

impl<V> fmt::Debug for Filter<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("id", &self.id)
            .field("weight", &self.weight)
            .field("reactive", &self.source.is_some())
            .finish()
    }
}

/// Conversion into a [`Filter`]: bare predicates and filters both qualify.
pub trait IntoFilter<V> {
    fn into_filter(self) -> Filter<V>;
}

impl<V: 'static, F> IntoFilter<V> for F
where
    F: Fn(&V) -> bool + 'static,
{
    fn into_filter(self) -> Filter<V> {
        Filter::new(self)
    }
}

impl<V> IntoFilter<V> for Filter<V> {
    fn into_filter(self) -> Filter<V> {
        self
    }
}

/// A registered filter.
pub struct FilterEntry<V> {
    id: Option<String>,
    predicate: Predicate<V>,
    weight: f64,
}

impl<V> FilterEntry<V> {
    /// Returns the filter id.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the effective weight.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Evaluates the predicate.
    #[inline]
    pub fn test(&self, value: &V) -> bool {
        (self.predicate)(value)
    }
}

impl<V> Clone for FilterEntry<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            predicate: Rc::clone(&self.predicate),
            weight: self.weight,
        }
    }
}

impl<V> fmt::Debug for FilterEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEntry")
            .field("id", &self.id)
            .field("weight", &self.weight)
            .finish()
    }
}

/// Identity of a registered predicate: the address of its shared allocation.
pub trait FilterIdentity<V> {
    fn identity(&self) -> *const ();
}

impl<V> FilterIdentity<V> for Filter<V> {
    fn identity(&self) -> *const () {
        Rc::as_ptr(&self.predicate) as *const ()
    }
}

impl<V> FilterIdentity<V> for FilterEntry<V> {
    fn identity(&self) -> *const () {
        Rc::as_ptr(&self.predicate) as *const ()
    }
}

impl<V> FilterIdentity<V> for Predicate<V> {
    fn identity(&self) -> *const () {
        Rc::as_ptr(self) as *const ()
    }
}

/// Filter registry of one reducer index.
pub struct AdapterFilters<C: KeyedCollection> {
    filters: Rc<RefCell<Vec<FilterEntry<C::Value>>>>,
    unsubscribes: RefCell<HashMap<*const (), Unsubscribe>>,
    index: IndexHandle<C>,
}

impl<C: KeyedCollection> AdapterFilters<C> {
    pub(crate) fn new(index: IndexHandle<C>) -> Self {
        Self {
            filters: index.engine().filters_cell(),
            unsubscribes: RefCell::new(HashMap::new()),
            index,
        }
    }

    /// Returns the number of registered filters.
    pub fn len(&self) -> usize {
        self.filters.borrow().len()
    }

    /// Returns true if no filters are registered.
    pub fn is_empty(&self) -> bool {
        self.filters.borrow().is_empty()
    }

    /// Returns copies of the registered filters in evaluation order.
    pub fn iter(&self) -> alloc::vec::IntoIter<FilterEntry<C::Value>> {
        self.filters.borrow().clone().into_iter()
    }

    /// Adds a single filter.
    pub fn add(&self, filter: impl IntoFilter<C::Value>) -> Result<()> {
        self.extend([filter])
    }

    /// Adds filters in order.
    ///
    /// One forced update runs afterwards if at least one added filter is not
    /// reactive; reactive sources drive their own updates.
    pub fn extend<I>(&self, filters: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: IntoFilter<C::Value>,
    {
        self.ensure_alive()?;

        let mut added = 0usize;
        let mut subscribed = 0usize;
        let mut outcome = Ok(());
        for filter in filters {
            match self.insert(filter.into_filter()) {
                Ok(reactive) => {
                    added += 1;
                    if reactive {
                        subscribed += 1;
                    }
                }
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }

        tracing::debug!(added, subscribed, total = self.len(), "filters added");

        if subscribed < added {
            self.index.refresh(true)?;
        }
        outcome
    }

    /// Removes filters by predicate identity, releasing their subscriptions.
    pub fn remove<'a, F>(&self, filters: impl IntoIterator<Item = &'a F>) -> Result<()>
    where
        F: FilterIdentity<C::Value> + ?Sized + 'a,
    {
        self.ensure_alive()?;
        let targets: Vec<*const ()> = filters.into_iter().map(FilterIdentity::identity).collect();
        self.retain(|entry| !targets.contains(&entry.identity()))
    }

    /// Removes every filter for which `callback` returns true.
    ///
    /// The callback receives a copy of each entry.
    pub fn remove_by<F>(&self, mut callback: F) -> Result<()>
    where
        F: FnMut(&FilterEntry<C::Value>) -> bool,
    {
        self.ensure_alive()?;
        self.retain(|entry| !callback(entry))
    }

    /// Removes every filter whose id matches one of `ids`.
    pub fn remove_by_id<I, S>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_alive()?;
        let ids: Vec<S> = ids.into_iter().collect();
        self.retain(|entry| {
            !ids
                .iter()
                .any(|id| entry.id.as_deref() == Some(id.as_ref()))
        })
    }

    /// Removes all filters and subscriptions, then updates the index.
    pub fn clear(&self) -> Result<()> {
        self.ensure_alive()?;
        self.filters.borrow_mut().clear();

        let tokens: Vec<Unsubscribe> = self
            .unsubscribes
            .borrow_mut()
            .drain()
            .map(|(_, token)| token)
            .collect();
        for mut token in tokens {
            token.unsubscribe();
        }

        tracing::debug!("filters cleared");
        self.index.refresh(false)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.index.is_destroyed() {
            return Err(Error::destroyed(COMPONENT));
        }
        self.index.ensure_idle()
    }

    /// Inserts one filter; returns true if it subscribed to a reactive source.
    fn insert(&self, filter: Filter<C::Value>) -> Result<bool> {
        let weight = match filter.weight {
            None => DEFAULT_WEIGHT,
            Some(weight) if (0.0..=1.0).contains(&weight) => weight,
            Some(_) => {
                return Err(Error::invalid_argument(
                    COMPONENT,
                    "'weight' is not a number between 0 and 1 inclusive",
                ))
            }
        };

        let identity = filter.identity();
        if filter.source.is_some() && self.unsubscribes.borrow().contains_key(&identity) {
            return Err(Error::contract_violation(
                COMPONENT,
                "filter added already has an unsubscribe registered",
            ));
        }

        let entry = FilterEntry {
            id: filter.id,
            predicate: filter.predicate,
            weight,
        };
        {
            let mut filters = self.filters.borrow_mut();
            let pos = filters
                .iter()
                .position(|existing| weight < existing.weight)
                .unwrap_or(filters.len());
            filters.insert(pos, entry);
        }

        let Some(source) = filter.source else {
            return Ok(false);
        };

        match source.subscribe(self.index.trigger()) {
            Some(token) => {
                self.unsubscribes.borrow_mut().insert(identity, token);
                Ok(true)
            }
            None => {
                {
                    let mut filters = self.filters.borrow_mut();
                    if let Some(pos) = filters.iter().rposition(|e| e.identity() == identity) {
                        filters.remove(pos);
                    }
                }
                self.index.refresh(true)?;
                Err(Error::contract_violation(
                    COMPONENT,
                    "filter has a reactive source, but no unsubscribe was returned",
                ))
            }
        }
    }

    /// Keeps the entries accepted by `keep`; forced update if any was removed.
    fn retain(&self, mut keep: impl FnMut(&FilterEntry<C::Value>) -> bool) -> Result<()> {
        let snapshot = self.filters.borrow().clone();
        if snapshot.is_empty() {
            return Ok(());
        }

        let mut kept = Vec::with_capacity(snapshot.len());
        let mut removed = Vec::new();
        for entry in snapshot {
            if keep(&entry) {
                kept.push(entry);
            } else {
                removed.push(entry);
            }
        }
        if removed.is_empty() {
            return Ok(());
        }

        *self.filters.borrow_mut() = kept;
        for entry in &removed {
            let token = self.unsubscribes.borrow_mut().remove(&entry.identity());
            if let Some(mut token) = token {
                token.unsubscribe();
            }
        }

        tracing::debug!(removed = removed.len(), total = self.len(), "filters removed");
        self.index.refresh(true)
    }
}

impl<C: KeyedCollection> fmt::Debug for AdapterFilters<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.filters.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MapReducer;
    use alloc::vec;
    use core::cell::Cell;
    use keyview_core::{data_map, DataMap, Writable};

    fn numbers() -> MapReducer<DataMap<u32, u32>> {
        let mut map = data_map();
        for i in 1..=6 {
            map.insert(i, i * 10);
        }
        MapReducer::with_data(map)
    }

    fn values(reducer: &MapReducer<DataMap<u32, u32>>) -> Vec<u32> {
        reducer.iter().collect()
    }

    /// Reactive source that never hands back an unsubscribe.
    struct Broken;

    impl Reactive for Broken {
        fn subscribe(&self, _notify: Rc<dyn Fn()>) -> Option<Unsubscribe> {
            None
        }
    }

    #[test]
    fn test_add_bare_predicate() {
        let reducer = numbers();
        reducer.filters().add(|v: &u32| *v > 30).unwrap();

        assert_eq!(reducer.filters().len(), 1);
        assert_eq!(values(&reducer), vec![40, 50, 60]);
    }

    #[test]
    fn test_weight_order() {
        let reducer = numbers();
        let order = Rc::new(RefCell::new(Vec::new()));

        let make = |tag: &'static str| {
            let order = order.clone();
            move |_: &u32| {
                order.borrow_mut().push(tag);
                true
            }
        };

        reducer
            .filters()
            .extend([
                Filter::new(make("a")).weight(0.5),
                Filter::new(make("b")),
                Filter::new(make("c")).weight(0.1),
                Filter::new(make("d")).weight(0.5),
            ])
            .unwrap();

        let weights: Vec<f64> = reducer.filters().iter().map(|e| e.weight()).collect();
        assert_eq!(weights, vec![0.1, 0.5, 0.5, 1.0]);

        order.borrow_mut().clear();
        reducer.index().update(false).unwrap();
        assert_eq!(&order.borrow()[..4], &["c", "a", "d", "b"]);
    }

    #[test]
    fn test_zero_weight_kept() {
        let reducer = numbers();
        reducer.filters().add(Filter::new(|_: &u32| true).weight(0.0)).unwrap();
        assert_eq!(reducer.filters().iter().next().map(|e| e.weight()), Some(0.0));
    }

    #[test]
    fn test_short_circuit() {
        let reducer = numbers();
        let second_calls = Rc::new(Cell::new(0));
        let second_calls_clone = second_calls.clone();

        reducer
            .filters()
            .extend([
                Filter::new(|_: &u32| false).weight(0.1),
                Filter::new(move |_: &u32| {
                    second_calls_clone.set(second_calls_clone.get() + 1);
                    true
                })
                .weight(0.9),
            ])
            .unwrap();

        assert_eq!(second_calls.get(), 0);
        assert_eq!(reducer.len(), 0);
    }

    #[test]
    fn test_invalid_weight() {
        let reducer = numbers();
        for weight in [-0.1, 1.5, f64::NAN] {
            let err = reducer
                .filters()
                .add(Filter::new(|_: &u32| true).weight(weight))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidArgument { .. }));
        }
        assert!(reducer.filters().is_empty());
    }

    #[test]
    fn test_remove_by_identity() {
        let reducer = numbers();
        let big = Filter::new(|v: &u32| *v > 20);
        let small = Filter::new(|v: &u32| *v < 60);
        reducer.filters().extend([big.clone(), small.clone()]).unwrap();
        assert_eq!(values(&reducer), vec![30, 40, 50]);

        reducer.filters().remove([&big]).unwrap();
        assert_eq!(reducer.filters().len(), 1);
        assert_eq!(values(&reducer), vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_remove_unknown_no_update() {
        let reducer = numbers();
        reducer.filters().add(|v: &u32| *v > 20).unwrap();

        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let _unsubscribe = reducer
            .subscribe(move |_| count_clone.set(count_clone.get() + 1))
            .unwrap();

        let stranger = Filter::new(|_: &u32| true);
        reducer.filters().remove([&stranger]).unwrap();

        assert_eq!(count.get(), 1); // Only the immediate call
        assert_eq!(reducer.filters().len(), 1);
    }

    #[test]
    fn test_remove_by_id_and_callback() {
        let reducer = numbers();
        reducer
            .filters()
            .extend([
                Filter::new(|v: &u32| *v > 10).id("gt10"),
                Filter::new(|v: &u32| *v < 60).id("lt60"),
                Filter::new(|v: &u32| *v != 30).id("not30").weight(0.2),
            ])
            .unwrap();
        assert_eq!(values(&reducer), vec![20, 40, 50]);

        reducer.filters().remove_by_id(["gt10", "missing"]).unwrap();
        assert_eq!(values(&reducer), vec![10, 20, 40, 50]);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        reducer
            .filters()
            .remove_by(move |entry| {
                seen_clone.borrow_mut().push(entry.id().map(String::from));
                entry.weight() < 0.5
            })
            .unwrap();

        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(values(&reducer), vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_add_inside_update_rejected() {
        let reducer = numbers();
        reducer.filters().add(|v: &u32| *v < 50).unwrap();

        let armed = Rc::new(Cell::new(false));
        let result = Rc::new(RefCell::new(None));
        let armed_clone = armed.clone();
        let result_clone = result.clone();
        let _ = reducer
            .subscribe(move |view| {
                if armed_clone.get() {
                    *result_clone.borrow_mut() = Some(view.filters().add(|v: &u32| *v > 20));
                }
            })
            .unwrap();

        armed.set(true);
        reducer.index().update(true).unwrap();

        assert_eq!(*result.borrow(), Some(Err(Error::ReentrantUpdate)));
        assert_eq!(reducer.filters().len(), 1);
        assert_eq!(reducer.index().len(), 4);
        assert_eq!(values(&reducer), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_remove_inside_update_rejected() {
        let reducer = numbers();
        reducer.filters().add(Filter::new(|v: &u32| *v < 50).id("lt50")).unwrap();

        let armed = Rc::new(Cell::new(false));
        let result = Rc::new(RefCell::new(None));
        let armed_clone = armed.clone();
        let result_clone = result.clone();
        let _ = reducer
            .subscribe(move |view| {
                if armed_clone.get() {
                    *result_clone.borrow_mut() = Some(view.filters().remove_by_id(["lt50"]));
                }
            })
            .unwrap();

        armed.set(true);
        reducer.index().update(true).unwrap();

        assert_eq!(*result.borrow(), Some(Err(Error::ReentrantUpdate)));
        assert_eq!(reducer.filters().len(), 1);
        assert_eq!(values(&reducer), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_reactive_filter_subscribes_once() {
        let reducer = numbers();
        let threshold = Writable::new(0u32);
        let limit = threshold.clone();

        let filter = Filter::new(move |v: &u32| *v > limit.get()).subscribe_to(threshold.clone());
        reducer.filters().add(filter.clone()).unwrap();
        assert_eq!(threshold.subscriber_count(), 1);
        assert_eq!(reducer.len(), 6);

        threshold.set(40);
        assert_eq!(values(&reducer), vec![50, 60]);

        let err = reducer.filters().add(filter.clone()).unwrap_err();
        assert!(matches!(err, Error::ContractViolation { .. }));
        assert_eq!(threshold.subscriber_count(), 1);

        reducer.filters().remove([&filter]).unwrap();
        assert_eq!(threshold.subscriber_count(), 0);
        assert_eq!(reducer.len(), 6);
    }

    #[test]
    fn test_reactive_source_without_unsubscribe() {
        let reducer = numbers();
        let err = reducer
            .filters()
            .add(Filter::new(|v: &u32| *v > 30).subscribe_to(Broken))
            .unwrap_err();

        assert!(matches!(err, Error::ContractViolation { .. }));
        assert!(reducer.filters().is_empty());
        assert_eq!(reducer.len(), 6);
    }

    #[test]
    fn test_clear_releases_subscriptions() {
        let reducer = numbers();
        let store = Writable::new(1u32);
        reducer
            .filters()
            .extend([
                Filter::new(|v: &u32| *v > 10).subscribe_to(store.clone()),
                Filter::new(|v: &u32| *v < 60),
            ])
            .unwrap();
        assert_eq!(store.subscriber_count(), 1);

        reducer.filters().clear().unwrap();
        assert!(reducer.filters().is_empty());
        assert_eq!(store.subscriber_count(), 0);
        assert!(!reducer.index().is_active());
    }

    #[test]
    fn test_destroyed_adapter_errors() {
        let reducer = numbers();
        let filters = reducer.filters();
        reducer.destroy();

        assert!(filters.add(|_: &u32| true).unwrap_err().is_destroyed());
        assert!(filters.clear().unwrap_err().is_destroyed());
        assert!(filters.remove_by_id(["x"]).unwrap_err().is_destroyed());
    }
}
