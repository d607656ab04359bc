//! Sort registry for a reducer index.
//!
//! A reducer index holds at most one comparator. Like filters, a comparator
//! may carry a [`Reactive`] source that triggers index updates.

use crate::indexer::IndexHandle;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::cmp::Ordering;
use core::fmt;
use keyview_core::{Error, KeyedCollection, Reactive, Result, Unsubscribe};

/// Shared comparator type.
pub type Comparator<V> = Rc<dyn Fn(&V, &V) -> Ordering>;

const COMPONENT: &str = "AdapterSort";

/// Sort order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Order {
    /// Ascending order (smallest first)
    #[default]
    Asc,
    /// Descending order (largest first)
    Desc,
}

impl Order {
    /// Applies this order to a comparison result.
    #[inline]
    pub fn apply(&self, ord: Ordering) -> Ordering {
        match self {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        }
    }
}

/// A comparator definition passed to [`AdapterSort::set`].
pub struct Sort<V> {
    compare: Comparator<V>,
    source: Option<Rc<dyn Reactive>>,
}

impl<V: 'static> Sort<V> {
    /// Creates a new sort from a comparator.
    pub fn new<F>(compare: F) -> Self
    where
        F: Fn(&V, &V) -> Ordering + 'static,
    {
        Self {
            compare: Rc::new(compare),
            source: None,
        }
    }

    /// Creates a sort comparing the keys extracted by `key`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use keyview_reducer::{Order, Sort};
    ///
    /// let by_len = Sort::by_key(|s: &String| s.len(), Order::Desc);
    /// assert!(by_len.compare(&"aa".to_string(), &"b".to_string()).is_lt());
    /// ```
    pub fn by_key<K, F>(key: F, order: Order) -> Self
    where
        K: Ord + 'static,
        F: Fn(&V) -> K + 'static,
    {
        Self::new(move |a, b| order.apply(key(a).cmp(&key(b))))
    }
}

impl<V> Sort<V> {
    /// Makes the comparator reactive: `source` triggers index updates.
    pub fn subscribe_to<S>(mut self, source: S) -> Self
    where
        S: Reactive + 'static,
    {
        self.source = Some(Rc::new(source));
        self
    }

    /// Compares two values.
    #[inline]
    pub fn compare(&self, a: &V, b: &V) -> Ordering {
        (self.compare)(a, b)
    }

    /// Returns true if the comparator carries a reactive source.
    pub fn is_reactive(&self) -> bool {
        self.source.is_some()
    }
}

impl<V> Clone for Sort<V> {
    fn clone(&self) -> Self {
        Self {
            compare: Rc::clone(&self.compare),
            source: self.source.clone(),
        }
    }
}

impl<V> fmt::Debug for Sort<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sort")
            .field("reactive", &self.source.is_some())
            .finish()
    }
}

/// Conversion into a [`Sort`]: bare comparators and sorts both qualify.
pub trait IntoSort<V> {
    fn into_sort(self) -> Sort<V>;
}

impl<V: 'static, F> IntoSort<V> for F
where
    F: Fn(&V, &V) -> Ordering + 'static,
{
    fn into_sort(self) -> Sort<V> {
        Sort::new(self)
    }
}

impl<V> IntoSort<V> for Sort<V> {
    fn into_sort(self) -> Sort<V> {
        self
    }
}

/// Sort registry of one reducer index.
pub struct AdapterSort<C: KeyedCollection> {
    compare: Rc<RefCell<Option<Comparator<C::Value>>>>,
    unsubscribe: RefCell<Option<Unsubscribe>>,
    index: IndexHandle<C>,
}

impl<C: KeyedCollection> AdapterSort<C> {
    pub(crate) fn new(index: IndexHandle<C>) -> Self {
        Self {
            compare: index.engine().sort_cell(),
            unsubscribe: RefCell::new(None),
            index,
        }
    }

    /// Returns true if a comparator is set.
    pub fn is_set(&self) -> bool {
        self.compare.borrow().is_some()
    }

    /// Sets the comparator, replacing any previous one.
    ///
    /// A plain comparator forces an update. A reactive comparator only
    /// subscribes; its source drives the update.
    pub fn set(&self, sort: impl IntoSort<C::Value>) -> Result<()> {
        self.replace(Some(sort.into_sort()))
    }

    /// Sets or removes the comparator.
    ///
    /// Removing with `None` runs an unforced update if a comparator was set.
    pub fn replace(&self, sort: Option<Sort<C::Value>>) -> Result<()> {
        self.ensure_alive()?;
        self.release();

        let Some(sort) = sort else {
            let previous = self.compare.borrow_mut().take();
            if previous.is_some() {
                tracing::debug!("sort removed");
                self.index.refresh(false)?;
            }
            return Ok(());
        };

        *self.compare.borrow_mut() = Some(sort.compare);
        tracing::debug!(reactive = sort.source.is_some(), "sort set");

        let Some(source) = sort.source else {
            return self.index.refresh(true);
        };

        match source.subscribe(self.index.trigger()) {
            Some(token) => {
                *self.unsubscribe.borrow_mut() = Some(token);
                Ok(())
            }
            None => {
                self.compare.borrow_mut().take();
                self.index.refresh(true)?;
                Err(Error::contract_violation(
                    COMPONENT,
                    "sort has a reactive source, but no unsubscribe was returned",
                ))
            }
        }
    }

    /// Removes the comparator; forced update if one was set.
    pub fn clear(&self) -> Result<()> {
        self.ensure_alive()?;
        let previous = self.compare.borrow_mut().take();
        self.release();
        if previous.is_some() {
            tracing::debug!("sort cleared");
            self.index.refresh(true)?;
        }
        Ok(())
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.index.is_destroyed() {
            return Err(Error::destroyed(COMPONENT));
        }
        self.index.ensure_idle()
    }

    fn release(&self) {
        let token = self.unsubscribe.borrow_mut().take();
        if let Some(mut token) = token {
            token.unsubscribe();
        }
    }
}

impl<C: KeyedCollection> fmt::Debug for AdapterSort<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterSort")
            .field("set", &self.is_set())
            .finish()
    }
}
