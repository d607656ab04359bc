//! Subscription primitives and a minimal writable store.
//!
//! This module provides subscriber handles, an ordered subscriber list, the
//! `Unsubscribe` token returned by every subscribe call, the [`Reactive`]
//! capability implemented by sources that can trigger a reducer update, and
//! [`Writable`], an observable value that implements it.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

/// Unique identifier for a subscription within a [`SubscriberList`].
pub type SubscriptionId = u64;

/// A shared subscriber callback.
///
/// Identity is the identity of the underlying allocation: clones of one
/// `Subscriber` are the same subscriber, two separately created subscribers
/// are distinct even when built from equal closures.
pub struct Subscriber<T: ?Sized> {
    callback: Rc<dyn Fn(&T)>,
}

impl<T: ?Sized> Subscriber<T> {
    /// Creates a new subscriber.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&T) + 'static,
    {
        Self {
            callback: Rc::new(callback),
        }
    }

    /// Invokes the callback.
    #[inline]
    pub fn call(&self, value: &T) {
        (self.callback)(value);
    }

    /// Returns true if both handles refer to the same subscriber.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        core::ptr::eq(
            Rc::as_ptr(&self.callback) as *const u8,
            Rc::as_ptr(&other.callback) as *const u8,
        )
    }
}

impl<T: ?Sized> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            callback: Rc::clone(&self.callback),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("callback", &Rc::as_ptr(&self.callback))
            .finish()
    }
}

/// Subscribers kept in registration order, deduplicated by identity.
pub struct SubscriberList<T: ?Sized> {
    entries: Vec<(SubscriptionId, Subscriber<T>)>,
    next_id: SubscriptionId,
}

impl<T: ?Sized> Default for SubscriberList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> SubscriberList<T> {
    /// Creates a new subscriber list.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Adds a subscriber.
    ///
    /// Returns `None` if the same subscriber is already registered.
    pub fn add(&mut self, subscriber: Subscriber<T>) -> Option<SubscriptionId> {
        if self.contains(&subscriber) {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, subscriber));
        Some(id)
    }

    /// Removes a subscriber by ID.
    ///
    /// Returns true if the subscription was found and removed.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        match self.entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Returns true if the subscriber is registered.
    pub fn contains(&self, subscriber: &Subscriber<T>) -> bool {
        self.entries.iter().any(|(_, entry)| entry.ptr_eq(subscriber))
    }

    /// Returns the subscribers in registration order.
    ///
    /// Notification iterates this snapshot so callbacks may unsubscribe freely.
    pub fn snapshot(&self) -> Vec<Subscriber<T>> {
        self.entries.iter().map(|(_, s)| s.clone()).collect()
    }

    /// Returns the number of subscribers.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no subscribers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clears all subscribers.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Token that releases a subscription.
///
/// Releasing is idempotent: only the first call has an effect. Dropping the
/// token without calling [`Unsubscribe::unsubscribe`] keeps the subscription.
#[must_use = "dropping an Unsubscribe keeps the subscription alive"]
pub struct Unsubscribe {
    release: Option<Box<dyn FnOnce()>>,
}

impl Unsubscribe {
    /// Creates a token running `release` on the first unsubscribe.
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Creates a token with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Releases the subscription.
    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// Returns true if the subscription has not been released yet.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}

/// A source that can notify a reducer index that it must recompute.
///
/// Filters and sort comparators carrying a `Reactive` source are subscribed
/// once on registration and unsubscribed once on removal. Implementations
/// must return the token that undoes the subscription; returning `None` is a
/// contract violation reported at registration.
pub trait Reactive {
    /// Registers `notify` to be invoked whenever the source changes.
    fn subscribe(&self, notify: Rc<dyn Fn()>) -> Option<Unsubscribe>;
}

struct WritableInner<T> {
    value: RefCell<T>,
    subscribers: RefCell<SubscriberList<T>>,
}

/// An observable value.
///
/// Subscribers run once immediately on subscription and again after every
/// change, in registration order.
///
/// # Example
///
/// ```rust
/// use keyview_core::store::Writable;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let store = Writable::new(1);
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let seen_clone = seen.clone();
/// let mut unsubscribe = store.subscribe(move |v| seen_clone.borrow_mut().push(*v));
///
/// store.set(2);
/// store.set(2); // unchanged, no notification
/// unsubscribe.unsubscribe();
/// store.set(3);
///
/// assert_eq!(*seen.borrow(), vec![1, 2]);
/// ```
pub struct Writable<T> {
    inner: Rc<WritableInner<T>>,
}

impl<T> Clone for Writable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Default + 'static> Default for Writable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: 'static> Writable<T> {
    /// Creates a new store holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(WritableInner {
                value: RefCell::new(value),
                subscribers: RefCell::new(SubscriberList::new()),
            }),
        }
    }

    /// Runs `f` with a reference to the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Subscribes to value changes; `handler` runs immediately.
    pub fn subscribe<F>(&self, handler: F) -> Unsubscribe
    where
        F: Fn(&T) + 'static,
        T: Clone,
    {
        self.subscribe_handler(&Subscriber::new(handler))
    }

    /// Subscribes an existing subscriber; a duplicate registration is a no-op.
    pub fn subscribe_handler(&self, subscriber: &Subscriber<T>) -> Unsubscribe
    where
        T: Clone,
    {
        let id = self.inner.subscribers.borrow_mut().add(subscriber.clone());
        let Some(id) = id else {
            return Unsubscribe::noop();
        };

        let current = self.get();
        subscriber.call(&current);

        let weak: Weak<WritableInner<T>> = Rc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.borrow_mut().remove(id);
            }
        })
    }

    /// Returns the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    fn notify(&self)
    where
        T: Clone,
    {
        let subscribers = self.inner.subscribers.borrow().snapshot();
        if subscribers.is_empty() {
            return;
        }
        let current = self.get();
        for subscriber in subscribers {
            subscriber.call(&current);
        }
    }
}

impl<T: Clone + 'static> Writable<T> {
    /// Returns a clone of the current value.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T: Clone + PartialEq + 'static> Writable<T> {
    /// Sets a new value, notifying subscribers if it changed.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        self.notify();
    }

    /// Updates the value with `f`, notifying subscribers if it changed.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }
}

impl<T: Clone + 'static> Reactive for Writable<T> {
    fn subscribe(&self, notify: Rc<dyn Fn()>) -> Option<Unsubscribe> {
        Some(Writable::subscribe(self, move |_| notify()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use alloc::vec;
    use core::cell::Cell;

    #[test]
    fn test_subscriber_identity() {
        let a: Subscriber<u32> = Subscriber::new(|_| {});
        let b: Subscriber<u32> = Subscriber::new(|_| {});
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_subscriber_list_add_dedup() {
        let mut list = SubscriberList::new();
        let sub: Subscriber<u32> = Subscriber::new(|_| {});

        assert_eq!(list.add(sub.clone()), Some(1));
        assert_eq!(list.add(sub.clone()), None);
        assert_eq!(list.add(Subscriber::new(|_| {})), Some(2));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_subscriber_list_remove() {
        let mut list: SubscriberList<u32> = SubscriberList::new();
        let id = list.add(Subscriber::new(|_| {})).unwrap();

        assert!(list.remove(id));
        assert!(list.is_empty());
        assert!(!list.remove(id)); // Already removed
    }

    #[test]
    fn test_subscriber_list_snapshot_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut list: SubscriberList<u32> = SubscriberList::new();
        for tag in 0..3u32 {
            let order = order.clone();
            list.add(Subscriber::new(move |_| order.borrow_mut().push(tag)));
        }

        for sub in list.snapshot() {
            sub.call(&0);
        }

        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn test_unsubscribe_idempotent() {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let mut token = Unsubscribe::new(move || count_clone.set(count_clone.get() + 1));

        assert!(token.is_active());
        token.unsubscribe();
        token.unsubscribe();

        assert_eq!(count.get(), 1);
        assert!(!token.is_active());
        assert!(!Unsubscribe::noop().is_active());
    }

    #[test]
    fn test_writable_subscribe_fires_immediately() {
        let store = Writable::new(String::from("a"));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();

        let _unsubscribe = store.subscribe(move |v: &String| seen_clone.borrow_mut().push(v.clone()));
        store.set(String::from("b"));

        assert_eq!(*seen.borrow(), vec![String::from("a"), String::from("b")]);
    }

    #[test]
    fn test_writable_set_unchanged_no_notification() {
        let store = Writable::new(5);
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let _unsubscribe = store.subscribe(move |_| count_clone.set(count_clone.get() + 1));

        store.set(5);
        store.update(|v| *v);

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_writable_unsubscribe() {
        let store = Writable::new(0);
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let mut unsubscribe = store.subscribe(move |_| count_clone.set(count_clone.get() + 1));

        assert_eq!(store.subscriber_count(), 1);
        unsubscribe.unsubscribe();
        assert_eq!(store.subscriber_count(), 0);

        store.set(1);
        assert_eq!(count.get(), 1);
        assert_eq!(store.get(), 1);
    }

    #[test]
    fn test_writable_duplicate_handler() {
        let store = Writable::new(0);
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let handler = Subscriber::new(move |_: &i32| count_clone.set(count_clone.get() + 1));

        let _first = store.subscribe_handler(&handler);
        let second = store.subscribe_handler(&handler);

        assert!(!second.is_active());
        assert_eq!(store.subscriber_count(), 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_writable_as_reactive() {
        let store = Writable::new(0);
        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();

        let token = Reactive::subscribe(&store, Rc::new(move || fired_clone.set(fired_clone.get() + 1)));
        let mut token = token.expect("writable returns an unsubscribe token");

        store.set(1);
        token.unsubscribe();
        store.set(2);

        assert_eq!(fired.get(), 2);
    }
}
