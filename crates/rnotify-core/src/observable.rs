#![forbid(unsafe_code)]

//! Shared, version-tracked value with change notification.
//!
//! # Design
//!
//! [`ObservableValue<T>`] keeps its value and subscriber list behind
//! `Rc<RefCell<..>>`. The subscriber list only holds `Weak` references to
//! callbacks; the strong reference lives in the [`Subscription`] returned by
//! [`subscribe`](ObservableValue::subscribe). Dropping the subscription
//! therefore unsubscribes, and dead entries are pruned lazily during the
//! next broadcast.
//!
//! Containers built on top (notifiers, view-models) decide *when* to
//! broadcast, so besides the equality-checked [`set`](ObservableValue::set)
//! this type exposes a silent [`replace`](ObservableValue::replace) and an
//! explicit [`notify`](ObservableValue::notify).
//!
//! # Invariants
//!
//! 1. Version increments exactly once per write that stores a value.
//! 2. Subscribers are notified in registration order.
//! 3. `set` with a value equal to the current one is a no-op (no version
//!    bump, no notifications).
//! 4. No `RefCell` borrow is held while callbacks run, so callbacks may read
//!    or write the same observable.
//!
//! # Failure Modes
//!
//! - **Callback panics**: propagates to the writer. The value has already
//!   been stored; later subscribers in the same cycle are skipped.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = Box<dyn Fn(&T)>;

struct ObservableInner<T> {
    value: T,
    version: u64,
    subscribers: Vec<Weak<Callback<T>>>,
}

/// A shared value that broadcasts to subscribers.
///
/// Cloning creates another handle to the **same** value.
pub struct ObservableValue<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for ObservableValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ObservableValue")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + 'static> ObservableValue<T> {
    /// Wrap `value` with no subscribers.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Borrow the current value.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this observable.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Number of writes that stored a value.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Store `value` and notify, unless it equals the current value.
    ///
    /// Returns whether a write happened.
    pub fn set(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        if self.with(|current| *current == value) {
            return false;
        }
        self.replace(value);
        self.notify();
        true
    }

    /// Store `value` without notifying. Returns the previous value.
    pub fn replace(&self, value: T) -> T {
        let mut inner = self.inner.borrow_mut();
        inner.version += 1;
        std::mem::replace(&mut inner.value, value)
    }

    /// Apply `f` to the value in place, bump the version and notify.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        {
            let mut inner = self.inner.borrow_mut();
            f(&mut inner.value);
            inner.version += 1;
        }
        self.notify();
    }

    /// Broadcast the current value to every live subscriber.
    pub fn notify(&self) {
        let (value, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|weak| weak.strong_count() > 0);
            let callbacks: Vec<Rc<Callback<T>>> =
                inner.subscribers.iter().filter_map(Weak::upgrade).collect();
            (inner.value.clone(), callbacks)
        };
        for callback in callbacks {
            callback(&value);
        }
    }

    /// Register `callback`. It stays registered while the returned
    /// [`Subscription`] is alive.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Rc<Callback<T>> = Rc::new(Box::new(callback));
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        let guard: Rc<dyn Any> = strong;
        Subscription { guard: Some(guard) }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Forget every subscriber. Outstanding [`Subscription`]s become inert.
    pub fn clear_subscribers(&self) {
        self.inner.borrow_mut().subscribers.clear();
    }
}

/// RAII guard for an [`ObservableValue`] subscription.
#[must_use = "dropping the Subscription unsubscribes immediately"]
pub struct Subscription {
    guard: Option<Rc<dyn Any>>,
}

impl Subscription {
    /// A subscription that was never attached to anything.
    pub fn inert() -> Self {
        Self { guard: None }
    }

    /// Stop receiving notifications now.
    pub fn unsubscribe(mut self) {
        self.guard.take();
    }

    /// Whether the callback is still attached (the source may still have
    /// pruned it via `clear_subscribers`).
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.guard.is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn set_notifies_with_new_value() {
        let obs = ObservableValue::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = obs.subscribe(move |v| sink.borrow_mut().push(*v));

        assert!(obs.set(2));
        assert!(obs.set(3));
        assert_eq!(*seen.borrow(), vec![2, 3]);
        assert_eq!(obs.version(), 2);
    }

    #[test]
    fn equal_set_is_noop() {
        let obs = ObservableValue::new("a".to_string());
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = obs.subscribe(move |_| h.set(h.get() + 1));

        assert!(!obs.set("a".to_string()));
        assert_eq!(hits.get(), 0);
        assert_eq!(obs.version(), 0);
    }

    #[test]
    fn replace_is_silent_but_versions() {
        let obs = ObservableValue::new(10);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = obs.subscribe(move |_| h.set(h.get() + 1));

        assert_eq!(obs.replace(11), 10);
        assert_eq!(obs.get(), 11);
        assert_eq!(obs.version(), 1);
        assert_eq!(hits.get(), 0);

        obs.notify();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let obs = ObservableValue::new(0);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = obs.subscribe(move |_| h.set(h.get() + 1));
        assert_eq!(obs.subscriber_count(), 1);

        drop(sub);
        assert_eq!(obs.subscriber_count(), 0);
        obs.set(1);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn explicit_unsubscribe() {
        let obs = ObservableValue::new(0);
        let sub = obs.subscribe(|_| {});
        assert!(sub.is_attached());
        sub.unsubscribe();
        assert_eq!(obs.subscriber_count(), 0);
        assert!(!Subscription::inert().is_attached());
    }

    #[test]
    fn registration_order_is_preserved() {
        let obs = ObservableValue::new(0);
        let order = Rc::new(RefCell::new(Vec::new()));
        let subs: Vec<Subscription> = (0..4)
            .map(|i| {
                let o = Rc::clone(&order);
                obs.subscribe(move |_| o.borrow_mut().push(i))
            })
            .collect();
        obs.set(1);
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
        drop(subs);
    }

    #[test]
    fn callback_may_write_back() {
        let obs = ObservableValue::new(0);
        let handle = obs.clone();
        let _sub = obs.subscribe(move |v| {
            if *v < 3 {
                handle.set(v + 1);
            }
        });
        obs.set(1);
        assert_eq!(obs.get(), 3);
    }

    #[test]
    fn update_in_place_notifies() {
        let obs = ObservableValue::new(vec![1]);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = obs.subscribe(move |v: &Vec<i32>| h.set(v.len()));
        obs.update(|v| v.push(2));
        assert_eq!(hits.get(), 2);
        assert_eq!(obs.version(), 1);
    }

    #[test]
    fn clear_subscribers_detaches_all() {
        let obs = ObservableValue::new(0);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = obs.subscribe(move |_| h.set(h.get() + 1));
        obs.clear_subscribers();
        obs.set(5);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn debug_format() {
        let obs = ObservableValue::new(42);
        let dbg = format!("{obs:?}");
        assert!(dbg.contains("ObservableValue"));
        assert!(dbg.contains("42"));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn set_notifies_exactly_on_change(values in proptest::collection::vec(0u8..4, 0..64)) {
                let obs = ObservableValue::new(0u8);
                let hits = Rc::new(Cell::new(0usize));
                let h = Rc::clone(&hits);
                let _sub = obs.subscribe(move |_| h.set(h.get() + 1));

                let mut current = 0u8;
                let mut changes = 0usize;
                for value in values {
                    let wrote = obs.set(value);
                    prop_assert_eq!(wrote, value != current);
                    if wrote {
                        changes += 1;
                        current = value;
                    }
                }
                prop_assert_eq!(hits.get(), changes);
                prop_assert_eq!(obs.version(), changes as u64);
                prop_assert_eq!(obs.get(), current);
            }
        }
    }
}
