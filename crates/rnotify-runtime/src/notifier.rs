#![forbid(unsafe_code)]

//! The simple value container.
//!
//! A [`Notifier<T>`] wraps an [`ObservableValue<T>`] and adds what the
//! registry needs: a key, the single-slot listener, related-state
//! propagation to parents, and a stored factory used by
//! [`Registry::reinitialize`](crate::Registry::reinitialize).
//!
//! Writes come in two flavours. `update_state` and `transform_state`
//! broadcast (own subscribers, then the single-slot listener, then every
//! parent); the `_silently` variants only store.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rnotify_core::{Key, ObservableValue, Subscription};

use crate::container::{Container, ContainerCore, ContainerKind, CoreSeed, Keyed, guarded_update};
use crate::listeners::Callback;
use crate::selector::Subscribable;

pub(crate) struct NotifierInner<T> {
    core: ContainerCore,
    value: ObservableValue<T>,
    listener: RefCell<Option<Callback<T>>>,
    factory: Box<dyn Fn() -> T>,
}

impl<T: Clone + PartialEq + 'static> NotifierInner<T> {
    pub(crate) fn create(seed: CoreSeed, factory: Box<dyn Fn() -> T>) -> Rc<Self> {
        let initial = factory();
        Rc::new(Self {
            core: ContainerCore::new::<T>(seed, ContainerKind::Notifier),
            value: ObservableValue::new(initial),
            listener: RefCell::new(None),
            factory,
        })
    }
}

impl<T: Clone + PartialEq + 'static> Container for NotifierInner<T> {
    fn core(&self) -> &ContainerCore {
        &self.core
    }

    fn broadcast(&self) {
        self.value.notify();
        let listener = self.listener.borrow().clone();
        if let Some(listener) = listener {
            let current = self.value.get();
            listener(&current);
        }
    }

    fn stop_all_listeners(&self) {
        let listener = self.listener.borrow_mut().take();
        drop(listener);
        self.value.clear_subscribers();
    }

    fn reinitialize(&self) -> bool {
        guarded_update(self, || {
            self.value.replace((self.factory)());
        })
    }
}

/// Key-addressed value holder. Cloning yields another handle to the same
/// container.
pub struct Notifier<T> {
    inner: Rc<NotifierInner<T>>,
}

impl<T> Clone for Notifier<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Notifier<T> {
    pub(crate) fn from_inner(inner: Rc<NotifierInner<T>>) -> Self {
        Self { inner }
    }

    #[must_use]
    pub fn key(&self) -> &Key {
        self.inner.core.key()
    }

    /// Clone of the current value.
    #[must_use]
    pub fn value(&self) -> T {
        self.inner.value.get()
    }

    /// Borrow the current value. `f` must not write to this notifier.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.value.with(f)
    }

    /// Number of stored writes.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.value.version()
    }

    /// Store `next` and broadcast, unless it equals the current value or
    /// this notifier is already mid-update.
    pub fn update_state(&self, next: T) {
        if self.inner.value.with(|current| *current == next) {
            return;
        }
        let inner = &*self.inner;
        guarded_update(inner, || {
            inner.value.replace(next);
        });
    }

    /// Store `next` without notifying anyone.
    pub fn update_silently(&self, next: T) {
        self.inner.value.replace(next);
    }

    pub fn transform_state(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.value());
        self.update_state(next);
    }

    pub fn transform_state_silently(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.value());
        self.update_silently(next);
    }

    /// Install the single-slot listener, replacing any previous one.
    /// Returns the current value.
    pub fn listen(&self, callback: impl Fn(&T) + 'static) -> T {
        let previous = self.inner.listener.borrow_mut().replace(Rc::new(callback));
        drop(previous);
        self.value()
    }

    /// Remove the single-slot listener. Safe when none is set.
    pub fn stop_listening(&self) {
        let previous = self.inner.listener.borrow_mut().take();
        drop(previous);
    }

    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.inner.listener.borrow().is_some()
    }

    /// Observe every broadcast while the returned [`Subscription`] lives.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.inner.value.subscribe(callback)
    }

    /// Broadcast the current value without changing it.
    pub fn notify_listeners(&self) {
        self.inner.notify_listeners();
    }

    /// Containers that list this one as related.
    #[must_use]
    pub fn parent_count(&self) -> usize {
        self.inner.core.parent_count()
    }

    /// Keys of the containers this one lists as related.
    #[must_use]
    pub fn child_keys(&self) -> Vec<Key> {
        self.inner.core.child_keys()
    }

    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.inner.core.is_updating()
    }

    /// Notifications counted in the current overflow window.
    #[must_use]
    pub fn notifications_in_window(&self) -> u32 {
        self.inner.core.notifications_in_window()
    }

    /// Removed from its registry.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.core.is_disposed()
    }
}

impl<T: Clone + PartialEq + 'static> Keyed for Notifier<T> {
    fn key(&self) -> &Key {
        self.inner.core.key()
    }
}

impl<T: Clone + PartialEq + 'static> Subscribable for Notifier<T> {
    type Value = T;

    fn current(&self) -> T {
        self.value()
    }

    fn watch(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.subscribe(callback)
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> fmt::Debug for Notifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("key", self.key())
            .field("value", &self.value())
            .field("version", &self.version())
            .finish()
    }
}
