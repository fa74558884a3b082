#![forbid(unsafe_code)]

//! Listener bookkeeping shared by the view-model variants.
//!
//! A view-model has three kinds of listener state:
//!
//! - the **single slot** set by `listen`, replaced on every call;
//! - **keyed listeners** added by other view-models through `listen_vm`,
//!   each addressable by its [`ListenerKey`];
//! - **outgoing subscriptions** this view-model holds on others (created by
//!   `listen_to`), dropped when it is disposed or cleaned.
//!
//! Dispatch order is single slot first, then keyed listeners in
//! registration order. Callbacks run with no `RefCell` borrow held.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LISTENER_KEY: AtomicU64 = AtomicU64::new(1);

/// Handle for one keyed listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerKey(u64);

impl ListenerKey {
    fn next() -> Self {
        Self(NEXT_LISTENER_KEY.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Result of registering a keyed listener: its key and the value current at
/// registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct Listening<T> {
    pub key: ListenerKey,
    pub current: T,
}

pub(crate) type Callback<T> = Rc<dyn Fn(&T)>;

pub(crate) struct ListenerTable<T> {
    single: RefCell<Option<Callback<T>>>,
    keyed: RefCell<Vec<(ListenerKey, Callback<T>)>>,
    outgoing: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl<T> Default for ListenerTable<T> {
    fn default() -> Self {
        Self {
            single: RefCell::new(None),
            keyed: RefCell::new(Vec::new()),
            outgoing: RefCell::new(Vec::new()),
        }
    }
}

impl<T> ListenerTable<T> {
    pub(crate) fn set_single(&self, callback: Callback<T>) {
        // Bind first so the replaced callback drops after the borrow ends.
        let previous = self.single.borrow_mut().replace(callback);
        drop(previous);
    }

    pub(crate) fn clear_single(&self) -> bool {
        let previous = self.single.borrow_mut().take();
        previous.is_some()
    }

    pub(crate) fn has_single(&self) -> bool {
        self.single.borrow().is_some()
    }

    pub(crate) fn add_keyed(&self, callback: Callback<T>) -> ListenerKey {
        let key = ListenerKey::next();
        self.keyed.borrow_mut().push((key, callback));
        key
    }

    pub(crate) fn remove_keyed(&self, key: ListenerKey) -> bool {
        let removed = {
            let mut keyed = self.keyed.borrow_mut();
            keyed
                .iter()
                .position(|(k, _)| *k == key)
                .map(|index| keyed.remove(index))
        };
        removed.is_some()
    }

    pub(crate) fn clear_keyed(&self) -> usize {
        let removed = std::mem::take(&mut *self.keyed.borrow_mut());
        removed.len()
    }

    pub(crate) fn keyed_count(&self) -> usize {
        self.keyed.borrow().len()
    }

    /// Remember how to undo a subscription this container holds elsewhere.
    pub(crate) fn track_outgoing(&self, detach: Box<dyn FnOnce()>) {
        self.outgoing.borrow_mut().push(detach);
    }

    pub(crate) fn outgoing_count(&self) -> usize {
        self.outgoing.borrow().len()
    }

    /// Run every tracked detach closure. Returns how many ran.
    pub(crate) fn drop_outgoing(&self) -> usize {
        let detach = std::mem::take(&mut *self.outgoing.borrow_mut());
        let count = detach.len();
        for undo in detach {
            undo();
        }
        count
    }

    /// Drop the single slot and every keyed listener.
    pub(crate) fn clear_incoming(&self) {
        self.clear_single();
        self.clear_keyed();
    }

    pub(crate) fn dispatch(&self, value: &T) {
        let single = self.single.borrow().clone();
        let keyed: Vec<Callback<T>> = self
            .keyed
            .borrow()
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        if let Some(callback) = single {
            callback(value);
        }
        for callback in keyed {
            callback(value);
        }
    }
}

/// A container other view-models can attach keyed listeners to.
///
/// Implemented by [`ViewModel`](crate::ViewModel) and
/// [`AsyncViewModel`](crate::AsyncViewModel); used by `listen_to`.
pub trait ListenVm {
    type Value: Clone + 'static;

    /// Add a keyed listener, optionally calling it right away with the
    /// current value.
    fn add_vm_listener(
        &self,
        callback: Rc<dyn Fn(&Self::Value)>,
        call_on_init: bool,
    ) -> Listening<Self::Value>;

    fn remove_vm_listener(&self, key: ListenerKey) -> bool;

    /// A closure that removes `key` from this container if it is still
    /// alive. Holds only a weak reference.
    fn vm_listener_remover(&self, key: ListenerKey) -> Box<dyn FnOnce()>;
}
