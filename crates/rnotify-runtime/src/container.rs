#![forbid(unsafe_code)]

//! Machinery shared by every container variant.
//!
//! Notifiers, view-models and async view-models differ in what they store
//! and which hooks they run, but they propagate updates the same way. That
//! common part lives in [`ContainerCore`]:
//!
//! - **Re-entrancy guard.** The registry owns one [`Propagation`] set of
//!   keys currently mid-update. A container whose key is already in the set
//!   refuses to start another update, which breaks structural cycles in the
//!   related graph at runtime.
//! - **Parent propagation.** After broadcasting to its own listeners a
//!   container calls `notify_listeners` on every parent, which repeats the
//!   same guarded broadcast one level up.
//! - **Overflow accounting.** Each container counts notifications inside a
//!   sliding window and logs a warning when the count passes the threshold.
//!   The update still proceeds.
//!
//! # Invariants
//!
//! 1. Own listeners run before any parent's listeners (self-before-parents).
//! 2. A key is never re-entered while it is mid-update on the same stack.
//! 3. The guard is released on every exit path, including panics.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use ahash::AHashSet;
use rnotify_core::{Clock, Key};
use tracing::{trace, warn};
use web_time::{Duration, Instant};

use crate::config::NotifierConfig;
use crate::registry::RegistryShared;

/// The closed set of container variants a record can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Plain value container ([`Notifier`](crate::Notifier)).
    Notifier,
    /// Synchronous business-logic container ([`ViewModel`](crate::ViewModel)).
    ViewModel,
    /// Asynchronous business-logic container ([`AsyncViewModel`](crate::AsyncViewModel)).
    AsyncViewModel,
}

impl ContainerKind {
    /// Whether teardown has to dispose a view-model payload.
    #[must_use]
    pub const fn is_view_model(self) -> bool {
        matches!(self, Self::ViewModel | Self::AsyncViewModel)
    }
}

/// Anything addressable by a registry key.
pub trait Keyed {
    fn key(&self) -> &Key;
}

// ---------------------------------------------------------------------------
// Propagation: registry-wide re-entrancy set + overflow settings
// ---------------------------------------------------------------------------

pub(crate) struct Propagation {
    updating: RefCell<AHashSet<Key>>,
    clock: Clock,
    window: Duration,
    threshold: u32,
    overflow_events: Cell<u64>,
}

impl Propagation {
    pub(crate) fn new(clock: Clock, config: &NotifierConfig) -> Rc<Self> {
        Rc::new(Self {
            updating: RefCell::new(AHashSet::new()),
            clock,
            window: config.overflow_window,
            threshold: config.overflow_threshold,
            overflow_events: Cell::new(0),
        })
    }

    fn enter(self: &Rc<Self>, key: &Key) -> Option<UpdateGuard> {
        if !self.updating.borrow_mut().insert(key.clone()) {
            return None;
        }
        Some(UpdateGuard {
            propagation: Rc::clone(self),
            key: key.clone(),
        })
    }

    pub(crate) fn is_updating(&self, key: &Key) -> bool {
        self.updating.borrow().contains(key)
    }

    pub(crate) fn overflow_events(&self) -> u64 {
        self.overflow_events.get()
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.clock
    }

    pub(crate) fn reset(&self) {
        self.updating.borrow_mut().clear();
    }
}

/// Removes its key from the updating set on drop.
pub(crate) struct UpdateGuard {
    propagation: Rc<Propagation>,
    key: Key,
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        self.propagation.updating.borrow_mut().remove(&self.key);
    }
}

// ---------------------------------------------------------------------------
// NotificationWindow
// ---------------------------------------------------------------------------

/// Sliding-window notification counter.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct NotificationWindow {
    first: Option<Instant>,
    count: u32,
}

impl NotificationWindow {
    /// Count one notification at `now`. Returns `true` exactly once per
    /// window: on the notification that first exceeds `threshold`.
    pub(crate) fn record(&mut self, now: Instant, window: Duration, threshold: u32) -> bool {
        match self.first {
            Some(start) if now.saturating_duration_since(start) < window => {
                self.count = self.count.saturating_add(1);
            }
            _ => {
                self.first = Some(now);
                self.count = 1;
            }
        }
        self.count == threshold.saturating_add(1)
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }
}

// ---------------------------------------------------------------------------
// ContainerCore
// ---------------------------------------------------------------------------

/// Registration facts handed from the registry to a new container.
pub(crate) struct CoreSeed {
    pub(crate) key: Key,
    pub(crate) auto_dispose: bool,
    pub(crate) related: Vec<Key>,
    pub(crate) registry: Weak<RegistryShared>,
    pub(crate) propagation: Rc<Propagation>,
}

pub(crate) struct ParentEdge {
    key: Key,
    container: Weak<dyn Container>,
}

pub(crate) struct ContainerCore {
    key: Key,
    kind: ContainerKind,
    payload_type: TypeId,
    type_name: &'static str,
    auto_dispose: bool,
    declared_related: Vec<Key>,
    registry: Weak<RegistryShared>,
    propagation: Rc<Propagation>,
    parents: RefCell<Vec<ParentEdge>>,
    children: RefCell<Vec<Key>>,
    window: RefCell<NotificationWindow>,
    disposed: Cell<bool>,
}

impl ContainerCore {
    pub(crate) fn new<P: 'static>(seed: CoreSeed, kind: ContainerKind) -> Self {
        Self {
            key: seed.key,
            kind,
            payload_type: TypeId::of::<P>(),
            type_name: std::any::type_name::<P>(),
            auto_dispose: seed.auto_dispose,
            declared_related: seed.related,
            registry: seed.registry,
            propagation: seed.propagation,
            parents: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            window: RefCell::new(NotificationWindow::default()),
            disposed: Cell::new(false),
        }
    }

    pub(crate) fn key(&self) -> &Key {
        &self.key
    }

    pub(crate) fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub(crate) fn payload_type(&self) -> TypeId {
        self.payload_type
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn auto_dispose(&self) -> bool {
        self.auto_dispose
    }

    pub(crate) fn declared_related(&self) -> &[Key] {
        &self.declared_related
    }

    pub(crate) fn registry(&self) -> Option<Rc<RegistryShared>> {
        self.registry.upgrade()
    }

    pub(crate) fn clock(&self) -> &Clock {
        self.propagation.clock()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub(crate) fn set_disposed(&self, disposed: bool) {
        self.disposed.set(disposed);
    }

    pub(crate) fn is_updating(&self) -> bool {
        self.propagation.is_updating(&self.key)
    }

    /// Claim this key for one update. `None` when already mid-update.
    pub(crate) fn begin_update(&self) -> Option<UpdateGuard> {
        let guard = self.propagation.enter(&self.key);
        if guard.is_none() {
            trace!(key = %self.key, "update skipped: container is already updating");
        }
        guard
    }

    /// Overflow accounting for one notification.
    pub(crate) fn record_notification(&self) {
        let p = &self.propagation;
        let overflowed = self
            .window
            .borrow_mut()
            .record(p.clock.now(), p.window, p.threshold);
        if overflowed {
            p.overflow_events.set(p.overflow_events.get() + 1);
            warn!(
                key = %self.key,
                type_name = self.type_name,
                threshold = p.threshold,
                window_ms = p.window.as_millis() as u64,
                "notification overflow: possible infinite update loop"
            );
        }
    }

    pub(crate) fn notifications_in_window(&self) -> u32 {
        self.window.borrow().count()
    }

    /// Broadcast to every live parent, each through its own guard.
    pub(crate) fn notify_parents(&self) {
        let parents: Vec<Rc<dyn Container>> = self
            .parents
            .borrow()
            .iter()
            .filter_map(|edge| edge.container.upgrade())
            .collect();
        for parent in parents {
            trace!(child = %self.key, parent = %parent.core().key, "notifying parent");
            parent.notify_listeners();
        }
    }

    pub(crate) fn add_parent(&self, key: Key, container: Weak<dyn Container>) {
        let mut parents = self.parents.borrow_mut();
        if !parents.iter().any(|edge| edge.key == key) {
            parents.push(ParentEdge { key, container });
        }
    }

    pub(crate) fn remove_parent(&self, key: &Key) {
        self.parents.borrow_mut().retain(|edge| &edge.key != key);
    }

    pub(crate) fn parent_count(&self) -> usize {
        self.parents.borrow().len()
    }

    pub(crate) fn add_child(&self, key: Key) {
        let mut children = self.children.borrow_mut();
        if !children.contains(&key) {
            children.push(key);
        }
    }

    pub(crate) fn remove_child(&self, key: &Key) {
        self.children.borrow_mut().retain(|child| child != key);
    }

    pub(crate) fn child_keys(&self) -> Vec<Key> {
        self.children.borrow().clone()
    }

    /// Drop every edge, returning `(parents, children)` so the registry can
    /// remove the mirrored halves.
    pub(crate) fn take_edges(&self) -> (Vec<Key>, Vec<Key>) {
        let parents = self
            .parents
            .take()
            .into_iter()
            .map(|edge| edge.key)
            .collect();
        (parents, self.children.take())
    }
}

// ---------------------------------------------------------------------------
// Container: the erased view the registry works with
// ---------------------------------------------------------------------------

pub(crate) trait Container: 'static {
    fn core(&self) -> &ContainerCore;

    /// Deliver the current value to this container's own listeners.
    fn broadcast(&self);

    /// Drop single-slot and keyed listeners.
    fn stop_all_listeners(&self);

    /// Runs once the record is stored in the registry.
    fn activate(&self) {}

    /// Dispose the view-model payload. Notifiers have nothing to dispose.
    fn dispose_payload(&self) {}

    /// Reset to a freshly initialized state under the same key.
    fn reinitialize(&self) -> bool;

    /// A host context just became available for this container.
    fn context_available(&self) {}

    /// Guarded broadcast without a value change, then up to the parents.
    fn notify_listeners(&self) {
        guarded_update(self, || {});
    }
}

/// The update protocol every notifying write follows: claim the key,
/// count the notification, `write`, broadcast, then notify parents.
///
/// Returns `false` without calling `write` when the key is already
/// mid-update.
pub(crate) fn guarded_update<C: Container + ?Sized>(container: &C, write: impl FnOnce()) -> bool {
    let core = container.core();
    let Some(_guard) = core.begin_update() else {
        return false;
    };
    core.record_notification();
    write();
    container.broadcast();
    core.notify_parents();
    true
}
