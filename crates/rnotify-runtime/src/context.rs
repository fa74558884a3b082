#![forbid(unsafe_code)]

//! Bridge between containers and the host UI's context objects.
//!
//! The host registers a [`ContextHandle`] for a container key when a
//! component that owns that container mounts, and may install one global
//! fallback at startup. Lookup is two-tier and always in this order:
//!
//! 1. the handle registered for the container's key,
//! 2. the global handle.
//!
//! Mutation goes through the [`Registry`](crate::Registry) so that async
//! view-models waiting for a context are woken up when one appears.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use rnotify_core::{Key, NotifierError};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, cheaply clonable wrapper around a host context object.
#[derive(Clone)]
pub struct ContextHandle {
    id: u64,
    value: Rc<dyn Any>,
}

impl ContextHandle {
    /// Wrap any host context value.
    pub fn new<C: 'static>(value: C) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            value: Rc::new(value),
        }
    }

    /// Stable id of this handle (clones share it).
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Borrow the wrapped value as `C`.
    #[must_use]
    pub fn downcast_ref<C: 'static>(&self) -> Option<&C> {
        self.value.downcast_ref::<C>()
    }

    /// Whether two handles wrap the same context.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle").field("id", &self.id).finish()
    }
}

/// Per-key context registry with a global fallback.
#[derive(Default)]
pub struct ContextBridge {
    instances: RefCell<AHashMap<Key, ContextHandle>>,
    global: RefCell<Option<ContextHandle>>,
}

impl ContextBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `key`, returning the handle it replaced.
    pub(crate) fn register(&self, key: Key, handle: ContextHandle) -> Option<ContextHandle> {
        self.instances.borrow_mut().insert(key, handle)
    }

    pub(crate) fn unregister(&self, key: &Key) -> Option<ContextHandle> {
        self.instances.borrow_mut().remove(key)
    }

    /// Install the global fallback, returning the previous one.
    pub(crate) fn init_global(&self, handle: ContextHandle) -> Option<ContextHandle> {
        self.global.borrow_mut().replace(handle)
    }

    pub(crate) fn clear_global(&self) -> Option<ContextHandle> {
        self.global.borrow_mut().take()
    }

    pub(crate) fn clear(&self) {
        self.instances.borrow_mut().clear();
        self.global.borrow_mut().take();
    }

    /// Instance handle first, then the global one.
    #[must_use]
    pub fn get_for(&self, key: &Key) -> Option<ContextHandle> {
        if let Some(handle) = self.instances.borrow().get(key) {
            return Some(handle.clone());
        }
        self.global.borrow().clone()
    }

    /// Handle registered for `key` only, ignoring the global fallback.
    #[must_use]
    pub fn instance_for(&self, key: &Key) -> Option<ContextHandle> {
        self.instances.borrow().get(key).cloned()
    }

    #[must_use]
    pub fn global(&self) -> Option<ContextHandle> {
        self.global.borrow().clone()
    }

    #[must_use]
    pub fn has_context(&self, key: &Key) -> bool {
        self.instances.borrow().contains_key(key) || self.global.borrow().is_some()
    }

    #[must_use]
    pub fn has_global(&self) -> bool {
        self.global.borrow().is_some()
    }

    /// Like [`get_for`](Self::get_for) but fails with an error naming
    /// `operation` when no context is reachable.
    pub fn require_context(
        &self,
        key: &Key,
        operation: &str,
    ) -> Result<ContextHandle, NotifierError> {
        self.get_for(key)
            .ok_or_else(|| NotifierError::missing_context(operation, key.clone()))
    }

    /// Number of per-key registrations.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.instances.borrow().len()
    }
}

impl fmt::Debug for ContextBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBridge")
            .field("instances", &self.instances.borrow().len())
            .field("global", &self.global.borrow().as_ref().map(ContextHandle::id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Theme(&'static str);

    #[test]
    fn handle_downcasts_to_wrapped_type() {
        let handle = ContextHandle::new(Theme("dark"));
        assert_eq!(handle.downcast_ref::<Theme>(), Some(&Theme("dark")));
        assert!(handle.downcast_ref::<String>().is_none());
        assert!(handle.same(&handle.clone()));
        assert!(!handle.same(&ContextHandle::new(Theme("dark"))));
    }

    #[test]
    fn instance_wins_over_global() {
        let bridge = ContextBridge::new();
        let key = Key::named("vm");
        let global = ContextHandle::new(Theme("global"));
        let local = ContextHandle::new(Theme("local"));

        bridge.init_global(global.clone());
        assert!(bridge.get_for(&key).is_some_and(|h| h.same(&global)));

        bridge.register(key.clone(), local.clone());
        assert!(bridge.get_for(&key).is_some_and(|h| h.same(&local)));

        bridge.unregister(&key);
        assert!(bridge.get_for(&key).is_some_and(|h| h.same(&global)));
    }

    #[test]
    fn require_context_names_operation() {
        let bridge = ContextBridge::new();
        let err = bridge
            .require_context(&Key::named("cart"), "fetch cart")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("fetch cart"));
        assert!(msg.contains("cart"));
    }

    #[test]
    fn has_context_considers_both_tiers() {
        let bridge = ContextBridge::new();
        let key = Key::named("k");
        assert!(!bridge.has_context(&key));
        bridge.register(key.clone(), ContextHandle::new(()));
        assert!(bridge.has_context(&key));
        assert!(!bridge.has_context(&Key::named("other")));
        bridge.init_global(ContextHandle::new(()));
        assert!(bridge.has_context(&Key::named("other")));
    }

    #[test]
    fn clear_drops_everything() {
        let bridge = ContextBridge::new();
        bridge.register(Key::named("a"), ContextHandle::new(1u8));
        bridge.init_global(ContextHandle::new(2u8));
        bridge.clear();
        assert_eq!(bridge.registered_count(), 0);
        assert!(!bridge.has_global());
        assert!(bridge.clear_global().is_none());
    }

    #[test]
    fn instance_for_ignores_global() {
        let bridge = ContextBridge::new();
        bridge.init_global(ContextHandle::new(()));
        assert!(bridge.instance_for(&Key::named("x")).is_none());
        assert!(bridge.global().is_some());
    }
}
