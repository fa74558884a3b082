#![forbid(unsafe_code)]

//! Memoized projections of a container's value.
//!
//! A [`Selector<S>`] subscribes to a source container, applies a projection
//! on every broadcast and stores the result in its own
//! [`ObservableValue<S>`]. Its subscribers only hear about broadcasts that
//! actually change the projection, so a widget that renders one field of a
//! large state does not re-render when another field changes.
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use rnotify_runtime::{Options, Registry, Selector};
//!
//! #[derive(Clone, PartialEq)]
//! struct User { name: String, visits: u32 }
//!
//! let registry = Registry::new();
//! let user = registry
//!     .create_notifier(Options::new(), || User { name: "ada".into(), visits: 0 })
//!     .unwrap();
//! let name = Selector::new(&user, |u: &User| u.name.clone());
//!
//! let renders = Rc::new(Cell::new(0));
//! let r = Rc::clone(&renders);
//! let _sub = name.subscribe(move |_| r.set(r.get() + 1));
//!
//! user.transform_state(|u| User { visits: u.visits + 1, ..u.clone() });
//! assert_eq!(renders.get(), 0);
//! user.transform_state(|u| User { name: "grace".into(), ..u.clone() });
//! assert_eq!(renders.get(), 1);
//! assert_eq!(name.get(), "grace");
//! ```

use std::fmt;
use std::rc::Rc;

use rnotify_core::{ObservableValue, Subscription};

/// A container that can be observed by a [`Selector`].
pub trait Subscribable {
    type Value: Clone + 'static;

    /// The value right now.
    fn current(&self) -> Self::Value;

    /// Observe broadcasts while the returned [`Subscription`] lives.
    fn watch(&self, callback: impl Fn(&Self::Value) + 'static) -> Subscription;
}

/// Derived value that follows a source through a projection.
pub struct Selector<S> {
    value: ObservableValue<S>,
    _source: Subscription,
}

impl<S: Clone + PartialEq + 'static> Selector<S> {
    /// Follow `source` through `project`. The projection runs once now and
    /// again on every broadcast of `source`.
    pub fn new<Src: Subscribable>(
        source: &Src,
        project: impl Fn(&Src::Value) -> S + 'static,
    ) -> Self {
        let project = Rc::new(project);
        let value = ObservableValue::new(project(&source.current()));
        let target = value.clone();
        let source_sub = source.watch(move |next| {
            target.set(project(next));
        });
        Self {
            value,
            _source: source_sub,
        }
    }

    #[must_use]
    pub fn get(&self) -> S {
        self.value.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        self.value.with(f)
    }

    /// How many times the projection changed.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.value.version()
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&S) + 'static) -> Subscription {
        self.value.subscribe(callback)
    }
}

impl<S: Clone + PartialEq + 'static> Subscribable for Selector<S> {
    type Value = S;

    fn current(&self) -> S {
        self.get()
    }

    fn watch(&self, callback: impl Fn(&S) + 'static) -> Subscription {
        self.subscribe(callback)
    }
}

impl<S: fmt::Debug + Clone + 'static> fmt::Debug for Selector<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector").field("value", &self.value).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Options, Registry};
    use std::cell::Cell;

    #[test]
    fn projection_tracks_source() {
        let registry = Registry::new();
        let n = registry.create_notifier(Options::new(), || 3).unwrap();
        let parity = Selector::new(&n, |v: &i32| v % 2 == 0);
        assert!(!parity.get());

        n.update_state(4);
        assert!(parity.get());
        assert_eq!(parity.version(), 1);
    }

    #[test]
    fn unchanged_projection_is_silent() {
        let registry = Registry::new();
        let n = registry.create_notifier(Options::new(), || 1).unwrap();
        let sign = Selector::new(&n, |v: &i32| v.signum());
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = sign.subscribe(move |_| h.set(h.get() + 1));

        n.update_state(2);
        n.update_state(7);
        assert_eq!(hits.get(), 0);
        n.update_state(-1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn selectors_chain() {
        let registry = Registry::new();
        let n = registry.create_notifier(Options::new(), || 10).unwrap();
        let doubled = Selector::new(&n, |v: &i32| v * 2);
        let label = Selector::new(&doubled, |v: &i32| format!("{v}"));
        n.update_state(21);
        assert_eq!(label.get(), "42");
    }

    #[test]
    fn dropping_selector_detaches_from_source() {
        let registry = Registry::new();
        let n = registry.create_notifier(Options::new(), || 0).unwrap();
        let sel = Selector::new(&n, |v: &i32| *v);
        drop(sel);
        n.update_state(1);
        assert_eq!(n.value(), 1);
    }
}
