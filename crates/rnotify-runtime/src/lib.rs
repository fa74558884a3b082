#![forbid(unsafe_code)]

//! Runtime: the registry and the three container variants built on it.
//!
//! - [`Notifier<T>`] holds a plain value.
//! - [`ViewModel<L>`] wraps a value with synchronous business logic and a
//!   lifecycle ([`ViewModelLogic`]).
//! - [`AsyncViewModel<L>`] drives an [`AsyncState`] through cancellable
//!   loads ([`AsyncViewModelLogic`]).
//!
//! All of them are created through a [`Registry`], addressed by
//! [`Key`](rnotify_core::Key), and can declare related children whose
//! updates propagate up to them. Auto-dispose containers are torn down a
//! configurable delay after their last reference goes away; the registry
//! fires those deadlines from [`Registry::poll_timers`].
//!
//! Everything here is single-threaded (`Rc` based). Create one registry per
//! UI thread.

pub mod async_state;
pub mod async_view_model;
pub mod config;
mod container;
pub mod context;
mod lifecycle;
pub mod listeners;
pub mod notifier;
pub mod registry;
pub mod selector;
pub mod view_model;

pub use async_state::{AsyncError, AsyncState};
pub use async_view_model::{AsyncViewModel, AsyncViewModelLogic, LoadContext};
pub use config::{
    ConfigError, DEFAULT_DISPOSE_DELAY, DEFAULT_OVERFLOW_THRESHOLD, DEFAULT_OVERFLOW_WINDOW,
    NotifierConfig,
};
pub use container::{ContainerKind, Keyed};
pub use context::{ContextBridge, ContextHandle};
pub use listeners::{ListenVm, ListenerKey, Listening};
pub use notifier::Notifier;
pub use registry::{Options, RecordInfo, Registry, RegistryBuilder};
pub use selector::{Selector, Subscribable};
pub use view_model::{Lifecycle, ViewModel, ViewModelLogic};

pub use rnotify_core::{BoxError, Clock, Cx, Key, LabClock, NotifierError, ReferenceId, Result, Subscription};
