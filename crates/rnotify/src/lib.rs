#![forbid(unsafe_code)]

//! rnotify public facade crate.
//!
//! Key-addressed reactive state containers with related-state propagation,
//! reference-counted auto-dispose and async loading.
//!
//! ```
//! use rnotify::prelude::*;
//!
//! let registry = Registry::new();
//! let filter = registry.create_notifier(Options::new().with_key("filter"), || 0u32).unwrap();
//! let list = registry
//!     .create_notifier(Options::new().with_key("list").with_related(&filter), || 0u32)
//!     .unwrap();
//! assert_eq!(list.child_keys(), vec![Key::named("filter")]);
//! filter.update_state(2);
//! assert_eq!(filter.value(), 2);
//! ```

pub use rnotify_runtime::{
    AsyncError, AsyncState, AsyncViewModel, AsyncViewModelLogic, BoxError, Clock, ContextHandle,
    Key, LabClock, Lifecycle, LoadContext, Notifier, NotifierConfig, NotifierError, Options,
    ReferenceId, Registry, Result, Selector, ViewModel, ViewModelLogic,
};

pub mod prelude {
    pub use rnotify_core as core;
    pub use rnotify_runtime as runtime;

    pub use rnotify_runtime::{
        AsyncState, AsyncViewModel, AsyncViewModelLogic, Key, Keyed, ListenVm, LoadContext,
        Notifier, Options, Registry, Selector, Subscribable, ViewModel, ViewModelLogic,
    };
}
