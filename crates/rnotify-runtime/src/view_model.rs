#![forbid(unsafe_code)]

//! Synchronous business-logic containers.
//!
//! A [`ViewModel<L>`] owns a value of type `L::Data` and delegates behavior
//! to a [`ViewModelLogic`] implementation: how to build the initial value,
//! what "empty" looks like, and which hooks to run around listener setup
//! and state changes.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──► Initializing ──► Active ──dispose──► Disposed
//!                        ▲                                  │
//!                        └──────────── access ──────────────┘
//! ```
//!
//! Reading or mutating a disposed view-model reinitializes it: `init` runs
//! again, the instance re-registers under its old key when the key is
//! free, and [`init_count`](ViewModel::init_count) goes up. The transition
//! is logged at `debug`.
//!
//! # Listeners
//!
//! - [`listen`](ViewModel::listen): single slot, replaced on every call.
//! - [`listen_vm`](ViewModel::listen_vm): keyed, many per view-model.
//! - [`listen_to`](ViewModel::listen_to): subscribe this view-model to
//!   another one; the subscription is dropped on dispose and clean.
//! - [`subscribe`](ViewModel::subscribe): RAII observer for the UI layer.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use rnotify_core::{BoxError, Key, NotifierError, ObservableValue, Result, Subscription};
use tracing::{debug, error, warn};

use crate::container::{Container, ContainerCore, ContainerKind, CoreSeed, Keyed, guarded_update};
use crate::context::ContextHandle;
use crate::listeners::{ListenVm, ListenerKey, ListenerTable, Listening};
use crate::selector::Subscribable;

/// Lifecycle of a view-model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Active,
    Disposed,
}

/// Behavior plugged into a [`ViewModel`].
///
/// Hooks take `&self`; implementations that need mutable state use
/// interior mutability.
pub trait ViewModelLogic: Sized + 'static {
    type Data: Clone + PartialEq + 'static;

    /// Build the initial value. Runs on creation and on every
    /// reinitialization.
    fn init(&self, vm: &ViewModel<Self>) -> std::result::Result<Self::Data, BoxError>;

    /// Value used before `init` completes and after `clean_state`.
    fn empty_state(&self) -> Self::Data;

    /// Subscribe to other containers. Runs after every successful `init`.
    fn setup_listeners(&self, _vm: &ViewModel<Self>) {}

    /// Undo [`setup_listeners`](Self::setup_listeners).
    fn remove_listeners(&self, _vm: &ViewModel<Self>) {}

    /// Runs after every state change, including silent transforms.
    fn on_state_changed(&self, _previous: &Self::Data, _next: &Self::Data) {}

    /// Runs once the instance is fully settled after `init`.
    fn on_resume(&self, _vm: &ViewModel<Self>, _data: &Self::Data) {}
}

pub(crate) struct VmInner<L: ViewModelLogic> {
    core: ContainerCore,
    this: Weak<VmInner<L>>,
    logic: L,
    data: ObservableValue<L::Data>,
    listeners: ListenerTable<L::Data>,
    lifecycle: Cell<Lifecycle>,
    init_count: Cell<u32>,
    update_count: Cell<u64>,
}

impl<L: ViewModelLogic> VmInner<L> {
    pub(crate) fn create(seed: CoreSeed, logic: L) -> Result<Rc<Self>> {
        let inner = Rc::new_cyclic(|this| {
            let empty = logic.empty_state();
            Self {
                core: ContainerCore::new::<L>(seed, ContainerKind::ViewModel),
                this: this.clone(),
                logic,
                data: ObservableValue::new(empty),
                listeners: ListenerTable::default(),
                lifecycle: Cell::new(Lifecycle::Uninitialized),
                init_count: Cell::new(0),
                update_count: Cell::new(0),
            }
        });
        let vm = ViewModel { inner };
        vm.run_init()?;
        Ok(vm.inner)
    }

    fn handle(&self) -> Option<ViewModel<L>> {
        self.this.upgrade().map(|inner| ViewModel { inner })
    }
}

impl<L: ViewModelLogic> Container for VmInner<L> {
    fn core(&self) -> &ContainerCore {
        &self.core
    }

    fn broadcast(&self) {
        self.data.notify();
        let current = self.data.get();
        self.listeners.dispatch(&current);
    }

    fn stop_all_listeners(&self) {
        self.listeners.clear_incoming();
        self.data.clear_subscribers();
    }

    fn activate(&self) {
        if let Some(vm) = self.handle() {
            vm.settle();
        }
    }

    fn dispose_payload(&self) {
        if let Some(vm) = self.handle() {
            vm.release();
        }
    }

    fn reinitialize(&self) -> bool {
        let Some(vm) = self.handle() else {
            return false;
        };
        match vm.reinitialize() {
            Ok(()) => true,
            Err(err) => {
                error!(key = %self.core.key(), error = %err, "view-model reinitialization failed");
                false
            }
        }
    }
}

/// Handle to a synchronous view-model. Cloning yields another handle to
/// the same instance.
pub struct ViewModel<L: ViewModelLogic> {
    inner: Rc<VmInner<L>>,
}

impl<L: ViewModelLogic> Clone for ViewModel<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<L: ViewModelLogic> ViewModel<L> {
    pub(crate) fn from_inner(inner: Rc<VmInner<L>>) -> Self {
        Self { inner }
    }

    // --- lifecycle -------------------------------------------------------

    fn run_init(&self) -> Result<()> {
        let inner = &*self.inner;
        let previous = inner.lifecycle.replace(Lifecycle::Initializing);
        debug!(key = %inner.core.key(), from = ?previous, "view-model initializing");
        match inner.logic.init(self) {
            Ok(data) => {
                inner.data.replace(data);
                inner.lifecycle.set(Lifecycle::Active);
                inner.init_count.set(inner.init_count.get() + 1);
                inner.core.set_disposed(false);
                Ok(())
            }
            Err(source) => {
                inner.lifecycle.set(previous);
                Err(NotifierError::Init {
                    key: inner.core.key().clone(),
                    type_name: inner.core.type_name(),
                    source,
                })
            }
        }
    }

    /// Listener setup followed by `on_resume`.
    fn settle(&self) {
        let inner = &*self.inner;
        inner.logic.setup_listeners(self);
        let data = inner.data.get();
        inner.logic.on_resume(self, &data);
    }

    /// Payload half of disposal; the registry handles the rest.
    fn release(&self) {
        let inner = &*self.inner;
        match inner.lifecycle.get() {
            Lifecycle::Disposed => return,
            Lifecycle::Active => inner.logic.remove_listeners(self),
            Lifecycle::Uninitialized | Lifecycle::Initializing => {}
        }
        let dropped = inner.listeners.drop_outgoing();
        inner.lifecycle.set(Lifecycle::Disposed);
        debug!(key = %inner.core.key(), outgoing = dropped, "view-model disposed");
    }

    fn reregister(&self) {
        let inner = &self.inner;
        let Some(registry) = inner.core.registry() else {
            return;
        };
        let container: Rc<dyn Container> = inner.clone();
        let handle: Rc<dyn Any> = inner.clone();
        if !registry.reinsert(container, handle) {
            warn!(
                key = %inner.core.key(),
                "key was taken while disposed; revived view-model stays unregistered"
            );
        }
    }

    /// Phoenix transition on access to a disposed instance.
    fn ensure_alive(&self, operation: &'static str) {
        if self.inner.lifecycle.get() != Lifecycle::Disposed {
            return;
        }
        debug!(key = %self.key(), operation, "disposed view-model accessed; reinitializing");
        if let Err(err) = self.reinitialize() {
            error!(key = %self.key(), operation, error = %err, "reinitialization failed");
        }
    }

    /// Run `init` again and settle. A disposed instance re-registers under
    /// its key; an active one drops its listeners first and broadcasts the
    /// fresh value afterwards.
    pub fn reinitialize(&self) -> Result<()> {
        let inner = &*self.inner;
        let was = inner.lifecycle.get();
        if was == Lifecycle::Active {
            inner.logic.remove_listeners(self);
            inner.listeners.drop_outgoing();
        }
        if let Err(err) = self.run_init() {
            if was == Lifecycle::Active {
                inner.logic.setup_listeners(self);
            }
            return Err(err);
        }
        if was == Lifecycle::Disposed {
            self.reregister();
        }
        self.settle();
        inner.notify_listeners();
        Ok(())
    }

    /// Idempotent. Removes external listeners, drops subscriptions held on
    /// other view-models, leaves the registry and marks the instance
    /// disposed. The next access reinitializes it.
    pub fn dispose(&self) {
        let inner = &*self.inner;
        if inner.lifecycle.get() == Lifecycle::Disposed {
            return;
        }
        if let Some(registry) = inner.core.registry() {
            if registry.holds(inner) {
                registry.teardown(inner.core.key());
                return;
            }
        }
        inner.stop_all_listeners();
        self.release();
        inner.core.set_disposed(true);
    }

    /// Reset the data to [`ViewModelLogic::empty_state`] and remove external
    /// listeners. The instance stays registered.
    pub fn clean_state(&self) {
        self.ensure_alive("clean_state");
        let inner = &*self.inner;
        inner.logic.remove_listeners(self);
        inner.listeners.drop_outgoing();
        let mut empty = Some(inner.logic.empty_state());
        guarded_update(inner, || {
            if let Some(empty) = empty.take() {
                inner.data.replace(empty);
            }
        });
        if let Some(empty) = empty {
            inner.data.replace(empty);
        }
        debug!(key = %inner.core.key(), "view-model state cleaned");
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle.get()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.lifecycle.get() == Lifecycle::Disposed
    }

    /// How many times `init` succeeded, counting the first run.
    #[must_use]
    pub fn init_count(&self) -> u32 {
        self.inner.init_count.get()
    }

    /// How many writes changed the data.
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.inner.update_count.get()
    }

    // --- data ------------------------------------------------------------

    #[must_use]
    pub fn key(&self) -> &Key {
        self.inner.core.key()
    }

    #[must_use]
    pub fn logic(&self) -> &L {
        &self.inner.logic
    }

    /// Current data. Reinitializes a disposed instance first.
    pub fn data(&self) -> L::Data {
        self.ensure_alive("data");
        self.inner.data.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&L::Data) -> R) -> R {
        self.ensure_alive("with");
        self.inner.data.with(f)
    }

    /// Store `next` and broadcast, then run `on_state_changed`. Equal
    /// values are ignored.
    pub fn update_state(&self, next: L::Data) {
        self.ensure_alive("update_state");
        let inner = &*self.inner;
        if inner.data.with(|current| *current == next) {
            return;
        }
        let committed = next.clone();
        let mut previous = None;
        guarded_update(inner, || {
            previous = Some(inner.data.replace(next));
            inner.update_count.set(inner.update_count.get() + 1);
        });
        if let Some(previous) = previous {
            inner.logic.on_state_changed(&previous, &committed);
        }
    }

    /// Store `next` without broadcasting or running hooks.
    pub fn update_silently(&self, next: L::Data) {
        self.ensure_alive("update_silently");
        let inner = &*self.inner;
        inner.data.replace(next);
        inner.update_count.set(inner.update_count.get() + 1);
    }

    pub fn transform_state(&self, f: impl FnOnce(&L::Data) -> L::Data) {
        let next = f(&self.data());
        self.update_state(next);
    }

    /// Store the transformed value without broadcasting. Unlike
    /// [`update_silently`](Self::update_silently), `on_state_changed` runs.
    pub fn transform_state_silently(&self, f: impl FnOnce(&L::Data) -> L::Data) {
        let inner = &*self.inner;
        let current = self.data();
        let next = f(&current);
        let previous = inner.data.replace(next.clone());
        inner.update_count.set(inner.update_count.get() + 1);
        inner.logic.on_state_changed(&previous, &next);
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.data.version()
    }

    /// Broadcast the current data without changing it.
    pub fn notify_listeners(&self) {
        self.inner.notify_listeners();
    }

    // --- listeners -------------------------------------------------------

    /// Install the single-slot listener. Returns the current data.
    pub fn listen(&self, callback: impl Fn(&L::Data) + 'static) -> L::Data {
        self.ensure_alive("listen");
        self.inner.listeners.set_single(Rc::new(callback));
        self.inner.data.get()
    }

    pub fn stop_listening(&self) {
        self.inner.listeners.clear_single();
    }

    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.inner.listeners.has_single()
    }

    /// Add a keyed listener. With `call_on_init` it is called right away
    /// with the current data.
    pub fn listen_vm(
        &self,
        callback: impl Fn(&L::Data) + 'static,
        call_on_init: bool,
    ) -> Listening<L::Data> {
        self.add_vm_listener(Rc::new(callback), call_on_init)
    }

    /// Listen to `other`. The subscription is owned by this view-model and
    /// dropped when it is disposed or cleaned.
    pub fn listen_to<O: ListenVm>(
        &self,
        other: &O,
        callback: impl Fn(&O::Value) + 'static,
        call_on_init: bool,
    ) -> Listening<O::Value> {
        let listening = other.add_vm_listener(Rc::new(callback), call_on_init);
        self.inner
            .listeners
            .track_outgoing(other.vm_listener_remover(listening.key));
        listening
    }

    /// Remove every keyed listener. Returns how many were removed.
    pub fn stop_listening_vm(&self) -> usize {
        self.inner.listeners.clear_keyed()
    }

    pub fn stop_specific_listener(&self, key: ListenerKey) -> bool {
        self.inner.listeners.remove_keyed(key)
    }

    /// Keyed listeners currently attached.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.keyed_count()
    }

    /// Subscriptions this view-model holds on others.
    #[must_use]
    pub fn listening_to_count(&self) -> usize {
        self.inner.listeners.outgoing_count()
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&L::Data) + 'static) -> Subscription {
        self.inner.data.subscribe(callback)
    }

    #[must_use]
    pub fn parent_count(&self) -> usize {
        self.inner.core.parent_count()
    }

    // --- context ---------------------------------------------------------

    /// Context registered for this key, falling back to the global one.
    #[must_use]
    pub fn context(&self) -> Option<ContextHandle> {
        self.inner
            .core
            .registry()
            .and_then(|registry| registry.context().get_for(self.key()))
    }

    #[must_use]
    pub fn has_context(&self) -> bool {
        self.context().is_some()
    }

    /// Like [`context`](Self::context), failing with
    /// [`NotifierError::MissingContext`] naming `operation`.
    pub fn require_context(&self, operation: &str) -> Result<ContextHandle> {
        self.context()
            .ok_or_else(|| NotifierError::missing_context(operation, self.key().clone()))
    }
}

impl<L: ViewModelLogic> ListenVm for ViewModel<L> {
    type Value = L::Data;

    fn add_vm_listener(
        &self,
        callback: Rc<dyn Fn(&L::Data)>,
        call_on_init: bool,
    ) -> Listening<L::Data> {
        let current = self.data();
        let key = self.inner.listeners.add_keyed(Rc::clone(&callback));
        if call_on_init {
            callback(&current);
        }
        Listening { key, current }
    }

    fn remove_vm_listener(&self, key: ListenerKey) -> bool {
        self.inner.listeners.remove_keyed(key)
    }

    fn vm_listener_remover(&self, key: ListenerKey) -> Box<dyn FnOnce()> {
        let weak = Rc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.remove_keyed(key);
            }
        })
    }
}

impl<L: ViewModelLogic> Keyed for ViewModel<L> {
    fn key(&self) -> &Key {
        self.inner.core.key()
    }
}

impl<L: ViewModelLogic> Subscribable for ViewModel<L> {
    type Value = L::Data;

    fn current(&self) -> L::Data {
        self.data()
    }

    fn watch(&self, callback: impl Fn(&L::Data) + 'static) -> Subscription {
        self.subscribe(callback)
    }
}

impl<L: ViewModelLogic> fmt::Debug for ViewModel<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModel")
            .field("key", self.key())
            .field("type", &self.inner.core.type_name())
            .field("lifecycle", &self.lifecycle())
            .field("init_count", &self.init_count())
            .field("update_count", &self.update_count())
            .finish()
    }
}
