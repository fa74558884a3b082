#![forbid(unsafe_code)]

//! Asynchronous business-logic containers.
//!
//! An [`AsyncViewModel<L>`] holds an [`AsyncState<L::Data>`] and drives it
//! through the reload protocol:
//!
//! ```text
//! Initial ──reload──► Loading ──init ok──► Success(data)
//!                        │
//!                        └──init err──► Error { error, trace }
//! Success | Error ──reload──► Loading
//! any ──clean_state──► Initial ──(scheduled reload)──► Loading
//! ```
//!
//! Every load gets a fresh [`Cx`]. Disposing, cleaning or reinitializing
//! cancels it, and a result that arrives after cancellation is dropped
//! instead of being written. With
//! [`NotifierConfig::load_timeout`](crate::NotifierConfig::load_timeout)
//! set, the `Cx` also carries a deadline and a load that outlives it ends
//! in `Error`.
//!
//! Loads started by the registry (load-on-init, `clean_state`,
//! reinitialization, a context becoming available) run on the registry's
//! [`LocalSpawn`](futures::task::LocalSpawn) spawner. Without a spawner they
//! are deferred until the caller awaits [`reload`](AsyncViewModel::reload).

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use rnotify_core::{BoxError, Cx, CxController, CxError, Key, NotifierError, ObservableValue, Result, Subscription};
use tracing::{Instrument, debug, debug_span, error, trace, warn};
use web_time::Duration;

use crate::async_state::{AsyncError, AsyncState};
use crate::container::{Container, ContainerCore, ContainerKind, CoreSeed, Keyed, guarded_update};
use crate::context::ContextHandle;
use crate::listeners::{ListenVm, ListenerKey, ListenerTable, Listening};
use crate::selector::Subscribable;
use crate::view_model::Lifecycle;

/// What a load receives.
#[derive(Debug, Clone)]
pub struct LoadContext {
    key: Key,
    cx: Cx,
    context: Option<ContextHandle>,
    attempt: u32,
}

impl LoadContext {
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Cancelled when the view-model is disposed, cleaned or reinitialized.
    #[must_use]
    pub fn cx(&self) -> &Cx {
        &self.cx
    }

    /// Time left before the load timeout. `None` without one.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.cx.remaining()
    }

    #[must_use]
    pub fn context(&self) -> Option<&ContextHandle> {
        self.context.as_ref()
    }

    /// `Err(NotifierError::Cancelled)` once this load has been superseded
    /// or has run past its timeout. Loaders call it between steps to stop
    /// early.
    pub fn check(&self) -> Result<()> {
        Ok(self.cx.check()?)
    }

    /// 1 for the first load after creation or a reset, then 2, 3, ...
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Behavior plugged into an [`AsyncViewModel`].
pub trait AsyncViewModelLogic: Sized + 'static {
    type Data: Clone + 'static;

    /// Load the data. Errors end up in [`AsyncState::Error`].
    fn init(self: Rc<Self>, load: LoadContext) -> LocalBoxFuture<'static, std::result::Result<Self::Data, BoxError>>;

    /// Subscribe to other containers. Runs after every finished load,
    /// successful or not.
    fn setup_listeners(&self, _vm: &AsyncViewModel<Self>) {}

    /// Undo [`setup_listeners`](Self::setup_listeners). Skipped before the
    /// first load.
    fn remove_listeners(&self, _vm: &AsyncViewModel<Self>) {}

    fn on_state_changed(&self, _previous: &AsyncState<Self::Data>, _next: &AsyncState<Self::Data>) {}

    /// Runs after a successful load once listeners are set up.
    fn on_resume(&self, _vm: &AsyncViewModel<Self>, _data: &Self::Data) {}
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AsyncSettings {
    pub(crate) wait_for_context: bool,
    pub(crate) load_on_init: bool,
    pub(crate) load_timeout: Option<Duration>,
}

pub(crate) struct AsyncInner<L: AsyncViewModelLogic> {
    core: ContainerCore,
    this: Weak<AsyncInner<L>>,
    logic: Rc<L>,
    state: ObservableValue<AsyncState<L::Data>>,
    listeners: ListenerTable<AsyncState<L::Data>>,
    settings: AsyncSettings,
    lifecycle: Cell<Lifecycle>,
    /// Loads started since creation or the last reset.
    loads: Cell<u32>,
    /// Bumped whenever in-flight results become stale.
    generation: Cell<u64>,
    controller: RefCell<Option<CxController>>,
    waiting_for_context: Cell<bool>,
    init_count: Cell<u32>,
    update_count: Cell<u64>,
}

impl<L: AsyncViewModelLogic> AsyncInner<L> {
    pub(crate) fn create(seed: CoreSeed, logic: L, settings: AsyncSettings) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            core: ContainerCore::new::<L>(seed, ContainerKind::AsyncViewModel),
            this: this.clone(),
            logic: Rc::new(logic),
            state: ObservableValue::new(AsyncState::Initial),
            listeners: ListenerTable::default(),
            settings,
            lifecycle: Cell::new(Lifecycle::Uninitialized),
            loads: Cell::new(0),
            generation: Cell::new(0),
            controller: RefCell::new(None),
            waiting_for_context: Cell::new(false),
            init_count: Cell::new(0),
            update_count: Cell::new(0),
        })
    }

    fn handle(&self) -> Option<AsyncViewModel<L>> {
        self.this.upgrade().map(|inner| AsyncViewModel { inner })
    }
}

impl<L: AsyncViewModelLogic> Container for AsyncInner<L> {
    fn core(&self) -> &ContainerCore {
        &self.core
    }

    fn broadcast(&self) {
        self.state.notify();
        let current = self.state.get();
        self.listeners.dispatch(&current);
    }

    fn stop_all_listeners(&self) {
        self.listeners.clear_incoming();
        self.state.clear_subscribers();
    }

    fn activate(&self) {
        self.lifecycle.set(Lifecycle::Active);
        self.init_count.set(1);
        if !self.settings.load_on_init {
            trace!(key = %self.core.key(), "load on init disabled");
            return;
        }
        if let Some(vm) = self.handle() {
            vm.start_or_wait();
        }
    }

    fn dispose_payload(&self) {
        if let Some(vm) = self.handle() {
            vm.release();
        }
    }

    fn reinitialize(&self) -> bool {
        match self.handle() {
            Some(vm) => {
                vm.reinitialize();
                true
            }
            None => false,
        }
    }

    fn context_available(&self) {
        if let Some(vm) = self.handle() {
            vm.reinitialize_with_context();
        }
    }
}

/// Handle to an asynchronous view-model. Cloning yields another handle to
/// the same instance.
pub struct AsyncViewModel<L: AsyncViewModelLogic> {
    inner: Rc<AsyncInner<L>>,
}

impl<L: AsyncViewModelLogic> Clone for AsyncViewModel<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<L: AsyncViewModelLogic> AsyncViewModel<L> {
    pub(crate) fn from_inner(inner: Rc<AsyncInner<L>>) -> Self {
        Self { inner }
    }

    // --- loading ---------------------------------------------------------

    /// Run one load. Returns immediately when a load is already in
    /// progress.
    pub async fn reload(&self) {
        self.revive("reload");
        let inner = &*self.inner;
        if inner.state.with(AsyncState::is_loading) {
            trace!(key = %self.key(), "reload skipped: already loading");
            return;
        }

        if inner.loads.get() > 0 {
            inner.logic.remove_listeners(self);
        }
        let clock = inner.core.clock().clone();
        let (cx, controller) = match inner.settings.load_timeout {
            Some(timeout) => Cx::with_timeout(clock, timeout),
            None => Cx::new(clock),
        };
        let stale = inner.controller.replace(Some(controller));
        if let Some(stale) = stale {
            stale.cancel();
        }
        let generation = inner.generation.get() + 1;
        inner.generation.set(generation);
        let attempt = inner.loads.get() + 1;
        inner.loads.set(attempt);

        self.set_state(AsyncState::Loading);

        let load = LoadContext {
            key: self.key().clone(),
            cx: cx.clone(),
            context: self.context(),
            attempt,
        };
        let span = debug_span!("reload", key = %self.key(), attempt, cx = cx.id());
        let result = Rc::clone(&inner.logic).init(load).instrument(span).await;

        if inner.generation.get() != generation || cx.is_cancelled() || self.is_disposed() {
            debug!(key = %self.key(), attempt, "load finished after cancellation; result dropped");
            return;
        }
        inner.controller.replace(None);

        let result = match result {
            Ok(_) if cx.is_expired() => {
                warn!(key = %self.key(), attempt, timeout = ?inner.settings.load_timeout, "load finished past its timeout");
                Err(BoxError::from(CxError::DeadlineExceeded))
            }
            other => other,
        };
        match result {
            Ok(data) => {
                self.set_state(AsyncState::Success(data.clone()));
                inner.logic.setup_listeners(self);
                inner.logic.on_resume(self, &data);
            }
            Err(err) => {
                error!(key = %self.key(), attempt, error = %err, "async load failed");
                self.set_state(AsyncState::failure(err));
                inner.logic.setup_listeners(self);
            }
        }
    }

    /// Start a load on the registry's spawner, or defer it when there is
    /// none.
    fn schedule_reload(&self) {
        let spawner = self.inner.core.registry().and_then(|registry| registry.spawner());
        let Some(spawner) = spawner else {
            debug!(key = %self.key(), "no spawner; load deferred until reload() is awaited");
            return;
        };
        let vm = self.clone();
        if let Err(err) = spawner.spawn_local(async move { vm.reload().await }) {
            warn!(key = %self.key(), error = %err, "failed to spawn reload");
        }
    }

    fn start_or_wait(&self) {
        if self.inner.settings.wait_for_context && !self.has_context() {
            self.inner.waiting_for_context.set(true);
            debug!(key = %self.key(), "waiting for a context before loading");
            return;
        }
        self.schedule_reload();
    }

    /// Start the load held back by `wait_for_context`. No-op when nothing
    /// is waiting.
    pub fn reinitialize_with_context(&self) {
        if !self.inner.waiting_for_context.replace(false) {
            return;
        }
        debug!(key = %self.key(), "context available; starting deferred load");
        self.schedule_reload();
    }

    /// Whether the first load is held back until a context appears.
    #[must_use]
    pub fn is_waiting_for_context(&self) -> bool {
        self.inner.waiting_for_context.get()
    }

    fn cancel_load(&self) {
        let inner = &*self.inner;
        let controller = inner.controller.replace(None);
        if let Some(controller) = controller {
            controller.cancel();
        }
        inner.generation.set(inner.generation.get() + 1);
    }

    // --- lifecycle -------------------------------------------------------

    /// Payload half of disposal; the registry handles the rest.
    fn release(&self) {
        let inner = &*self.inner;
        if inner.lifecycle.get() == Lifecycle::Disposed {
            return;
        }
        self.cancel_load();
        if inner.loads.get() > 0 {
            inner.logic.remove_listeners(self);
        }
        let dropped = inner.listeners.drop_outgoing();
        inner.waiting_for_context.set(false);
        inner.lifecycle.set(Lifecycle::Disposed);
        debug!(key = %self.key(), outgoing = dropped, "async view-model disposed");
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

    /// Phoenix transition on access to a disposed instance, load included.
    fn ensure_alive(&self, operation: &'static str) {
        if self.revive(operation) {
            self.start_or_wait();
        }
    }

    /// Phoenix transition without scheduling a load, for callers that start
    /// one themselves. Returns whether the instance was disposed.
    fn revive(&self, operation: &'static str) -> bool {
        if self.inner.lifecycle.get() != Lifecycle::Disposed {
            return false;
        }
        debug!(key = %self.key(), operation, "disposed async view-model accessed; reinitializing");
        self.reset();
        true
    }

    /// Back to `Initial` with a fresh load scheduled. A disposed instance
    /// re-registers under its key first.
    pub fn reinitialize(&self) {
        self.reset();
        self.start_or_wait();
    }

    fn reset(&self) {
        let inner = &*self.inner;
        let was = inner.lifecycle.get();
        self.cancel_load();
        if was == Lifecycle::Active && inner.loads.get() > 0 {
            inner.logic.remove_listeners(self);
        }
        inner.lifecycle.set(Lifecycle::Initializing);
        inner.loads.set(0);
        if was == Lifecycle::Disposed {
            inner.state.replace(AsyncState::Initial);
            inner.core.set_disposed(false);
            self.reregister();
        } else {
            self.set_state(AsyncState::Initial);
        }
        inner.lifecycle.set(Lifecycle::Active);
        inner.init_count.set(inner.init_count.get() + 1);
        debug!(key = %self.key(), from = ?was, init_count = inner.init_count.get(), "async view-model reinitialized");
    }

    /// Idempotent. Cancels the current load, removes external listeners,
    /// leaves the registry and marks the instance disposed.
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

    /// Cancel the current load, remove external listeners, go back to
    /// `Initial` and schedule a reload.
    pub fn clean_state(&self) {
        self.revive("clean_state");
        let inner = &*self.inner;
        self.cancel_load();
        if inner.loads.get() > 0 {
            inner.logic.remove_listeners(self);
        }
        inner.listeners.drop_outgoing();
        inner.loads.set(0);
        self.set_state(AsyncState::Initial);
        debug!(key = %self.key(), "async view-model state cleaned");
        self.schedule_reload();
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle.get()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.lifecycle.get() == Lifecycle::Disposed
    }

    #[must_use]
    pub fn init_count(&self) -> u32 {
        self.inner.init_count.get()
    }

    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.inner.update_count.get()
    }

    // --- state -----------------------------------------------------------

    /// Store `next`, broadcast, then run `on_state_changed`.
    ///
    /// Async transitions are never lost: when the key is mid-update the
    /// state is stored without a broadcast.
    fn set_state(&self, next: AsyncState<L::Data>) {
        let inner = &*self.inner;
        let mut pending = Some(next);
        let mut previous = None;
        guarded_update(inner, || {
            if let Some(next) = pending.take() {
                previous = Some(inner.state.replace(next));
            }
        });
        if let Some(next) = pending.take() {
            trace!(key = %self.key(), state = next.name(), "stored without broadcast: already updating");
            previous = Some(inner.state.replace(next));
        }
        inner.update_count.set(inner.update_count.get() + 1);
        if let Some(previous) = previous {
            let current = inner.state.get();
            inner.logic.on_state_changed(&previous, &current);
        }
    }

    fn set_state_silently(&self, next: AsyncState<L::Data>, run_hook: bool) {
        let inner = &*self.inner;
        let previous = inner.state.replace(next);
        inner.update_count.set(inner.update_count.get() + 1);
        if run_hook {
            let current = inner.state.get();
            inner.logic.on_state_changed(&previous, &current);
        }
    }

    #[must_use]
    pub fn key(&self) -> &Key {
        self.inner.core.key()
    }

    #[must_use]
    pub fn logic(&self) -> &L {
        &self.inner.logic
    }

    /// Current state. Reinitializes a disposed instance first.
    pub fn state(&self) -> AsyncState<L::Data> {
        self.ensure_alive("state");
        self.inner.state.get()
    }

    /// The loaded data, `None` while there is none, and the stored error
    /// when the state is `Error`.
    pub fn data(&self) -> std::result::Result<Option<L::Data>, AsyncError> {
        self.state().data().map(|data| data.cloned())
    }

    pub fn loading_state(&self) {
        self.ensure_alive("loading_state");
        self.set_state(AsyncState::Loading);
    }

    pub fn error_state(&self, error: impl Into<BoxError>) {
        self.ensure_alive("error_state");
        self.set_state(AsyncState::failure(error));
    }

    /// `Success(data)` with a broadcast.
    pub fn update_state(&self, data: L::Data) {
        self.ensure_alive("update_state");
        self.set_state(AsyncState::Success(data));
    }

    /// `Success(data)` without broadcast or hook.
    pub fn update_silently(&self, data: L::Data) {
        self.ensure_alive("update_silently");
        self.set_state_silently(AsyncState::Success(data), false);
    }

    pub fn transform_state(&self, f: impl FnOnce(&AsyncState<L::Data>) -> AsyncState<L::Data>) {
        let next = f(&self.state());
        self.set_state(next);
    }

    pub fn transform_state_silently(
        &self,
        f: impl FnOnce(&AsyncState<L::Data>) -> AsyncState<L::Data>,
    ) {
        let next = f(&self.state());
        self.set_state_silently(next, true);
    }

    /// Transform the `Success` payload. Returns whether a new state was
    /// stored; other tags and `None` results leave the state alone.
    pub fn transform_data_state(&self, f: impl FnOnce(&L::Data) -> Option<L::Data>) -> bool {
        match self.transformed_data(f, "transform_data_state") {
            Some(next) => {
                self.set_state(AsyncState::Success(next));
                true
            }
            None => false,
        }
    }

    pub fn transform_data_state_silently(
        &self,
        f: impl FnOnce(&L::Data) -> Option<L::Data>,
    ) -> bool {
        match self.transformed_data(f, "transform_data_state_silently") {
            Some(next) => {
                self.set_state_silently(AsyncState::Success(next), true);
                true
            }
            None => false,
        }
    }

    fn transformed_data(
        &self,
        f: impl FnOnce(&L::Data) -> Option<L::Data>,
        operation: &'static str,
    ) -> Option<L::Data> {
        let state = self.state();
        let Some(current) = state.success() else {
            debug!(key = %self.key(), operation, state = state.name(), "no loaded data to transform");
            return None;
        };
        let next = f(current);
        if next.is_none() {
            warn!(key = %self.key(), operation, "transform produced no data; update dropped");
        }
        next
    }

    /// Four-way dispatch over the current state; `Empty` goes to `initial`.
    pub fn when<R>(
        &self,
        initial: impl FnOnce() -> R,
        loading: impl FnOnce() -> R,
        success: impl FnOnce(&L::Data) -> R,
        error: impl FnOnce(&AsyncError, Option<&std::backtrace::Backtrace>) -> R,
    ) -> R {
        self.state().when(initial, loading, success, error)
    }

    /// Five-way dispatch over the current state.
    pub fn match_state<R>(
        &self,
        initial: impl FnOnce() -> R,
        loading: impl FnOnce() -> R,
        success: impl FnOnce(&L::Data) -> R,
        error: impl FnOnce(&AsyncError, Option<&std::backtrace::Backtrace>) -> R,
        empty: impl FnOnce() -> R,
    ) -> R {
        self.state().match_state(initial, loading, success, error, empty)
    }

    pub fn notify_listeners(&self) {
        self.inner.notify_listeners();
    }

    // --- listeners -------------------------------------------------------

    pub fn listen(&self, callback: impl Fn(&AsyncState<L::Data>) + 'static) -> AsyncState<L::Data> {
        self.ensure_alive("listen");
        self.inner.listeners.set_single(Rc::new(callback));
        self.inner.state.get()
    }

    pub fn stop_listening(&self) {
        self.inner.listeners.clear_single();
    }

    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.inner.listeners.has_single()
    }

    pub fn listen_vm(
        &self,
        callback: impl Fn(&AsyncState<L::Data>) + 'static,
        call_on_init: bool,
    ) -> Listening<AsyncState<L::Data>> {
        self.add_vm_listener(Rc::new(callback), call_on_init)
    }

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

    pub fn stop_listening_vm(&self) -> usize {
        self.inner.listeners.clear_keyed()
    }

    pub fn stop_specific_listener(&self, key: ListenerKey) -> bool {
        self.inner.listeners.remove_keyed(key)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.keyed_count()
    }

    #[must_use]
    pub fn listening_to_count(&self) -> usize {
        self.inner.listeners.outgoing_count()
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&AsyncState<L::Data>) + 'static) -> Subscription {
        self.inner.state.subscribe(callback)
    }

    // --- context ---------------------------------------------------------

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

    pub fn require_context(&self, operation: &str) -> Result<ContextHandle> {
        self.context()
            .ok_or_else(|| NotifierError::missing_context(operation, self.key().clone()))
    }
}

impl<L: AsyncViewModelLogic> ListenVm for AsyncViewModel<L> {
    type Value = AsyncState<L::Data>;

    fn add_vm_listener(
        &self,
        callback: Rc<dyn Fn(&AsyncState<L::Data>)>,
        call_on_init: bool,
    ) -> Listening<AsyncState<L::Data>> {
        let current = self.state();
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

impl<L: AsyncViewModelLogic> Keyed for AsyncViewModel<L> {
    fn key(&self) -> &Key {
        self.inner.core.key()
    }
}

impl<L: AsyncViewModelLogic> Subscribable for AsyncViewModel<L> {
    type Value = AsyncState<L::Data>;

    fn current(&self) -> AsyncState<L::Data> {
        self.state()
    }

    fn watch(&self, callback: impl Fn(&AsyncState<L::Data>) + 'static) -> Subscription {
        self.subscribe(callback)
    }
}

impl<L: AsyncViewModelLogic> fmt::Debug for AsyncViewModel<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncViewModel")
            .field("key", self.key())
            .field("type", &self.inner.core.type_name())
            .field("state", &self.inner.state.with(AsyncState::name))
            .field("lifecycle", &self.lifecycle())
            .field("loads", &self.inner.loads.get())
            .finish()
    }
}
