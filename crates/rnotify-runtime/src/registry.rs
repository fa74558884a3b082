#![forbid(unsafe_code)]

//! The registry: one record per key, the related graph, reference
//! lifecycles and the context bridge.
//!
//! A [`Registry`] is created once per process (or per test) and handed to
//! whatever creates containers. It is `Rc`-based and therefore `!Send`.
//!
//! # Creation
//!
//! `create_notifier`, `create_view_model` and `create_async_view_model`
//! mint a key when [`Options`] carries none, reject keys that are already
//! registered, validate the `related` list, build the container, make it a
//! parent of every related child and store the record.
//!
//! # Teardown
//!
//! [`Registry::remove`], expiring dispose timers and `dispose()` on a
//! view-model all end up in the same sequence:
//!
//! 1. stop the container's listeners,
//! 2. detach it from the related graph,
//! 3. dispose the view-model payload,
//! 4. remove the record,
//! 5. mark the container disposed.
//!
//! # Example
//!
//! ```
//! use rnotify_core::Key;
//! use rnotify_runtime::{Options, Registry};
//!
//! let registry = Registry::new();
//! let counter = registry
//!     .create_notifier(Options::new().with_key("counter"), || 0u32)
//!     .unwrap();
//! counter.update_state(3);
//!
//! let again = registry.get_notifier::<u32>(&Key::named("counter")).unwrap();
//! assert_eq!(again.value(), 3);
//! assert!(registry.create_notifier(Options::new().with_key("counter"), || 0u32).is_err());
//! ```

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use futures::task::LocalSpawn;
use rnotify_core::{Clock, Key, NotifierError, ReferenceId, RelatedIssue, Result};
use tracing::{debug, info, trace};
use web_time::Instant;

use crate::async_view_model::{AsyncInner, AsyncSettings, AsyncViewModel, AsyncViewModelLogic};
use crate::config::{ConfigError, NotifierConfig};
use crate::container::{Container, ContainerCore, ContainerKind, CoreSeed, Keyed, Propagation};
use crate::context::{ContextBridge, ContextHandle};
use crate::lifecycle::ReferenceSet;
use crate::notifier::{Notifier, NotifierInner};
use crate::view_model::{ViewModel, ViewModelLogic, VmInner};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-container creation options.
///
/// ```
/// use rnotify_runtime::Options;
///
/// let opts = Options::new()
///     .with_key("cart")
///     .with_auto_dispose(true)
///     .with_wait_for_context(true);
/// assert_eq!(opts.key().and_then(|k| k.name()), Some("cart"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Options {
    key: Option<Key>,
    related: Vec<Key>,
    auto_dispose: bool,
    wait_for_context: bool,
    load_on_init: Option<bool>,
}

impl Options {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `key` instead of minting one.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Make the new container a parent of `child`.
    #[must_use]
    pub fn with_related(mut self, child: &impl Keyed) -> Self {
        self.related.push(child.key().clone());
        self
    }

    /// Like [`with_related`](Self::with_related), by key.
    #[must_use]
    pub fn with_related_key(mut self, child: impl Into<Key>) -> Self {
        self.related.push(child.into());
        self
    }

    #[must_use]
    pub fn with_auto_dispose(mut self, auto_dispose: bool) -> Self {
        self.auto_dispose = auto_dispose;
        self
    }

    /// Async view-models only: hold the first load until a context exists.
    #[must_use]
    pub fn with_wait_for_context(mut self, wait: bool) -> Self {
        self.wait_for_context = wait;
        self
    }

    /// Async view-models only: override [`NotifierConfig::load_on_init`].
    #[must_use]
    pub fn with_load_on_init(mut self, load: bool) -> Self {
        self.load_on_init = Some(load);
        self
    }

    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    #[must_use]
    pub fn related(&self) -> &[Key] {
        &self.related
    }

    #[must_use]
    pub fn auto_dispose(&self) -> bool {
        self.auto_dispose
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

struct ContainerRecord {
    container: Rc<dyn Container>,
    /// Same allocation as `container`, kept as `Any` for typed lookups.
    handle: Rc<dyn Any>,
    references: ReferenceSet,
    seq: u64,
}

impl ContainerRecord {
    fn core(&self) -> &ContainerCore {
        self.container.core()
    }

    fn info(&self) -> RecordInfo {
        let core = self.core();
        RecordInfo {
            key: core.key().clone(),
            kind: core.kind(),
            type_name: core.type_name(),
            reference_count: self.references.count(),
            auto_dispose: core.auto_dispose(),
            pending_dispose: self.references.pending_dispose(),
            parent_count: core.parent_count(),
            child_count: core.child_keys().len(),
        }
    }
}

/// Diagnostic view of one record, as returned by [`Registry::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    pub key: Key,
    pub kind: ContainerKind,
    pub type_name: &'static str,
    pub reference_count: usize,
    pub auto_dispose: bool,
    pub pending_dispose: Option<Instant>,
    pub parent_count: usize,
    pub child_count: usize,
}

// ---------------------------------------------------------------------------
// RegistryShared
// ---------------------------------------------------------------------------

pub(crate) struct RegistryShared {
    config: NotifierConfig,
    propagation: Rc<Propagation>,
    records: RefCell<AHashMap<Key, ContainerRecord>>,
    next_seq: Cell<u64>,
    context: ContextBridge,
    spawner: Option<Rc<dyn LocalSpawn>>,
}

impl RegistryShared {
    pub(crate) fn context(&self) -> &ContextBridge {
        &self.context
    }

    pub(crate) fn spawner(&self) -> Option<Rc<dyn LocalSpawn>> {
        self.spawner.clone()
    }

    fn container(&self, key: &Key) -> Option<Rc<dyn Container>> {
        self.records
            .borrow()
            .get(key)
            .map(|record| Rc::clone(&record.container))
    }

    fn handle(&self, key: &Key) -> Option<Rc<dyn Any>> {
        self.records
            .borrow()
            .get(key)
            .map(|record| Rc::clone(&record.handle))
    }

    /// Keys in creation order, optionally filtered.
    fn ordered_keys(&self, filter: impl Fn(&ContainerRecord) -> bool) -> Vec<Key> {
        let records = self.records.borrow();
        let mut keyed: Vec<(u64, Key)> = records
            .iter()
            .filter(|(_, record)| filter(record))
            .map(|(key, record)| (record.seq, key.clone()))
            .collect();
        keyed.sort_unstable_by_key(|(seq, _)| *seq);
        keyed.into_iter().map(|(_, key)| key).collect()
    }

    /// A new key is unregistered and every related child must be registered,
    /// so no child can reach the new key yet. Structural cycles that appear
    /// later, through revived containers, are broken by the update guard.
    fn validate(&self, key: &Key, related: &[Key]) -> Result<()> {
        let records = self.records.borrow();
        if records.contains_key(key) {
            return Err(NotifierError::DuplicateKey { key: key.clone() });
        }
        for (index, child) in related.iter().enumerate() {
            let issue = if child == key {
                Some(RelatedIssue::SelfReference)
            } else if related[..index].contains(child) {
                Some(RelatedIssue::Duplicate)
            } else if !records.contains_key(child) {
                Some(RelatedIssue::NotRegistered)
            } else {
                None
            };
            if let Some(issue) = issue {
                return Err(NotifierError::InvalidRelated {
                    key: key.clone(),
                    related: child.clone(),
                    issue,
                });
            }
        }
        Ok(())
    }

    fn register<H: Container>(
        self: &Rc<Self>,
        options: &Options,
        build: impl FnOnce(CoreSeed) -> Result<Rc<H>>,
    ) -> Result<Rc<H>> {
        let key = options.key.clone().unwrap_or_else(Key::auto);
        self.validate(&key, &options.related)?;

        let seed = CoreSeed {
            key: key.clone(),
            auto_dispose: options.auto_dispose,
            related: options.related.clone(),
            registry: Rc::downgrade(self),
            propagation: Rc::clone(&self.propagation),
        };
        let inner = build(seed)?;

        // `init` runs user code that may have claimed the key meanwhile.
        if self.records.borrow().contains_key(&key) {
            return Err(NotifierError::DuplicateKey { key });
        }

        let container: Rc<dyn Container> = inner.clone();
        let handle: Rc<dyn Any> = inner.clone();
        self.insert(Rc::clone(&container), handle);
        debug!(
            key = %key,
            kind = ?container.core().kind(),
            type_name = container.core().type_name(),
            related = options.related.len(),
            "container created"
        );
        container.activate();
        Ok(inner)
    }

    fn insert(&self, container: Rc<dyn Container>, handle: Rc<dyn Any>) {
        let key = container.core().key().clone();
        self.link(&container);
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.records.borrow_mut().insert(
            key,
            ContainerRecord {
                container,
                handle,
                references: ReferenceSet::default(),
                seq,
            },
        );
    }

    /// Make `container` a parent of each declared child that is registered,
    /// and a child of each registered container that declared its key.
    fn link(&self, container: &Rc<dyn Container>) {
        let core = container.core();
        let key = core.key();
        let weak = Rc::downgrade(container);
        let records = self.records.borrow();
        for child_key in core.declared_related() {
            if child_key == key {
                continue;
            }
            match records.get(child_key) {
                Some(child) => {
                    child.core().add_parent(key.clone(), weak.clone());
                    core.add_child(child_key.clone());
                }
                None => {
                    debug!(key = %key, related = %child_key, "related container gone; edge skipped");
                }
            }
        }
        for (parent_key, parent) in records.iter() {
            if parent_key == key || !parent.core().declared_related().contains(key) {
                continue;
            }
            core.add_parent(parent_key.clone(), Rc::downgrade(&parent.container));
            parent.core().add_child(key.clone());
            trace!(key = %key, parent = %parent_key, "parent edge restored");
        }
    }

    /// Store a revived container under its old key. Fails when the key has
    /// been taken in the meantime.
    pub(crate) fn reinsert(&self, container: Rc<dyn Container>, handle: Rc<dyn Any>) -> bool {
        let key = container.core().key().clone();
        if self.records.borrow().contains_key(&key) {
            return false;
        }
        self.insert(container, handle);
        debug!(key = %key, "container re-registered");
        true
    }

    /// Whether the record under `container`'s key holds this very instance.
    pub(crate) fn holds(&self, container: &dyn Container) -> bool {
        self.records
            .borrow()
            .get(container.core().key())
            .is_some_and(|record| {
                std::ptr::addr_eq(Rc::as_ptr(&record.container), container as *const dyn Container)
            })
    }

    pub(crate) fn teardown(&self, key: &Key) -> bool {
        let Some(container) = self.container(key) else {
            return false;
        };
        let core = container.core();

        container.stop_all_listeners();
        self.detach(core);
        container.dispose_payload();

        let removed = {
            let mut records = self.records.borrow_mut();
            let same = records.get(key).is_some_and(|record| {
                std::ptr::addr_eq(Rc::as_ptr(&record.container), Rc::as_ptr(&container))
            });
            if same { records.remove(key) } else { None }
        };
        core.set_disposed(true);
        debug!(key = %key, kind = ?core.kind(), "container disposed");
        drop(removed);
        true
    }

    fn detach(&self, core: &ContainerCore) {
        let key = core.key();
        let (parents, children) = core.take_edges();
        let records = self.records.borrow();
        for parent in &parents {
            if let Some(record) = records.get(parent) {
                record.core().remove_child(key);
            }
        }
        for child in &children {
            if let Some(record) = records.get(child) {
                record.core().remove_parent(key);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures a [`Registry`].
///
/// ```
/// use rnotify_core::{Clock, LabClock};
/// use rnotify_runtime::{NotifierConfig, RegistryBuilder};
/// use std::time::Duration;
///
/// let lab = LabClock::new();
/// let registry = RegistryBuilder::new()
///     .with_config(NotifierConfig::new().with_dispose_delay(Duration::from_secs(5)))
///     .with_clock(Clock::lab(&lab))
///     .build()
///     .unwrap();
/// assert_eq!(registry.config().dispose_delay, Duration::from_secs(5));
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    config: NotifierConfig,
    clock: Clock,
    spawner: Option<Rc<dyn LocalSpawn>>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: NotifierConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Executor used to run async loads started by the registry
    /// (load-on-init, `clean_state`, reinitialization).
    #[must_use]
    pub fn with_spawner(mut self, spawner: impl LocalSpawn + 'static) -> Self {
        self.spawner = Some(Rc::new(spawner));
        self
    }

    pub fn build(self) -> std::result::Result<Registry, ConfigError> {
        self.config.validate()?;
        Ok(Registry::from_parts(self.config, self.clock, self.spawner))
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("spawner", &self.spawner.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Key-addressed store of containers. Cloning yields another handle to the
/// same registry.
#[derive(Clone)]
pub struct Registry {
    shared: Rc<RegistryShared>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry with default configuration, wall-clock time and no spawner.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(NotifierConfig::default(), Clock::real(), None)
    }

    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    fn from_parts(
        config: NotifierConfig,
        clock: Clock,
        spawner: Option<Rc<dyn LocalSpawn>>,
    ) -> Self {
        let propagation = Propagation::new(clock, &config);
        Self {
            shared: Rc::new(RegistryShared {
                config,
                propagation,
                records: RefCell::new(AHashMap::new()),
                next_seq: Cell::new(0),
                context: ContextBridge::new(),
                spawner,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &NotifierConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        self.shared.propagation.clock()
    }

    /// Read access to the context bridge. Mutate through
    /// [`register_context`](Self::register_context) and friends.
    #[must_use]
    pub fn context(&self) -> &ContextBridge {
        &self.shared.context
    }

    // --- creation --------------------------------------------------------

    /// Create a [`Notifier`] whose initial value comes from `factory`. The
    /// factory is kept for [`reinitialize`](Self::reinitialize).
    pub fn create_notifier<T>(
        &self,
        options: Options,
        factory: impl Fn() -> T + 'static,
    ) -> Result<Notifier<T>>
    where
        T: Clone + PartialEq + 'static,
    {
        self.shared
            .register(&options, |seed| Ok(NotifierInner::create(seed, Box::new(factory))))
            .map(Notifier::from_inner)
    }

    /// Create a [`ViewModel`], running its `init` synchronously. An `init`
    /// failure is returned as [`NotifierError::Init`] and nothing is stored.
    pub fn create_view_model<L: ViewModelLogic>(
        &self,
        options: Options,
        logic: L,
    ) -> Result<ViewModel<L>> {
        self.shared
            .register(&options, |seed| VmInner::create(seed, logic))
            .map(ViewModel::from_inner)
    }

    /// Create an [`AsyncViewModel`]. The first load is scheduled on the
    /// spawner unless disabled or waiting for a context.
    pub fn create_async_view_model<L: AsyncViewModelLogic>(
        &self,
        options: Options,
        logic: L,
    ) -> Result<AsyncViewModel<L>> {
        let settings = AsyncSettings {
            wait_for_context: options.wait_for_context,
            load_on_init: options.load_on_init.unwrap_or(self.shared.config.load_on_init),
            load_timeout: self.shared.config.load_timeout,
        };
        self.shared
            .register(&options, |seed| Ok(AsyncInner::create(seed, logic, settings)))
            .map(AsyncViewModel::from_inner)
    }

    // --- lookup ----------------------------------------------------------

    /// The notifier under `key`, if it holds a `T`.
    #[must_use]
    pub fn get_notifier<T>(&self, key: &Key) -> Option<Notifier<T>>
    where
        T: Clone + PartialEq + 'static,
    {
        self.shared
            .handle(key)?
            .downcast::<NotifierInner<T>>()
            .ok()
            .map(Notifier::from_inner)
    }

    #[must_use]
    pub fn get_view_model<L: ViewModelLogic>(&self, key: &Key) -> Option<ViewModel<L>> {
        self.shared
            .handle(key)?
            .downcast::<VmInner<L>>()
            .ok()
            .map(ViewModel::from_inner)
    }

    #[must_use]
    pub fn get_async_view_model<L: AsyncViewModelLogic>(
        &self,
        key: &Key,
    ) -> Option<AsyncViewModel<L>> {
        self.shared
            .handle(key)?
            .downcast::<AsyncInner<L>>()
            .ok()
            .map(AsyncViewModel::from_inner)
    }

    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.shared.records.borrow().contains_key(key)
    }

    /// Registered and not disposed.
    #[must_use]
    pub fn is_active(&self, key: &Key) -> bool {
        self.shared
            .records
            .borrow()
            .get(key)
            .is_some_and(|record| !record.core().is_disposed())
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.shared.records.borrow().len()
    }

    /// Number of records whose payload type is `P` (the value type of a
    /// notifier, the logic type of a view-model).
    #[must_use]
    pub fn count_of_type<P: 'static>(&self) -> usize {
        let wanted = TypeId::of::<P>();
        self.shared
            .records
            .borrow()
            .values()
            .filter(|record| record.core().payload_type() == wanted)
            .count()
    }

    /// Registered keys in creation order.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.shared.ordered_keys(|_| true)
    }

    // --- removal ---------------------------------------------------------

    /// Tear down and remove the record under `key`. `false` when missing.
    pub fn remove(&self, key: &Key) -> bool {
        self.shared.teardown(key)
    }

    /// Remove every record whose payload type is `P`. Returns how many went.
    pub fn remove_all_of_type<P: 'static>(&self) -> usize {
        let wanted = TypeId::of::<P>();
        let keys = self
            .shared
            .ordered_keys(|record| record.core().payload_type() == wanted);
        let removed = keys.iter().filter(|key| self.shared.teardown(key)).count();
        debug!(type_name = std::any::type_name::<P>(), removed, "removed all of type");
        removed
    }

    /// Dispose every view-model, drop every record, clear the context
    /// bridge (global slot included) and the update tracker.
    pub fn clear_all(&self) {
        let keys = self.keys();
        let total = keys.len();
        for key in &keys {
            self.shared.teardown(key);
        }
        let leftovers = std::mem::take(&mut *self.shared.records.borrow_mut());
        self.shared.context.clear();
        self.shared.propagation.reset();
        info!(disposed = total, leftovers = leftovers.len(), "registry cleared");
        drop(leftovers);
    }

    /// Reset the container under `key` to a freshly initialized state.
    pub fn reinitialize(&self, key: &Key) -> bool {
        match self.shared.container(key) {
            Some(container) => container.reinitialize(),
            None => false,
        }
    }

    // --- reference lifecycle ---------------------------------------------

    /// Record that component `id` uses `key`. Cancels a pending dispose.
    /// Returns whether the reference set grew.
    pub fn add_reference(&self, key: &Key, id: impl Into<ReferenceId>) -> bool {
        let mut records = self.shared.records.borrow_mut();
        let Some(record) = records.get_mut(key) else {
            return false;
        };
        let added = record.references.add(id.into());
        if added.cancelled_dispose {
            debug!(key = %key, "pending dispose cancelled by new reference");
        }
        trace!(key = %key, count = record.references.count(), "reference added");
        added.grew
    }

    /// Record that component `id` stopped using `key`. Arms the dispose
    /// timer when this was the last reference of an auto-dispose record.
    /// Returns whether the reference set shrank.
    pub fn remove_reference(&self, key: &Key, id: impl Into<ReferenceId>) -> bool {
        let now = self.clock().now();
        let delay = self.shared.config.dispose_delay;
        let mut records = self.shared.records.borrow_mut();
        let Some(record) = records.get_mut(key) else {
            return false;
        };
        let auto_dispose = record.container.core().auto_dispose();
        let removed = record.references.remove(&id.into(), auto_dispose, now, delay);
        if removed.armed.is_some() {
            debug!(
                key = %key,
                delay_ms = delay.as_millis() as u64,
                "last reference gone; dispose scheduled"
            );
        }
        removed.shrank
    }

    /// Fire every dispose deadline that has passed. Returns how many
    /// containers were torn down.
    pub fn poll_timers(&self) -> usize {
        let now = self.clock().now();
        let due = self
            .shared
            .ordered_keys(|record| record.references.is_due(now));
        let mut fired = 0;
        for key in due {
            let proceed = {
                let mut records = self.shared.records.borrow_mut();
                match records.get_mut(&key) {
                    Some(record) => {
                        let core = record.container.core();
                        let (auto_dispose, disposed) = (core.auto_dispose(), core.is_disposed());
                        record.references.fire(auto_dispose, disposed)
                    }
                    None => false,
                }
            };
            if proceed {
                debug!(key = %key, "dispose timer fired");
                if self.shared.teardown(&key) {
                    fired += 1;
                }
            } else {
                trace!(key = %key, "dispose timer fired but record is in use again");
            }
        }
        fired
    }

    /// Earliest pending dispose deadline, for hosts that sleep between polls.
    #[must_use]
    pub fn next_dispose_deadline(&self) -> Option<Instant> {
        self.shared
            .records
            .borrow()
            .values()
            .filter_map(|record| record.references.pending_dispose())
            .min()
    }

    #[must_use]
    pub fn reference_count(&self, key: &Key) -> usize {
        self.shared
            .records
            .borrow()
            .get(key)
            .map_or(0, |record| record.references.count())
    }

    #[must_use]
    pub fn has_reference(&self, key: &Key, id: &ReferenceId) -> bool {
        self.shared
            .records
            .borrow()
            .get(key)
            .is_some_and(|record| record.references.contains(id))
    }

    #[must_use]
    pub fn has_pending_dispose(&self, key: &Key) -> bool {
        self.shared
            .records
            .borrow()
            .get(key)
            .is_some_and(|record| record.references.pending_dispose().is_some())
    }

    /// A component reading `key` mounted, optionally providing its context.
    pub fn mount(&self, key: &Key, id: impl Into<ReferenceId>, context: Option<ContextHandle>) -> bool {
        if let Some(handle) = context {
            self.register_context(key.clone(), handle);
        }
        self.add_reference(key, id)
    }

    /// A component reading `key` unmounted. The key's context registration
    /// goes away with its last reference.
    pub fn unmount(&self, key: &Key, id: impl Into<ReferenceId>) -> bool {
        let shrank = self.remove_reference(key, id);
        if self.reference_count(key) == 0 {
            self.shared.context.unregister(key);
        }
        shrank
    }

    // --- context ---------------------------------------------------------

    /// Register `handle` for `key` and wake a view-model waiting for it.
    pub fn register_context(&self, key: Key, handle: ContextHandle) {
        if self.shared.context.register(key.clone(), handle).is_some() {
            trace!(key = %key, "context replaced");
        }
        if let Some(container) = self.shared.container(&key) {
            container.context_available();
        }
    }

    pub fn unregister_context(&self, key: &Key) -> bool {
        self.shared.context.unregister(key).is_some()
    }

    /// Install the global fallback context and wake every waiting
    /// view-model.
    pub fn init_global_context(&self, handle: ContextHandle) {
        if let Some(previous) = self.shared.context.init_global(handle) {
            info!(previous = previous.id(), "global context replaced");
        }
        for key in self.keys() {
            if let Some(container) = self.shared.container(&key) {
                container.context_available();
            }
        }
    }

    pub fn clear_global_context(&self) -> bool {
        self.shared.context.clear_global().is_some()
    }

    // --- diagnostics -----------------------------------------------------

    /// One [`RecordInfo`] per record, in creation order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RecordInfo> {
        let records = self.shared.records.borrow();
        let mut infos: Vec<(u64, RecordInfo)> = records
            .values()
            .map(|record| (record.seq, record.info()))
            .collect();
        infos.sort_unstable_by_key(|(seq, _)| *seq);
        infos.into_iter().map(|(_, info)| info).collect()
    }

    /// Total notification-overflow warnings emitted by this registry.
    #[must_use]
    pub fn overflow_events(&self) -> u64 {
        self.shared.propagation.overflow_events()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("records", &self.count())
            .field("context", &self.shared.context)
            .field("overflow_events", &self.overflow_events())
            .finish()
    }
}
