#![forbid(unsafe_code)]

//! The async view-model reload protocol on a real local executor.
//!
//! Validates that:
//! 1. Creation schedules the first load on the registry spawner.
//! 2. A reload that overlaps an in-flight load is a no-op.
//! 3. Results arriving after dispose or `clean_state` are dropped and the
//!    load's `Cx` is cancelled.
//! 4. `wait_for_context` holds the first load until a context appears,
//!    either for the key or globally.
//! 5. Errors are captured in the state and re-raised by `data()`.
//! 6. Reviving a disposed instance through `reload` or `clean_state` runs
//!    exactly one load.
//! 7. A load that outlives the configured timeout ends in `Error`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::executor::{LocalPool, block_on};
use futures::future::LocalBoxFuture;
use rnotify_core::{BoxError, Clock, Cx, LabClock};
use rnotify_runtime::{
    AsyncViewModel, AsyncViewModelLogic, ContextHandle, LoadContext, NotifierConfig, Options,
    Registry,
};

// ============================================================================
// Helpers
// ============================================================================

type Outcome = Result<u32, &'static str>;

/// Loader whose every attempt waits for the test to release it.
#[derive(Default)]
struct Gated {
    gates: RefCell<VecDeque<oneshot::Receiver<Outcome>>>,
    tokens: RefCell<Vec<Cx>>,
    contexts: RefCell<Vec<Option<&'static str>>>,
    events: RefCell<Vec<String>>,
}

impl Gated {
    /// Queue a gate for the next load and return its release handle.
    fn gate(&self) -> oneshot::Sender<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().push_back(rx);
        tx
    }

    fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

impl AsyncViewModelLogic for Gated {
    type Data = u32;

    fn init(self: Rc<Self>, load: LoadContext) -> LocalBoxFuture<'static, Result<u32, BoxError>> {
        async move {
            self.events.borrow_mut().push(format!("init #{}", load.attempt()));
            self.tokens.borrow_mut().push(load.cx().clone());
            let context = load
                .context()
                .and_then(|handle| handle.downcast_ref::<&'static str>().copied());
            self.contexts.borrow_mut().push(context);
            let gate = self.gates.borrow_mut().pop_front();
            let outcome = match gate {
                Some(rx) => rx.await.unwrap_or(Err("gate dropped")),
                None => Ok(0),
            };
            outcome.map_err(BoxError::from)
        }
        .boxed_local()
    }

    fn setup_listeners(&self, _vm: &AsyncViewModel<Self>) {
        self.events.borrow_mut().push("setup".into());
    }

    fn on_resume(&self, _vm: &AsyncViewModel<Self>, data: &u32) {
        self.events.borrow_mut().push(format!("resume {data}"));
    }
}

fn pooled_registry() -> (LocalPool, Registry) {
    let pool = LocalPool::new();
    let registry = Registry::builder()
        .with_spawner(pool.spawner())
        .build()
        .unwrap();
    (pool, registry)
}

const LOAD_TIMEOUT: Duration = Duration::from_millis(100);

fn timed_registry(lab: &LabClock) -> (LocalPool, Registry) {
    let pool = LocalPool::new();
    let registry = Registry::builder()
        .with_config(NotifierConfig::new().with_load_timeout(LOAD_TIMEOUT))
        .with_clock(Clock::lab(lab))
        .with_spawner(pool.spawner())
        .build()
        .unwrap();
    (pool, registry)
}

fn record_states(vm: &AsyncViewModel<Gated>) -> Rc<RefCell<Vec<&'static str>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    vm.listen(move |state| s.borrow_mut().push(state.name()));
    seen
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn creation_schedules_first_load() {
    let (mut pool, registry) = pooled_registry();
    let logic = Gated::default();
    let release = logic.gate();
    let vm = registry.create_async_view_model(Options::new(), logic).unwrap();
    let seen = record_states(&vm);
    assert!(vm.state().is_initial());

    pool.run_until_stalled();
    assert!(vm.state().is_loading());

    release.send(Ok(42)).unwrap();
    pool.run_until_stalled();
    assert_eq!(vm.data().unwrap(), Some(42));
    assert_eq!(*seen.borrow(), vec!["loading", "success"]);
    assert_eq!(vm.logic().events(), vec!["init #1", "setup", "resume 42"]);
}

#[test]
fn overlapping_reload_is_noop() {
    let (mut pool, registry) = pooled_registry();
    let logic = Gated::default();
    let release = logic.gate();
    let vm = registry.create_async_view_model(Options::new(), logic).unwrap();
    pool.run_until_stalled();
    assert!(vm.state().is_loading());

    block_on(vm.reload());
    assert_eq!(vm.logic().events(), vec!["init #1"]);

    release.send(Ok(1)).unwrap();
    pool.run_until_stalled();
    assert_eq!(vm.data().unwrap(), Some(1));
}

#[test]
fn failed_load_is_captured_and_reraised() {
    let (mut pool, registry) = pooled_registry();
    let logic = Gated::default();
    let release = logic.gate();
    let vm = registry.create_async_view_model(Options::new(), logic).unwrap();
    pool.run_until_stalled();
    release.send(Err("backend unavailable")).unwrap();
    pool.run_until_stalled();

    assert!(vm.state().is_error());
    assert_eq!(vm.data().unwrap_err().to_string(), "backend unavailable");
    let message = vm.when(
        String::new,
        String::new,
        |_| String::new(),
        |err, _trace| err.to_string(),
    );
    assert_eq!(message, "backend unavailable");
    assert_eq!(vm.logic().events(), vec!["init #1", "setup"]);

    // A later reload recovers.
    block_on(vm.reload());
    assert_eq!(vm.data().unwrap(), Some(0));
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn result_after_dispose_is_dropped() {
    let (mut pool, registry) = pooled_registry();
    let logic = Gated::default();
    let release = logic.gate();
    let vm = registry.create_async_view_model(Options::new(), logic).unwrap();
    pool.run_until_stalled();
    let key = vm.key().clone();

    vm.dispose();
    assert!(vm.is_disposed());
    assert!(!registry.contains(&key));
    assert!(vm.logic().tokens.borrow()[0].is_cancelled());

    // The gate is still held by the suspended load.
    let _ = release.send(Ok(9));
    pool.run_until_stalled();
    assert!(vm.is_disposed());
    assert_eq!(vm.logic().events(), vec!["init #1"]);
}

#[test]
fn result_after_clean_state_is_dropped() {
    let (mut pool, registry) = pooled_registry();
    let logic = Gated::default();
    let first = logic.gate();
    let second = logic.gate();
    let vm = registry.create_async_view_model(Options::new(), logic).unwrap();
    pool.run_until_stalled();

    vm.clean_state();
    assert!(vm.state().is_initial());
    pool.run_until_stalled();
    assert!(vm.state().is_loading());
    assert!(vm.logic().tokens.borrow()[0].is_cancelled());

    let _ = first.send(Ok(1));
    pool.run_until_stalled();
    assert!(vm.state().is_loading(), "stale result ignored");

    second.send(Ok(2)).unwrap();
    pool.run_until_stalled();
    assert_eq!(vm.data().unwrap(), Some(2));
    assert_eq!(vm.logic().events(), vec!["init #1", "init #1", "setup", "resume 2"]);
}

#[test]
fn access_after_dispose_schedules_fresh_load() {
    let (mut pool, registry) = pooled_registry();
    let vm = registry
        .create_async_view_model(Options::new(), Gated::default())
        .unwrap();
    pool.run_until_stalled();
    assert_eq!(vm.data().unwrap(), Some(0));

    vm.dispose();
    assert!(vm.state().is_initial());
    assert!(registry.contains(vm.key()));
    pool.run_until_stalled();
    assert!(vm.state().is_success());
    assert_eq!(vm.init_count(), 2);
}

#[test]
fn reload_after_dispose_runs_one_load() {
    let (mut pool, registry) = pooled_registry();
    let vm = registry
        .create_async_view_model(Options::new(), Gated::default())
        .unwrap();
    pool.run_until_stalled();
    assert_eq!(vm.logic().events(), vec!["init #1", "setup", "resume 0"]);

    vm.dispose();
    block_on(vm.reload());
    pool.run_until_stalled();

    assert!(registry.contains(vm.key()));
    assert_eq!(vm.init_count(), 2);
    assert_eq!(
        vm.logic().events(),
        vec!["init #1", "setup", "resume 0", "init #1", "setup", "resume 0"]
    );
}

#[test]
fn clean_state_after_dispose_runs_one_load() {
    let (mut pool, registry) = pooled_registry();
    let vm = registry
        .create_async_view_model(Options::new(), Gated::default())
        .unwrap();
    pool.run_until_stalled();

    vm.dispose();
    vm.clean_state();
    pool.run_until_stalled();

    assert!(vm.state().is_success());
    let inits = vm
        .logic()
        .events()
        .iter()
        .filter(|event| event.starts_with("init"))
        .count();
    assert_eq!(inits, 2);
}

// ============================================================================
// Timeout
// ============================================================================

#[test]
fn load_past_timeout_ends_in_error() {
    let lab = LabClock::new();
    let (mut pool, registry) = timed_registry(&lab);
    let logic = Gated::default();
    let release = logic.gate();
    let vm = registry.create_async_view_model(Options::new(), logic).unwrap();
    pool.run_until_stalled();
    assert!(vm.state().is_loading());
    assert_eq!(vm.logic().tokens.borrow()[0].remaining(), Some(LOAD_TIMEOUT));

    lab.advance(LOAD_TIMEOUT + Duration::from_millis(50));
    release.send(Ok(7)).unwrap();
    pool.run_until_stalled();

    assert!(vm.state().is_error());
    assert_eq!(vm.data().unwrap_err().to_string(), "deadline exceeded");
    assert_eq!(vm.logic().events(), vec!["init #1", "setup"]);

    // A load that finishes in time succeeds.
    block_on(vm.reload());
    assert_eq!(vm.data().unwrap(), Some(0));
}

#[test]
fn load_within_timeout_succeeds() {
    let lab = LabClock::new();
    let (mut pool, registry) = timed_registry(&lab);
    let logic = Gated::default();
    let release = logic.gate();
    let vm = registry.create_async_view_model(Options::new(), logic).unwrap();
    pool.run_until_stalled();

    lab.advance(LOAD_TIMEOUT / 2);
    assert_eq!(
        vm.logic().tokens.borrow()[0].remaining(),
        Some(LOAD_TIMEOUT / 2)
    );
    release.send(Ok(3)).unwrap();
    pool.run_until_stalled();
    assert_eq!(vm.data().unwrap(), Some(3));
}

// ============================================================================
// Context
// ============================================================================

#[test]
fn waits_for_instance_context() {
    let (mut pool, registry) = pooled_registry();
    let vm = registry
        .create_async_view_model(Options::new().with_wait_for_context(true), Gated::default())
        .unwrap();
    pool.run_until_stalled();
    assert!(vm.state().is_initial());
    assert!(vm.is_waiting_for_context());
    assert!(vm.require_context("load").is_err());

    registry.register_context(vm.key().clone(), ContextHandle::new("host"));
    pool.run_until_stalled();
    assert!(vm.state().is_success());
    assert_eq!(*vm.logic().contexts.borrow(), vec![Some("host")]);
}

#[test]
fn global_context_wakes_waiting_view_models() {
    let (mut pool, registry) = pooled_registry();
    let first = registry
        .create_async_view_model(Options::new().with_wait_for_context(true), Gated::default())
        .unwrap();
    let second = registry
        .create_async_view_model(Options::new().with_wait_for_context(true), Gated::default())
        .unwrap();
    pool.run_until_stalled();

    registry.init_global_context(ContextHandle::new("app"));
    pool.run_until_stalled();
    assert!(first.state().is_success());
    assert!(second.state().is_success());
    assert_eq!(*second.logic().contexts.borrow(), vec![Some("app")]);
}

#[test]
fn present_context_does_not_wait() {
    let (mut pool, registry) = pooled_registry();
    registry.init_global_context(ContextHandle::new("app"));
    let vm = registry
        .create_async_view_model(Options::new().with_wait_for_context(true), Gated::default())
        .unwrap();
    assert!(!vm.is_waiting_for_context());
    pool.run_until_stalled();
    assert!(vm.state().is_success());
}

// ============================================================================
// Transforms
// ============================================================================

#[test]
fn transform_data_state_requires_success() {
    let (mut pool, registry) = pooled_registry();
    let vm = registry
        .create_async_view_model(Options::new().with_load_on_init(false), Gated::default())
        .unwrap();
    pool.run_until_stalled();
    assert!(vm.state().is_initial());
    assert!(!vm.transform_data_state(|v| Some(v + 1)));

    block_on(vm.reload());
    assert!(vm.transform_data_state(|v| Some(v + 5)));
    assert!(!vm.transform_data_state(|_| None));
    assert_eq!(vm.data().unwrap(), Some(5));
}
