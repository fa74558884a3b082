#![forbid(unsafe_code)]

//! The value held by an async view-model.
//!
//! [`AsyncState<T>`] is replaced wholesale on every transition; it is never
//! mutated in place. Reading the payload with [`AsyncState::data`] returns
//! the stored error when the state is [`AsyncState::Error`], so careless
//! direct access fails loudly. The exhaustive [`when`](AsyncState::when)
//! and [`match_state`](AsyncState::match_state) dispatchers are the safe
//! read path.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use rnotify_core::BoxError;

/// Shared, clonable error stored in [`AsyncState::Error`].
#[derive(Clone)]
pub struct AsyncError(Arc<dyn Error + Send + Sync + 'static>);

impl AsyncError {
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self(Arc::from(error.into()))
    }

    /// Whether both handles share one underlying error.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    #[must_use]
    pub fn get(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Debug for AsyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for AsyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl Error for AsyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

/// Five-way tagged union over the lifecycle of an async load.
#[derive(Debug, Clone)]
pub enum AsyncState<T> {
    /// Nothing loaded yet.
    Initial,
    Loading,
    Success(T),
    Error {
        error: AsyncError,
        trace: Option<Arc<Backtrace>>,
    },
    /// Loaded, but there is nothing to show.
    Empty,
}

impl<T> Default for AsyncState<T> {
    fn default() -> Self {
        Self::Initial
    }
}

impl<T> AsyncState<T> {
    /// An `Error` state for `error`, capturing a backtrace when
    /// `RUST_BACKTRACE` enables it.
    pub fn failure(error: impl Into<BoxError>) -> Self {
        Self::Error {
            error: AsyncError::new(error),
            trace: capture_trace(),
        }
    }

    /// Short lowercase tag for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Loading => "loading",
            Self::Success(_) => "success",
            Self::Error { .. } => "error",
            Self::Empty => "empty",
        }
    }

    #[must_use]
    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Initial)
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The payload when loaded, `None` while there is none, and the stored
    /// error when the state is `Error`.
    pub fn data(&self) -> Result<Option<&T>, AsyncError> {
        match self {
            Self::Success(data) => Ok(Some(data)),
            Self::Error { error, .. } => Err(error.clone()),
            Self::Initial | Self::Loading | Self::Empty => Ok(None),
        }
    }

    /// The payload, ignoring errors.
    #[must_use]
    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&AsyncError> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Four-way dispatch. `Empty` is routed to `initial`.
    pub fn when<R>(
        &self,
        initial: impl FnOnce() -> R,
        loading: impl FnOnce() -> R,
        success: impl FnOnce(&T) -> R,
        error: impl FnOnce(&AsyncError, Option<&Backtrace>) -> R,
    ) -> R {
        match self {
            Self::Initial | Self::Empty => initial(),
            Self::Loading => loading(),
            Self::Success(data) => success(data),
            Self::Error { error: err, trace } => error(err, trace.as_deref()),
        }
    }

    /// Five-way dispatch.
    pub fn match_state<R>(
        &self,
        initial: impl FnOnce() -> R,
        loading: impl FnOnce() -> R,
        success: impl FnOnce(&T) -> R,
        error: impl FnOnce(&AsyncError, Option<&Backtrace>) -> R,
        empty: impl FnOnce() -> R,
    ) -> R {
        match self {
            Self::Initial => initial(),
            Self::Loading => loading(),
            Self::Success(data) => success(data),
            Self::Error { error: err, trace } => error(err, trace.as_deref()),
            Self::Empty => empty(),
        }
    }
}

/// Errors compare by identity; payloads by value.
impl<T: PartialEq> PartialEq for AsyncState<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Initial, Self::Initial)
            | (Self::Loading, Self::Loading)
            | (Self::Empty, Self::Empty) => true,
            (Self::Success(a), Self::Success(b)) => a == b,
            (Self::Error { error: a, .. }, Self::Error { error: b, .. }) => a.same(b),
            _ => false,
        }
    }
}

fn capture_trace() -> Option<Arc<Backtrace>> {
    let trace = Backtrace::capture();
    (trace.status() == BacktraceStatus::Captured).then(|| Arc::new(trace))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("network down")]
    struct NetworkDown;

    #[test]
    fn data_rethrows_stored_error() {
        let state: AsyncState<u32> = AsyncState::failure(NetworkDown);
        let err = state.data().unwrap_err();
        assert_eq!(err.to_string(), "network down");
        assert!(err.downcast_ref::<NetworkDown>().is_some());
    }

    #[test]
    fn data_on_other_tags() {
        assert_eq!(AsyncState::Success(3).data().unwrap(), Some(&3));
        assert_eq!(AsyncState::<u8>::Initial.data().unwrap(), None);
        assert_eq!(AsyncState::<u8>::Loading.data().unwrap(), None);
        assert_eq!(AsyncState::<u8>::Empty.data().unwrap(), None);
    }

    #[test]
    fn when_routes_empty_to_initial() {
        let route = |state: &AsyncState<i32>| {
            state.when(
                || "initial",
                || "loading",
                |_| "success",
                |_, _| "error",
            )
        };
        assert_eq!(route(&AsyncState::Empty), "initial");
        assert_eq!(route(&AsyncState::Initial), "initial");
        assert_eq!(route(&AsyncState::Loading), "loading");
        assert_eq!(route(&AsyncState::Success(1)), "success");
        assert_eq!(route(&AsyncState::failure("boom")), "error");
    }

    #[test]
    fn match_state_has_five_branches() {
        let route = |state: &AsyncState<i32>| {
            state.match_state(
                || "initial".to_string(),
                || "loading".to_string(),
                |v| format!("success {v}"),
                |e, _| format!("error {e}"),
                || "empty".to_string(),
            )
        };
        assert_eq!(route(&AsyncState::Empty), "empty");
        assert_eq!(route(&AsyncState::Success(9)), "success 9");
        assert_eq!(route(&AsyncState::failure("boom")), "error boom");
    }

    #[test]
    fn equality_compares_errors_by_identity() {
        let failed: AsyncState<i32> = AsyncState::failure("x");
        assert_eq!(failed, failed.clone());
        assert_ne!(failed, AsyncState::failure("x"));
        assert_eq!(AsyncState::Success(1), AsyncState::Success(1));
        assert_ne!(AsyncState::Success(1), AsyncState::Loading);
    }

    #[test]
    fn names_and_predicates() {
        let state: AsyncState<()> = AsyncState::default();
        assert!(state.is_initial());
        assert_eq!(state.name(), "initial");
        assert!(AsyncState::<()>::Loading.is_loading());
        assert!(AsyncState::Success(()).is_success());
        assert!(AsyncState::<()>::failure("e").is_error());
        assert!(AsyncState::<()>::Empty.is_empty());
        assert_eq!(AsyncState::Success(2).success(), Some(&2));
        assert!(AsyncState::<()>::failure("e").error().is_some());
    }
}
