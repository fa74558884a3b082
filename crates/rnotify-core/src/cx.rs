//! Cancellation context (`Cx`) threaded through asynchronous loads.
//!
//! An async view-model hands a fresh `Cx` to every `init()` call. Disposing
//! or cleaning the view-model cancels it, so long-running loaders can bail
//! out at their next yield point instead of relying on an `is_disposed`
//! check after every `.await`. The view-model also checks the token itself
//! once the load resolves and drops results from cancelled loads.
//!
//! A `Cx` built with [`Cx::with_timeout`] also expires on its clock. The
//! runtime uses that for the configurable load timeout.
//!
//! `Cx` is cheaply cloneable and read-only. Cancellation goes through the
//! companion [`CxController`].
//!
//! # Example
//!
//! ```
//! use rnotify_core::cx::{Cx, CxError};
//! use rnotify_core::clock::Clock;
//!
//! let (cx, ctrl) = Cx::new(Clock::real());
//! assert!(cx.check().is_ok());
//! ctrl.cancel();
//! assert_eq!(cx.check(), Err(CxError::Cancelled));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;
use web_time::{Duration, Instant};

use crate::clock::Clock;

// ─── Cx ID generation ────────────────────────────────────────────────────────

static NEXT_CX_ID: AtomicU64 = AtomicU64::new(1);

fn next_cx_id() -> u64 {
    NEXT_CX_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Inner shared state ──────────────────────────────────────────────────────

#[derive(Debug)]
struct CxInner {
    id: u64,
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    clock: Clock,
}

// ─── Cx ──────────────────────────────────────────────────────────────────────

/// Cancellation handle given to loaders.
#[derive(Clone, Debug)]
pub struct Cx {
    inner: Arc<CxInner>,
}

impl Cx {
    /// Context without a deadline.
    #[must_use]
    pub fn new(clock: Clock) -> (Self, CxController) {
        Self::build(clock, None)
    }

    /// Context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(clock: Clock, timeout: Duration) -> (Self, CxController) {
        let deadline = clock.now() + timeout;
        Self::build(clock, Some(deadline))
    }

    fn build(clock: Clock, deadline: Option<Instant>) -> (Self, CxController) {
        let inner = Arc::new(CxInner {
            id: next_cx_id(),
            cancelled: AtomicBool::new(false),
            deadline,
            clock,
        });
        (
            Self {
                inner: Arc::clone(&inner),
            },
            CxController { inner },
        )
    }

    /// Identifier for logs.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Whether the deadline has passed. Always `false` without one.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.inner
            .deadline
            .is_some_and(|d| self.inner.clock.now() >= d)
    }

    /// Time left before the deadline, saturating at zero.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(self.inner.clock.now()))
    }

    /// `Err` once cancelled or expired. Call at yield points:
    ///
    /// ```ignore
    /// let page = api.fetch_page(1).await?;
    /// cx.check()?;
    /// let next = api.fetch_page(2).await?;
    /// ```
    pub fn check(&self) -> Result<(), CxError> {
        if self.is_cancelled() {
            return Err(CxError::Cancelled);
        }
        if self.is_expired() {
            return Err(CxError::DeadlineExceeded);
        }
        Ok(())
    }
}

// ─── CxController ────────────────────────────────────────────────────────────

/// Owner side of a [`Cx`]. Dropping it does **not** cancel.
#[derive(Debug)]
pub struct CxController {
    inner: Arc<CxInner>,
}

impl CxController {
    /// Cancel the context. Repeated calls are no-ops.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!(cx_id = self.inner.id, "cx cancelled");
        }
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Another handle to the controlled context.
    #[must_use]
    pub fn cx(&self) -> Cx {
        Cx {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Why a context stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CxError {
    #[error("context cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
