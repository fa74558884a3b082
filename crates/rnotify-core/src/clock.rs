#![forbid(unsafe_code)]

//! Time sources for dispose timers and notification windows.
//!
//! Production code reads wall-clock time. Tests hand the registry a
//! [`LabClock`] and advance it by hand, which makes debounced disposal and
//! overflow windows fully deterministic.
//!
//! # Example
//!
//! ```
//! use rnotify_core::clock::{Clock, LabClock};
//! use web_time::Duration;
//!
//! let lab = LabClock::new();
//! let clock = Clock::lab(&lab);
//! let t0 = clock.now();
//! lab.advance(Duration::from_secs(30));
//! assert_eq!(clock.now().duration_since(t0), Duration::from_secs(30));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use web_time::{Duration, Instant};

/// A manually-advanceable clock.
///
/// Clones share the same offset, so every component holding a clone
/// observes the same time.
#[derive(Debug, Clone)]
pub struct LabClock {
    epoch: Instant,
    offset_us: Arc<AtomicU64>,
}

impl LabClock {
    /// Create a lab clock pinned at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = delta.as_micros().min(u64::MAX as u128) as u64;
        self.offset_us.fetch_add(us, Ordering::Release);
    }

    /// Current lab time.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.epoch + self.elapsed()
    }

    /// Total time advanced since creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.offset_us.load(Ordering::Acquire))
    }
}

impl Default for LabClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Time source used by the registry.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Wall-clock time.
    #[default]
    Real,
    /// Deterministic time driven by a [`LabClock`].
    Lab(LabClock),
}

impl Clock {
    /// Wall-clock time source.
    #[must_use]
    pub const fn real() -> Self {
        Self::Real
    }

    /// Time source sharing `clock`'s offset.
    #[must_use]
    pub fn lab(clock: &LabClock) -> Self {
        Self::Lab(clock.clone())
    }

    /// Current instant according to this source.
    #[must_use]
    pub fn now(&self) -> Instant {
        match self {
            Self::Real => Instant::now(),
            Self::Lab(lab) => lab.now(),
        }
    }

    /// Whether time is driven by hand.
    #[inline]
    #[must_use]
    pub fn is_lab(&self) -> bool {
        matches!(self, Self::Lab(_))
    }
}
