#![forbid(unsafe_code)]

//! Reference counting tied to UI mount/unmount, with debounced disposal.
//!
//! Each registry record carries a [`ReferenceSet`]. The UI layer adds a
//! reference when a component that reads the container mounts and removes
//! it on unmount. When the last reference goes away and the record has
//! `auto_dispose` enabled, a dispose deadline is armed
//! (`now + dispose_delay`). A reference arriving before the deadline cancels
//! it. The host loop calls [`Registry::poll_timers`](crate::Registry::poll_timers)
//! to fire expired deadlines.
//!
//! This module never touches container values; it only observes
//! mount/unmount events and decides when teardown is due.
//!
//! # Invariants
//!
//! 1. `count()` equals the number of distinct ids currently held.
//! 2. At most one deadline is pending per record.
//! 3. Adding a reference always clears a pending deadline.

use ahash::AHashSet;
use rnotify_core::ReferenceId;
use web_time::{Duration, Instant};

/// Outcome of [`ReferenceSet::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Added {
    pub(crate) grew: bool,
    pub(crate) cancelled_dispose: bool,
}

/// Outcome of [`ReferenceSet::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Removed {
    pub(crate) shrank: bool,
    pub(crate) armed: Option<Instant>,
}

/// Mounted-component references of one record.
#[derive(Debug, Default)]
pub(crate) struct ReferenceSet {
    ids: AHashSet<ReferenceId>,
    pending_dispose: Option<Instant>,
}

impl ReferenceSet {
    pub(crate) fn count(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn contains(&self, id: &ReferenceId) -> bool {
        self.ids.contains(id)
    }

    pub(crate) fn pending_dispose(&self) -> Option<Instant> {
        self.pending_dispose
    }

    /// Add `id`. A late reference always wins over a scheduled teardown.
    pub(crate) fn add(&mut self, id: ReferenceId) -> Added {
        let grew = self.ids.insert(id);
        let cancelled_dispose = self.pending_dispose.take().is_some();
        Added {
            grew,
            cancelled_dispose,
        }
    }

    /// Remove `id`; arm a deadline when this empties an auto-dispose set and
    /// nothing is pending yet.
    pub(crate) fn remove(
        &mut self,
        id: &ReferenceId,
        auto_dispose: bool,
        now: Instant,
        delay: Duration,
    ) -> Removed {
        let shrank = self.ids.remove(id);
        let mut armed = None;
        if self.ids.is_empty() && auto_dispose && self.pending_dispose.is_none() {
            let deadline = now + delay;
            self.pending_dispose = Some(deadline);
            armed = Some(deadline);
        }
        Removed { shrank, armed }
    }

    /// Whether a pending deadline has passed at `now`.
    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.pending_dispose.is_some_and(|deadline| now >= deadline)
    }

    /// Clear the pending deadline and report whether teardown should really
    /// happen: nobody re-referenced the record while the timer was in
    /// flight and auto-dispose is still on.
    pub(crate) fn fire(&mut self, auto_dispose: bool, already_disposed: bool) -> bool {
        self.pending_dispose = None;
        self.ids.is_empty() && auto_dispose && !already_disposed
    }
}
