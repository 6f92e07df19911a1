//! Delay judge: deadline checks without suspended call stacks.
//!
//! Anything in the simulation that "finishes after N ticks" — cast
//! delays, cooldown gates — goes through this table instead of holding
//! a coroutine or callback alive. Callers keep a [`DelayHandle`] and ask
//! [`DelayJudge::is_completed`] each tick; nothing is scheduled, nothing
//! fires on its own.
//!
//! The deadline of an entry is fixed at creation. Haste and slow
//! effects shift the *perceived* elapsed time via
//! [`DelayJudge::modify_delta`] without recomputing the deadline, so
//! stacking and removing such effects cannot accumulate rounding drift.

use std::collections::HashMap;

use crate::clock::Tick;

/// Opaque identifier for a delay entry.
///
/// Handles are issued from a monotonically increasing counter and are
/// never reused after [`DelayJudge::remove`], so a stale handle can
/// never alias a newer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DelayHandle(u32);

/// A single pending delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DelayEntry {
    /// Deadline tick, fixed at creation.
    end_tick: Tick,
    /// Perceived-time adjustment. The only mutable field.
    delta_tick: i32,
}

/// Table of pending delays.
///
/// Private to its owning component instance; there is no concurrent
/// writer, so no locking is needed.
#[derive(Debug, Default)]
pub struct DelayJudge {
    entries: HashMap<DelayHandle, DelayEntry>,
    next_handle: u32,
}

impl DelayJudge {
    /// Create an empty judge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delay of `duration_ticks` starting at `current_tick`.
    ///
    /// The deadline is `current_tick + max(duration_ticks, 1)`,
    /// saturating at the maximum representable tick rather than
    /// wrapping. The `max(.., 1)` floor is the one-tick latency
    /// guarantee: a zero-duration delay still needs one more tick
    /// boundary before it completes, so callers never observe
    /// completion in the tick they asked in.
    pub fn start(&mut self, current_tick: Tick, duration_ticks: Tick) -> DelayHandle {
        let handle = DelayHandle(self.next_handle);
        self.next_handle += 1;

        let end_tick = current_tick.saturating_add(duration_ticks.max(1));
        self.entries.insert(
            handle,
            DelayEntry {
                end_tick,
                delta_tick: 0,
            },
        );
        handle
    }

    /// Pure completion query: `(current + delta) >= end`.
    ///
    /// Unknown or removed handles answer `false`; a caller that removed
    /// an entry already knows to stop querying it.
    #[must_use]
    pub fn is_completed(&self, handle: DelayHandle, current_tick: Tick) -> bool {
        match self.entries.get(&handle) {
            Some(entry) => i64::from(current_tick) + i64::from(entry.delta_tick)
                >= i64::from(entry.end_tick),
            None => false,
        }
    }

    /// Shift the perceived elapsed time of an entry.
    ///
    /// Positive `delta` accelerates completion (haste), negative stalls
    /// it (slow). The deadline itself never moves. Unknown handles are
    /// ignored.
    pub fn modify_delta(&mut self, handle: DelayHandle, delta: i32) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            entry.delta_tick = entry.delta_tick.saturating_add(delta);
        }
    }

    /// Permanently forget an entry.
    ///
    /// Removing a handle twice is a programmer error: loud in debug
    /// builds, a defensive no-op in release.
    pub fn remove(&mut self, handle: DelayHandle) {
        let removed = self.entries.remove(&handle);
        debug_assert!(
            removed.is_some(),
            "delay handle {handle:?} removed twice or never issued"
        );
        if removed.is_none() {
            tracing::trace!(?handle, "remove of unknown delay handle ignored");
        }
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
