//! Dispatch statistics.
//!
//! Counters are updated only on the slow path, so the cached fast path
//! stays free of shared writes. All counters use relaxed ordering; they are
//! diagnostics, not synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

/// Slow-path counters shared by every site of a context.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Full resolutions performed.
    resolutions: AtomicU64,
    /// Strategies installed into sites.
    installs: AtomicU64,
    /// Cached strategy rejected by its guards.
    guard_misses: AtomicU64,
    /// Cached strategy rejected because the epoch moved on.
    stale_misses: AtomicU64,
    /// Calls served without caching (warm-up, disabled caching, spread).
    uncached_calls: AtomicU64,
    /// Sites that gave up specializing.
    megamorphic_transitions: AtomicU64,
    /// Calls served by the catch-all strategy.
    generic_dispatches: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub resolutions: u64,
    pub installs: u64,
    pub guard_misses: u64,
    pub stale_misses: u64,
    pub uncached_calls: u64,
    pub megamorphic_transitions: u64,
    pub generic_dispatches: u64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_resolution(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_install(&self) {
        self.installs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_guard_miss(&self) {
        self.guard_misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_stale_miss(&self) {
        self.stale_misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_uncached(&self) {
        self.uncached_calls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_megamorphic(&self) {
        self.megamorphic_transitions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_generic(&self) {
        self.generic_dispatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of full resolutions performed so far.
    #[inline]
    pub fn resolutions(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            resolutions: self.resolutions.load(Ordering::Relaxed),
            installs: self.installs.load(Ordering::Relaxed),
            guard_misses: self.guard_misses.load(Ordering::Relaxed),
            stale_misses: self.stale_misses.load(Ordering::Relaxed),
            uncached_calls: self.uncached_calls.load(Ordering::Relaxed),
            megamorphic_transitions: self.megamorphic_transitions.load(Ordering::Relaxed),
            generic_dispatches: self.generic_dispatches.load(Ordering::Relaxed),
        }
    }

    /// Reset every counter to zero.
    pub fn reset(&self) {
        for counter in [
            &self.resolutions,
            &self.installs,
            &self.guard_misses,
            &self.stale_misses,
            &self.uncached_calls,
            &self.megamorphic_transitions,
            &self.generic_dispatches,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl StatsSnapshot {
    /// Misses of either kind.
    pub fn misses(&self) -> u64 {
        self.guard_misses + self.stale_misses
    }
}
