//! Global invalidation epoch.
//!
//! Every cached binding holds the epoch token that was current when its
//! resolution started. A type-system change swaps in a fresh token and marks
//! the previous one invalidated; from then on every binding holding an old
//! token fails its validity check and its site re-resolves on next use.
//!
//! ```text
//!   bump():   current ──swap──▶ token(n+1)
//!             token(n).invalidated = true
//!
//!   binding:  token(n) ── is_valid()? ── false ──▶ re-resolve
//! ```
//!
//! # Performance
//!
//! - Validity check: one atomic load on the binding's own token.
//! - Bump: one allocation, one atomic swap, one atomic store, regardless of
//!   how many sites exist. No reverse index from types to sites is kept.

use arc_swap::ArcSwap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use switchyard_core::TypeSystemChange;

/// Why the epoch was bumped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidationReason {
    /// The epoch a context starts with.
    Initial,
    /// A broadcast type-system change.
    TypeSystem(TypeSystemChange),
    /// Explicit request by the embedder.
    Manual(Arc<str>),
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationReason::Initial => f.write_str("initial"),
            InvalidationReason::TypeSystem(change) => write!(f, "{change}"),
            InvalidationReason::Manual(why) => write!(f, "manual: {why}"),
        }
    }
}

/// One generation of the epoch.
#[derive(Debug)]
pub struct EpochToken {
    /// Monotonic generation number.
    generation: u64,
    /// Change that created this token.
    reason: InvalidationReason,
    /// Set once a newer token replaces this one.
    invalidated: AtomicBool,
}

impl EpochToken {
    fn new(generation: u64, reason: InvalidationReason) -> Self {
        Self {
            generation,
            reason,
            invalidated: AtomicBool::new(false),
        }
    }

    /// Whether no bump has happened since this token was current.
    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        !self.invalidated.load(Ordering::Acquire)
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reason(&self) -> &InvalidationReason {
        &self.reason
    }
}

/// The shared, swappable invalidation token.
pub struct InvalidationEpoch {
    /// Current token.
    current: ArcSwap<EpochToken>,
    /// Generation counter.
    generations: AtomicU64,
}

impl InvalidationEpoch {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(EpochToken::new(0, InvalidationReason::Initial)),
            generations: AtomicU64::new(0),
        }
    }

    /// The current token. Capture it before resolving.
    #[inline]
    pub fn current(&self) -> Arc<EpochToken> {
        self.current.load_full()
    }

    /// Generation of the current token.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// Invalidate every binding made under the current token.
    pub fn bump(&self, reason: InvalidationReason) -> u64 {
        let generation = self.generations.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(generation, %reason, "bumping invalidation epoch");
        let previous = self.current.swap(Arc::new(EpochToken::new(generation, reason)));
        previous.invalidated.store(true, Ordering::Release);
        generation
    }
}

impl Default for InvalidationEpoch {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InvalidationEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationEpoch")
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_token_valid() {
        let epoch = InvalidationEpoch::new();
        let token = epoch.current();
        assert!(token.is_valid());
        assert_eq!(token.generation(), 0);
        assert_eq!(token.reason(), &InvalidationReason::Initial);
    }

    #[test]
    fn test_bump_invalidates_previous() {
        let epoch = InvalidationEpoch::new();
        let before = epoch.current();
        let generation = epoch.bump(InvalidationReason::Manual(Arc::from("test")));
        assert_eq!(generation, 1);
        assert!(!before.is_valid());

        let after = epoch.current();
        assert!(after.is_valid());
        assert_eq!(after.generation(), 1);
        assert_eq!(epoch.generation(), 1);
    }

    #[test]
    fn test_every_older_token_invalidated() {
        let epoch = InvalidationEpoch::new();
        let tokens: Vec<_> = (0..5)
            .map(|_| {
                let token = epoch.current();
                epoch.bump(InvalidationReason::Manual(Arc::from("loop")));
                token
            })
            .collect();
        assert!(tokens.iter().all(|t| !t.is_valid()));
        assert!(epoch.current().is_valid());
    }

    #[test]
    fn test_concurrent_bumps() {
        let epoch = Arc::new(InvalidationEpoch::new());
        let initial = epoch.current();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let epoch = Arc::clone(&epoch);
                scope.spawn(move || {
                    for _ in 0..100 {
                        epoch.bump(InvalidationReason::Manual(Arc::from("race")));
                    }
                });
            }
        });
        assert!(!initial.is_valid());
        assert!(epoch.current().is_valid());
        assert!(epoch.generation() >= 1);
    }
}
