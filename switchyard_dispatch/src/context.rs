//! Runtime context.
//!
//! Everything a dispatch needs beyond the call itself: the meta-object
//! lookup capability, the invalidation epoch, configuration and statistics.
//! A context is created once per runtime and shared by every site table;
//! nothing in the engine reaches for process-wide state.

use crate::config::{ConfigError, DispatchConfig};
use crate::epoch::{InvalidationEpoch, InvalidationReason};
use crate::resolver::Resolver;
use crate::stats::DispatchStats;
use std::sync::{Arc, Weak};
use switchyard_core::{ChangeListener, MetaObjectLookup, TypeSystemChange};

/// Shared dispatch state for one runtime.
pub struct RuntimeContext {
    /// Meta-object lookup capability.
    lookup: Arc<dyn MetaObjectLookup>,
    /// Invalidation token shared by every site.
    epoch: Arc<InvalidationEpoch>,
    /// Dispatch configuration.
    config: DispatchConfig,
    /// Slow-path counters.
    stats: DispatchStats,
}

/// Bumps the epoch on every broadcast type-system change.
struct EpochListener(Weak<InvalidationEpoch>);

impl ChangeListener for EpochListener {
    fn on_change(&self, change: &TypeSystemChange) {
        if let Some(epoch) = self.0.upgrade() {
            epoch.bump(InvalidationReason::TypeSystem(change.clone()));
        }
    }
}

impl RuntimeContext {
    /// Create a context configured from the environment.
    ///
    /// An invalid environment configuration falls back to the defaults.
    pub fn new(lookup: Arc<dyn MetaObjectLookup>) -> Arc<Self> {
        let mut config = DispatchConfig::from_env();
        if let Err(error) = config.validate() {
            tracing::warn!(%error, "invalid dispatch configuration from environment, using defaults");
            config = DispatchConfig::default();
        }
        Self::build(lookup, config)
    }

    /// Create a context with an explicit configuration.
    pub fn with_config(
        lookup: Arc<dyn MetaObjectLookup>,
        config: DispatchConfig,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        Ok(Self::build(lookup, config))
    }

    fn build(lookup: Arc<dyn MetaObjectLookup>, config: DispatchConfig) -> Arc<Self> {
        let epoch = Arc::new(InvalidationEpoch::new());
        lookup.subscribe(Arc::new(EpochListener(Arc::downgrade(&epoch))));
        tracing::debug!(?config, "created dispatch context");
        Arc::new(Self {
            lookup,
            epoch,
            config,
            stats: DispatchStats::new(),
        })
    }

    #[inline]
    pub fn lookup(&self) -> &dyn MetaObjectLookup {
        &*self.lookup
    }

    #[inline]
    pub fn epoch(&self) -> &InvalidationEpoch {
        &self.epoch
    }

    #[inline]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Resolver bound to this context.
    #[inline]
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&*self.lookup, &self.stats)
    }

    /// Invalidate every cached binding. Returns the new generation.
    pub fn invalidate(&self, why: &str) -> u64 {
        self.epoch.bump(InvalidationReason::Manual(Arc::from(why)))
    }
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("epoch", &self.epoch)
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
