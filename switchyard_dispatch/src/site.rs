//! Dispatch sites.
//!
//! One `DispatchSite` exists per call location of a compiled unit. It holds
//! at most one published [`ResolvedBinding`] and moves through a small state
//! machine:
//!
//! ```text
//!                 warm-up calls
//!   Uncached ───────────────────▶ WarmingUp ──┐
//!      ▲                                      │ resolve + install
//!      │ epoch bumped                         ▼
//!      └──────────────────────────────────  Cached ◀──┐
//!                                             │       │ guard miss:
//!                                             └───────┘ resolve + replace
//! ```
//!
//! # Concurrency
//!
//! The binding slot is an atomic pointer. Readers take a snapshot; writers
//! publish a fully built binding with a plain store. Two threads missing at
//! the same time both resolve and the last store wins; both results are
//! correct for their own calls, so the race costs at most a redundant
//! resolution.
//!
//! # Performance
//!
//! The fast path is one pointer load, one epoch load, the guard tests and
//! the invocation. It performs no shared writes when the site is not
//! churning.

use crate::config::DispatchConfig;
use crate::context::RuntimeContext;
use crate::family::{CatchAllReason, ResolvedBinding, SiteStrategy};
use crate::guard::GuardSet;
use crate::kind::{CallKind, SiteDescriptor, SiteFlags};
use crate::resolver::CallRequest;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use switchyard_core::{RuntimeError, Value};

/// Observable state of a site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SiteState {
    /// Nothing cached (fresh, invalidated, or caching disabled).
    Uncached,
    /// Still inside the warm-up window.
    WarmingUp { calls: u32 },
    /// A valid binding is published.
    Cached,
}

/// Why the fast path was not taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Miss {
    /// No binding published.
    Empty,
    /// Binding resolved under an older epoch.
    Stale,
    /// Binding rejected by its guards.
    Guard,
}

/// A single call location.
pub struct DispatchSite {
    /// Compiled unit the site belongs to.
    unit: Arc<str>,
    /// Position within the unit's site table.
    index: usize,
    descriptor: SiteDescriptor,
    /// Published binding.
    current: ArcSwapOption<ResolvedBinding>,
    /// Slow-path calls seen during warm-up. Saturates at `warmup_calls`.
    warmup_seen: AtomicU32,
    /// Consecutive guard misses.
    misses: AtomicU32,
    /// Set by the first install; warm-up is never reported again.
    installed: AtomicBool,
    /// Warm-up length copied from the configuration.
    warmup_calls: u32,
    /// False for spread sites and when caching is disabled.
    cache_enabled: bool,
}

impl DispatchSite {
    pub fn new(unit: Arc<str>, index: usize, descriptor: SiteDescriptor, config: &DispatchConfig) -> Self {
        let cache_enabled = config.caching && !descriptor.flags.contains(SiteFlags::SPREAD);
        Self {
            unit,
            index,
            descriptor,
            current: ArcSwapOption::empty(),
            warmup_seen: AtomicU32::new(0),
            misses: AtomicU32::new(0),
            installed: AtomicBool::new(false),
            warmup_calls: config.warmup_calls,
            cache_enabled,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[inline]
    pub fn kind(&self) -> CallKind {
        self.descriptor.kind
    }

    #[inline]
    pub fn descriptor(&self) -> &SiteDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Whether this site ever caches.
    #[inline]
    pub fn is_cacheable(&self) -> bool {
        self.cache_enabled
    }

    /// Build the resolution request for a call at this site.
    #[inline]
    pub(crate) fn request<'a>(&'a self, receiver: &'a Value, args: &'a [Value]) -> CallRequest<'a> {
        CallRequest {
            name: &self.descriptor.name,
            kind: self.descriptor.kind,
            receiver,
            args,
            cast_target: self.descriptor.cast_target,
        }
    }

    /// Current state.
    pub fn state(&self) -> SiteState {
        let current = self.current.load();
        if current.as_deref().is_some_and(|b| !b.is_stale()) {
            return SiteState::Cached;
        }
        let calls = self.warmup_seen.load(Ordering::Relaxed).min(self.warmup_calls);
        if self.cache_enabled && calls > 0 && !self.installed.load(Ordering::Relaxed) {
            SiteState::WarmingUp { calls }
        } else {
            SiteState::Uncached
        }
    }

    /// Strategy of the published binding, if any and still valid.
    pub fn strategy_name(&self) -> Option<&'static str> {
        let current = self.current.load();
        current
            .as_deref()
            .filter(|b| !b.is_stale())
            .map(|b| b.strategy().name())
    }

    /// Drop the published binding.
    pub fn reset(&self) {
        self.current.store(None);
        self.misses.store(0, Ordering::Relaxed);
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Dispatch a call through this site.
    #[inline]
    pub fn dispatch(
        &self,
        ctx: &RuntimeContext,
        receiver: &Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        // The load guard is released before invoking: callables may dispatch
        // again, and nested calls must not each pin a guard.
        let hit = {
            let current = self.current.load();
            match &*current {
                Some(binding) if binding.accepts(receiver, args, ctx.lookup()) => {
                    Ok(Arc::clone(binding))
                }
                Some(binding) if binding.is_stale() => Err(Miss::Stale),
                Some(_) => Err(Miss::Guard),
                None => Err(Miss::Empty),
            }
        };
        match hit {
            Ok(binding) => {
                if self.misses.load(Ordering::Relaxed) != 0 {
                    self.misses.store(0, Ordering::Relaxed);
                }
                self.finish(binding.invoke(self, ctx, receiver, args))
            }
            Err(miss) => self.finish(self.dispatch_slow(ctx, receiver, args, miss)),
        }
    }

    /// Surface the underlying error of a reflective failure.
    #[inline]
    fn finish(&self, result: Result<Value, RuntimeError>) -> Result<Value, RuntimeError> {
        result.map_err(|error| {
            let error = error.unwrap_invocation();
            if error.is_fatal() {
                tracing::error!(
                    unit = %self.unit,
                    index = self.index,
                    name = %self.descriptor.name,
                    %error,
                    "internal dispatch failure"
                );
            }
            error
        })
    }

    /// Count a warm-up call. Returns true while the window is still open.
    #[inline]
    fn tick_warmup(&self) -> bool {
        if self.warmup_seen.load(Ordering::Relaxed) >= self.warmup_calls {
            return false;
        }
        self.warmup_seen.fetch_add(1, Ordering::Relaxed) < self.warmup_calls
    }

    #[cold]
    #[inline(never)]
    fn dispatch_slow(
        &self,
        ctx: &RuntimeContext,
        receiver: &Value,
        args: &[Value],
        miss: Miss,
    ) -> Result<Value, RuntimeError> {
        let stats = ctx.stats();
        match miss {
            Miss::Guard => stats.record_guard_miss(),
            Miss::Stale => {
                stats.record_stale_miss();
                self.misses.store(0, Ordering::Relaxed);
            }
            Miss::Empty => {}
        }

        let cacheable = self.cache_enabled && !self.tick_warmup();

        // Safe navigation never needs the resolver for a null receiver.
        if receiver.is_null() && self.descriptor.flags.contains(SiteFlags::SAFE_NAVIGATION) {
            if cacheable {
                let strategy = SiteStrategy::NullShortCircuit;
                let guards = GuardSet::build(&strategy, &self.descriptor, receiver, args, ctx.lookup());
                self.install(ctx, ResolvedBinding::new(strategy, guards, ctx.epoch().current()));
            } else {
                stats.record_uncached();
            }
            return Ok(Value::Null);
        }

        // Captured before resolving: a change racing with this resolution
        // leaves the binding already stale.
        let epoch = ctx.epoch().current();
        let meta = ctx.lookup().meta_object(receiver);
        let candidate = ctx.resolver().resolve(&self.request(receiver, args), &meta)?;

        if !cacheable {
            stats.record_uncached();
            return candidate.invoke(self.name(), receiver, args);
        }

        // The slow path always invokes the candidate it just resolved; the
        // strategy only serves later hits.
        let strategy = SiteStrategy::specialize(self.descriptor.kind, receiver, candidate.clone());

        if miss == Miss::Guard && !strategy.is_catch_all() {
            let misses = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
            if misses >= ctx.config().megamorphic_threshold {
                tracing::debug!(
                    unit = %self.unit,
                    index = self.index,
                    name = %self.descriptor.name,
                    misses,
                    "site went megamorphic"
                );
                stats.record_megamorphic();
                let catch_all = SiteStrategy::CatchAll(CatchAllReason::Megamorphic);
                let guards = GuardSet::build(&catch_all, &self.descriptor, receiver, args, ctx.lookup());
                self.install(ctx, ResolvedBinding::new(catch_all, guards, epoch));
                return candidate.invoke(self.name(), receiver, args);
            }
        }

        let guards = GuardSet::build(&strategy, &self.descriptor, receiver, args, ctx.lookup());
        self.install(ctx, ResolvedBinding::new(strategy, guards, epoch));
        candidate.invoke(self.name(), receiver, args)
    }

    fn install(&self, ctx: &RuntimeContext, binding: ResolvedBinding) {
        let binding = Arc::new(binding);
        tracing::trace!(
            unit = %self.unit,
            index = self.index,
            name = %self.descriptor.name,
            strategy = binding.strategy().name(),
            generation = binding.generation(),
            "installed binding"
        );
        self.current.store(Some(binding));
        self.installed.store(true, Ordering::Relaxed);
        ctx.stats().record_install();
    }
}

impl fmt::Debug for DispatchSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchSite")
            .field("unit", &self.unit)
            .field("index", &self.index)
            .field("descriptor", &self.descriptor)
            .field("state", &self.state())
            .field("strategy", &self.strategy_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::{FlatLookup, TableMeta};
    use switchyard_core::{ClassId, MetaMethod, MetaObject, MetaObjectLookup};

    /// Lookup serving one meta-object for every receiver.
    struct SingleLookup(Arc<dyn MetaObject>);

    impl MetaObjectLookup for SingleLookup {
        fn meta_object(&self, _: &Value) -> Arc<dyn MetaObject> {
            Arc::clone(&self.0)
        }

        fn meta_object_for_class(&self, _: ClassId) -> Option<Arc<dyn MetaObject>> {
            Some(Arc::clone(&self.0))
        }
    }

    fn context(config: DispatchConfig) -> Arc<RuntimeContext> {
        let meta = TableMeta::new(ClassId::OBJECT).method(MetaMethod::new(
            "echo",
            ClassId::OBJECT,
            [switchyard_core::ParamType::Any],
            |_, args| Ok(args[0].clone()),
        ));
        RuntimeContext::with_config(Arc::new(SingleLookup(Arc::new(meta))), config).unwrap()
    }

    fn site(ctx: &RuntimeContext, descriptor: SiteDescriptor) -> DispatchSite {
        DispatchSite::new(Arc::from("unit"), 0, descriptor, ctx.config())
    }

    #[test]
    fn test_warmup_then_cached() {
        let ctx = context(DispatchConfig::default());
        let site = site(&ctx, SiteDescriptor::method("echo"));
        assert_eq!(site.state(), SiteState::Uncached);

        site.dispatch(&ctx, &Value::Int(0), &[Value::Int(1)]).unwrap();
        assert_eq!(site.state(), SiteState::WarmingUp { calls: 1 });
        site.dispatch(&ctx, &Value::Int(0), &[Value::Int(1)]).unwrap();
        assert_eq!(site.state(), SiteState::WarmingUp { calls: 2 });
        site.dispatch(&ctx, &Value::Int(0), &[Value::Int(1)]).unwrap();
        assert_eq!(site.state(), SiteState::Cached);
        assert_eq!(site.strategy_name(), Some("mono-instance"));

        let before = ctx.stats().resolutions();
        for _ in 0..10 {
            site.dispatch(&ctx, &Value::Int(0), &[Value::Int(1)]).unwrap();
        }
        assert_eq!(ctx.stats().resolutions(), before);
        // Warm-up is over for good: invalidation goes straight to uncached.
        ctx.invalidate("test");
        assert_eq!(site.state(), SiteState::Uncached);
    }

    #[test]
    fn test_invalidation_returns_to_uncached() {
        let ctx = context(DispatchConfig::eager());
        let site = site(&ctx, SiteDescriptor::method("echo"));
        site.dispatch(&ctx, &Value::Int(0), &[Value::Int(1)]).unwrap();
        assert_eq!(site.state(), SiteState::Cached);

        ctx.invalidate("test");
        assert_eq!(site.state(), SiteState::Uncached);
        assert_eq!(site.dispatch(&ctx, &Value::Int(0), &[Value::Int(2)]).unwrap(), Value::Int(2));
        assert_eq!(site.state(), SiteState::Cached);
    }

    #[test]
    fn test_spread_site_never_caches() {
        let ctx = context(DispatchConfig::eager());
        let site = site(&ctx, SiteDescriptor::method("echo").spread());
        for _ in 0..5 {
            site.dispatch(&ctx, &Value::Int(0), &[Value::Int(1)]).unwrap();
        }
        assert!(!site.is_cacheable());
        assert_eq!(site.state(), SiteState::Uncached);
        assert_eq!(ctx.stats().resolutions(), 5);
    }

    #[test]
    fn test_errors_leave_binding_untouched() {
        let ctx = context(DispatchConfig::eager());
        let site = site(&ctx, SiteDescriptor::method("echo"));
        site.dispatch(&ctx, &Value::Int(0), &[Value::Int(1)]).unwrap();

        let err = site
            .dispatch(&ctx, &Value::Int(0), &[Value::Int(1), Value::Int(2)])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::MissingMethod { .. }));
        assert_eq!(site.state(), SiteState::Cached);

        let before = ctx.stats().resolutions();
        site.dispatch(&ctx, &Value::Int(0), &[Value::Int(1)]).unwrap();
        assert_eq!(ctx.stats().resolutions(), before);
    }

    #[test]
    fn test_reset() {
        let ctx = context(DispatchConfig::eager());
        let site = site(&ctx, SiteDescriptor::method("echo"));
        site.dispatch(&ctx, &Value::Int(0), &[Value::Int(1)]).unwrap();
        site.reset();
        assert_eq!(site.state(), SiteState::Uncached);
    }

    #[test]
    fn test_flat_lookup_has_no_methods() {
        let ctx = RuntimeContext::with_config(Arc::new(FlatLookup), DispatchConfig::eager()).unwrap();
        let site = site(&ctx, SiteDescriptor::method("echo"));
        assert!(site.dispatch(&ctx, &Value::Int(0), &[]).is_err());
        assert_eq!(site.state(), SiteState::Uncached);
    }
}
