//! Site strategies.
//!
//! A strategy is the specialized form a site takes once a call has been
//! resolved. Every strategy shares the same state machine (see
//! [`crate::site`]); they differ only in which guards they install and how
//! they invoke.
//!
//! ```text
//!   NullShortCircuit   receiver is null on a safe-navigation site
//!   MonoInstance       one receiver meta-object, one method
//!   MonoStatic         one class object, one static method
//!   MonoConstructor    one class object, one constructor
//!   PropertyGet        getter or accessor
//!   FieldGet           direct field slot read
//!   Cast               fixed cast plan for one receiver shape
//!   CatchAll           no specialization; generic path every call
//! ```

use crate::epoch::EpochToken;
use crate::guard::GuardSet;
use crate::kind::{CallKind, SiteFlags};
use crate::resolver::{read_field, Candidate, CastPlan, Target};
use crate::site::DispatchSite;
use crate::context::RuntimeContext;
use std::fmt;
use std::sync::Arc;
use switchyard_core::{MetaObjectLookup, RuntimeError, Value};

/// Why a site stopped specializing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CatchAllReason {
    /// Receiver's meta-object intercepts every call.
    Intercepted,
    /// Receiver's meta-object handles calls itself.
    OptedOut,
    /// Too many consecutive guard misses.
    Megamorphic,
}

/// Specialized form of a site.
#[derive(Clone)]
pub enum SiteStrategy {
    NullShortCircuit,
    MonoInstance(Candidate),
    MonoStatic(Candidate),
    MonoConstructor(Candidate),
    PropertyGet(Candidate),
    FieldGet { slot: u16 },
    Cast(CastPlan),
    CatchAll(CatchAllReason),
}

impl SiteStrategy {
    /// Choose the strategy for a freshly resolved candidate.
    pub fn specialize(kind: CallKind, receiver: &Value, candidate: Candidate) -> SiteStrategy {
        match candidate.target {
            Target::Intercept(_) => return SiteStrategy::CatchAll(CatchAllReason::Intercepted),
            Target::MetaInvoke { .. } => return SiteStrategy::CatchAll(CatchAllReason::OptedOut),
            Target::Field { slot } => return SiteStrategy::FieldGet { slot },
            Target::Cast(ref plan) => return SiteStrategy::Cast(plan.clone()),
            _ => {}
        }
        match kind {
            CallKind::Init => SiteStrategy::MonoConstructor(candidate),
            CallKind::GetProperty => SiteStrategy::PropertyGet(candidate),
            _ if matches!(receiver, Value::Class(_)) => SiteStrategy::MonoStatic(candidate),
            _ => SiteStrategy::MonoInstance(candidate),
        }
    }

    #[inline]
    pub fn is_catch_all(&self) -> bool {
        matches!(self, SiteStrategy::CatchAll(_))
    }

    /// Short name for logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            SiteStrategy::NullShortCircuit => "null-short-circuit",
            SiteStrategy::MonoInstance(_) => "mono-instance",
            SiteStrategy::MonoStatic(_) => "mono-static",
            SiteStrategy::MonoConstructor(_) => "mono-constructor",
            SiteStrategy::PropertyGet(_) => "property-get",
            SiteStrategy::FieldGet { .. } => "field-get",
            SiteStrategy::Cast(_) => "cast",
            SiteStrategy::CatchAll(_) => "catch-all",
        }
    }

    /// Run the strategy's invocation step.
    #[inline]
    pub fn invoke(
        &self,
        site: &DispatchSite,
        ctx: &RuntimeContext,
        receiver: &Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        match self {
            SiteStrategy::NullShortCircuit => Ok(Value::Null),
            SiteStrategy::MonoInstance(candidate)
            | SiteStrategy::MonoStatic(candidate)
            | SiteStrategy::MonoConstructor(candidate)
            | SiteStrategy::PropertyGet(candidate) => candidate.invoke(site.name(), receiver, args),
            SiteStrategy::FieldGet { slot } => read_field(receiver, *slot),
            SiteStrategy::Cast(plan) => plan.apply(receiver),
            SiteStrategy::CatchAll(_) => invoke_generic(site, ctx, receiver, args),
        }
    }
}

impl fmt::Debug for SiteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteStrategy::MonoInstance(c)
            | SiteStrategy::MonoStatic(c)
            | SiteStrategy::MonoConstructor(c)
            | SiteStrategy::PropertyGet(c) => write!(f, "{}({:?})", self.name(), c.target),
            SiteStrategy::FieldGet { slot } => write!(f, "field-get({slot})"),
            SiteStrategy::Cast(plan) => write!(f, "cast({plan:?})"),
            SiteStrategy::CatchAll(reason) => write!(f, "catch-all({reason:?})"),
            SiteStrategy::NullShortCircuit => f.write_str(self.name()),
        }
    }
}

/// Generic path: resolve and invoke without caching anything.
fn invoke_generic(
    site: &DispatchSite,
    ctx: &RuntimeContext,
    receiver: &Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    ctx.stats().record_generic();
    if receiver.is_null() && site.descriptor().flags.contains(SiteFlags::SAFE_NAVIGATION) {
        return Ok(Value::Null);
    }
    let meta = ctx.lookup().meta_object(receiver);
    let candidate = ctx.resolver().resolve(&site.request(receiver, args), &meta)?;
    candidate.invoke(site.name(), receiver, args)
}

// =============================================================================
// Resolved Binding
// =============================================================================

/// What a site caches: a strategy, its guards and the epoch it was
/// resolved under. Immutable once published.
pub struct ResolvedBinding {
    strategy: SiteStrategy,
    guards: GuardSet,
    epoch: Arc<EpochToken>,
}

impl ResolvedBinding {
    pub fn new(strategy: SiteStrategy, guards: GuardSet, epoch: Arc<EpochToken>) -> Self {
        Self {
            strategy,
            guards,
            epoch,
        }
    }

    /// Whether this binding may serve the call.
    #[inline(always)]
    pub fn accepts(&self, receiver: &Value, args: &[Value], lookup: &dyn MetaObjectLookup) -> bool {
        self.epoch.is_valid()
            && (self.strategy.is_catch_all() || self.guards.accepts(receiver, args, lookup))
    }

    /// Whether the epoch moved on since this binding was resolved.
    #[inline]
    pub fn is_stale(&self) -> bool {
        !self.epoch.is_valid()
    }

    #[inline]
    pub fn invoke(
        &self,
        site: &DispatchSite,
        ctx: &RuntimeContext,
        receiver: &Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        self.strategy.invoke(site, ctx, receiver, args)
    }

    pub fn strategy(&self) -> &SiteStrategy {
        &self.strategy
    }

    pub fn guards(&self) -> &GuardSet {
        &self.guards
    }

    pub fn generation(&self) -> u64 {
        self.epoch.generation()
    }
}

impl fmt::Debug for ResolvedBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedBinding")
            .field("strategy", &self.strategy)
            .field("guards", &self.guards)
            .field("generation", &self.epoch.generation())
            .field("valid", &self.epoch.is_valid())
            .finish()
    }
}
