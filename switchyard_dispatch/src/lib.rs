//! Call-site dispatch for the Switchyard runtime.
//!
//! Every call location of a compiled unit gets a [`DispatchSite`]. A site
//! resolves its first calls through the [`Resolver`], then caches a
//! specialized strategy guarded by cheap checks on the receiver and
//! arguments. Type-system changes bump a single [`InvalidationEpoch`] and
//! every cached strategy resolved before the bump re-resolves on next use.
//!
//! # Architecture
//!
//! ```text
//!   compiled code ──▶ DispatchSiteTable ──▶ DispatchSite
//!                                             │ fast: guards ✓ ──▶ invoke
//!                                             │ slow:
//!                                             ▼
//!                                          Resolver ──▶ Candidate
//!                                             │
//!                                             ▼
//!                               SiteStrategy + GuardSet + epoch token
//!                                             │
//!                                             ▼
//!                                    published binding
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod context;
pub mod epoch;
pub mod family;
pub mod guard;
pub mod kind;
pub mod resolver;
pub mod site;
pub mod stats;
pub mod table;

// Re-export commonly used items
pub use config::{ConfigError, DispatchConfig};
pub use context::RuntimeContext;
pub use epoch::{EpochToken, InvalidationEpoch, InvalidationReason};
pub use family::{CatchAllReason, ResolvedBinding, SiteStrategy};
pub use guard::{Guard, GuardSet, Slot};
pub use kind::{CallKind, SiteDescriptor, SiteFlags, StaticArg};
pub use resolver::{
    AdaptStep, Adaptation, CallRequest, Candidate, CastPlan, Coercion, NumericKind, Resolver,
    Target,
};
pub use site::{DispatchSite, SiteState};
pub use stats::{DispatchStats, StatsSnapshot};
pub use table::{despread, DispatchSiteTable};
