//! Reference object model for the Switchyard dispatch engine.
//!
//! This crate provides:
//! - Class meta-objects with inherited lookup and dispatch hooks
//! - A class registry that answers meta-object lookups and broadcasts
//!   type-system changes
//! - Builtin classes for every builtin value kind
//! - Per-instance meta-object overrides
//! - Thread-scoped extension sets

#![deny(unsafe_op_in_unsafe_fn)]

mod builtins;
pub mod expando;
pub mod extension;
pub mod meta_class;
pub mod registry;

// Re-export commonly used items
pub use expando::ExpandoMeta;
pub use extension::{ExtensionSet, ExtensionSetBuilder};
pub use meta_class::{ClassBuilder, InitFn, MetaClass, MetaClassFlags};
pub use registry::{ClassRegistry, ExtensionScope};
