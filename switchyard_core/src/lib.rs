//! Core value model for the Switchyard dispatch engine.
//!
//! This crate provides:
//! - Runtime values (`Value`) and class identity (`ClassId`)
//! - Object instances with fixed field slots and per-instance meta overrides
//! - The meta-object protocol consumed by dispatch (`MetaObject`,
//!   `MetaObjectLookup`, `MetaMethod`, `MetaProperty`, `ParamType`)
//! - Type-system change notifications
//! - The runtime error taxonomy

#![deny(unsafe_op_in_unsafe_fn)]

pub mod arith;
pub mod class_id;
pub mod error;
pub mod meta;
pub mod object;
pub mod value;

// Re-export commonly used items
pub use class_id::ClassId;
pub use error::{describe_args, ErrorCategory, RuntimeError, RuntimeResult};
pub use object::Instance;
pub use value::{Array, Callback, Closure, GString, Value};

// Meta-object protocol
pub use meta::{
    Accessor, ChangeListener, Interceptor, MathOp, MetaMethod, MetaObject, MetaObjectId,
    MetaObjectLookup, MetaProperty, MethodFlags, MethodList, NativeFn, ParamType, Primitive,
    PropertyKind, TypeSystemChange,
};
