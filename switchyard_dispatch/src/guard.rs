//! Guards.
//!
//! A guard set is the cheap predicate a cached binding must pass before its
//! target may be invoked directly. Guards are built from the receiver and
//! arguments of the call that produced the binding and are checked in cost
//! order:
//!
//! ```text
//!   arity ─▶ null checks ─▶ identity checks ─▶ class checks
//! ```
//!
//! Argument slots the compiler declared primitive cannot change class
//! between calls and get no guard.
//!
//! # Performance
//!
//! Testing a guard set never allocates and never consults the object model;
//! identity checks read one atomic per receiver.

use crate::family::{CatchAllReason, SiteStrategy};
use crate::kind::{SiteDescriptor, StaticArg};
use smallvec::SmallVec;
use switchyard_core::{ClassId, MetaObjectId, MetaObjectLookup, Value};

/// Value a guard inspects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Receiver,
    Arg(usize),
}

impl Slot {
    #[inline(always)]
    fn value<'v>(self, receiver: &'v Value, args: &'v [Value]) -> Option<&'v Value> {
        match self {
            Slot::Receiver => Some(receiver),
            Slot::Arg(i) => args.get(i),
        }
    }
}

/// A single cheap check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Guard {
    /// Value is null.
    IsNull(Slot),
    /// Object receiver is governed by this meta-object.
    MetaIdentity(MetaObjectId),
    /// Receiver is this class object.
    SameClassObject(ClassId),
    /// Current thread sees this set of scoped extensions.
    ExtensionScope(u64),
    /// Value has exactly this runtime class.
    Class(Slot, ClassId),
    /// Value is an array with this element class.
    ArrayOf(Slot, ClassId),
    /// Value is a closure with this declared arity.
    ClosureArity(Slot, Option<u8>),
}

impl Guard {
    /// Evaluation order; cheaper first.
    #[inline]
    fn rank(&self) -> u8 {
        match self {
            Guard::IsNull(_) => 0,
            Guard::MetaIdentity(_) | Guard::SameClassObject(_) | Guard::ExtensionScope(_) => 1,
            Guard::Class(..) | Guard::ArrayOf(..) | Guard::ClosureArity(..) => 2,
        }
    }

    #[inline(always)]
    pub fn test(&self, receiver: &Value, args: &[Value], lookup: &dyn MetaObjectLookup) -> bool {
        match *self {
            Guard::IsNull(slot) => slot.value(receiver, args).is_some_and(Value::is_null),
            Guard::MetaIdentity(id) => receiver.meta_identity() == Some(id),
            Guard::SameClassObject(class) => matches!(receiver, Value::Class(c) if *c == class),
            Guard::ExtensionScope(token) => lookup.extension_scope_token() == token,
            Guard::Class(slot, class) => slot
                .value(receiver, args)
                .is_some_and(|v| !v.is_null() && v.class_id() == class),
            Guard::ArrayOf(slot, element) => {
                matches!(slot.value(receiver, args), Some(Value::Array(a)) if a.element == element)
            }
            Guard::ClosureArity(slot, arity) => {
                matches!(slot.value(receiver, args), Some(Value::Closure(c)) if c.arity == arity)
            }
        }
    }

    /// Guard pinning the shape of a non-receiver value.
    fn for_value(slot: Slot, value: &Value) -> Guard {
        match value {
            Value::Null => Guard::IsNull(slot),
            Value::Array(arr) => Guard::ArrayOf(slot, arr.element),
            Value::Closure(c) => Guard::ClosureArity(slot, c.arity),
            other => Guard::Class(slot, other.class_id()),
        }
    }
}

/// Ordered guards of one binding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardSet {
    /// Argument count the binding was made for.
    arity: usize,
    guards: SmallVec<[Guard; 6]>,
}

impl GuardSet {
    /// Guards for a binding of `strategy` made from this call.
    pub fn build(
        strategy: &SiteStrategy,
        descriptor: &SiteDescriptor,
        receiver: &Value,
        args: &[Value],
        lookup: &dyn MetaObjectLookup,
    ) -> GuardSet {
        let mut guards: SmallVec<[Guard; 6]> = SmallVec::new();

        match strategy {
            SiteStrategy::CatchAll(CatchAllReason::Megamorphic) => {
                return GuardSet {
                    arity: args.len(),
                    guards,
                };
            }
            // Only receivers governed by the same meta-object share the
            // generic path; anything else gets to specialize.
            SiteStrategy::CatchAll(_) => {
                push_receiver_guards(strategy, receiver, &mut guards);
                return GuardSet {
                    arity: args.len(),
                    guards,
                };
            }
            SiteStrategy::NullShortCircuit => {
                guards.push(Guard::IsNull(Slot::Receiver));
                return GuardSet {
                    arity: args.len(),
                    guards,
                };
            }
            _ => {}
        }

        push_receiver_guards(strategy, receiver, &mut guards);

        if lookup.extensions_active() {
            guards.push(Guard::ExtensionScope(lookup.extension_scope_token()));
        }

        for (index, arg) in args.iter().enumerate() {
            if let StaticArg::Primitive(_) = descriptor.static_arg(index) {
                continue;
            }
            guards.push(Guard::for_value(Slot::Arg(index), arg));
        }

        guards.sort_by_key(Guard::rank);
        GuardSet {
            arity: args.len(),
            guards,
        }
    }

    /// Whether a call matches every guard.
    #[inline(always)]
    pub fn accepts(&self, receiver: &Value, args: &[Value], lookup: &dyn MetaObjectLookup) -> bool {
        args.len() == self.arity && self.guards.iter().all(|g| g.test(receiver, args, lookup))
    }

    #[inline]
    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }
}

fn push_receiver_guards(strategy: &SiteStrategy, receiver: &Value, guards: &mut SmallVec<[Guard; 6]>) {
    match receiver {
        Value::Object(obj) => {
            guards.push(Guard::MetaIdentity(obj.meta_identity()));
            // Field slots and casts depend on the concrete class, which
            // an instance override does not pin.
            if matches!(strategy, SiteStrategy::FieldGet { .. } | SiteStrategy::Cast(_)) {
                guards.push(Guard::Class(Slot::Receiver, obj.class_id()));
            }
        }
        Value::Class(class) => guards.push(Guard::SameClassObject(*class)),
        other => guards.push(Guard::for_value(Slot::Receiver, other)),
    }
}
