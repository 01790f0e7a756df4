//! Meta-object interfaces.
//!
//! The dispatch engine never owns method tables. It asks a
//! [`MetaObjectLookup`] for the meta-object governing a receiver and asks
//! that [`MetaObject`] for callables by name. Everything the engine needs to
//! select, adapt, guard and invoke a target is described by the types here.
//!
//! # Change notification
//!
//! Any mutation that can change a selection result (method table edits,
//! meta-object replacement, scoped extensions entering or leaving) is
//! broadcast as a [`TypeSystemChange`] to every subscribed
//! [`ChangeListener`].

use crate::class_id::ClassId;
use crate::error::RuntimeError;
use crate::value::Value;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Native body of a method: `(receiver, args) -> result`.
///
/// Static methods and constructors receive the class object as receiver.
pub type NativeFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Property accessor: `receiver -> value`.
pub type Accessor = Arc<dyn Fn(&Value) -> Result<Value, RuntimeError> + Send + Sync>;

/// Hook that handles every call on a receiver: `(receiver, name, args)`.
pub type Interceptor =
    Arc<dyn Fn(&Value, &str, &[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Candidate list returned by a meta-object.
pub type MethodList = SmallVec<[Arc<MetaMethod>; 4]>;

// =============================================================================
// Identity
// =============================================================================

/// Identity token of a meta-object, compared by guards.
///
/// The default meta-object of a class has the identity derived from its
/// class id; independently allocated meta-objects (per-instance overrides)
/// live above the class range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MetaObjectId(u64);

/// First raw identity handed out by [`MetaObjectId::allocate`].
const FIRST_ALLOCATED_IDENTITY: u64 = 1 << 32;

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(FIRST_ALLOCATED_IDENTITY);

impl MetaObjectId {
    /// Identity of the default meta-object of `class`.
    #[inline]
    pub const fn for_class(class: ClassId) -> Self {
        Self(class.0 as u64)
    }

    /// Allocate an identity not tied to any class.
    pub fn allocate() -> Self {
        Self(NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this is a class default identity.
    #[inline]
    pub const fn is_class_default(self) -> bool {
        self.0 < FIRST_ALLOCATED_IDENTITY
    }
}

// =============================================================================
// Parameter Types
// =============================================================================

/// Unboxed parameter types. Never accept null.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Int,
    Long,
    Double,
}

impl Primitive {
    /// Boxed class of this primitive.
    pub const fn class_id(self) -> ClassId {
        match self {
            Primitive::Bool => ClassId::BOOL,
            Primitive::Int => ClassId::INT,
            Primitive::Long => ClassId::LONG,
            Primitive::Double => ClassId::DOUBLE,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "boolean",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Double => "double",
        }
    }
}

/// Declared type of a formal parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// Accepts anything, including null.
    Any,
    Primitive(Primitive),
    /// Instances of the class or its subclasses, or null.
    Class(ClassId),
    /// Array with the given element class.
    Array(ClassId),
    /// Functional interface with a single method of `arity` parameters.
    Callback { interface: ClassId, arity: u8 },
}

impl ParamType {
    #[inline]
    pub const fn is_primitive(self) -> bool {
        matches!(self, ParamType::Primitive(_))
    }

    /// Class a value of this type belongs to.
    pub const fn class_id(self) -> ClassId {
        match self {
            ParamType::Any => ClassId::OBJECT,
            ParamType::Primitive(p) => p.class_id(),
            ParamType::Class(c) => c,
            ParamType::Array(_) => ClassId::ARRAY,
            ParamType::Callback { interface, .. } => interface,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Any => f.write_str("Object"),
            ParamType::Primitive(p) => f.write_str(p.name()),
            ParamType::Class(c) => write!(f, "{c}"),
            ParamType::Array(element) if *element == ClassId::OBJECT => f.write_str("Object[]"),
            ParamType::Array(element) => write!(f, "{element}[]"),
            ParamType::Callback { interface, .. } => write!(f, "{interface}"),
        }
    }
}

// =============================================================================
// Methods
// =============================================================================

bitflags::bitflags! {
    /// Method attributes relevant to dispatch.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u8 {
        /// Static method; the receiver is the class object.
        const STATIC = 1 << 0;
        /// Last parameter is an array that collects trailing arguments.
        const VARARGS = 1 << 1;
        /// Contributed by a scoped extension.
        const EXTENSION = 1 << 2;
        /// Constructor.
        const CONSTRUCTOR = 1 << 3;
    }
}

/// Arithmetic operations with a primitive fast path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MathOp {
    Plus,
    Minus,
    Multiply,
    Div,
    Remainder,
    CompareTo,
    Next,
    Previous,
}

impl MathOp {
    /// Number of explicit operands (excluding the receiver).
    pub const fn arity(self) -> usize {
        match self {
            MathOp::Next | MathOp::Previous => 0,
            _ => 1,
        }
    }
}

/// Counter for method ids.
static NEXT_METHOD_ID: AtomicU64 = AtomicU64::new(1);

/// A callable member of a meta-object.
pub struct MetaMethod {
    /// Unique id.
    id: u64,
    /// Method name.
    name: Arc<str>,
    /// Class that declares the method.
    declaring_class: ClassId,
    /// Formal parameters, excluding the receiver.
    params: SmallVec<[ParamType; 4]>,
    /// Dispatch attributes.
    flags: MethodFlags,
    /// Arithmetic operation this method implements, if any.
    math: Option<MathOp>,
    /// Native body.
    body: NativeFn,
}

impl MetaMethod {
    /// Create a method.
    pub fn new<F>(
        name: impl Into<Arc<str>>,
        declaring_class: ClassId,
        params: impl IntoIterator<Item = ParamType>,
        body: F,
    ) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            id: NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            declaring_class,
            params: params.into_iter().collect(),
            flags: MethodFlags::empty(),
            math: None,
            body: Arc::new(body),
        }
    }

    /// Add attributes.
    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Mark as static.
    pub fn static_method(self) -> Self {
        self.with_flags(MethodFlags::STATIC)
    }

    /// Mark the last parameter as a vararg collector.
    pub fn varargs(self) -> Self {
        self.with_flags(MethodFlags::VARARGS)
    }

    /// Attach an arithmetic fast-path operation.
    pub fn with_math(mut self, op: MathOp) -> Self {
        self.math = Some(op);
        self
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn declaring_class(&self) -> ClassId {
        self.declaring_class
    }

    #[inline]
    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    #[inline]
    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Whether trailing arguments are collected into the last parameter.
    ///
    /// Only honored when the last parameter is actually an array.
    #[inline]
    pub fn is_varargs(&self) -> bool {
        self.flags.contains(MethodFlags::VARARGS)
            && matches!(self.params.last(), Some(ParamType::Array(_)))
    }

    #[inline]
    pub fn math(&self) -> Option<MathOp> {
        self.math
    }

    /// Element class of the vararg parameter.
    pub fn vararg_element(&self) -> Option<ClassId> {
        match self.params.last() {
            Some(ParamType::Array(element)) if self.is_varargs() => Some(*element),
            _ => None,
        }
    }

    /// Whether `other` has the same name and parameter list.
    pub fn same_signature(&self, other: &MetaMethod) -> bool {
        self.name == other.name && self.params == other.params
    }

    /// Invoke the body. Arguments must already match the parameter list.
    #[inline]
    pub fn invoke(&self, receiver: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        (self.body)(receiver, args)
    }

    /// Human-readable signature, `name(T1, T2)`.
    pub fn signature(&self) -> String {
        let mut out = String::with_capacity(self.name.len() + 2);
        out.push_str(&self.name);
        out.push('(');
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            if self.is_varargs() && i + 1 == self.params.len() {
                if let ParamType::Array(element) = param {
                    out.push_str(&format!("{element}..."));
                    continue;
                }
            }
            out.push_str(&param.to_string());
        }
        out.push(')');
        out
    }
}

impl fmt::Debug for MetaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaMethod")
            .field("id", &self.id)
            .field("signature", &self.signature())
            .field("declaring_class", &self.declaring_class)
            .field("flags", &self.flags)
            .field("math", &self.math)
            .finish()
    }
}

// =============================================================================
// Properties
// =============================================================================

/// How a property value is obtained.
#[derive(Clone)]
pub enum PropertyKind {
    /// Direct field slot of an instance.
    Field { slot: u16 },
    /// Zero-argument getter method.
    Getter(Arc<MetaMethod>),
    /// Native accessor.
    Accessor(Accessor),
}

/// A readable property.
#[derive(Clone)]
pub struct MetaProperty {
    pub name: Arc<str>,
    pub kind: PropertyKind,
    /// Readable through the class object.
    pub is_static: bool,
}

impl MetaProperty {
    pub fn field(name: impl Into<Arc<str>>, slot: u16) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Field { slot },
            is_static: false,
        }
    }

    pub fn getter(name: impl Into<Arc<str>>, method: Arc<MetaMethod>) -> Self {
        let is_static = method.is_static();
        Self {
            name: name.into(),
            kind: PropertyKind::Getter(method),
            is_static,
        }
    }

    pub fn accessor<F>(name: impl Into<Arc<str>>, accessor: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: PropertyKind::Accessor(Arc::new(accessor)),
            is_static: false,
        }
    }

    /// Mark as readable through the class object.
    pub fn static_property(mut self) -> Self {
        self.is_static = true;
        self
    }
}

impl fmt::Debug for MetaProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            PropertyKind::Field { slot } => format!("Field({slot})"),
            PropertyKind::Getter(m) => format!("Getter({})", m.signature()),
            PropertyKind::Accessor(_) => "Accessor".to_string(),
        };
        f.debug_struct("MetaProperty")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("is_static", &self.is_static)
            .finish()
    }
}

// =============================================================================
// Meta-object Protocol
// =============================================================================

/// Per-class (or per-instance) description of dispatchable members.
pub trait MetaObject: Send + Sync {
    /// Identity compared by dispatch guards.
    fn identity(&self) -> MetaObjectId;

    /// Class this meta-object describes.
    fn class_id(&self) -> ClassId;

    fn class_name(&self) -> Arc<str>;

    /// Whether the engine may enumerate and select callables itself.
    ///
    /// Meta-objects that return false handle every call through
    /// [`MetaObject::invoke_method`] and friends.
    fn is_selectable(&self) -> bool {
        true
    }

    /// Methods named `name`, most derived first, including inherited
    /// methods and those contributed by active scoped extensions.
    fn methods(&self, name: &str) -> MethodList;

    fn constructors(&self) -> MethodList {
        MethodList::new()
    }

    fn property(&self, name: &str) -> Option<MetaProperty> {
        let _ = name;
        None
    }

    /// Hook that handles every method call on this receiver.
    fn interceptor(&self) -> Option<Interceptor> {
        None
    }

    /// Whether [`MetaObject::method_missing`] handles unresolved calls.
    fn has_method_missing(&self) -> bool {
        false
    }

    /// Fallback for calls no method matches.
    fn method_missing(
        &self,
        receiver: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let _ = receiver;
        Err(RuntimeError::missing_method(self.class_name(), name, args))
    }

    /// Generic method invocation for non-selectable meta-objects.
    fn invoke_method(
        &self,
        receiver: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        self.method_missing(receiver, name, args)
    }

    /// Generic property read for non-selectable meta-objects.
    fn get_property(&self, receiver: &Value, name: &str) -> Result<Value, RuntimeError> {
        let _ = receiver;
        Err(RuntimeError::MissingProperty {
            class: self.class_name(),
            name: Arc::from(name),
        })
    }
}

impl fmt::Debug for dyn MetaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaObject")
            .field("class", &self.class_name())
            .field("identity", &self.identity())
            .finish()
    }
}

/// A mutation of the type system that can change selection results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeSystemChange {
    /// Methods were added to or removed from a class.
    MethodTableChanged { class: ClassId },
    /// A class's meta-object was replaced.
    MetaObjectReplaced { class: ClassId },
    /// A scoped extension became active on some thread.
    ExtensionEntered { name: Arc<str> },
    /// A scoped extension stopped being active on some thread.
    ExtensionLeft { name: Arc<str> },
}

impl fmt::Display for TypeSystemChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSystemChange::MethodTableChanged { class } => {
                write!(f, "method table of {class} changed")
            }
            TypeSystemChange::MetaObjectReplaced { class } => {
                write!(f, "meta-object of {class} replaced")
            }
            TypeSystemChange::ExtensionEntered { name } => write!(f, "extension {name} entered"),
            TypeSystemChange::ExtensionLeft { name } => write!(f, "extension {name} left"),
        }
    }
}

/// Receiver of type-system change notifications.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, change: &TypeSystemChange);
}

/// Capability for finding the meta-object of any receiver.
pub trait MetaObjectLookup: Send + Sync {
    /// Meta-object governing `receiver`.
    ///
    /// For `Value::Class` receivers this is the meta-object of the named
    /// class (its static side). Null receivers get the null meta-object.
    fn meta_object(&self, receiver: &Value) -> Arc<dyn MetaObject>;

    /// Default meta-object of a class.
    fn meta_object_for_class(&self, class: ClassId) -> Option<Arc<dyn MetaObject>>;

    /// Direct superclass.
    fn superclass(&self, class: ClassId) -> Option<ClassId> {
        class.builtin_superclass()
    }

    fn class_name(&self, class: ClassId) -> Arc<str> {
        Arc::from(class.to_string())
    }

    /// Whether any scoped extension is active on any thread.
    fn extensions_active(&self) -> bool {
        false
    }

    /// Token naming the scoped extensions active on the current thread.
    fn extension_scope_token(&self) -> u64 {
        0
    }

    /// Register for change notifications.
    fn subscribe(&self, listener: Arc<dyn ChangeListener>) {
        let _ = listener;
    }

    /// Distance from `class` up to `ancestor`, or `None` if unrelated.
    fn superclass_distance(&self, class: ClassId, ancestor: ClassId) -> Option<u32> {
        let mut current = class;
        let mut distance = 0;
        loop {
            if current == ancestor {
                return Some(distance);
            }
            current = self.superclass(current)?;
            distance += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ranges() {
        let class_identity = MetaObjectId::for_class(ClassId(300));
        assert!(class_identity.is_class_default());
        let allocated = MetaObjectId::allocate();
        assert!(!allocated.is_class_default());
        assert_ne!(MetaObjectId::allocate(), allocated);
    }

    #[test]
    fn test_varargs_requires_array_param() {
        let ok = MetaMethod::new("f", ClassId::OBJECT, [ParamType::Array(ClassId::OBJECT)], |_, _| {
            Ok(Value::Null)
        })
        .varargs();
        assert!(ok.is_varargs());
        assert_eq!(ok.vararg_element(), Some(ClassId::OBJECT));

        let bad = MetaMethod::new("f", ClassId::OBJECT, [ParamType::Any], |_, _| Ok(Value::Null))
            .varargs();
        assert!(!bad.is_varargs());
        assert_eq!(bad.vararg_element(), None);
    }

    #[test]
    fn test_signature() {
        let m = MetaMethod::new(
            "format",
            ClassId::STRING,
            [ParamType::Class(ClassId::STRING), ParamType::Array(ClassId::OBJECT)],
            |_, _| Ok(Value::Null),
        )
        .varargs()
        .static_method();
        assert_eq!(m.signature(), "format(String, Object...)");
        assert!(m.is_static());
    }

    #[test]
    fn test_same_signature() {
        let a = MetaMethod::new("f", ClassId(300), [ParamType::Any], |_, _| Ok(Value::Null));
        let b = MetaMethod::new("f", ClassId(301), [ParamType::Any], |_, _| Ok(Value::Int(1)));
        let c = MetaMethod::new("f", ClassId(301), [ParamType::Class(ClassId::STRING)], |_, _| {
            Ok(Value::Null)
        });
        assert!(a.same_signature(&b));
        assert!(!a.same_signature(&c));
        assert_ne!(a.id(), b.id());
    }

    struct Flat;

    impl MetaObjectLookup for Flat {
        fn meta_object(&self, _: &Value) -> Arc<dyn MetaObject> {
            unreachable!()
        }
        fn meta_object_for_class(&self, _: ClassId) -> Option<Arc<dyn MetaObject>> {
            None
        }
    }

    #[test]
    fn test_superclass_distance() {
        let lookup = Flat;
        assert_eq!(lookup.superclass_distance(ClassId::INT, ClassId::INT), Some(0));
        assert_eq!(lookup.superclass_distance(ClassId::INT, ClassId::NUMBER), Some(1));
        assert_eq!(lookup.superclass_distance(ClassId::INT, ClassId::OBJECT), Some(2));
        assert_eq!(lookup.superclass_distance(ClassId::INT, ClassId::STRING), None);
    }
}
