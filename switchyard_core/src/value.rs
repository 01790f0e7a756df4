//! Runtime values.
//!
//! `Value` is the tagged union every callable receives and returns. Scalars
//! are stored inline; aggregates are reference counted so that cloning a
//! value for an argument buffer never copies payloads.

use crate::class_id::ClassId;
use crate::error::RuntimeError;
use crate::meta::MetaObjectId;
use crate::object::Instance;
use std::fmt;
use std::sync::Arc;

/// Body of a closure literal.
pub type ClosureFn = Arc<dyn Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

// =============================================================================
// Value
// =============================================================================

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    /// Double-precision number; also stands in for arbitrary decimals.
    Double(f64),
    Str(Arc<str>),
    /// Interpolated text, converted to `Str` on demand.
    GString(Arc<GString>),
    List(Arc<Vec<Value>>),
    Set(Arc<Vec<Value>>),
    /// Typed fixed-length sequence.
    Array(Arc<Array>),
    Closure(Arc<Closure>),
    /// A closure converted to a single-method interface.
    Callback(Arc<Callback>),
    /// A class object, used as the receiver of static calls and constructors.
    Class(ClassId),
    Object(Arc<Instance>),
}

impl Value {
    /// Create a string value.
    #[inline]
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// Create a list value.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(items.into_iter().collect()))
    }

    /// Create a set value, dropping duplicates while keeping first-seen order.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for item in items {
            if !out.contains(&item) {
                out.push(item);
            }
        }
        Value::Set(Arc::new(out))
    }

    /// Create an array of `element`-typed values.
    pub fn array(element: ClassId, items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Arc::new(Array {
            element,
            items: items.into_iter().collect(),
        }))
    }

    /// Create an `Object[]` array.
    pub fn object_array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::array(ClassId::OBJECT, items)
    }

    /// Create a closure value.
    pub fn closure<F>(arity: Option<u8>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        Value::Closure(Arc::new(Closure::new(arity, body)))
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value is already sequence-shaped (an array).
    #[inline]
    pub const fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Runtime class of this value.
    #[inline]
    pub fn class_id(&self) -> ClassId {
        match self {
            Value::Null => ClassId::NULL,
            Value::Bool(_) => ClassId::BOOL,
            Value::Int(_) => ClassId::INT,
            Value::Long(_) => ClassId::LONG,
            Value::Double(_) => ClassId::DOUBLE,
            Value::Str(_) => ClassId::STRING,
            Value::GString(_) => ClassId::GSTRING,
            Value::List(_) => ClassId::LIST,
            Value::Set(_) => ClassId::SET,
            Value::Array(_) => ClassId::ARRAY,
            Value::Closure(_) => ClassId::CLOSURE,
            Value::Callback(cb) => cb.interface,
            Value::Class(_) => ClassId::CLASS,
            Value::Object(obj) => obj.class_id(),
        }
    }

    /// Meta-object identity governing an object receiver.
    ///
    /// Answered without consulting the object model: either the instance's
    /// override or the default identity of its class.
    #[inline]
    pub fn meta_identity(&self) -> Option<MetaObjectId> {
        match self {
            Value::Object(obj) => Some(obj.meta_identity()),
            _ => None,
        }
    }

    /// Language truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Long(l) => *l != 0,
            Value::Double(d) => *d != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::GString(g) => !g.render().is_empty(),
            Value::List(items) | Value::Set(items) => !items.is_empty(),
            Value::Array(arr) => !arr.items.is_empty(),
            _ => true,
        }
    }

    /// Borrow the elements of a list, set or array.
    pub fn as_elements(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items.as_slice()),
            Value::Array(arr) => Some(arr.items.as_slice()),
            _ => None,
        }
    }

    /// Text payload of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::GString(a), Value::GString(b)) => a.render() == b.render(),
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.element == b.element && a.items == b.items,
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::Callback(a), Value::Callback(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Long(l) => write!(f, "Long({l})"),
            Value::Double(d) => write!(f, "Double({d})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::GString(g) => write!(f, "GString({:?})", g.render()),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Set(items) => f.debug_tuple("Set").field(items).finish(),
            Value::Array(arr) => f
                .debug_struct("Array")
                .field("element", &arr.element)
                .field("items", &arr.items)
                .finish(),
            Value::Closure(c) => write!(f, "Closure(arity={:?})", c.arity),
            Value::Callback(cb) => write!(f, "Callback({}, arity={})", cb.interface, cb.arity),
            Value::Class(id) => write!(f, "Class({id})"),
            Value::Object(obj) => write!(f, "Object({}@{})", obj.class_id(), obj.id()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
            f.write_str("[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            f.write_str("]")
        }

        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Long(l) => write!(f, "{l}"),
            Value::Double(d) => write!(f, "{d:?}"),
            Value::Str(s) => f.write_str(s),
            Value::GString(g) => f.write_str(&g.render()),
            Value::List(items) | Value::Set(items) => join(f, items),
            Value::Array(arr) => join(f, &arr.items),
            Value::Closure(_) => f.write_str("Closure"),
            Value::Callback(cb) => write!(f, "{}(closure)", cb.interface),
            Value::Class(id) => write!(f, "class {id}"),
            Value::Object(obj) => write!(f, "{}@{:x}", obj.class_id(), obj.id()),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Arc::from(v))
    }
}

// =============================================================================
// Aggregates
// =============================================================================

/// Interpolated text: literal fragments interleaved with values.
#[derive(Debug, Clone)]
pub struct GString {
    /// Literal fragments; one more than `values` when the text ends in a literal.
    pub strings: Vec<Arc<str>>,
    /// Interpolated values.
    pub values: Vec<Value>,
}

impl GString {
    pub fn new(strings: Vec<Arc<str>>, values: Vec<Value>) -> Self {
        Self { strings, values }
    }

    /// Render to plain text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut values = self.values.iter();
        for fragment in &self.strings {
            out.push_str(fragment);
            if let Some(value) = values.next() {
                out.push_str(&value.to_string());
            }
        }
        for value in values {
            out.push_str(&value.to_string());
        }
        out
    }
}

/// Typed fixed-length sequence.
#[derive(Debug, Clone)]
pub struct Array {
    /// Declared element class.
    pub element: ClassId,
    pub items: Vec<Value>,
}

/// A closure literal.
pub struct Closure {
    /// Declared parameter count; `None` for the implicit single parameter.
    pub arity: Option<u8>,
    body: ClosureFn,
}

impl Closure {
    pub fn new<F>(arity: Option<u8>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            arity,
            body: Arc::new(body),
        }
    }

    /// Whether the closure can be called with `count` arguments.
    #[inline]
    pub fn accepts(&self, count: usize) -> bool {
        match self.arity {
            Some(arity) => arity as usize == count,
            None => count <= 1,
        }
    }

    /// Invoke the closure body.
    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        (self.body)(args)
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure").field("arity", &self.arity).finish()
    }
}

/// A closure adapted to a single-abstract-method interface.
#[derive(Debug, Clone)]
pub struct Callback {
    /// The functional interface this callback implements.
    pub interface: ClassId,
    /// Parameter count of the interface method.
    pub arity: u8,
    pub closure: Arc<Closure>,
}

impl Callback {
    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        self.closure.call(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_ids() {
        assert_eq!(Value::Null.class_id(), ClassId::NULL);
        assert_eq!(Value::Int(1).class_id(), ClassId::INT);
        assert_eq!(Value::str("a").class_id(), ClassId::STRING);
        assert_eq!(Value::object_array([]).class_id(), ClassId::ARRAY);
        assert_eq!(Value::Class(ClassId::STRING).class_id(), ClassId::CLASS);
    }

    #[test]
    fn test_set_deduplicates() {
        let set = Value::set([Value::Int(1), Value::Int(2), Value::Int(1)]);
        assert_eq!(set.as_elements().map(<[Value]>::len), Some(2));
    }

    #[test]
    fn test_gstring_render() {
        let g = GString::new(vec![Arc::from("x = "), Arc::from("!")], vec![Value::Int(4)]);
        assert_eq!(g.render(), "x = 4!");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(Value::str("a").truthy());
        assert!(!Value::list([]).truthy());
    }

    #[test]
    fn test_closure_arity() {
        let implicit = Closure::new(None, |_| Ok(Value::Null));
        assert!(implicit.accepts(0));
        assert!(implicit.accepts(1));
        assert!(!implicit.accepts(2));

        let two = Closure::new(Some(2), |_| Ok(Value::Null));
        assert!(two.accepts(2));
        assert!(!two.accepts(1));
    }

    #[test]
    fn test_display() {
        let list = Value::list([Value::Int(1), Value::str("a")]);
        assert_eq!(list.to_string(), "[1, a]");
        assert_eq!(Value::Double(1.5).to_string(), "1.5");
    }
}
