//! Runtime class identity.
//!
//! Every value carries a `ClassId`. Builtin classes occupy the reserved range
//! below [`ClassId::FIRST_USER_CLASS`]; user classes are allocated by the
//! object model above it.
//!
//! The builtin hierarchy is fixed:
//!
//! ```text
//!                    Object
//!   ┌──────┬──────────┼────────────┬─────────────┬──────┬───────┬──────┐
//!  Bool  Number  CharSequence  Collection      Array  Closure  Class  Null
//!   ┌─────┼─────┐    ┌──┴───┐     ┌──┴──┐
//!  Int  Long Double String GString List  Set
//! ```

use std::fmt;

/// Unique identifier for a runtime class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ClassId(pub u32);

impl ClassId {
    // =========================================================================
    // Builtin Classes
    // =========================================================================

    /// The class of the null value.
    pub const NULL: ClassId = ClassId(0);
    /// Root of the hierarchy.
    pub const OBJECT: ClassId = ClassId(1);
    pub const BOOL: ClassId = ClassId(2);
    /// Abstract numeric supertype.
    pub const NUMBER: ClassId = ClassId(3);
    pub const INT: ClassId = ClassId(4);
    pub const LONG: ClassId = ClassId(5);
    pub const DOUBLE: ClassId = ClassId(6);
    /// Abstract text supertype.
    pub const CHAR_SEQUENCE: ClassId = ClassId(7);
    pub const STRING: ClassId = ClassId(8);
    /// Interpolated text, lazily rendered.
    pub const GSTRING: ClassId = ClassId(9);
    /// Abstract collection supertype.
    pub const COLLECTION: ClassId = ClassId(10);
    pub const LIST: ClassId = ClassId(11);
    pub const SET: ClassId = ClassId(12);
    /// Fixed-length typed sequence; the vararg carrier.
    pub const ARRAY: ClassId = ClassId(13);
    pub const CLOSURE: ClassId = ClassId(14);
    /// The class of class objects (static receivers).
    pub const CLASS: ClassId = ClassId(15);

    /// First ID available for user-defined classes.
    pub const FIRST_USER_CLASS: u32 = 256;

    /// Get the raw ID value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check if this is a builtin class.
    #[inline]
    pub const fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_USER_CLASS
    }

    /// Superclass of a builtin class.
    ///
    /// Returns `None` for `OBJECT` and for every user class; user class
    /// hierarchies are answered by the object model.
    pub const fn builtin_superclass(self) -> Option<ClassId> {
        match self {
            Self::OBJECT => None,
            Self::INT | Self::LONG | Self::DOUBLE => Some(Self::NUMBER),
            Self::STRING | Self::GSTRING => Some(Self::CHAR_SEQUENCE),
            Self::LIST | Self::SET => Some(Self::COLLECTION),
            id if id.is_builtin() => Some(Self::OBJECT),
            _ => None,
        }
    }

    /// Display name of a builtin class.
    pub const fn builtin_name(self) -> Option<&'static str> {
        Some(match self {
            Self::NULL => "NullObject",
            Self::OBJECT => "Object",
            Self::BOOL => "Boolean",
            Self::NUMBER => "Number",
            Self::INT => "Integer",
            Self::LONG => "Long",
            Self::DOUBLE => "Double",
            Self::CHAR_SEQUENCE => "CharSequence",
            Self::STRING => "String",
            Self::GSTRING => "GString",
            Self::COLLECTION => "Collection",
            Self::LIST => "List",
            Self::SET => "Set",
            Self::ARRAY => "Object[]",
            Self::CLOSURE => "Closure",
            Self::CLASS => "Class",
            _ => return None,
        })
    }

    /// Whether values of this class are numbers with a primitive fast path.
    #[inline]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::INT | Self::LONG | Self::DOUBLE)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.builtin_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "class#{}", self.0),
        }
    }
}
