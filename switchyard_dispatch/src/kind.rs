//! Call kinds and site descriptors.
//!
//! A compiled unit describes each of its call locations with a
//! [`SiteDescriptor`]: the member name, what kind of call it is, how the
//! call was written (safe navigation, spread) and which argument slots the
//! compiler statically knows to be primitives.

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use switchyard_core::{ParamType, Primitive};

/// What a call site does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Method call on a receiver (instance or class object).
    Method,
    /// Constructor call; the receiver is the class object.
    Init,
    /// Property read.
    GetProperty,
    /// Property write. Never emitted; rejected as an internal error.
    SetProperty,
    /// Explicit cast of the receiver to the site's target type.
    Cast,
}

impl CallKind {
    /// Name used by compiled code to refer to the call kind.
    pub const fn call_site_name(self) -> &'static str {
        match self {
            CallKind::Method => "invoke",
            CallKind::Init => "init",
            CallKind::GetProperty => "getProperty",
            CallKind::SetProperty => "setProperty",
            CallKind::Cast => "cast",
        }
    }

    pub fn from_call_site_name(name: &str) -> Option<Self> {
        Some(match name {
            "invoke" => CallKind::Method,
            "init" => CallKind::Init,
            "getProperty" => CallKind::GetProperty,
            "setProperty" => CallKind::SetProperty,
            "cast" => CallKind::Cast,
            _ => return None,
        })
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.call_site_name())
    }
}

bitflags::bitflags! {
    /// How a call was written.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct SiteFlags: u8 {
        /// `receiver?.member(...)`: a null receiver yields null.
        const SAFE_NAVIGATION = 1 << 0;
        /// `member(*args)`: arguments arrive as one collection. Never cached.
        const SPREAD = 1 << 1;
    }
}

/// Statically known shape of an argument slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum StaticArg {
    /// Type known only at runtime.
    #[default]
    Dynamic,
    /// Declared primitive; its class cannot vary between calls.
    Primitive(Primitive),
}

/// Compile-time description of one call location.
#[derive(Clone, Debug, PartialEq)]
pub struct SiteDescriptor {
    /// Member name; empty for constructor and cast sites.
    pub name: Arc<str>,
    pub kind: CallKind,
    pub flags: SiteFlags,
    /// Per-argument static shapes. Missing entries are dynamic.
    pub static_args: SmallVec<[StaticArg; 4]>,
    /// Target type of a cast site.
    pub cast_target: Option<ParamType>,
}

impl SiteDescriptor {
    pub fn new(name: &str, kind: CallKind) -> Self {
        Self {
            name: Arc::from(name),
            kind,
            flags: SiteFlags::empty(),
            static_args: SmallVec::new(),
            cast_target: None,
        }
    }

    /// A method call site.
    pub fn method(name: &str) -> Self {
        Self::new(name, CallKind::Method)
    }

    /// A constructor call site.
    pub fn constructor() -> Self {
        Self::new("<init>", CallKind::Init)
    }

    /// A property read site.
    pub fn property(name: &str) -> Self {
        Self::new(name, CallKind::GetProperty)
    }

    /// A cast site.
    pub fn cast(target: ParamType) -> Self {
        Self {
            cast_target: Some(target),
            ..Self::new("<cast>", CallKind::Cast)
        }
    }

    pub fn safe_navigation(mut self) -> Self {
        self.flags |= SiteFlags::SAFE_NAVIGATION;
        self
    }

    pub fn spread(mut self) -> Self {
        self.flags |= SiteFlags::SPREAD;
        self
    }

    pub fn with_static_args(mut self, args: impl IntoIterator<Item = StaticArg>) -> Self {
        self.static_args = args.into_iter().collect();
        self
    }

    /// Static shape of argument `index`.
    #[inline]
    pub fn static_arg(&self, index: usize) -> StaticArg {
        self.static_args.get(index).copied().unwrap_or_default()
    }
}
