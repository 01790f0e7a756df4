//! Scoped extensions.
//!
//! An extension set adds methods to existing classes for the dynamic extent
//! of a scope on one thread. Scopes nest; the innermost scope's methods are
//! seen first. Entering or leaving a scope is a type-system change and is
//! broadcast through the registry, which invalidates every cached dispatch.
//!
//! Each active scope frame gets a unique token. The current thread's token
//! identifies exactly which extensions are visible, so a cached binding made
//! under one set of scopes is rejected under another.

use smallvec::SmallVec;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use switchyard_core::{ClassId, MetaMethod, MethodFlags, ParamType, RuntimeError, Value};

/// Counter for scope tokens. 0 means "no scope".
static NEXT_SCOPE_TOKEN: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Extension Sets
// =============================================================================

/// A named group of methods added to existing classes.
#[derive(Debug)]
pub struct ExtensionSet {
    name: Arc<str>,
    /// `(target class, method)` pairs; methods apply to subclasses too.
    methods: Vec<(ClassId, Arc<MetaMethod>)>,
}

impl ExtensionSet {
    /// Start building a set.
    pub fn builder(name: impl Into<Arc<str>>) -> ExtensionSetBuilder {
        ExtensionSetBuilder {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Builder for [`ExtensionSet`].
pub struct ExtensionSetBuilder {
    name: Arc<str>,
    methods: Vec<(ClassId, Arc<MetaMethod>)>,
}

impl ExtensionSetBuilder {
    /// Add a method to `target` and its subclasses.
    pub fn method<F>(
        mut self,
        target: ClassId,
        name: &str,
        params: impl IntoIterator<Item = ParamType>,
        body: F,
    ) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        let method = MetaMethod::new(name, target, params, body).with_flags(MethodFlags::EXTENSION);
        self.methods.push((target, Arc::new(method)));
        self
    }

    pub fn build(self) -> Arc<ExtensionSet> {
        Arc::new(ExtensionSet {
            name: self.name,
            methods: self.methods,
        })
    }
}

// =============================================================================
// Thread-local Scope Stack
// =============================================================================

struct ActiveFrame {
    token: u64,
    set: Arc<ExtensionSet>,
}

thread_local! {
    static ACTIVE: RefCell<SmallVec<[ActiveFrame; 2]>> = RefCell::new(SmallVec::new());
}

/// Push a frame and return its token.
pub(crate) fn push_frame(set: Arc<ExtensionSet>) -> u64 {
    let token = NEXT_SCOPE_TOKEN.fetch_add(1, Ordering::Relaxed);
    ACTIVE.with(|stack| stack.borrow_mut().push(ActiveFrame { token, set }));
    token
}

/// Pop the frame identified by `token`.
///
/// Scopes are strictly nested, so this is normally the top frame; a frame
/// dropped out of order is still removed.
pub(crate) fn pop_frame(token: u64) {
    ACTIVE.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(pos) = stack.iter().rposition(|frame| frame.token == token) {
            stack.remove(pos);
        }
    });
}

/// Token of the innermost active scope on this thread, or 0.
#[inline]
pub fn current_token() -> u64 {
    ACTIVE.with(|stack| stack.borrow().last().map_or(0, |frame| frame.token))
}

/// Number of scope frames active on this thread.
pub fn depth() -> usize {
    ACTIVE.with(|stack| stack.borrow().len())
}

/// Collect active extension methods named `name` that apply to a class.
///
/// `applies` decides whether an extension target covers the receiver class.
/// Innermost scopes come first.
pub(crate) fn collect_methods(
    name: &str,
    applies: impl Fn(ClassId) -> bool,
    out: &mut SmallVec<[Arc<MetaMethod>; 4]>,
) {
    ACTIVE.with(|stack| {
        for frame in stack.borrow().iter().rev() {
            for (target, method) in &frame.set.methods {
                if method.name() == name
                    && applies(*target)
                    && !out.iter().any(|m| m.same_signature(method))
                {
                    out.push(Arc::clone(method));
                }
            }
        }
    });
}
