//! Per-instance meta-objects.
//!
//! An `ExpandoMeta` layers extra methods over a base meta-object and is
//! attached to individual instances. It has its own identity, so a receiver
//! carrying one never matches a dispatch guard built for the plain class.
//! An expando is immutable once built: changing an instance's behavior
//! again means attaching a new expando, which gets a new identity.

use rustc_hash::FxHashMap;
use std::sync::Arc;
use switchyard_core::{
    ClassId, Instance, Interceptor, MetaMethod, MetaObject, MetaObjectId, MetaProperty,
    MethodList, ParamType, RuntimeError, Value,
};

/// Meta-object overriding dispatch for selected instances.
pub struct ExpandoMeta {
    identity: MetaObjectId,
    base: Arc<dyn MetaObject>,
    methods: FxHashMap<Arc<str>, MethodList>,
}

impl ExpandoMeta {
    /// Start from `base`'s behavior.
    pub fn new(base: Arc<dyn MetaObject>) -> Self {
        Self {
            identity: MetaObjectId::allocate(),
            base,
            methods: FxHashMap::default(),
        }
    }

    /// Add a method that takes precedence over the base's.
    pub fn with_method<F>(
        mut self,
        name: &str,
        params: impl IntoIterator<Item = ParamType>,
        body: F,
    ) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        let method = Arc::new(MetaMethod::new(name, self.base.class_id(), params, body));
        let list = self.methods.entry(Arc::from(name)).or_default();
        list.retain(|existing| !existing.same_signature(&method));
        list.push(method);
        self
    }

    /// Attach to an instance, replacing any previous override.
    pub fn attach(self: &Arc<Self>, instance: &Instance) {
        instance.set_meta_override(Some(Arc::clone(self) as Arc<dyn MetaObject>));
    }
}

impl MetaObject for ExpandoMeta {
    fn identity(&self) -> MetaObjectId {
        self.identity
    }

    fn class_id(&self) -> ClassId {
        self.base.class_id()
    }

    fn class_name(&self) -> Arc<str> {
        self.base.class_name()
    }

    fn is_selectable(&self) -> bool {
        self.base.is_selectable()
    }

    fn methods(&self, name: &str) -> MethodList {
        let mut out = self.methods.get(name).cloned().unwrap_or_default();
        for method in self.base.methods(name) {
            if !out.iter().any(|m| m.same_signature(&method)) {
                out.push(method);
            }
        }
        out
    }

    fn constructors(&self) -> MethodList {
        self.base.constructors()
    }

    fn property(&self, name: &str) -> Option<MetaProperty> {
        self.base.property(name)
    }

    fn interceptor(&self) -> Option<Interceptor> {
        self.base.interceptor()
    }

    fn has_method_missing(&self) -> bool {
        self.base.has_method_missing()
    }

    fn method_missing(
        &self,
        receiver: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        self.base.method_missing(receiver, name, args)
    }

    fn invoke_method(
        &self,
        receiver: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        self.base.invoke_method(receiver, name, args)
    }

    fn get_property(&self, receiver: &Value, name: &str) -> Result<Value, RuntimeError> {
        self.base.get_property(receiver, name)
    }
}
