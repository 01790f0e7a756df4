//! Class meta-objects.
//!
//! A `MetaClass` describes one runtime class: its declared methods,
//! constructors, readable properties, instance field layout and dispatch
//! hooks. Inherited members are found by walking the superclass chain
//! through the owning registry.
//!
//! # Architecture
//!
//! ```text
//! MetaClass
//! ├── class_id / name / superclass
//! ├── flags: MetaClassFlags (INTERCEPTABLE, OPAQUE, FUNCTIONAL, ...)
//! ├── field_count (inherited slots first)
//! ├── methods: RwLock<FxHashMap<name, MethodList>>   (mutable, notifies)
//! ├── constructors: MethodList
//! ├── properties: FxHashMap<name, MetaProperty>
//! ├── interceptor / method_missing / handler hooks
//! └── registry: Weak<ClassRegistry>                  (superclass walk)
//! ```
//!
//! # Lookup order
//!
//! `methods(name)` returns active scoped-extension methods first (innermost
//! scope first), then the class's own methods, then each superclass's. A
//! method is dropped when an earlier entry has the same signature, which is
//! how overriding and extension shadowing work.

use crate::extension;
use crate::registry::ClassRegistry;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::{Arc, Weak};
use switchyard_core::{
    ClassId, Instance, Interceptor, MetaMethod, MetaObject, MetaObjectId, MetaObjectLookup,
    MetaProperty, MethodFlags, MethodList, ParamType, RuntimeError, Value,
};

// =============================================================================
// Class Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags describing class dispatch behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MetaClassFlags: u32 {
        /// Every method call goes through the interceptor hook.
        const INTERCEPTABLE = 1 << 0;
        /// Class opts out of normal selection; calls go to the generic handler.
        const OPAQUE = 1 << 1;
        /// Single-method interface that closures can be converted to.
        const FUNCTIONAL = 1 << 2;
        /// Class cannot be instantiated.
        const ABSTRACT = 1 << 3;
        /// Builtin class.
        const BUILTIN = 1 << 4;
    }
}

/// Constructor initializer: fills the freshly allocated instance.
pub type InitFn = Arc<dyn Fn(&Instance, &[Value]) -> Result<(), RuntimeError> + Send + Sync>;

// =============================================================================
// MetaClass
// =============================================================================

/// Meta-object of a runtime class.
pub struct MetaClass {
    /// Class described.
    class_id: ClassId,
    /// Display name.
    name: Arc<str>,
    /// Direct superclass; `None` only for the root.
    superclass: Option<ClassId>,
    /// Dispatch flags.
    flags: MetaClassFlags,
    /// Total field slots of an instance, inherited slots first.
    field_count: usize,
    /// Declared methods by name.
    methods: RwLock<FxHashMap<Arc<str>, MethodList>>,
    /// Declared constructors.
    constructors: MethodList,
    /// Declared readable properties.
    properties: FxHashMap<Arc<str>, MetaProperty>,
    /// Hook for every method call when INTERCEPTABLE.
    interceptor: Option<Interceptor>,
    /// Fallback for calls no method matches.
    method_missing: Option<Interceptor>,
    /// Generic handler when OPAQUE.
    handler: Option<Interceptor>,
    /// Owning registry, for superclass and extension lookups.
    registry: Weak<ClassRegistry>,
}

impl MetaClass {
    /// A class with no members.
    pub(crate) fn bare(
        class_id: ClassId,
        name: Arc<str>,
        superclass: Option<ClassId>,
        registry: Weak<ClassRegistry>,
    ) -> Self {
        Self {
            class_id,
            name,
            superclass,
            flags: MetaClassFlags::empty(),
            field_count: 0,
            methods: RwLock::new(FxHashMap::default()),
            constructors: MethodList::new(),
            properties: FxHashMap::default(),
            interceptor: None,
            method_missing: None,
            handler: None,
            registry,
        }
    }

    #[inline]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[inline]
    pub fn superclass(&self) -> Option<ClassId> {
        self.superclass
    }

    #[inline]
    pub fn flags(&self) -> MetaClassFlags {
        self.flags
    }

    /// Field slots an instance of this class carries.
    #[inline]
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Methods declared directly on this class.
    pub fn declared_methods(&self, name: &str) -> MethodList {
        self.methods.read().get(name).cloned().unwrap_or_default()
    }

    /// Allocate an instance with null fields.
    pub fn new_instance(&self) -> Arc<Instance> {
        Arc::new(Instance::new(self.class_id, self.field_count))
    }

    pub(crate) fn add_method(&self, method: Arc<MetaMethod>) {
        let mut methods = self.methods.write();
        let list = methods.entry(Arc::from(method.name())).or_default();
        list.retain(|existing| !existing.same_signature(&method));
        list.push(method);
    }

    pub(crate) fn remove_methods(&self, name: &str) -> usize {
        self.methods.write().remove(name).map_or(0, |list| list.len())
    }

    fn collect_declared(&self, name: &str, out: &mut MethodList) {
        let methods = self.methods.read();
        if let Some(list) = methods.get(name) {
            for method in list {
                if !out.iter().any(|m| m.same_signature(method)) {
                    out.push(Arc::clone(method));
                }
            }
        }
    }
}

impl MetaObject for MetaClass {
    #[inline]
    fn identity(&self) -> MetaObjectId {
        MetaObjectId::for_class(self.class_id)
    }

    #[inline]
    fn class_id(&self) -> ClassId {
        self.class_id
    }

    fn class_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    fn is_selectable(&self) -> bool {
        !self.flags.contains(MetaClassFlags::OPAQUE)
    }

    fn methods(&self, name: &str) -> MethodList {
        let mut out = MethodList::new();
        let registry = self.registry.upgrade();

        if let Some(registry) = &registry {
            if registry.extensions_active() {
                extension::collect_methods(
                    name,
                    |target| registry.superclass_distance(self.class_id, target).is_some(),
                    &mut out,
                );
            }
        }

        self.collect_declared(name, &mut out);

        let Some(registry) = registry else {
            return out;
        };
        let mut next = self.superclass;
        while let Some(id) = next {
            match registry.get(id) {
                Some(meta) => {
                    meta.collect_declared(name, &mut out);
                    next = meta.superclass;
                }
                None => break,
            }
        }
        out
    }

    fn constructors(&self) -> MethodList {
        self.constructors.clone()
    }

    fn property(&self, name: &str) -> Option<MetaProperty> {
        if let Some(property) = self.properties.get(name) {
            return Some(property.clone());
        }
        let registry = self.registry.upgrade()?;
        let mut next = self.superclass;
        while let Some(id) = next {
            let meta = registry.get(id)?;
            if let Some(property) = meta.properties.get(name) {
                return Some(property.clone());
            }
            next = meta.superclass;
        }
        None
    }

    fn interceptor(&self) -> Option<Interceptor> {
        if self.flags.contains(MetaClassFlags::INTERCEPTABLE) {
            self.interceptor.clone()
        } else {
            None
        }
    }

    fn has_method_missing(&self) -> bool {
        self.method_missing.is_some()
    }

    fn method_missing(
        &self,
        receiver: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        match &self.method_missing {
            Some(hook) => hook(receiver, name, args),
            None => Err(RuntimeError::missing_method(self.class_name(), name, args)),
        }
    }

    fn invoke_method(
        &self,
        receiver: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        match &self.handler {
            Some(handler) => handler(receiver, name, args),
            None => self.method_missing(receiver, name, args),
        }
    }

    fn get_property(&self, receiver: &Value, name: &str) -> Result<Value, RuntimeError> {
        match &self.handler {
            Some(handler) => handler(receiver, "getProperty", &[Value::str(name)]),
            None => Err(RuntimeError::MissingProperty {
                class: self.class_name(),
                name: Arc::from(name),
            }),
        }
    }
}

impl std::fmt::Debug for MetaClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaClass")
            .field("class_id", &self.class_id)
            .field("name", &self.name)
            .field("superclass", &self.superclass)
            .field("flags", &self.flags)
            .field("field_count", &self.field_count)
            .finish()
    }
}

// =============================================================================
// Class Builder
// =============================================================================

struct ConstructorSpec {
    params: SmallVec<[ParamType; 4]>,
    flags: MethodFlags,
    init: InitFn,
}

/// Builder for a class definition.
///
/// The class id is allocated up front so method bodies and parameter types
/// can refer to it before the class is installed.
pub struct ClassBuilder {
    registry: Arc<ClassRegistry>,
    id: ClassId,
    name: Arc<str>,
    superclass: Option<ClassId>,
    flags: MetaClassFlags,
    fields: Vec<Arc<str>>,
    methods: Vec<Arc<MetaMethod>>,
    constructors: Vec<ConstructorSpec>,
    properties: Vec<MetaProperty>,
    interceptor: Option<Interceptor>,
    method_missing: Option<Interceptor>,
    handler: Option<Interceptor>,
    replaces: bool,
}

impl ClassBuilder {
    pub(crate) fn new(
        registry: Arc<ClassRegistry>,
        id: ClassId,
        name: Arc<str>,
        superclass: Option<ClassId>,
        replaces: bool,
    ) -> Self {
        Self {
            registry,
            id,
            name,
            superclass,
            flags: MetaClassFlags::empty(),
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            properties: Vec::new(),
            interceptor: None,
            method_missing: None,
            handler: None,
            replaces,
        }
    }

    /// Id of the class being built.
    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn extends(mut self, superclass: ClassId) -> Self {
        self.superclass = Some(superclass);
        self
    }

    pub fn flags(mut self, flags: MetaClassFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Declare an instance field, readable as a property of the same name.
    pub fn field(mut self, name: &str) -> Self {
        self.fields.push(Arc::from(name));
        self
    }

    /// Add a prepared method.
    pub fn add_method(mut self, method: MetaMethod) -> Self {
        self.methods.push(Arc::new(method));
        self
    }

    pub fn method<F>(self, name: &str, params: impl IntoIterator<Item = ParamType>, body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        let method = MetaMethod::new(name, self.id, params, body);
        self.add_method(method)
    }

    pub fn static_method<F>(
        self,
        name: &str,
        params: impl IntoIterator<Item = ParamType>,
        body: F,
    ) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        let method = MetaMethod::new(name, self.id, params, body).static_method();
        self.add_method(method)
    }

    /// Add a method whose last (array) parameter collects trailing arguments.
    pub fn varargs_method<F>(
        self,
        name: &str,
        params: impl IntoIterator<Item = ParamType>,
        body: F,
    ) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        let method = MetaMethod::new(name, self.id, params, body).varargs();
        self.add_method(method)
    }

    /// Add a constructor. `init` fills the new instance's fields.
    pub fn constructor<F>(mut self, params: impl IntoIterator<Item = ParamType>, init: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<(), RuntimeError> + Send + Sync + 'static,
    {
        self.constructors.push(ConstructorSpec {
            params: params.into_iter().collect(),
            flags: MethodFlags::CONSTRUCTOR,
            init: Arc::new(init),
        });
        self
    }

    /// Add a constructor whose last (array) parameter collects trailing arguments.
    pub fn varargs_constructor<F>(
        mut self,
        params: impl IntoIterator<Item = ParamType>,
        init: F,
    ) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<(), RuntimeError> + Send + Sync + 'static,
    {
        self.constructors.push(ConstructorSpec {
            params: params.into_iter().collect(),
            flags: MethodFlags::CONSTRUCTOR | MethodFlags::VARARGS,
            init: Arc::new(init),
        });
        self
    }

    pub fn property(mut self, property: MetaProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Route every method call through `hook`.
    pub fn interceptable<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value, &str, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.flags |= MetaClassFlags::INTERCEPTABLE;
        self.interceptor = Some(Arc::new(hook));
        self
    }

    /// Handle calls no method matches.
    pub fn method_missing<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value, &str, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.method_missing = Some(Arc::new(hook));
        self
    }

    /// Opt out of normal selection; `handler` receives every call and
    /// property read (as `getProperty(name)`).
    pub fn opaque<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Value, &str, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.flags |= MetaClassFlags::OPAQUE;
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Install the class in the registry.
    pub fn build(self) -> Arc<MetaClass> {
        let inherited = self
            .superclass
            .and_then(|id| self.registry.get(id))
            .map_or(0, |meta| meta.field_count());
        let field_count = inherited + self.fields.len();

        let mut properties = FxHashMap::default();
        for (i, field) in self.fields.iter().enumerate() {
            let slot = (inherited + i) as u16;
            properties.insert(Arc::clone(field), MetaProperty::field(Arc::clone(field), slot));
        }
        for property in self.properties {
            properties.insert(Arc::clone(&property.name), property);
        }

        let mut methods: FxHashMap<Arc<str>, MethodList> = FxHashMap::default();
        for method in self.methods {
            let list = methods.entry(Arc::from(method.name())).or_default();
            list.retain(|existing| !existing.same_signature(&method));
            list.push(method);
        }

        let class_id = self.id;
        let mut constructors = MethodList::new();
        let instantiable = !self.flags.intersects(
            MetaClassFlags::ABSTRACT | MetaClassFlags::FUNCTIONAL | MetaClassFlags::BUILTIN,
        );
        if instantiable && self.constructors.is_empty() {
            constructors.push(Arc::new(
                MetaMethod::new("<init>", class_id, [], move |_, _| {
                    Ok(Value::Object(Arc::new(Instance::new(class_id, field_count))))
                })
                .with_flags(MethodFlags::CONSTRUCTOR),
            ));
        }
        for spec in self.constructors {
            let init = spec.init;
            let ctor = MetaMethod::new("<init>", class_id, spec.params, move |_, args| {
                let instance = Instance::new(class_id, field_count);
                init(&instance, args)?;
                Ok(Value::Object(Arc::new(instance)))
            })
            .with_flags(spec.flags);
            constructors.push(Arc::new(ctor));
        }

        let meta = Arc::new(MetaClass {
            class_id,
            name: self.name,
            superclass: self.superclass,
            flags: self.flags,
            field_count,
            methods: RwLock::new(methods),
            constructors,
            properties,
            interceptor: self.interceptor,
            method_missing: self.method_missing,
            handler: self.handler,
            registry: Arc::downgrade(&self.registry),
        });
        self.registry.install(Arc::clone(&meta), self.replaces);
        meta
    }
}
