//! Class registry.
//!
//! Maps class ids to meta classes, allocates ids for user classes and acts
//! as the dispatch engine's [`MetaObjectLookup`]. Every mutation that can
//! change a dispatch decision is broadcast to subscribed listeners.
//!
//! # Thread Safety
//!
//! Class lookups go through a `DashMap` and never block each other.
//! Listener registration takes a short write lock; notification snapshots
//! the listener list so callbacks run without the lock held.

use crate::builtins;
use crate::extension::{self, ExtensionSet};
use crate::meta_class::{ClassBuilder, MetaClass};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use switchyard_core::{
    ChangeListener, ClassId, Instance, MetaMethod, MetaObject, MetaObjectLookup, TypeSystemChange,
    Value,
};

/// Registry of all classes known to a runtime.
pub struct ClassRegistry {
    /// Meta class per class id.
    classes: DashMap<ClassId, Arc<MetaClass>>,
    /// Class id per name.
    names: DashMap<Arc<str>, ClassId>,
    /// Counter for generating new class ids.
    next_id: AtomicU32,
    /// Change subscribers.
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
    /// Scoped extensions active across all threads.
    active_extensions: AtomicUsize,
    /// Meta class returned when a receiver's class is unknown.
    fallback: Arc<MetaClass>,
}

impl ClassRegistry {
    /// Create a registry with the builtin classes installed.
    pub fn new() -> Arc<Self> {
        let registry = Arc::new_cyclic(|weak: &Weak<ClassRegistry>| Self {
            classes: DashMap::new(),
            names: DashMap::new(),
            next_id: AtomicU32::new(ClassId::FIRST_USER_CLASS),
            listeners: RwLock::new(Vec::new()),
            active_extensions: AtomicUsize::new(0),
            fallback: Arc::new(MetaClass::bare(
                ClassId::OBJECT,
                Arc::from("Object"),
                None,
                weak.clone(),
            )),
        });
        builtins::install(&registry);
        registry
    }

    /// Allocate a new class id.
    pub fn allocate_class_id(&self) -> ClassId {
        ClassId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Start defining a user class. The class extends `Object` unless
    /// [`ClassBuilder::extends`] says otherwise.
    pub fn define_class(self: &Arc<Self>, name: &str) -> ClassBuilder {
        let id = self.allocate_class_id();
        ClassBuilder::new(Arc::clone(self), id, Arc::from(name), Some(ClassId::OBJECT), false)
    }

    /// Start a replacement definition of an existing class.
    ///
    /// The new meta class starts empty; building it replaces the old one and
    /// notifies listeners.
    pub fn redefine_class(self: &Arc<Self>, class: ClassId) -> Option<ClassBuilder> {
        let old = self.get(class)?;
        Some(ClassBuilder::new(
            Arc::clone(self),
            class,
            Arc::clone(old.name()),
            old.superclass(),
            true,
        ))
    }

    pub(crate) fn builtin_class(self: &Arc<Self>, class: ClassId, name: &str) -> ClassBuilder {
        ClassBuilder::new(
            Arc::clone(self),
            class,
            Arc::from(name),
            class.builtin_superclass(),
            false,
        )
    }

    pub(crate) fn install(&self, meta: Arc<MetaClass>, replaces: bool) {
        let class = meta.class_id();
        tracing::debug!(class = %meta.name(), id = class.raw(), replaces, "installing meta class");
        self.names.insert(Arc::clone(meta.name()), class);
        let previous = self.classes.insert(class, meta);
        if replaces && previous.is_some() {
            self.notify(&TypeSystemChange::MetaObjectReplaced { class });
        }
    }

    /// Look up a meta class.
    #[inline]
    pub fn get(&self, class: ClassId) -> Option<Arc<MetaClass>> {
        self.classes.get(&class).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up a class id by name.
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.names.get(name).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Allocate an instance of `class` with null fields.
    pub fn new_instance(&self, class: ClassId) -> Option<Arc<Instance>> {
        self.get(class).map(|meta| meta.new_instance())
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Add (or replace by signature) a method on an existing class.
    pub fn add_method(&self, class: ClassId, method: MetaMethod) -> bool {
        let Some(meta) = self.get(class) else {
            return false;
        };
        tracing::debug!(class = %meta.name(), method = %method.signature(), "adding method");
        meta.add_method(Arc::new(method));
        self.notify(&TypeSystemChange::MethodTableChanged { class });
        true
    }

    /// Remove every method named `name` declared on `class`.
    pub fn remove_methods(&self, class: ClassId, name: &str) -> usize {
        let Some(meta) = self.get(class) else {
            return 0;
        };
        let removed = meta.remove_methods(name);
        if removed > 0 {
            tracing::debug!(class = %meta.name(), name, removed, "removed methods");
            self.notify(&TypeSystemChange::MethodTableChanged { class });
        }
        removed
    }

    /// Activate an extension set on the current thread until the returned
    /// scope is dropped.
    pub fn enter_extension(self: &Arc<Self>, set: Arc<ExtensionSet>) -> ExtensionScope {
        let name = Arc::clone(set.name());
        let token = extension::push_frame(set);
        self.active_extensions.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(extension = %name, token, "entering extension scope");
        self.notify(&TypeSystemChange::ExtensionEntered {
            name: Arc::clone(&name),
        });
        ExtensionScope {
            registry: Arc::clone(self),
            token,
            name,
            _not_send: PhantomData,
        }
    }

    /// Broadcast a change to every listener.
    pub fn notify(&self, change: &TypeSystemChange) {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.on_change(change);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn class_meta(&self, class: ClassId) -> Arc<dyn MetaObject> {
        let meta = self
            .get(class)
            .or_else(|| self.get(ClassId::OBJECT))
            .unwrap_or_else(|| Arc::clone(&self.fallback));
        meta as Arc<dyn MetaObject>
    }
}

impl MetaObjectLookup for ClassRegistry {
    fn meta_object(&self, receiver: &Value) -> Arc<dyn MetaObject> {
        match receiver {
            Value::Object(obj) => match obj.meta_override() {
                Some(meta) => meta,
                None => self.class_meta(obj.class_id()),
            },
            Value::Class(class) => self.class_meta(*class),
            other => self.class_meta(other.class_id()),
        }
    }

    fn meta_object_for_class(&self, class: ClassId) -> Option<Arc<dyn MetaObject>> {
        self.get(class).map(|meta| meta as Arc<dyn MetaObject>)
    }

    fn superclass(&self, class: ClassId) -> Option<ClassId> {
        match self.get(class) {
            Some(meta) => meta.superclass(),
            None => class.builtin_superclass(),
        }
    }

    fn class_name(&self, class: ClassId) -> Arc<str> {
        match self.get(class) {
            Some(meta) => Arc::clone(meta.name()),
            None => Arc::from(class.to_string()),
        }
    }

    #[inline]
    fn extensions_active(&self) -> bool {
        self.active_extensions.load(Ordering::Acquire) > 0
    }

    #[inline]
    fn extension_scope_token(&self) -> u64 {
        extension::current_token()
    }

    fn subscribe(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.write().push(listener);
    }
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.classes.len())
            .field("listeners", &self.listener_count())
            .field("active_extensions", &self.active_extensions.load(Ordering::Relaxed))
            .finish()
    }
}

// =============================================================================
// Extension Scope
// =============================================================================

/// Active scoped extension. Leaving the scope (dropping) deactivates it.
///
/// Bound to the thread that entered it.
#[must_use = "the extension is deactivated when the scope is dropped"]
pub struct ExtensionScope {
    registry: Arc<ClassRegistry>,
    token: u64,
    name: Arc<str>,
    _not_send: PhantomData<*const ()>,
}

impl ExtensionScope {
    /// Token identifying this scope frame.
    pub fn token(&self) -> u64 {
        self.token
    }
}

impl Drop for ExtensionScope {
    fn drop(&mut self) {
        extension::pop_frame(self.token);
        self.registry.active_extensions.fetch_sub(1, Ordering::AcqRel);
        tracing::debug!(extension = %self.name, token = self.token, "leaving extension scope");
        self.registry.notify(&TypeSystemChange::ExtensionLeft {
            name: Arc::clone(&self.name),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use switchyard_core::ParamType;

    #[derive(Default)]
    struct Recorder {
        changes: Mutex<Vec<TypeSystemChange>>,
    }

    impl ChangeListener for Recorder {
        fn on_change(&self, change: &TypeSystemChange) {
            self.changes.lock().push(change.clone());
        }
    }

    #[test]
    fn test_builtins_installed() {
        let registry = ClassRegistry::new();
        assert!(registry.get(ClassId::OBJECT).is_some());
        assert!(registry.get(ClassId::STRING).is_some());
        assert_eq!(registry.class_id("Integer"), Some(ClassId::INT));
    }

    #[test]
    fn test_allocate_class_id() {
        let registry = ClassRegistry::new();
        let a = registry.define_class("A").build();
        let b = registry.define_class("B").build();
        assert!(!a.class_id().is_builtin());
        assert_eq!(b.class_id().raw(), a.class_id().raw() + 1);
        assert_eq!(registry.class_id("B"), Some(b.class_id()));
    }

    #[test]
    fn test_meta_object_for_receivers() {
        let registry = ClassRegistry::new();
        let point = registry.define_class("Point").build();
        let obj = Value::Object(point.new_instance());

        assert_eq!(registry.meta_object(&obj).class_id(), point.class_id());
        assert_eq!(
            registry.meta_object(&Value::Class(point.class_id())).class_id(),
            point.class_id()
        );
        assert_eq!(registry.meta_object(&Value::Null).class_id(), ClassId::NULL);
        assert_eq!(registry.meta_object(&Value::Int(1)).class_id(), ClassId::INT);
    }

    #[test]
    fn test_superclass_chain() {
        let registry = ClassRegistry::new();
        let base = registry.define_class("Base").build();
        let derived = registry.define_class("Derived").extends(base.class_id()).build();
        assert_eq!(
            registry.superclass_distance(derived.class_id(), ClassId::OBJECT),
            Some(2)
        );
        assert_eq!(registry.superclass_distance(base.class_id(), derived.class_id()), None);
    }

    #[test]
    fn test_mutations_notify() {
        let registry = ClassRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.subscribe(recorder.clone());
        let point = registry.define_class("Point").build();
        let class = point.class_id();

        assert!(registry.add_method(
            class,
            MetaMethod::new("norm", class, [], |_, _| Ok(Value::Int(0)))
        ));
        assert_eq!(registry.remove_methods(class, "norm"), 1);
        assert_eq!(registry.remove_methods(class, "norm"), 0);
        registry.redefine_class(class).unwrap().build();

        let changes = recorder.changes.lock();
        assert_eq!(
            *changes,
            vec![
                TypeSystemChange::MethodTableChanged { class },
                TypeSystemChange::MethodTableChanged { class },
                TypeSystemChange::MetaObjectReplaced { class },
            ]
        );
    }

    #[test]
    fn test_extension_scope_lifecycle() {
        let registry = ClassRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.subscribe(recorder.clone());

        let set = ExtensionSet::builder("Shouting")
            .method(ClassId::CHAR_SEQUENCE, "shout", [], |recv, _| {
                Ok(Value::str(format!("{recv}!")))
            })
            .build();

        let string_meta = registry.get(ClassId::STRING).unwrap();
        assert!(string_meta.methods("shout").is_empty());
        {
            let scope = registry.enter_extension(set);
            assert!(registry.extensions_active());
            assert_eq!(registry.extension_scope_token(), scope.token());
            assert_eq!(string_meta.methods("shout").len(), 1);
            // Extensions do not leak to unrelated classes.
            assert!(registry.get(ClassId::INT).unwrap().methods("shout").is_empty());
        }
        assert!(!registry.extensions_active());
        assert_eq!(registry.extension_scope_token(), 0);
        assert!(string_meta.methods("shout").is_empty());
        assert_eq!(recorder.changes.lock().len(), 2);
    }

    #[test]
    fn test_instance_override_lookup() {
        let registry = ClassRegistry::new();
        let point = registry.define_class("Point").build();
        let other = registry
            .define_class("Other")
            .method("hello", [ParamType::Any], |_, _| Ok(Value::Null))
            .build();
        let instance = point.new_instance();
        instance.set_meta_override(Some(other.clone() as Arc<dyn MetaObject>));
        let meta = registry.meta_object(&Value::Object(instance));
        assert_eq!(meta.class_id(), other.class_id());
    }
}
