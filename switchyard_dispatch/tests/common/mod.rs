//! Shared fixtures for dispatch integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use switchyard_core::{ClassId, MetaObject, ParamType, RuntimeError, Value};
use switchyard_dispatch::{DispatchConfig, DispatchSiteTable, RuntimeContext, SiteDescriptor};
use switchyard_runtime::ClassRegistry;

/// Registry plus a context that caches from the first call.
pub fn eager_runtime() -> (Arc<ClassRegistry>, Arc<RuntimeContext>) {
    runtime_with(DispatchConfig::eager())
}

pub fn runtime_with(config: DispatchConfig) -> (Arc<ClassRegistry>, Arc<RuntimeContext>) {
    let registry = ClassRegistry::new();
    let ctx = RuntimeContext::with_config(registry.clone(), config).expect("valid config");
    (registry, ctx)
}

pub fn table(
    ctx: &Arc<RuntimeContext>,
    sites: impl IntoIterator<Item = SiteDescriptor>,
) -> DispatchSiteTable {
    DispatchSiteTable::create(Arc::clone(ctx), "TestUnit", sites)
}

/// A class with a zero-argument `name()` method answering `label`.
pub fn named_class(registry: &Arc<ClassRegistry>, class: &str, label: &'static str) -> ClassId {
    registry
        .define_class(class)
        .method("name", [], move |_, _| Ok(Value::str(label)))
        .build()
        .class_id()
}

/// A fresh instance of `class`.
pub fn instance(registry: &ClassRegistry, class: ClassId) -> Value {
    Value::Object(registry.new_instance(class).expect("class is registered"))
}

/// A method body that echoes its first argument.
pub fn echo(_: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(args.first().cloned().unwrap_or(Value::Null))
}

pub const ANY: ParamType = ParamType::Any;
pub const STRING: ParamType = ParamType::Class(ClassId::STRING);
pub const OBJECTS: ParamType = ParamType::Array(ClassId::OBJECT);
