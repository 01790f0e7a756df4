//! Call resolution.
//!
//! The resolver turns a call (kind, name, receiver, arguments) into a
//! [`Candidate`]: the target to invoke plus the adaptation its arguments
//! need. Resolution is the expensive path; sites cache its result.
//!
//! # Order of attempts for method calls
//!
//! ```text
//!   interceptor hook present ─────────────▶ Intercept
//!   meta-object opts out of selection ────▶ MetaInvoke
//!   overloads scored by distance:
//!     exact arity      (+ coercions)
//!     varargs          (C < A < D < B)
//!     null padding
//!   arithmetic method, same-kind operands ▶ Math kernel
//!   nothing applicable, method_missing ───▶ MethodMissing
//!   nothing applicable ───────────────────▶ MissingMethod error
//! ```
//!
//! Overloads are considered in the order the meta-object returns them.
//! When two candidates tie, the first one wins.

pub mod adapt;
pub mod coerce;
pub mod distance;
pub mod math;

pub use adapt::{AdaptStep, AdaptedArgs, Adaptation};
pub use coerce::{CastPlan, Coercion};
pub use math::NumericKind;

use crate::kind::CallKind;
use crate::stats::DispatchStats;
use std::fmt;
use std::sync::Arc;
use switchyard_core::{
    describe_args, Accessor, Interceptor, MathOp, MetaMethod, MetaObject, MetaObjectLookup,
    ParamType, PropertyKind, RuntimeError, Value,
};

/// One call to resolve.
#[derive(Clone, Copy, Debug)]
pub struct CallRequest<'a> {
    pub name: &'a str,
    pub kind: CallKind,
    pub receiver: &'a Value,
    pub args: &'a [Value],
    /// Target type of a cast.
    pub cast_target: Option<ParamType>,
}

/// What a resolved call invokes.
#[derive(Clone)]
pub enum Target {
    /// Instance or static method.
    Method(Arc<MetaMethod>),
    Constructor(Arc<MetaMethod>),
    /// Primitive arithmetic kernel.
    Math { op: MathOp, kind: NumericKind },
    /// Zero-argument getter backing a property.
    Getter(Arc<MetaMethod>),
    /// Native property accessor.
    Accessor(Accessor),
    /// Direct instance field read.
    Field { slot: u16 },
    Cast(CastPlan),
    /// Every call goes to the meta-object's hook.
    Intercept(Interceptor),
    /// Meta-object handles the call itself.
    MetaInvoke { property: bool },
    /// No callable matched; the meta-object's fallback handles it.
    MethodMissing,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Method(m) => write!(f, "Method({})", m.signature()),
            Target::Constructor(m) => write!(f, "Constructor({})", m.signature()),
            Target::Math { op, kind } => write!(f, "Math({op:?}, {kind:?})"),
            Target::Getter(m) => write!(f, "Getter({})", m.signature()),
            Target::Accessor(_) => f.write_str("Accessor"),
            Target::Field { slot } => write!(f, "Field({slot})"),
            Target::Cast(plan) => write!(f, "Cast({plan:?})"),
            Target::Intercept(_) => f.write_str("Intercept"),
            Target::MetaInvoke { property } => write!(f, "MetaInvoke(property={property})"),
            Target::MethodMissing => f.write_str("MethodMissing"),
        }
    }
}

/// A resolved call: target, argument adaptation and the meta-object that
/// produced them.
#[derive(Clone)]
pub struct Candidate {
    pub target: Target,
    pub adaptation: Adaptation,
    meta: Arc<dyn MetaObject>,
}

impl Candidate {
    /// Meta-object the candidate was resolved against.
    pub fn meta(&self) -> &Arc<dyn MetaObject> {
        &self.meta
    }

    /// Invoke the target with the call's arguments.
    pub fn invoke(&self, name: &str, receiver: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        match &self.target {
            Target::Method(m) | Target::Constructor(m) | Target::Getter(m) => {
                if self.adaptation.is_empty() {
                    m.invoke(receiver, args)
                } else {
                    let adapted = self.adaptation.apply(m, args)?;
                    m.invoke(receiver, &adapted)
                }
            }
            Target::Math { op, kind } => kind.apply(*op, receiver, args),
            Target::Accessor(accessor) => accessor(receiver),
            Target::Field { slot } => read_field(receiver, *slot),
            Target::Cast(plan) => plan.apply(receiver),
            Target::Intercept(hook) => hook(receiver, name, args),
            Target::MetaInvoke { property: true } => self.meta.get_property(receiver, name),
            Target::MetaInvoke { property: false } => self.meta.invoke_method(receiver, name, args),
            Target::MethodMissing => self.meta.method_missing(receiver, name, args),
        }
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("target", &self.target)
            .field("adaptation", &self.adaptation)
            .field("meta", &self.meta.class_name())
            .finish()
    }
}

/// Read a field slot of an object receiver.
#[inline]
pub(crate) fn read_field(receiver: &Value, slot: u16) -> Result<Value, RuntimeError> {
    match receiver {
        Value::Object(obj) => obj.field(usize::from(slot)).ok_or_else(|| {
            RuntimeError::internal(format!(
                "field slot {slot} out of range for {}",
                obj.class_id()
            ))
        }),
        other => Err(RuntimeError::internal(format!(
            "field read on non-object receiver {other:?}"
        ))),
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Selects callables for calls.
pub struct Resolver<'a> {
    lookup: &'a dyn MetaObjectLookup,
    stats: &'a DispatchStats,
}

impl<'a> Resolver<'a> {
    pub fn new(lookup: &'a dyn MetaObjectLookup, stats: &'a DispatchStats) -> Self {
        Self { lookup, stats }
    }

    /// Resolve `request` against `meta`, the meta-object of its receiver.
    pub fn resolve(
        &self,
        request: &CallRequest<'_>,
        meta: &Arc<dyn MetaObject>,
    ) -> Result<Candidate, RuntimeError> {
        self.stats.record_resolution();

        let (target, adaptation) = match request.kind {
            CallKind::Method => self.resolve_method(request, meta)?,
            CallKind::Init => self.resolve_constructor(request, meta)?,
            CallKind::GetProperty => self.resolve_property(request, meta)?,
            CallKind::Cast => {
                let cast_target = request.cast_target.ok_or_else(|| {
                    RuntimeError::internal("cast call site without a target type")
                })?;
                let plan = coerce::CastPlan::plan(self.lookup, request.receiver, cast_target);
                (Target::Cast(plan), Adaptation::none())
            }
            CallKind::SetProperty => {
                return Err(RuntimeError::internal(format!(
                    "property-set call site for '{}' is not supported",
                    request.name
                )));
            }
        };

        tracing::trace!(
            name = request.name,
            kind = %request.kind,
            class = %meta.class_name(),
            ?target,
            "resolved call"
        );

        Ok(Candidate {
            target,
            adaptation,
            meta: Arc::clone(meta),
        })
    }

    /// Pick the applicable method with the smallest distance.
    pub fn select<'m>(
        &self,
        methods: impl IntoIterator<Item = &'m Arc<MetaMethod>>,
        args: &[Value],
    ) -> Option<(Arc<MetaMethod>, Adaptation)> {
        let mut best: Option<(u64, &Arc<MetaMethod>, Adaptation)> = None;
        for method in methods {
            let Some((distance, adaptation)) = distance::score(self.lookup, method, args) else {
                continue;
            };
            if best.as_ref().map_or(true, |(d, _, _)| distance < *d) {
                best = Some((distance, method, adaptation));
            }
        }
        best.map(|(_, method, adaptation)| (Arc::clone(method), adaptation))
    }

    fn resolve_method(
        &self,
        request: &CallRequest<'_>,
        meta: &Arc<dyn MetaObject>,
    ) -> Result<(Target, Adaptation), RuntimeError> {
        if let Some(hook) = meta.interceptor() {
            return Ok((Target::Intercept(hook), Adaptation::none()));
        }
        if !meta.is_selectable() {
            return Ok((Target::MetaInvoke { property: false }, Adaptation::none()));
        }

        // Class objects expose only their static side.
        let static_only = matches!(request.receiver, Value::Class(_));
        let methods = meta.methods(request.name);
        let selected = self.select(
            methods.iter().filter(|m| !static_only || m.is_static()),
            request.args,
        );

        match selected {
            Some((method, adaptation)) => {
                if adaptation.is_empty() {
                    if let Some(op) = method.math() {
                        if let Some(kind) = NumericKind::widen(op, request.receiver, request.args) {
                            return Ok((Target::Math { op, kind }, adaptation));
                        }
                    }
                }
                Ok((Target::Method(method), adaptation))
            }
            None if meta.has_method_missing() => Ok((Target::MethodMissing, Adaptation::none())),
            None => Err(RuntimeError::missing_method(
                meta.class_name(),
                request.name,
                request.args,
            )),
        }
    }

    fn resolve_constructor(
        &self,
        request: &CallRequest<'_>,
        meta: &Arc<dyn MetaObject>,
    ) -> Result<(Target, Adaptation), RuntimeError> {
        if !matches!(request.receiver, Value::Class(_)) {
            return Err(RuntimeError::internal(format!(
                "constructor call on non-class receiver {:?}",
                request.receiver
            )));
        }
        let constructors = meta.constructors();
        match self.select(constructors.iter(), request.args) {
            Some((ctor, adaptation)) => Ok((Target::Constructor(ctor), adaptation)),
            None => Err(RuntimeError::MissingConstructor {
                class: meta.class_name(),
                arg_types: describe_args(request.args),
            }),
        }
    }

    fn resolve_property(
        &self,
        request: &CallRequest<'_>,
        meta: &Arc<dyn MetaObject>,
    ) -> Result<(Target, Adaptation), RuntimeError> {
        if !meta.is_selectable() {
            return Ok((Target::MetaInvoke { property: true }, Adaptation::none()));
        }

        let on_class = matches!(request.receiver, Value::Class(_));
        let name = request.name;

        if let Some(property) = meta.property(name).filter(|p| !on_class || p.is_static) {
            let target = match property.kind {
                PropertyKind::Field { slot } if !on_class => Target::Field { slot },
                PropertyKind::Field { .. } => {
                    return Err(RuntimeError::internal(format!(
                        "field-backed property '{name}' declared static"
                    )));
                }
                PropertyKind::Getter(method) => Target::Getter(method),
                PropertyKind::Accessor(accessor) => Target::Accessor(accessor),
            };
            return Ok((target, Adaptation::none()));
        }

        // Fall back to bean-style getters.
        let suffix = capitalize(name);
        for prefix in ["get", "is"] {
            let methods = meta.methods(&format!("{prefix}{suffix}"));
            let getter = methods
                .iter()
                .find(|m| m.params().is_empty() && (!on_class || m.is_static()));
            if let Some(getter) = getter {
                return Ok((Target::Getter(Arc::clone(getter)), Adaptation::none()));
            }
        }

        Err(RuntimeError::MissingProperty {
            class: meta.class_name(),
            name: Arc::from(name),
        })
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use switchyard_core::{
        ClassId, Instance, MetaObjectId, MetaProperty, MethodList, Primitive,
    };

    /// Lookup over the builtin hierarchy only.
    pub(crate) struct FlatLookup;

    impl MetaObjectLookup for FlatLookup {
        fn meta_object(&self, receiver: &Value) -> Arc<dyn MetaObject> {
            Arc::new(TableMeta::new(receiver.class_id()))
        }

        fn meta_object_for_class(&self, class: ClassId) -> Option<Arc<dyn MetaObject>> {
            Some(Arc::new(TableMeta::new(class)))
        }
    }

    /// Meta-object backed by plain vectors.
    pub(crate) struct TableMeta {
        pub class: ClassId,
        pub methods: Vec<Arc<MetaMethod>>,
        pub constructors: Vec<Arc<MetaMethod>>,
        pub properties: Vec<MetaProperty>,
        pub hook: Option<Interceptor>,
        pub missing: bool,
        pub opaque: bool,
    }

    impl TableMeta {
        pub(crate) fn new(class: ClassId) -> Self {
            Self {
                class,
                methods: Vec::new(),
                constructors: Vec::new(),
                properties: Vec::new(),
                hook: None,
                missing: false,
                opaque: false,
            }
        }

        pub(crate) fn method(mut self, method: MetaMethod) -> Self {
            self.methods.push(Arc::new(method));
            self
        }
    }

    impl MetaObject for TableMeta {
        fn identity(&self) -> MetaObjectId {
            MetaObjectId::for_class(self.class)
        }
        fn class_id(&self) -> ClassId {
            self.class
        }
        fn class_name(&self) -> Arc<str> {
            Arc::from(self.class.to_string())
        }
        fn is_selectable(&self) -> bool {
            !self.opaque
        }
        fn methods(&self, name: &str) -> MethodList {
            self.methods.iter().filter(|m| m.name() == name).cloned().collect()
        }
        fn constructors(&self) -> MethodList {
            self.constructors.iter().cloned().collect()
        }
        fn property(&self, name: &str) -> Option<MetaProperty> {
            self.properties.iter().find(|p| &*p.name == name).cloned()
        }
        fn interceptor(&self) -> Option<Interceptor> {
            self.hook.clone()
        }
        fn has_method_missing(&self) -> bool {
            self.missing
        }
        fn method_missing(&self, _: &Value, name: &str, _: &[Value]) -> Result<Value, RuntimeError> {
            Ok(Value::str(format!("missing:{name}")))
        }
        fn invoke_method(&self, _: &Value, name: &str, _: &[Value]) -> Result<Value, RuntimeError> {
            Ok(Value::str(format!("opaque:{name}")))
        }
    }

    fn tagged(name: &str, params: impl IntoIterator<Item = ParamType>, tag: &'static str) -> MetaMethod {
        MetaMethod::new(name, ClassId::OBJECT, params, move |_, _| Ok(Value::str(tag)))
    }

    fn resolve(meta: TableMeta, name: &str, kind: CallKind, receiver: &Value, args: &[Value]) -> Result<Candidate, RuntimeError> {
        let stats = DispatchStats::new();
        let meta: Arc<dyn MetaObject> = Arc::new(meta);
        let request = CallRequest {
            name,
            kind,
            receiver,
            args,
            cast_target: None,
        };
        Resolver::new(&FlatLookup, &stats).resolve(&request, &meta)
    }

    fn call(candidate: &Candidate, name: &str, receiver: &Value, args: &[Value]) -> Value {
        candidate.invoke(name, receiver, args).unwrap()
    }

    #[test]
    fn test_exact_match_beats_widening() {
        let meta = TableMeta::new(ClassId::OBJECT)
            .method(tagged("f", [ParamType::Primitive(Primitive::Long)], "long"))
            .method(tagged("f", [ParamType::Class(ClassId::INT)], "Integer"));
        let args = [Value::Int(1)];
        let candidate = resolve(meta, "f", CallKind::Method, &Value::Null, &args).unwrap();
        assert_eq!(call(&candidate, "f", &Value::Null, &args), Value::str("Integer"));
    }

    #[test]
    fn test_tie_keeps_first_declared() {
        let meta = TableMeta::new(ClassId::OBJECT)
            .method(tagged("f", [ParamType::Any], "first"))
            .method(tagged("f", [ParamType::Any], "second"));
        let args = [Value::Int(1)];
        let candidate = resolve(meta, "f", CallKind::Method, &Value::Null, &args).unwrap();
        assert_eq!(call(&candidate, "f", &Value::Null, &args), Value::str("first"));
    }

    #[test]
    fn test_fixed_arity_preferred_over_varargs() {
        let meta = TableMeta::new(ClassId::OBJECT)
            .method(tagged("f", [ParamType::Array(ClassId::OBJECT)], "varargs").varargs())
            .method(tagged("f", [ParamType::Any], "fixed"));
        let args = [Value::Int(1)];
        let candidate = resolve(meta, "f", CallKind::Method, &Value::Null, &args).unwrap();
        assert_eq!(call(&candidate, "f", &Value::Null, &args), Value::str("fixed"));
    }

    #[test]
    fn test_array_argument_not_rewrapped() {
        let meta = TableMeta::new(ClassId::OBJECT).method(
            MetaMethod::new("f", ClassId::OBJECT, [ParamType::Array(ClassId::OBJECT)], |_, args| {
                Ok(args[0].clone())
            })
            .varargs(),
        );
        let array = Value::object_array([Value::Int(1), Value::Int(2)]);
        let args = [array.clone()];
        let candidate = resolve(meta, "f", CallKind::Method, &Value::Null, &args).unwrap();
        assert!(candidate.adaptation.is_empty());
        assert_eq!(call(&candidate, "f", &Value::Null, &args), array);
    }

    #[test]
    fn test_math_fast_path_same_kind_only() {
        let plus = || {
            MetaMethod::new("plus", ClassId::INT, [ParamType::Class(ClassId::NUMBER)], |r, a| {
                switchyard_core::arith::generic(MathOp::Plus, r, a.first())
            })
            .with_math(MathOp::Plus)
        };

        let same = [Value::Int(2)];
        let candidate = resolve(
            TableMeta::new(ClassId::INT).method(plus()),
            "plus",
            CallKind::Method,
            &Value::Int(1),
            &same,
        )
        .unwrap();
        assert!(matches!(
            candidate.target,
            Target::Math {
                op: MathOp::Plus,
                kind: NumericKind::Int
            }
        ));
        assert_eq!(call(&candidate, "plus", &Value::Int(1), &same), Value::Int(3));

        let mixed = [Value::Long(2)];
        let candidate = resolve(
            TableMeta::new(ClassId::INT).method(plus()),
            "plus",
            CallKind::Method,
            &Value::Int(1),
            &mixed,
        )
        .unwrap();
        assert!(matches!(candidate.target, Target::Method(_)));
        assert_eq!(call(&candidate, "plus", &Value::Int(1), &mixed), Value::Long(3));
    }

    #[test]
    fn test_interceptor_wins() {
        let mut meta = TableMeta::new(ClassId::OBJECT).method(tagged("f", [], "method"));
        let hook: Interceptor = Arc::new(
            |_: &Value, name: &str, _: &[Value]| -> Result<Value, RuntimeError> {
                Ok(Value::str(format!("hook:{name}")))
            },
        );
        meta.hook = Some(hook);
        let candidate = resolve(meta, "f", CallKind::Method, &Value::Null, &[]).unwrap();
        assert!(matches!(candidate.target, Target::Intercept(_)));
        assert_eq!(call(&candidate, "f", &Value::Null, &[]), Value::str("hook:f"));
    }

    #[test]
    fn test_opaque_meta_handles_call() {
        let mut meta = TableMeta::new(ClassId::OBJECT);
        meta.opaque = true;
        let candidate = resolve(meta, "anything", CallKind::Method, &Value::Null, &[]).unwrap();
        assert_eq!(call(&candidate, "anything", &Value::Null, &[]), Value::str("opaque:anything"));
    }

    #[test]
    fn test_missing_method() {
        let err = resolve(
            TableMeta::new(ClassId::STRING),
            "nope",
            CallKind::Method,
            &Value::str("x"),
            &[Value::Int(1)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            RuntimeError::MissingMethod {
                class: Arc::from("String"),
                name: Arc::from("nope"),
                arg_types: "Integer".to_string()
            }
        );

        let mut meta = TableMeta::new(ClassId::STRING);
        meta.missing = true;
        let candidate = resolve(meta, "nope", CallKind::Method, &Value::str("x"), &[]).unwrap();
        assert_eq!(call(&candidate, "nope", &Value::str("x"), &[]), Value::str("missing:nope"));
    }

    #[test]
    fn test_class_receiver_sees_static_side() {
        let meta = TableMeta::new(ClassId::STRING)
            .method(tagged("f", [], "instance"))
            .method(tagged("f", [], "static").static_method());
        let receiver = Value::Class(ClassId::STRING);
        let candidate = resolve(meta, "f", CallKind::Method, &receiver, &[]).unwrap();
        assert_eq!(call(&candidate, "f", &receiver, &[]), Value::str("static"));
    }

    #[test]
    fn test_constructor_resolution() {
        let mut meta = TableMeta::new(ClassId(300));
        meta.constructors.push(Arc::new(tagged("<init>", [ParamType::Any], "ctor")));
        let receiver = Value::Class(ClassId(300));
        let args = [Value::Int(1)];
        let candidate = resolve(meta, "<init>", CallKind::Init, &receiver, &args).unwrap();
        assert_eq!(call(&candidate, "<init>", &receiver, &args), Value::str("ctor"));

        let err = resolve(TableMeta::new(ClassId(300)), "<init>", CallKind::Init, &receiver, &args)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::MissingConstructor { .. }));

        let err = resolve(TableMeta::new(ClassId(300)), "<init>", CallKind::Init, &Value::Null, &[])
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_property_resolution() {
        let object = Value::Object(Arc::new(Instance::with_fields(
            ClassId(300),
            [Value::str("field-value")],
        )));

        let mut meta = TableMeta::new(ClassId(300)).method(tagged("getTitle", [], "getter"));
        meta.properties.push(MetaProperty::field("name", 0));

        let candidate = resolve(meta, "name", CallKind::GetProperty, &object, &[]).unwrap();
        assert!(matches!(candidate.target, Target::Field { slot: 0 }));
        assert_eq!(call(&candidate, "name", &object, &[]), Value::str("field-value"));

        let meta = TableMeta::new(ClassId(300)).method(tagged("getTitle", [], "getter"));
        let candidate = resolve(meta, "title", CallKind::GetProperty, &object, &[]).unwrap();
        assert_eq!(call(&candidate, "title", &object, &[]), Value::str("getter"));

        let err = resolve(TableMeta::new(ClassId(300)), "title", CallKind::GetProperty, &object, &[])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::MissingProperty { .. }));
    }

    #[test]
    fn test_set_property_is_internal() {
        let err = resolve(
            TableMeta::new(ClassId::OBJECT),
            "x",
            CallKind::SetProperty,
            &Value::Null,
            &[Value::Int(1)],
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_every_resolution_counted() {
        let stats = DispatchStats::new();
        let resolver = Resolver::new(&FlatLookup, &stats);
        let meta: Arc<dyn MetaObject> = Arc::new(TableMeta::new(ClassId::OBJECT));
        let request = CallRequest {
            name: "missing",
            kind: CallKind::Method,
            receiver: &Value::Null,
            args: &[],
            cast_target: None,
        };
        let _ = resolver.resolve(&request, &meta);
        let _ = resolver.resolve(&request, &meta);
        assert_eq!(stats.resolutions(), 2);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("name"), "Name");
        assert_eq!(capitalize(""), "");
    }
}
