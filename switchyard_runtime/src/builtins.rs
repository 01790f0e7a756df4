//! Builtin meta classes.
//!
//! Installs the classes of the builtin value kinds with a small, practical
//! method surface: object identity and text conversion, numeric arithmetic
//! (tagged with [`MathOp`] for the primitive fast path), text helpers,
//! collection helpers, array length and closure invocation.

use crate::meta_class::MetaClassFlags;
use crate::registry::ClassRegistry;
use std::sync::Arc;
use switchyard_core::{
    arith, ClassId, MathOp, MetaMethod, MetaProperty, ParamType, Primitive, RuntimeError, Value,
};

/// Binary operators shared by every numeric class.
const BINARY_OPS: [(&str, MathOp); 6] = [
    ("plus", MathOp::Plus),
    ("minus", MathOp::Minus),
    ("multiply", MathOp::Multiply),
    ("div", MathOp::Div),
    ("mod", MathOp::Remainder),
    ("compareTo", MathOp::CompareTo),
];

pub(crate) fn install(registry: &Arc<ClassRegistry>) {
    install_object(registry);
    install_null(registry);
    install_bool(registry);
    install_numbers(registry);
    install_text(registry);
    install_collections(registry);
    install_closure(registry);

    registry
        .builtin_class(ClassId::CLASS, "Class")
        .flags(MetaClassFlags::BUILTIN)
        .build();
}

// =============================================================================
// Helpers
// =============================================================================

fn arg(args: &[Value], index: usize) -> Result<&Value, RuntimeError> {
    args.get(index)
        .ok_or_else(|| RuntimeError::internal(format!("builtin called without argument {index}")))
}

fn int_arg(args: &[Value], index: usize) -> Result<i32, RuntimeError> {
    match arg(args, index)? {
        Value::Int(i) => Ok(*i),
        other => Err(RuntimeError::internal(format!(
            "builtin expected int argument, got {}",
            other.class_id()
        ))),
    }
}

/// Text of a string or interpolated string.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.to_string()),
        Value::GString(g) => Some(g.render()),
        _ => None,
    }
}

fn receiver_text(receiver: &Value) -> Result<String, RuntimeError> {
    text_of(receiver).ok_or_else(|| RuntimeError::internal("text builtin on non-text receiver"))
}

fn receiver_elements(receiver: &Value) -> Result<&[Value], RuntimeError> {
    receiver
        .as_elements()
        .ok_or_else(|| RuntimeError::internal("collection builtin on non-collection receiver"))
}

fn index_out_of_bounds(index: i32, len: usize) -> RuntimeError {
    RuntimeError::raised(
        "IndexOutOfBoundsException",
        format!("index {index} out of range for length {len}"),
    )
}

// =============================================================================
// Object, Null, Boolean
// =============================================================================

fn install_object(registry: &Arc<ClassRegistry>) {
    registry
        .builtin_class(ClassId::OBJECT, "Object")
        .flags(MetaClassFlags::BUILTIN)
        .method("toString", [], |recv, _| Ok(Value::str(recv.to_string())))
        .method("equals", [ParamType::Any], |recv, args| {
            Ok(Value::Bool(recv == arg(args, 0)?))
        })
        .property(MetaProperty::accessor("class", |recv| Ok(Value::Class(recv.class_id()))))
        .build();
}

fn install_null(registry: &Arc<ClassRegistry>) {
    registry
        .builtin_class(ClassId::NULL, "NullObject")
        .flags(MetaClassFlags::BUILTIN)
        .method("toString", [], |_, _| Ok(Value::str("null")))
        .method("equals", [ParamType::Any], |_, args| Ok(Value::Bool(arg(args, 0)?.is_null())))
        .method("is", [ParamType::Any], |_, args| Ok(Value::Bool(arg(args, 0)?.is_null())))
        .build();
}

fn install_bool(registry: &Arc<ClassRegistry>) {
    let boolean = ParamType::Primitive(Primitive::Bool);
    registry
        .builtin_class(ClassId::BOOL, "Boolean")
        .flags(MetaClassFlags::BUILTIN)
        .method("not", [], |recv, _| Ok(Value::Bool(!recv.truthy())))
        .method("and", [boolean], |recv, args| {
            Ok(Value::Bool(recv.truthy() && arg(args, 0)?.truthy()))
        })
        .method("or", [boolean], |recv, args| {
            Ok(Value::Bool(recv.truthy() || arg(args, 0)?.truthy()))
        })
        .build();
}

// =============================================================================
// Numbers
// =============================================================================

fn install_numbers(registry: &Arc<ClassRegistry>) {
    registry
        .builtin_class(ClassId::NUMBER, "Number")
        .flags(MetaClassFlags::BUILTIN | MetaClassFlags::ABSTRACT)
        .method("intValue", [], |recv, _| match recv {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Long(l) => Ok(Value::Int(*l as i32)),
            Value::Double(d) => Ok(Value::Int(*d as i32)),
            _ => Err(RuntimeError::internal("intValue on non-number")),
        })
        .method("longValue", [], |recv, _| match recv {
            Value::Int(i) => Ok(Value::Long(i64::from(*i))),
            Value::Long(l) => Ok(Value::Long(*l)),
            Value::Double(d) => Ok(Value::Long(*d as i64)),
            _ => Err(RuntimeError::internal("longValue on non-number")),
        })
        .method("doubleValue", [], |recv, _| match recv {
            Value::Int(i) => Ok(Value::Double(f64::from(*i))),
            Value::Long(l) => Ok(Value::Double(*l as f64)),
            Value::Double(d) => Ok(Value::Double(*d)),
            _ => Err(RuntimeError::internal("doubleValue on non-number")),
        })
        .build();

    for (class, name) in [
        (ClassId::INT, "Integer"),
        (ClassId::LONG, "Long"),
        (ClassId::DOUBLE, "Double"),
    ] {
        let mut builder = registry.builtin_class(class, name).flags(MetaClassFlags::BUILTIN);
        for (method, op) in BINARY_OPS {
            builder = builder.add_method(
                MetaMethod::new(method, class, [ParamType::Class(ClassId::NUMBER)], move |recv, args| {
                    arith::generic(op, recv, args.first())
                })
                .with_math(op),
            );
        }
        for (method, op) in [("next", MathOp::Next), ("previous", MathOp::Previous)] {
            builder = builder.add_method(
                MetaMethod::new(method, class, [], move |recv, _| arith::generic(op, recv, None))
                    .with_math(op),
            );
        }
        builder.build();
    }

    // Parsing helpers live on the static side of their class.
    let string = ParamType::Class(ClassId::STRING);
    registry.add_method(
        ClassId::INT,
        MetaMethod::new("parseInt", ClassId::INT, [string], |_, args| {
            let text = text_of(arg(args, 0)?).unwrap_or_default();
            text.trim().parse::<i32>().map(Value::Int).map_err(|e| {
                RuntimeError::raised("NumberFormatException", format!("{text:?}: {e}"))
            })
        })
        .static_method(),
    );
    registry.add_method(
        ClassId::LONG,
        MetaMethod::new("parseLong", ClassId::LONG, [string], |_, args| {
            let text = text_of(arg(args, 0)?).unwrap_or_default();
            text.trim().parse::<i64>().map(Value::Long).map_err(|e| {
                RuntimeError::raised("NumberFormatException", format!("{text:?}: {e}"))
            })
        })
        .static_method(),
    );
}

// =============================================================================
// Text
// =============================================================================

/// Replace each `%s` in `pattern` with the next argument.
fn format_text(pattern: &str, values: &[Value]) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut values = values.iter();
    let mut rest = pattern;
    while let Some(pos) = rest.find("%s") {
        out.push_str(&rest[..pos]);
        match values.next() {
            Some(value) => out.push_str(&value.to_string()),
            None => out.push_str("%s"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

fn install_text(registry: &Arc<ClassRegistry>) {
    let int = ParamType::Primitive(Primitive::Int);

    registry
        .builtin_class(ClassId::CHAR_SEQUENCE, "CharSequence")
        .flags(MetaClassFlags::BUILTIN | MetaClassFlags::ABSTRACT)
        .method("length", [], |recv, _| {
            Ok(Value::Int(receiver_text(recv)?.chars().count() as i32))
        })
        .method("size", [], |recv, _| {
            Ok(Value::Int(receiver_text(recv)?.chars().count() as i32))
        })
        .method("isEmpty", [], |recv, _| Ok(Value::Bool(receiver_text(recv)?.is_empty())))
        .method("toUpperCase", [], |recv, _| {
            Ok(Value::str(receiver_text(recv)?.to_uppercase()))
        })
        .method("contains", [ParamType::Class(ClassId::CHAR_SEQUENCE)], |recv, args| {
            let needle = text_of(arg(args, 0)?).unwrap_or_default();
            Ok(Value::Bool(receiver_text(recv)?.contains(&needle)))
        })
        .method("plus", [ParamType::Any], |recv, args| {
            Ok(Value::str(format!("{}{}", receiver_text(recv)?, arg(args, 0)?)))
        })
        .build();

    registry
        .builtin_class(ClassId::STRING, "String")
        .flags(MetaClassFlags::BUILTIN)
        .method("substring", [int], |recv, args| {
            let text = receiver_text(recv)?;
            let start = int_arg(args, 0)?;
            let chars: Vec<char> = text.chars().collect();
            if start < 0 || start as usize > chars.len() {
                return Err(index_out_of_bounds(start, chars.len()));
            }
            Ok(Value::str(chars[start as usize..].iter().collect::<String>()))
        })
        .method("substring", [int, int], |recv, args| {
            let text = receiver_text(recv)?;
            let (start, end) = (int_arg(args, 0)?, int_arg(args, 1)?);
            let chars: Vec<char> = text.chars().collect();
            if start < 0 || end < start || end as usize > chars.len() {
                return Err(index_out_of_bounds(end, chars.len()));
            }
            Ok(Value::str(chars[start as usize..end as usize].iter().collect::<String>()))
        })
        .add_method(
            MetaMethod::new(
                "format",
                ClassId::STRING,
                [ParamType::Class(ClassId::STRING), ParamType::Array(ClassId::OBJECT)],
                |_, args| {
                    let pattern = text_of(arg(args, 0)?).unwrap_or_default();
                    let values = arg(args, 1)?.as_elements().unwrap_or(&[]);
                    Ok(Value::str(format_text(&pattern, values)))
                },
            )
            .static_method()
            .varargs(),
        )
        .static_method("valueOf", [ParamType::Any], |_, args| {
            Ok(Value::str(arg(args, 0)?.to_string()))
        })
        .build();

    registry
        .builtin_class(ClassId::GSTRING, "GString")
        .flags(MetaClassFlags::BUILTIN)
        .build();
}

// =============================================================================
// Collections
// =============================================================================

fn install_collections(registry: &Arc<ClassRegistry>) {
    let int = ParamType::Primitive(Primitive::Int);

    registry
        .builtin_class(ClassId::COLLECTION, "Collection")
        .flags(MetaClassFlags::BUILTIN | MetaClassFlags::ABSTRACT)
        .method("size", [], |recv, _| Ok(Value::Int(receiver_elements(recv)?.len() as i32)))
        .method("isEmpty", [], |recv, _| Ok(Value::Bool(receiver_elements(recv)?.is_empty())))
        .method("contains", [ParamType::Any], |recv, args| {
            let needle = arg(args, 0)?;
            Ok(Value::Bool(receiver_elements(recv)?.contains(needle)))
        })
        .build();

    registry
        .builtin_class(ClassId::LIST, "List")
        .flags(MetaClassFlags::BUILTIN)
        .method("get", [int], |recv, args| {
            let items = receiver_elements(recv)?;
            let index = int_arg(args, 0)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| index_out_of_bounds(index, items.len()))
        })
        .method("first", [], |recv, _| {
            let items = receiver_elements(recv)?;
            items.first().cloned().ok_or_else(|| {
                RuntimeError::raised("NoSuchElementException", "cannot access first() of an empty list")
            })
        })
        // Appending and concatenating are overloads; the more specific
        // collection parameter wins for collection arguments.
        .method("plus", [ParamType::Any], |recv, args| {
            let mut items = receiver_elements(recv)?.to_vec();
            items.push(arg(args, 0)?.clone());
            Ok(Value::list(items))
        })
        .method("plus", [ParamType::Class(ClassId::COLLECTION)], |recv, args| {
            let mut items = receiver_elements(recv)?.to_vec();
            if let Some(more) = arg(args, 0)?.as_elements() {
                items.extend_from_slice(more);
            }
            Ok(Value::list(items))
        })
        .method("join", [ParamType::Class(ClassId::STRING)], |recv, args| {
            let separator = text_of(arg(args, 0)?).unwrap_or_default();
            let parts: Vec<String> = receiver_elements(recv)?.iter().map(Value::to_string).collect();
            Ok(Value::str(parts.join(&separator)))
        })
        .build();

    registry
        .builtin_class(ClassId::SET, "Set")
        .flags(MetaClassFlags::BUILTIN)
        .build();

    registry
        .builtin_class(ClassId::ARRAY, "Object[]")
        .flags(MetaClassFlags::BUILTIN)
        .method("size", [], |recv, _| Ok(Value::Int(receiver_elements(recv)?.len() as i32)))
        .property(MetaProperty::accessor("length", |recv| {
            Ok(Value::Int(receiver_elements(recv)?.len() as i32))
        }))
        .build();
}

// =============================================================================
// Closures
// =============================================================================

fn install_closure(registry: &Arc<ClassRegistry>) {
    registry
        .builtin_class(ClassId::CLOSURE, "Closure")
        .flags(MetaClassFlags::BUILTIN)
        .varargs_method("call", [ParamType::Array(ClassId::OBJECT)], |recv, args| {
            let Value::Closure(closure) = recv else {
                return Err(RuntimeError::internal("call on non-closure receiver"));
            };
            let values = arg(args, 0)?.as_elements().unwrap_or(&[]);
            closure.call(values)
        })
        .method("getMaximumNumberOfParameters", [], |recv, _| match recv {
            Value::Closure(closure) => Ok(Value::Int(i32::from(closure.arity.unwrap_or(1)))),
            _ => Err(RuntimeError::internal("closure builtin on non-closure receiver")),
        })
        .build();
}
