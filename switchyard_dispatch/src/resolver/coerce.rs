//! Argument coercions and cast plans.
//!
//! A coercion converts a value whose class does not directly match a
//! parameter into one that does. Selection only *records* coercions; they
//! run at invocation time, and a failing coercion is an adaptation failure
//! rather than a resolution failure.

use crate::resolver::distance::match_arg;
use std::sync::Arc;
use switchyard_core::{
    Callback, ClassId, MetaObjectLookup, ParamType, Primitive, RuntimeError, Value,
};

/// A value conversion applied before invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Coercion {
    /// Interpolated text to plain text.
    ToStr,
    /// Narrowing to int. Out-of-range longs fail.
    ToInt,
    /// Widening to long.
    ToLong,
    /// Widening to double.
    ToDouble,
    /// Array or set to list.
    ToList,
    /// List or array to set.
    ToSet,
    /// Closure to a functional interface.
    ToCallback { interface: ClassId, arity: u8 },
}

impl Coercion {
    /// Name of the type this coercion produces.
    pub fn target_name(&self) -> String {
        match self {
            Coercion::ToStr => "String".to_string(),
            Coercion::ToInt => "int".to_string(),
            Coercion::ToLong => "Long".to_string(),
            Coercion::ToDouble => "Double".to_string(),
            Coercion::ToList => "List".to_string(),
            Coercion::ToSet => "Set".to_string(),
            Coercion::ToCallback { interface, arity } => format!("{interface}/{arity}"),
        }
    }

    /// Convert `value`. On failure returns a description of what was found.
    pub fn apply(&self, value: &Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let converted = match (self, value) {
            (Coercion::ToStr, Value::GString(g)) => Value::str(g.render()),
            (Coercion::ToStr, Value::Str(_)) => value.clone(),

            (Coercion::ToInt, Value::Int(_)) => value.clone(),
            (Coercion::ToInt, Value::Long(l)) => match i32::try_from(*l) {
                Ok(i) => Value::Int(i),
                Err(_) => return Err(format!("Long value {l} outside int range")),
            },
            (Coercion::ToInt, Value::Double(d)) => Value::Int(*d as i32),

            (Coercion::ToLong, Value::Int(i)) => Value::Long(i64::from(*i)),
            (Coercion::ToLong, Value::Long(_)) => value.clone(),
            (Coercion::ToLong, Value::Double(d)) => Value::Long(*d as i64),

            (Coercion::ToDouble, Value::Int(i)) => Value::Double(f64::from(*i)),
            (Coercion::ToDouble, Value::Long(l)) => Value::Double(*l as f64),
            (Coercion::ToDouble, Value::Double(_)) => value.clone(),

            (Coercion::ToList, Value::List(_)) => value.clone(),
            (Coercion::ToList, Value::Set(items)) => Value::list(items.iter().cloned()),
            (Coercion::ToList, Value::Array(arr)) => Value::list(arr.items.iter().cloned()),

            (Coercion::ToSet, Value::Set(_)) => value.clone(),
            (Coercion::ToSet, Value::List(items)) => Value::set(items.iter().cloned()),
            (Coercion::ToSet, Value::Array(arr)) => Value::set(arr.items.iter().cloned()),

            (Coercion::ToCallback { interface, arity }, Value::Closure(closure)) => {
                if !closure.accepts(*arity as usize) {
                    return Err(match closure.arity {
                        Some(n) => format!("Closure taking {n} parameters"),
                        None => "Closure taking an implicit parameter".to_string(),
                    });
                }
                Value::Callback(Arc::new(Callback {
                    interface: *interface,
                    arity: *arity,
                    closure: Arc::clone(closure),
                }))
            }
            (Coercion::ToCallback { interface, .. }, Value::Callback(cb))
                if cb.interface == *interface =>
            {
                value.clone()
            }

            _ => return Err(value.class_id().to_string()),
        };
        Ok(converted)
    }
}

// =============================================================================
// Cast Plans
// =============================================================================

/// How a cast site converts its receiver.
#[derive(Clone, Debug, PartialEq)]
pub enum CastPlan {
    /// Value already has the target type.
    Identity,
    /// Boolean target: language truthiness. Null becomes false for the
    /// primitive target and stays null for the boxed one.
    Truthiness { primitive: bool },
    /// Convert with a coercion.
    Coerce(Coercion),
    /// No conversion exists.
    Reject { target: ParamType },
}

impl CastPlan {
    /// Plan the cast of `value` to `target`.
    pub fn plan(lookup: &dyn MetaObjectLookup, value: &Value, target: ParamType) -> CastPlan {
        match target {
            ParamType::Primitive(Primitive::Bool) => {
                return CastPlan::Truthiness { primitive: true };
            }
            ParamType::Class(ClassId::BOOL) => return CastPlan::Truthiness { primitive: false },
            _ => {}
        }

        if value.is_null() {
            return if target.is_primitive() {
                CastPlan::Reject { target }
            } else {
                CastPlan::Identity
            };
        }

        if let Some(matched) = match_arg(lookup, value, target) {
            return match matched.coercion {
                Some(coercion) => CastPlan::Coerce(coercion),
                None => CastPlan::Identity,
            };
        }

        // Explicit casts may also narrow between numeric types.
        let numeric = matches!(value, Value::Int(_) | Value::Long(_) | Value::Double(_));
        match target {
            ParamType::Primitive(Primitive::Int) | ParamType::Class(ClassId::INT) if numeric => {
                CastPlan::Coerce(Coercion::ToInt)
            }
            ParamType::Primitive(Primitive::Long) | ParamType::Class(ClassId::LONG) if numeric => {
                CastPlan::Coerce(Coercion::ToLong)
            }
            _ => CastPlan::Reject { target },
        }
    }

    /// Apply the plan.
    pub fn apply(&self, value: &Value) -> Result<Value, RuntimeError> {
        match self {
            CastPlan::Identity => Ok(value.clone()),
            CastPlan::Truthiness { primitive } => {
                if value.is_null() && !primitive {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Bool(value.truthy()))
                }
            }
            CastPlan::Coerce(coercion) => coercion.apply(value).map_err(|found| RuntimeError::Cast {
                expected: coercion.target_name(),
                found,
            }),
            CastPlan::Reject { target } => Err(RuntimeError::Cast {
                expected: target.to_string(),
                found: if value.is_null() {
                    "null".to_string()
                } else {
                    value.class_id().to_string()
                },
            }),
        }
    }
}
