//! Parameter distance scoring.
//!
//! Each (argument, parameter) pair gets a distance; a candidate's distance
//! is the sum over its arguments plus a penalty for the shape adaptation it
//! needs. The lowest total wins. Costs live in separate bands so that a
//! cheaper band always beats a more expensive one:
//!
//! ```text
//!   bits  0..8    numeric widening, boxing
//!   bits  8..20   superclass steps (OBJECT_STEP per level)
//!   bits 20..40   coercions
//!   bits 40..56   vararg shape (C < A < D < B)
//!   bits 56..     null padding
//! ```

use crate::resolver::adapt::{AdaptStep, Adaptation};
use crate::resolver::coerce::Coercion;
use switchyard_core::{ClassId, MetaMethod, MetaObjectLookup, ParamType, Primitive, Value};

/// Cost of one superclass step.
pub const OBJECT_STEP: u64 = 1 << 8;
/// Base cost of any coercion.
pub const COERCION: u64 = 1 << 20;
/// Cost of supplying a missing argument as null.
pub const NULL_PADDING: u64 = 1 << 56;
/// Shift applied to vararg shape penalties.
const VARARG_SHIFT: u32 = 40;

/// Result of matching one argument against one parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgMatch {
    pub distance: u64,
    pub coercion: Option<Coercion>,
}

impl ArgMatch {
    #[inline]
    const fn exact(distance: u64) -> Self {
        Self {
            distance,
            coercion: None,
        }
    }

    #[inline]
    const fn coerced(distance: u64, coercion: Coercion) -> Self {
        Self {
            distance,
            coercion: Some(coercion),
        }
    }
}

/// Match `arg` against `param`. `None` if the argument cannot be passed.
pub fn match_arg(lookup: &dyn MetaObjectLookup, arg: &Value, param: ParamType) -> Option<ArgMatch> {
    if arg.is_null() {
        return match_null(lookup, param);
    }

    match (arg, param) {
        (Value::Int(_) | Value::Long(_) | Value::Double(_), _) => match_number(lookup, arg, param),

        (Value::Bool(_), ParamType::Primitive(Primitive::Bool)) => Some(ArgMatch::exact(1)),
        (_, ParamType::Primitive(_)) => None,

        (Value::GString(_), ParamType::Class(ClassId::STRING)) => {
            Some(ArgMatch::coerced(2, Coercion::ToStr))
        }

        (Value::Array(arr), ParamType::Array(element)) => {
            let steps = lookup.superclass_distance(arr.element, element)?;
            Some(ArgMatch::exact(u64::from(steps) * OBJECT_STEP))
        }
        // Passing an array where a plain object is expected is legal but
        // ranks behind any overload that names the array type.
        (Value::Array(_), ParamType::Any | ParamType::Class(ClassId::OBJECT)) => {
            Some(ArgMatch::exact(3 * OBJECT_STEP))
        }
        (_, ParamType::Array(_)) => None,

        (Value::List(_) | Value::Array(_), ParamType::Class(ClassId::SET)) => {
            Some(ArgMatch::coerced(COERCION, Coercion::ToSet))
        }
        (Value::Set(_) | Value::Array(_), ParamType::Class(ClassId::LIST)) => {
            Some(ArgMatch::coerced(COERCION, Coercion::ToList))
        }
        (Value::Array(_), ParamType::Class(ClassId::COLLECTION)) => {
            Some(ArgMatch::coerced(COERCION + 1, Coercion::ToList))
        }

        (Value::Closure(closure), ParamType::Callback { interface, arity }) => {
            let mismatch = if closure.accepts(arity as usize) { 0 } else { 3 };
            Some(ArgMatch::coerced(
                COERCION + mismatch,
                Coercion::ToCallback { interface, arity },
            ))
        }

        _ => hierarchy(lookup, arg.class_id(), param.class_id()).map(ArgMatch::exact),
    }
}

/// Null fits any reference parameter. Deeper parameter types cost more, so
/// the most general overload wins for a null argument.
fn match_null(lookup: &dyn MetaObjectLookup, param: ParamType) -> Option<ArgMatch> {
    match param {
        ParamType::Primitive(_) => None,
        ParamType::Any => Some(ArgMatch::exact(1)),
        other => {
            let depth = lookup
                .superclass_distance(other.class_id(), ClassId::OBJECT)
                .unwrap_or(1);
            Some(ArgMatch::exact(2 * u64::from(depth) + 1))
        }
    }
}

/// Numeric arguments prefer their own box, then their primitive, then
/// wider numeric types, then `Number`, then `Object`.
fn match_number(lookup: &dyn MetaObjectLookup, arg: &Value, param: ParamType) -> Option<ArgMatch> {
    use ParamType::{Class, Primitive as Prim};

    let matched = match (arg, param) {
        (Value::Int(_), Class(ClassId::INT)) => ArgMatch::exact(0),
        (Value::Int(_), Prim(Primitive::Int)) => ArgMatch::exact(1),
        (Value::Int(_), Class(ClassId::LONG)) => ArgMatch::coerced(2, Coercion::ToLong),
        (Value::Int(_), Prim(Primitive::Long)) => ArgMatch::coerced(3, Coercion::ToLong),
        (Value::Int(_), Class(ClassId::DOUBLE)) => ArgMatch::coerced(4, Coercion::ToDouble),
        (Value::Int(_), Prim(Primitive::Double)) => ArgMatch::coerced(5, Coercion::ToDouble),

        (Value::Long(_), Class(ClassId::LONG)) => ArgMatch::exact(0),
        (Value::Long(_), Prim(Primitive::Long)) => ArgMatch::exact(1),
        (Value::Long(_), Class(ClassId::DOUBLE)) => ArgMatch::coerced(2, Coercion::ToDouble),
        (Value::Long(_), Prim(Primitive::Double)) => ArgMatch::coerced(3, Coercion::ToDouble),
        // Narrowing is a coercion that can fail at invocation.
        (Value::Long(_), Class(ClassId::INT) | Prim(Primitive::Int)) => {
            ArgMatch::coerced(COERCION, Coercion::ToInt)
        }

        (Value::Double(_), Class(ClassId::DOUBLE)) => ArgMatch::exact(0),
        (Value::Double(_), Prim(Primitive::Double)) => ArgMatch::exact(1),

        (_, Class(ClassId::NUMBER)) => ArgMatch::exact(6),
        (_, ParamType::Any | Class(ClassId::OBJECT)) => ArgMatch::exact(7),
        (_, Prim(_)) => return None,
        (_, other) => {
            return hierarchy(lookup, arg.class_id(), other.class_id()).map(ArgMatch::exact);
        }
    };
    Some(matched)
}

/// Superclass distance scaled to the object band.
#[inline]
fn hierarchy(lookup: &dyn MetaObjectLookup, class: ClassId, ancestor: ClassId) -> Option<u64> {
    lookup
        .superclass_distance(class, ancestor)
        .map(|steps| u64::from(steps) * OBJECT_STEP)
}

/// Vararg shape penalty for a case rank.
#[inline]
const fn vararg_penalty(rank: u64) -> u64 {
    rank << VARARG_SHIFT
}

// =============================================================================
// Candidate Scoring
// =============================================================================

/// Total distance of calling `method` with `args`, and the adaptation the
/// call needs. `None` if the method is not applicable.
pub fn score(
    lookup: &dyn MetaObjectLookup,
    method: &MetaMethod,
    args: &[Value],
) -> Option<(u64, Adaptation)> {
    let params = method.params();

    if method.is_varargs() {
        return score_varargs(lookup, method, args);
    }

    if args.is_empty() && params.len() == 1 && !params[0].is_primitive() {
        let mut adaptation = Adaptation::none();
        adaptation.push(AdaptStep::PadNull);
        return Some((NULL_PADDING, adaptation));
    }

    if args.len() != params.len() {
        return None;
    }

    let mut adaptation = Adaptation::none();
    let total = score_fixed(lookup, params, args, &mut adaptation)?;
    Some((total, adaptation))
}

/// Score positional arguments against positional parameters, recording
/// coercions.
fn score_fixed(
    lookup: &dyn MetaObjectLookup,
    params: &[ParamType],
    args: &[Value],
    adaptation: &mut Adaptation,
) -> Option<u64> {
    let mut total = 0u64;
    for (index, (arg, param)) in args.iter().zip(params).enumerate() {
        let matched = match_arg(lookup, arg, *param)?;
        if let Some(coercion) = matched.coercion {
            adaptation.push(AdaptStep::Coerce { index, coercion });
        }
        total += matched.distance;
    }
    Some(total)
}

/// Vararg element parameter type.
#[inline]
fn element_param(element: ClassId) -> ParamType {
    if element == ClassId::OBJECT {
        ParamType::Any
    } else {
        ParamType::Class(element)
    }
}

/// Collected elements must match the element type without coercion.
fn score_elements(lookup: &dyn MetaObjectLookup, element: ClassId, args: &[Value]) -> Option<u64> {
    let param = element_param(element);
    let mut total = 0u64;
    for arg in args {
        let matched = match_arg(lookup, arg, param)?;
        if matched.coercion.is_some() {
            return None;
        }
        total += matched.distance;
    }
    Some(total)
}

/// Score a vararg method. With `n` parameters and `a` arguments:
///
/// - C: `a == n` and the last argument is already an array (or null): passed
///   through untouched.
/// - A: `a == n - 1`: an empty array is appended.
/// - D: `a == n` and the last argument is a single element: wrapped.
/// - B: `a > n`: trailing arguments collected.
fn score_varargs(
    lookup: &dyn MetaObjectLookup,
    method: &MetaMethod,
    args: &[Value],
) -> Option<(u64, Adaptation)> {
    let params = method.params();
    let element = method.vararg_element()?;
    let fixed = params.len() - 1;
    if args.len() < fixed {
        return None;
    }

    let mut adaptation = Adaptation::none();
    let mut coercions = Adaptation::none();
    let mut total = score_fixed(lookup, &params[..fixed], &args[..fixed], &mut coercions)?;

    match args.len() - fixed {
        0 => {
            adaptation.push(AdaptStep::AppendEmptyVarargs { element });
            total += vararg_penalty(1);
        }
        1 if args[fixed].is_null() => {
            total += 1;
        }
        1 if args[fixed].is_array() => {
            total += match_arg(lookup, &args[fixed], params[fixed])?.distance;
        }
        1 => {
            total += score_elements(lookup, element, &args[fixed..])?;
            adaptation.push(AdaptStep::CollectVarargs {
                from: fixed,
                element,
            });
            total += vararg_penalty(2);
        }
        extra => {
            total += score_elements(lookup, element, &args[fixed..])?;
            adaptation.push(AdaptStep::CollectVarargs {
                from: fixed,
                element,
            });
            total += vararg_penalty(1 + extra as u64);
        }
    }

    // Length correction runs before coercion; fixed positions are unaffected.
    adaptation.extend(coercions);
    Some((total, adaptation))
}
