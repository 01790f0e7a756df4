//! Numeric kernels.
//!
//! Typed kernels (`int_op`, `long_op`, `double_op`) back the primitive math
//! fast path. [`generic`] handles any mix of numeric operands by promoting
//! to the wider representation first (`Int < Long < Double`).
//!
//! Integer arithmetic wraps on overflow. Division always produces a
//! `Double`; only `Double / Double` has a typed kernel.

use crate::error::RuntimeError;
use crate::meta::MathOp;
use crate::value::Value;
use std::cmp::Ordering;

#[inline]
fn ordering_value(ordering: Option<Ordering>) -> Value {
    Value::Int(match ordering {
        Some(Ordering::Less) => -1,
        Some(Ordering::Greater) => 1,
        _ => 0,
    })
}

#[cold]
fn divide_by_zero() -> RuntimeError {
    RuntimeError::raised("ArithmeticException", "/ by zero")
}

/// `Int op Int`. `None` for operations without an int kernel.
#[inline]
pub fn int_op(op: MathOp, a: i32, b: i32) -> Option<Result<Value, RuntimeError>> {
    Some(Ok(match op {
        MathOp::Plus => Value::Int(a.wrapping_add(b)),
        MathOp::Minus => Value::Int(a.wrapping_sub(b)),
        MathOp::Multiply => Value::Int(a.wrapping_mul(b)),
        MathOp::Remainder => match a.checked_rem(b) {
            Some(r) => Value::Int(r),
            None if b == 0 => return Some(Err(divide_by_zero())),
            None => Value::Int(0),
        },
        MathOp::CompareTo => ordering_value(a.partial_cmp(&b)),
        MathOp::Next => Value::Int(a.wrapping_add(1)),
        MathOp::Previous => Value::Int(a.wrapping_sub(1)),
        MathOp::Div => return None,
    }))
}

/// `Long op Long`. `None` for operations without a long kernel.
#[inline]
pub fn long_op(op: MathOp, a: i64, b: i64) -> Option<Result<Value, RuntimeError>> {
    Some(Ok(match op {
        MathOp::Plus => Value::Long(a.wrapping_add(b)),
        MathOp::Minus => Value::Long(a.wrapping_sub(b)),
        MathOp::Multiply => Value::Long(a.wrapping_mul(b)),
        MathOp::Remainder => match a.checked_rem(b) {
            Some(r) => Value::Long(r),
            None if b == 0 => return Some(Err(divide_by_zero())),
            None => Value::Long(0),
        },
        MathOp::CompareTo => ordering_value(a.partial_cmp(&b)),
        MathOp::Next => Value::Long(a.wrapping_add(1)),
        MathOp::Previous => Value::Long(a.wrapping_sub(1)),
        MathOp::Div => return None,
    }))
}

/// `Double op Double`. Every operation has a double kernel.
#[inline]
pub fn double_op(op: MathOp, a: f64, b: f64) -> Value {
    match op {
        MathOp::Plus => Value::Double(a + b),
        MathOp::Minus => Value::Double(a - b),
        MathOp::Multiply => Value::Double(a * b),
        MathOp::Div => Value::Double(a / b),
        MathOp::Remainder => Value::Double(a % b),
        MathOp::CompareTo => ordering_value(a.partial_cmp(&b)),
        MathOp::Next => Value::Double(a + 1.0),
        MathOp::Previous => Value::Double(a - 1.0),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(f64::from(*i)),
        Value::Long(l) => Some(*l as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(i64::from(*i)),
        Value::Long(l) => Some(*l),
        _ => None,
    }
}

fn not_a_number(v: &Value) -> RuntimeError {
    RuntimeError::raised(
        "IllegalArgumentException",
        format!("cannot apply arithmetic to {}", v.class_id()),
    )
}

/// Arithmetic on any pair of numbers.
///
/// Unary operations ignore `arg`.
pub fn generic(op: MathOp, receiver: &Value, arg: Option<&Value>) -> Result<Value, RuntimeError> {
    let rhs = match (op.arity(), arg) {
        (0, _) => match receiver {
            Value::Double(_) => Value::Double(0.0),
            Value::Long(_) => Value::Long(0),
            _ => Value::Int(0),
        },
        (_, Some(arg)) => arg.clone(),
        (_, None) => return Err(RuntimeError::internal("binary arithmetic without operand")),
    };

    if op == MathOp::Div {
        let a = as_f64(receiver).ok_or_else(|| not_a_number(receiver))?;
        let b = as_f64(&rhs).ok_or_else(|| not_a_number(&rhs))?;
        return Ok(Value::Double(a / b));
    }

    match (receiver, &rhs) {
        (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b)
            .unwrap_or_else(|| Err(RuntimeError::internal("missing int kernel"))),
        (Value::Double(_), _) | (_, Value::Double(_)) => {
            let a = as_f64(receiver).ok_or_else(|| not_a_number(receiver))?;
            let b = as_f64(&rhs).ok_or_else(|| not_a_number(&rhs))?;
            Ok(double_op(op, a, b))
        }
        _ => {
            let a = as_i64(receiver).ok_or_else(|| not_a_number(receiver))?;
            let b = as_i64(&rhs).ok_or_else(|| not_a_number(&rhs))?;
            long_op(op, a, b).unwrap_or_else(|| Err(RuntimeError::internal("missing long kernel")))
        }
    }
}
