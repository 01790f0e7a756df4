//! Numeric fast path.
//!
//! Arithmetic methods on numbers can bypass method invocation when both
//! operands share a primitive kind. Only same-kind pairs qualify; mixed
//! operand types always take the generic method path.
//!
//! ```text
//!              Int      Long     Double
//!   Int        Int      -        -
//!   Long       -        Long     -
//!   Double     -        -        Double
//! ```

use switchyard_core::arith::{double_op, int_op, long_op};
use switchyard_core::{MathOp, RuntimeError, Value};

/// Operand kind of a primitive arithmetic kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumericKind {
    Int,
    Long,
    Double,
}

impl NumericKind {
    #[inline]
    fn of(value: &Value) -> Option<NumericKind> {
        match value {
            Value::Int(_) => Some(NumericKind::Int),
            Value::Long(_) => Some(NumericKind::Long),
            Value::Double(_) => Some(NumericKind::Double),
            _ => None,
        }
    }

    /// Shared kind of the operands of `op`, if they qualify for a kernel.
    pub fn widen(op: MathOp, receiver: &Value, args: &[Value]) -> Option<NumericKind> {
        if args.len() != op.arity() {
            return None;
        }
        let kind = Self::of(receiver)?;
        if let Some(arg) = args.first() {
            if Self::of(arg)? != kind {
                return None;
            }
        }
        kind.supports(op).then_some(kind)
    }

    /// Whether a kernel exists for `op`. Integer division yields a decimal
    /// result and therefore has no integer kernel.
    #[inline]
    pub fn supports(self, op: MathOp) -> bool {
        op != MathOp::Div || self == NumericKind::Double
    }

    /// Run the kernel.
    #[inline]
    pub fn apply(self, op: MathOp, receiver: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let unary = op.arity() == 0;
        let result = match (self, receiver, args) {
            (NumericKind::Int, Value::Int(a), []) if unary => int_op(op, *a, 0),
            (NumericKind::Int, Value::Int(a), [Value::Int(b)]) => int_op(op, *a, *b),
            (NumericKind::Long, Value::Long(a), []) if unary => long_op(op, *a, 0),
            (NumericKind::Long, Value::Long(a), [Value::Long(b)]) => long_op(op, *a, *b),
            (NumericKind::Double, Value::Double(a), []) if unary => {
                Some(Ok(double_op(op, *a, 0.0)))
            }
            (NumericKind::Double, Value::Double(a), [Value::Double(b)]) => {
                Some(Ok(double_op(op, *a, *b)))
            }
            _ => None,
        };
        result.unwrap_or_else(|| {
            Err(RuntimeError::internal(format!(
                "{self:?} kernel for {op:?} received {receiver:?} with {} operands",
                args.len()
            )))
        })
    }
}
