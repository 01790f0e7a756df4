//! Argument adaptation.
//!
//! The steps that turn the arguments of a call into the exact argument list
//! a selected callable expects. Length corrections (null padding, vararg
//! collection) come first, then per-position coercions.

use crate::resolver::coerce::Coercion;
use smallvec::SmallVec;
use switchyard_core::{ClassId, MetaMethod, RuntimeError, Value};

/// Inline capacity of an adapted argument list.
pub type AdaptedArgs = SmallVec<[Value; 4]>;

/// One adaptation step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdaptStep {
    /// Supply a single missing argument as null.
    PadNull,
    /// Append an empty vararg array.
    AppendEmptyVarargs { element: ClassId },
    /// Collect arguments from `from` onward into one array.
    CollectVarargs { from: usize, element: ClassId },
    /// Convert the argument at `index`.
    Coerce { index: usize, coercion: Coercion },
}

/// Ordered adaptation applied before every invocation of a target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Adaptation {
    steps: SmallVec<[AdaptStep; 2]>,
}

impl Adaptation {
    /// Arguments are passed as-is.
    #[inline]
    pub fn none() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[inline]
    pub fn steps(&self) -> &[AdaptStep] {
        &self.steps
    }

    pub(crate) fn push(&mut self, step: AdaptStep) {
        self.steps.push(step);
    }

    pub(crate) fn extend(&mut self, other: Adaptation) {
        self.steps.extend(other.steps);
    }

    /// Build the argument list for `callable`.
    pub fn apply(&self, callable: &MetaMethod, args: &[Value]) -> Result<AdaptedArgs, RuntimeError> {
        let mut out: AdaptedArgs = args.iter().cloned().collect();
        for step in &self.steps {
            match *step {
                AdaptStep::PadNull => out.push(Value::Null),
                AdaptStep::AppendEmptyVarargs { element } => {
                    out.push(Value::array(element, []));
                }
                AdaptStep::CollectVarargs { from, element } => {
                    if from > out.len() {
                        return Err(RuntimeError::internal(format!(
                            "vararg collection from {from} exceeds {} arguments of {}",
                            out.len(),
                            callable.signature()
                        )));
                    }
                    let tail: Vec<Value> = out.drain(from..).collect();
                    out.push(Value::array(element, tail));
                }
                AdaptStep::Coerce { index, coercion } => {
                    let Some(slot) = out.get_mut(index) else {
                        return Err(RuntimeError::internal(format!(
                            "coercion of argument {index} exceeds arguments of {}",
                            callable.signature()
                        )));
                    };
                    *slot = coercion.apply(slot).map_err(|found| RuntimeError::Adaptation {
                        callable: callable.signature(),
                        index,
                        expected: coercion.target_name(),
                        found,
                    })?;
                }
            }
        }
        Ok(out)
    }
}
