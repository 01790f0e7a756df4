//! Runtime errors.
//!
//! Every failure a dispatch can produce falls into one of four categories:
//!
//! - **Resolution**: no callable matched the name and argument shapes.
//! - **Adaptation**: a callable was selected but an argument could not be
//!   converted to its declared parameter type.
//! - **Language**: the callable itself raised an exception.
//! - **Internal**: an engine invariant was broken. Fatal.
//!
//! Callables may wrap the exception they raise in [`RuntimeError::Invocation`]
//! when it crosses a reflective boundary. The engine strips that wrapper
//! before the error reaches the caller.

use crate::value::Value;
use std::sync::Arc;
use thiserror::Error;

/// Result type for dispatch and callables.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Error raised by dispatch or by an invoked callable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("no signature of method {class}.{name}() is applicable for argument types: ({arg_types})")]
    MissingMethod {
        class: Arc<str>,
        name: Arc<str>,
        arg_types: String,
    },

    #[error("could not find matching constructor for: {class}({arg_types})")]
    MissingConstructor { class: Arc<str>, arg_types: String },

    #[error("no such property: {name} for class: {class}")]
    MissingProperty { class: Arc<str>, name: Arc<str> },

    #[error("cannot adapt argument {index} of {callable}: {found} is not convertible to {expected}")]
    Adaptation {
        callable: String,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("cannot cast object of class '{found}' to class '{expected}'")]
    Cast { expected: String, found: String },

    #[error("{class}: {message}")]
    Raised { class: Arc<str>, message: Arc<str> },

    #[error("invocation failed: {0}")]
    Invocation(Box<RuntimeError>),

    #[error("internal dispatch error: {0}")]
    Internal(String),
}

/// Broad classification of a [`RuntimeError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Resolution,
    Adaptation,
    Language,
    Internal,
}

impl RuntimeError {
    /// Build a missing-method error from the observed arguments.
    pub fn missing_method(class: impl Into<Arc<str>>, name: &str, args: &[Value]) -> Self {
        RuntimeError::MissingMethod {
            class: class.into(),
            name: Arc::from(name),
            arg_types: describe_args(args),
        }
    }

    /// Language-level exception.
    pub fn raised(class: impl Into<Arc<str>>, message: impl Into<Arc<str>>) -> Self {
        RuntimeError::Raised {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Wrap an error raised across a reflective boundary.
    pub fn wrap_invocation(self) -> Self {
        RuntimeError::Invocation(Box::new(self))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RuntimeError::Internal(message.into())
    }

    /// Strip every layer of invocation wrapping.
    pub fn unwrap_invocation(self) -> Self {
        let mut error = self;
        while let RuntimeError::Invocation(inner) = error {
            error = *inner;
        }
        error
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RuntimeError::MissingMethod { .. }
            | RuntimeError::MissingConstructor { .. }
            | RuntimeError::MissingProperty { .. } => ErrorCategory::Resolution,
            RuntimeError::Adaptation { .. } | RuntimeError::Cast { .. } => ErrorCategory::Adaptation,
            RuntimeError::Raised { .. } => ErrorCategory::Language,
            RuntimeError::Invocation(inner) => inner.category(),
            RuntimeError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the error signals a broken engine invariant.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Internal
    }
}

/// Comma-separated runtime class names of `args`.
pub fn describe_args(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if arg.is_null() {
            out.push_str("null");
        } else {
            out.push_str(&arg.class_id().to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_invocation_strips_all_layers() {
        let inner = RuntimeError::raised("IllegalStateException", "boom");
        let wrapped = inner.clone().wrap_invocation().wrap_invocation();
        assert_eq!(wrapped.category(), ErrorCategory::Language);
        assert_eq!(wrapped.unwrap_invocation(), inner);
    }

    #[test]
    fn test_categories() {
        let missing = RuntimeError::missing_method("Foo", "bar", &[Value::Int(1)]);
        assert_eq!(missing.category(), ErrorCategory::Resolution);
        assert!(!missing.is_fatal());

        let cast = RuntimeError::Cast {
            expected: "int".into(),
            found: "null".into(),
        };
        assert_eq!(cast.category(), ErrorCategory::Adaptation);

        assert!(RuntimeError::internal("bad").is_fatal());
    }

    #[test]
    fn test_describe_args() {
        let args = [Value::Int(1), Value::Null, Value::str("s")];
        assert_eq!(describe_args(&args), "Integer, null, String");
    }

    #[test]
    fn test_missing_method_message() {
        let err = RuntimeError::missing_method("Foo", "bar", &[Value::Long(1)]);
        assert_eq!(
            err.to_string(),
            "no signature of method Foo.bar() is applicable for argument types: (Long)"
        );
    }
}
