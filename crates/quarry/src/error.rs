use crate::continuation::ContinuationDecodeError;
use std::fmt;
use thiserror::Error as ThisError;

///
/// GroupingError
///
/// Structured runtime error with a stable internal classification.
/// Unsupported constructs are caller mistakes and surface as query errors;
/// invariant violations are programmer errors and are never retried.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct GroupingError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl GroupingError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct a request-origin unsupported-construct error.
    pub(crate) fn unsupported_request(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Request, message)
    }

    /// Construct a transform-origin invariant violation.
    pub(crate) fn transform_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Transform,
            message,
        )
    }

    /// Construct a result-origin invariant violation.
    pub(crate) fn result_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Result,
            message,
        )
    }

    /// Construct an executor-origin backend failure.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Backend, ErrorOrigin::Executor, message)
    }

    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self.class, ErrorClass::Unsupported)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<ContinuationDecodeError> for GroupingError {
    fn from(err: ContinuationDecodeError) -> Self {
        Self::new(
            ErrorClass::MalformedContinuation,
            ErrorOrigin::Continuation,
            err.to_string(),
        )
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Unsupported,
    InvariantViolation,
    MalformedContinuation,
    Backend,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
            Self::MalformedContinuation => "malformed_continuation",
            Self::Backend => "backend",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Request,
    Transform,
    Continuation,
    Executor,
    Result,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Request => "request",
            Self::Transform => "transform",
            Self::Continuation => "continuation",
            Self::Executor => "executor",
            Self::Result => "result",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{ErrorClass, ErrorOrigin, GroupingError};
    use crate::continuation::ContinuationDecodeError;

    #[test]
    fn display_with_class_includes_origin_and_class() {
        let err = GroupingError::unsupported_request("duplicate label 'x'");
        assert_eq!(
            err.display_with_class(),
            "request:unsupported: duplicate label 'x'"
        );
        assert!(err.is_unsupported());
    }

    #[test]
    fn decode_errors_map_to_malformed_continuation() {
        let err = GroupingError::from(ContinuationDecodeError::Empty);
        assert_eq!(err.class, ErrorClass::MalformedContinuation);
        assert_eq!(err.origin, ErrorOrigin::Continuation);
    }
}
