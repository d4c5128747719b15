//! Continuation tokens: opaque, reversibly-encoded pagination/resume state.
//!
//! Tokens are printable strings over a sixteen-symbol alphabet. Every
//! integer is zigzag-mapped and nibble-packed; see `codec`. Decoding is
//! strict and never panics on untrusted input.

pub(crate) mod codec;
mod offset;
mod result_id;

pub use codec::ContinuationDecodeError;
pub use offset::{CompositeContinuation, FLAG_UNSTABLE, OffsetContinuation};
pub use result_id::ResultId;

use serde::{Serialize, Serializer};
use std::fmt;

///
/// Continuation
///
/// Continuation is the caller-facing token shape: either one pagination
/// position or the composite bundle for a whole request. Callers treat the
/// encoded form as an uninterpreted string and echo it back verbatim.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Continuation {
    Offset(OffsetContinuation),
    Composite(CompositeContinuation),
}

impl Continuation {
    /// Parse a caller-supplied token. A single position decodes as
    /// `Offset`; anything longer decodes as `Composite`. Empty tokens are
    /// rejected here (only the composite entry point accepts emptiness).
    pub fn parse(token: &str) -> Result<Self, ContinuationDecodeError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ContinuationDecodeError::Empty);
        }

        let composite = CompositeContinuation::parse(token)?;
        match composite.children() {
            [only] => Ok(Self::Offset(only.clone())),
            _ => Ok(Self::Composite(composite)),
        }
    }

    /// Iterate the offset positions carried by this token.
    pub fn offsets(&self) -> impl Iterator<Item = &OffsetContinuation> {
        match self {
            Self::Offset(offset) => std::slice::from_ref(offset).iter(),
            Self::Composite(composite) => composite.children().iter(),
        }
    }
}

impl fmt::Display for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offset(offset) => write!(f, "{offset}"),
            Self::Composite(composite) => write!(f, "{composite}"),
        }
    }
}

impl Serialize for Continuation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{
        CompositeContinuation, Continuation, ContinuationDecodeError, FLAG_UNSTABLE,
        OffsetContinuation, ResultId,
    };

    #[test]
    fn single_position_tokens_parse_as_offset() {
        let offset = OffsetContinuation::new(ResultId::root().child(0).child(3), 7, 20, 0);
        let parsed = Continuation::parse(&offset.to_string()).expect("valid token");
        assert_eq!(parsed, Continuation::Offset(offset));
    }

    #[test]
    fn multi_position_tokens_parse_as_composite() {
        let composite: CompositeContinuation = [
            OffsetContinuation::new(ResultId::root().child(0), 1, 10, 0),
            OffsetContinuation::new(ResultId::root().child(0).child(0), 4, 5, FLAG_UNSTABLE),
        ]
        .into_iter()
        .collect();

        let parsed = Continuation::parse(&composite.to_string()).expect("valid token");
        assert_eq!(parsed, Continuation::Composite(composite));
    }

    #[test]
    fn empty_and_whitespace_tokens_are_rejected() {
        for token in ["", "  \n\t"] {
            let err = Continuation::parse(token).expect_err("empty token should fail");
            assert_eq!(err, ContinuationDecodeError::Empty);
        }
    }

    #[test]
    fn parse_round_trips_through_display() {
        let offset = OffsetContinuation::new(ResultId::root().child(2), -3, i32::MAX, 0);
        let token = Continuation::Offset(offset).to_string();
        let reparsed = Continuation::parse(&token).expect("valid token");
        assert_eq!(reparsed.to_string(), token);
    }
}
