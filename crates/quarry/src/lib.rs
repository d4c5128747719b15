//! Core runtime for Quarry grouping: the request compiler, the multi-pass
//! execution driver, the result-tree builder, and the continuation codec
//! that makes grouped result pages addressable across round trips.

pub mod ast;
pub mod builder;
pub mod continuation;
pub mod error;
pub mod executor;
pub mod request;
pub mod result;
pub mod trace;
pub mod transform;
pub mod translate;
pub mod value;

///
/// CONSTANTS
///

/// Maximum grouping nesting depth accepted by the request compiler.
///
/// Level 0 is the root, level 1 a group list, level 2 a hit list; deeper
/// declarations are rejected before any backend work is issued.
pub const MAX_GROUPING_LEVELS: u32 = 2;

/// Extra rows requested beyond a declared page window.
///
/// The lookahead row lets the result builder decide whether a next page
/// exists without a second round trip.
pub const PAGE_LOOKAHEAD: u64 = 1;

/// Longest continuation token the decoder will look at.
///
/// Tokens are caller-supplied and untrusted, so decoding bails out before
/// touching anything longer than this.
pub const MAX_CONTINUATION_TOKEN_LEN: usize = 4 * 1024;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, executors, or codec internals are re-exported here.
///

pub mod prelude {
    pub use crate::{
        ast::{AggregationOp, Expression, GroupingOperation},
        continuation::{CompositeContinuation, Continuation, ResultId},
        request::Grouping,
        value::Value,
    };
}
