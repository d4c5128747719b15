//! Execution tracing boundary.
//!
//! Tracing is optional, injected by the caller, and must not affect
//! execution semantics.

///
/// ExecutionTraceSink
///

pub trait ExecutionTraceSink: Send + Sync {
    fn on_event(&self, event: ExecutionTraceEvent);
}

///
/// ExecutionTraceEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecutionTraceEvent {
    /// One backend round trip is about to be issued.
    PassStarted { pass: usize, groupings: usize },
    /// One backend round trip finished and its partials were merged.
    PassFinished { pass: usize, corrected: usize },
    /// A partial result arrived for an id the running map does not know;
    /// its data was dropped. Tolerated (superseded sessions race here).
    StrayGroupingResult { pass: usize, id: u32 },
    /// A pass produced no partial for a known id. Tolerated.
    MissingGroupingResult { pass: usize, id: u32 },
}

///
/// NullTraceSink
///
/// Default sink when the caller injects nothing.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NullTraceSink;

impl ExecutionTraceSink for NullTraceSink {
    fn on_event(&self, _event: ExecutionTraceEvent) {}
}

///
/// TESTS
///
