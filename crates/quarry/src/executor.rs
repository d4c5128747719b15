//! Multi-pass execution driver. Later passes depend on group identities
//! discovered by earlier ones, so passes run strictly sequentially; the pass
//! count is pre-computed from the compiled groupings and never data-driven.

use crate::{
    error::{ErrorClass, ErrorOrigin, GroupingError},
    request::Grouping,
    trace::{ExecutionTraceEvent, ExecutionTraceSink},
};
use std::collections::BTreeMap;

///
/// GroupingBackend
///
/// The remote search call. One invocation per pass; the attached groupings
/// say which levels to compute. Everything about ranking, fetching, and
/// shard fan-out lives behind this trait.
///

pub trait GroupingBackend {
    type Query: Clone;

    fn search(
        &mut self,
        query: Self::Query,
        groupings: &[Grouping],
    ) -> Result<GroupingListResult, GroupingError>;
}

///
/// GroupingListResult
///
/// The grouping payload of one backend response: zero or more partial
/// `Grouping` trees identified by id.
///

#[derive(Clone, Debug, Default)]
pub struct GroupingListResult {
    groupings: Vec<Grouping>,
}

impl GroupingListResult {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            groupings: Vec::new(),
        }
    }

    pub fn push(&mut self, grouping: Grouping) {
        self.groupings.push(grouping);
    }

    #[must_use]
    pub fn groupings(&self) -> &[Grouping] {
        &self.groupings
    }
}

impl FromIterator<Grouping> for GroupingListResult {
    fn from_iter<I: IntoIterator<Item = Grouping>>(iter: I) -> Self {
        Self {
            groupings: iter.into_iter().collect(),
        }
    }
}

///
/// GroupingExecutor
///

pub struct GroupingExecutor<'a, B> {
    backend: &'a mut B,
    trace: &'a dyn ExecutionTraceSink,
}

impl<'a, B: GroupingBackend> GroupingExecutor<'a, B> {
    pub fn new(backend: &'a mut B, trace: &'a dyn ExecutionTraceSink) -> Self {
        Self { backend, trace }
    }

    /// Run the whole pass sequence for one query and return the accumulated
    /// per-id grouping results.
    ///
    /// Exactly `last_pass + 1` rounds are executed, where `last_pass` is the
    /// largest level count among the groupings that are not single-pass.
    /// A failed backend call aborts the sequence; no partial page survives.
    pub fn execute(
        &mut self,
        query: B::Query,
        groupings: &[Grouping],
    ) -> Result<BTreeMap<u32, Grouping>, GroupingError> {
        let last_pass = groupings
            .iter()
            .filter(|grouping| !grouping.is_single_pass())
            .map(Grouping::level_count)
            .max()
            .unwrap_or(0);

        // Items and filters do not change between passes, so later passes
        // reuse a clone of the original query tree. A single-pass sequence
        // moves the query straight through without cloning.
        let mut original = Some(query);
        let mut template: Option<B::Query> = None;

        let mut running: BTreeMap<u32, Grouping> = BTreeMap::new();

        for pass in 0..=last_pass {
            let participants = Self::participants(groupings, pass);
            if participants.is_empty() {
                continue;
            }

            self.trace.on_event(ExecutionTraceEvent::PassStarted {
                pass,
                groupings: participants.len(),
            });

            let pass_query = match original.take() {
                Some(query) => {
                    if pass < last_pass {
                        template = Some(query.clone());
                    }
                    query
                }
                None => {
                    let reused = if pass == last_pass {
                        template.take()
                    } else {
                        template.clone()
                    };
                    reused.ok_or_else(|| {
                        GroupingError::new(
                            ErrorClass::InvariantViolation,
                            ErrorOrigin::Executor,
                            "pass query template missing after the first round",
                        )
                    })?
                }
            };
            let result = self.backend.search(pass_query, &participants)?;

            let merged_ids = self.merge_pass(pass, groupings, &result, &mut running);

            for grouping in &participants {
                if !merged_ids.contains(&grouping.id()) {
                    self.trace.on_event(ExecutionTraceEvent::MissingGroupingResult {
                        pass,
                        id: grouping.id(),
                    });
                }
            }

            let mut corrected = 0;
            for id in &merged_ids {
                if let Some(grouping) = running.get_mut(id) {
                    corrected += grouping.post_merge();
                }
            }
            self.trace
                .on_event(ExecutionTraceEvent::PassFinished { pass, corrected });
        }

        // A grouping the backend never answered for still gets an entry, so
        // the result tree shows its declared (empty) lists.
        for grouping in groupings {
            running
                .entry(grouping.id())
                .or_insert_with(|| grouping.clone());
        }

        Ok(running)
    }

    /// Select and range-restrict the groupings taking part in one pass.
    fn participants(groupings: &[Grouping], pass: usize) -> Vec<Grouping> {
        let mut selected = Vec::new();

        for grouping in groupings {
            if grouping.is_single_pass() {
                if pass == 0 {
                    let mut clone = grouping.clone();
                    clone.set_level_range(0, grouping.level_count());
                    selected.push(clone);
                }
            } else if pass <= grouping.level_count() {
                let mut clone = grouping.clone();
                clone.set_level_range(pass, pass);
                selected.push(clone);
            }
        }

        selected
    }

    /// Fold one backend response into the running map. Returns the ids that
    /// received data this pass.
    fn merge_pass(
        &self,
        pass: usize,
        requested: &[Grouping],
        result: &GroupingListResult,
        running: &mut BTreeMap<u32, Grouping>,
    ) -> Vec<u32> {
        let mut merged_ids = Vec::new();

        for partial in result.groupings() {
            if !requested.iter().any(|g| g.id() == partial.id()) {
                self.trace.on_event(ExecutionTraceEvent::StrayGroupingResult {
                    pass,
                    id: partial.id(),
                });
                continue;
            }

            let id = partial.id();
            let mut partial = partial.clone();
            partial.unify_null();

            match running.get_mut(&id) {
                Some(existing) => existing.merge(&partial),
                None => {
                    running.insert(id, partial);
                }
            }

            if !merged_ids.contains(&id) {
                merged_ids.push(id);
            }
        }

        merged_ids
    }
}

///
/// TESTS
///
