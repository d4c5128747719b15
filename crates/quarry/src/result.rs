//! Result-tree construction. Merges the accumulated per-id grouping results
//! into one caller-facing tree, applies pagination windows, and emits the
//! continuation tokens for this page and its neighbours.

use crate::{
    continuation::{CompositeContinuation, Continuation, FLAG_UNSTABLE, OffsetContinuation, ResultId},
    error::GroupingError,
    request::{AggregateValue, Aggregator, AggregatorNode, BackendHit, Group, Grouping},
    transform::GroupingTransform,
    value::Value,
};
use serde::Serialize;
use std::collections::BTreeMap;

const PREV_PAGE: &str = "prev";
const NEXT_PAGE: &str = "next";

///
/// HitConverter
///
/// Boundary for summary/field filling. The core moves hits through
/// unchanged; callers inject a converter that resolves summary classes.
///

pub trait HitConverter {
    fn convert(
        &self,
        summary_class: Option<&str>,
        hit: BackendHit,
    ) -> Result<ResultHit, GroupingError>;
}

///
/// RawHitConverter
///
/// Pass-through converter: backend fields become result fields verbatim.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct RawHitConverter;

impl HitConverter for RawHitConverter {
    fn convert(
        &self,
        _summary_class: Option<&str>,
        hit: BackendHit,
    ) -> Result<ResultHit, GroupingError> {
        Ok(ResultHit {
            id: hit.id,
            relevance: hit.relevance,
            fields: hit.fields,
        })
    }
}

///
/// ResultHit
///

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultHit {
    pub id: String,
    pub relevance: f64,
    pub fields: BTreeMap<String, Value>,
}

///
/// RootGroup
///
/// The top of the caller-facing tree: aggregate fields of the whole request
/// plus its named group lists and hit lists.
///

#[derive(Clone, Debug, Serialize)]
pub struct RootGroup {
    pub id: ResultId,
    pub fields: BTreeMap<String, Value>,
    pub lists: Vec<GroupList>,
    pub hit_lists: Vec<HitList>,
}

///
/// GroupList
///

#[derive(Clone, Debug, Serialize)]
pub struct GroupList {
    pub label: String,
    pub id: ResultId,
    pub continuations: BTreeMap<String, Continuation>,
    pub groups: Vec<ResultGroup>,
}

///
/// ResultGroup
///

#[derive(Clone, Debug, Serialize)]
pub struct ResultGroup {
    pub id: ResultId,
    pub value: Value,
    pub fields: BTreeMap<String, Value>,
    pub lists: Vec<GroupList>,
    pub hit_lists: Vec<HitList>,
}

///
/// HitList
///

#[derive(Clone, Debug, Serialize)]
pub struct HitList {
    pub label: String,
    pub id: ResultId,
    pub continuations: BTreeMap<String, Continuation>,
    pub hits: Vec<ResultHit>,
}

///
/// BuiltResult
///
/// The finished page plus the composite token that reproduces it verbatim.
///

#[derive(Clone, Debug, Serialize)]
pub struct BuiltResult {
    pub root: RootGroup,
    pub continuation: CompositeContinuation,
}

// Intermediate merge structures. Deduplication key at every depth is the
// group's value, never backend identity; positions follow first occurrence.

#[derive(Default)]
struct GroupListAccumulator {
    groups: Vec<GroupAccumulator>,
}

impl GroupListAccumulator {
    fn feed(&mut self, group: &Group) {
        match self
            .groups
            .iter_mut()
            .find(|existing| &existing.value == group.value())
        {
            Some(existing) => existing.absorb(group),
            None => self.groups.push(GroupAccumulator::seeded(group)),
        }
    }
}

struct GroupAccumulator {
    value: Value,
    aggregators: Vec<Aggregator>,
    child_lists: BTreeMap<i32, GroupListAccumulator>,
}

impl GroupAccumulator {
    fn seeded(group: &Group) -> Self {
        let mut acc = Self {
            value: group.value().clone(),
            aggregators: Vec::new(),
            child_lists: BTreeMap::new(),
        };
        acc.absorb(group);
        acc
    }

    fn absorb(&mut self, group: &Group) {
        for aggregator in group.aggregators() {
            match self
                .aggregators
                .iter_mut()
                .find(|existing| existing.tag() == aggregator.tag())
            {
                Some(existing) => {
                    if existing.value().is_none() {
                        if let Some(value) = aggregator.value() {
                            existing.set_value(value.clone());
                        }
                    }
                }
                None => self.aggregators.push(aggregator.clone()),
            }
        }

        for child in group.children() {
            self.child_lists
                .entry(child.tag())
                .or_default()
                .feed(child);
        }
    }
}

enum ChildContent {
    Groups(GroupListAccumulator),
    Hits {
        summary_class: Option<String>,
        hits: Vec<BackendHit>,
    },
}

///
/// ResultBuilder
///

pub struct ResultBuilder<'a, C> {
    transform: &'a GroupingTransform,
    converter: &'a C,
}

impl<'a, C: HitConverter> ResultBuilder<'a, C> {
    pub const fn new(transform: &'a GroupingTransform, converter: &'a C) -> Self {
        Self {
            transform,
            converter,
        }
    }

    /// Merge the per-id grouping results into the caller-facing tree. The
    /// merged forest must resolve to exactly one root group.
    pub fn build(
        &self,
        results: &BTreeMap<u32, Grouping>,
    ) -> Result<BuiltResult, GroupingError> {
        let mut top = GroupListAccumulator::default();
        for grouping in results.values() {
            // Root null markers vary per backend; normalize before keying.
            let mut root = grouping.root().clone();
            root.set_value(Value::Null);
            top.feed(&root);
        }

        if top.groups.len() != 1 {
            return Err(GroupingError::result_invariant(format!(
                "result tree must resolve to exactly one root group, found {}",
                top.groups.len()
            )));
        }
        let root_acc = top.groups.remove(0);

        let mut continuation = CompositeContinuation::new();
        let root_id = self.transform.root_id().clone();
        let (fields, lists, hit_lists) =
            self.materialize_group(root_acc, &root_id, &mut continuation)?;

        Ok(BuiltResult {
            root: RootGroup {
                id: root_id,
                fields,
                lists,
                hit_lists,
            },
            continuation,
        })
    }

    #[expect(clippy::type_complexity)]
    fn materialize_group(
        &self,
        acc: GroupAccumulator,
        id: &ResultId,
        out: &mut CompositeContinuation,
    ) -> Result<(BTreeMap<String, Value>, Vec<GroupList>, Vec<HitList>), GroupingError> {
        let mut fields = BTreeMap::new();
        let mut children: Vec<(i32, ChildContent)> = acc
            .child_lists
            .into_iter()
            .map(|(tag, list)| (tag, ChildContent::Groups(list)))
            .collect();

        for aggregator in &acc.aggregators {
            let tag = aggregator.tag();
            match aggregator.node() {
                AggregatorNode::Hits { summary_class, .. } => {
                    let hits = match aggregator.value() {
                        Some(AggregateValue::Hits(hits)) => hits.clone(),
                        _ => Vec::new(),
                    };
                    children.push((
                        tag,
                        ChildContent::Hits {
                            summary_class: summary_class.clone(),
                            hits,
                        },
                    ));
                }
                _ => {
                    if let Some(value) = self.render_scalar(aggregator, &children) {
                        fields.insert(self.label_for(tag), value);
                    }
                }
            }
        }

        children.sort_by_key(|(tag, _)| *tag);

        let mut lists = Vec::new();
        let mut hit_lists = Vec::new();
        for (ordinal, (tag, content)) in children.into_iter().enumerate() {
            let child_id = id.child(u32::try_from(ordinal).unwrap_or(u32::MAX));
            match content {
                ChildContent::Groups(list) => {
                    lists.push(self.materialize_list(tag, list, child_id, out)?);
                }
                ChildContent::Hits {
                    summary_class,
                    hits,
                } => {
                    hit_lists.push(self.materialize_hits(
                        tag,
                        summary_class.as_deref(),
                        hits,
                        child_id,
                        out,
                    )?);
                }
            }
        }

        Ok((fields, lists, hit_lists))
    }

    fn materialize_list(
        &self,
        tag: i32,
        mut list: GroupListAccumulator,
        id: ResultId,
        out: &mut CompositeContinuation,
    ) -> Result<GroupList, GroupingError> {
        let (first, last, continuations) = self.paginate(&id, tag, list.groups.len(), out);

        let mut groups = Vec::with_capacity(last - first);
        for (position, acc) in list.groups.drain(..).enumerate().take(last).skip(first) {
            // Positions are absolute within the merged list, so a group
            // keeps its address when the page window moves.
            let group_id = id.child(u32::try_from(position).unwrap_or(u32::MAX));
            let value = acc.value.clone();
            let (fields, lists, hit_lists) =
                self.materialize_group(acc, &group_id, out)?;
            groups.push(ResultGroup {
                id: group_id,
                value,
                fields,
                lists,
                hit_lists,
            });
        }

        Ok(GroupList {
            label: self.label_for(tag),
            id,
            continuations,
            groups,
        })
    }

    fn materialize_hits(
        &self,
        tag: i32,
        summary_class: Option<&str>,
        hits: Vec<BackendHit>,
        id: ResultId,
        out: &mut CompositeContinuation,
    ) -> Result<HitList, GroupingError> {
        let (first, last, continuations) = self.paginate(&id, tag, hits.len(), out);

        let mut converted = Vec::with_capacity(last - first);
        for hit in hits.into_iter().take(last).skip(first) {
            converted.push(self.converter.convert(summary_class, hit)?);
        }

        Ok(HitList {
            label: self.label_for(tag),
            id,
            continuations,
            hits: converted,
        })
    }

    /// Compute one list's page window and emit its continuations: the
    /// same-page token goes into the outgoing composite, the neighbour
    /// tokens are named on the list itself.
    fn paginate(
        &self,
        id: &ResultId,
        tag: i32,
        len: usize,
        out: &mut CompositeContinuation,
    ) -> (usize, usize, BTreeMap<String, Continuation>) {
        let mut named = BTreeMap::new();

        let Some(max) = self.transform.max(tag).filter(|max| *max > 0) else {
            return (0, len, named);
        };
        let max = usize::try_from(max).unwrap_or(usize::MAX);

        // Carried-in offsets are authoritative only while the position is
        // stable; an unstable window restarts at the beginning.
        let stable = self.transform.is_stable(id);
        let first = if stable {
            usize::try_from(self.transform.offset_for_id(id)).unwrap_or(usize::MAX)
        } else {
            0
        }
        .min(len);
        let last = len.min(first.saturating_add(max));

        let flags = |unstable: bool| if unstable { FLAG_UNSTABLE } else { 0 };

        if first > 0 {
            out.push(OffsetContinuation::new(
                id.clone(),
                tag,
                saturate(first),
                flags(!stable),
            ));
            named.insert(
                PREV_PAGE.to_string(),
                Continuation::Offset(OffsetContinuation::new(
                    id.clone(),
                    tag,
                    saturate(first.saturating_sub(max)),
                    FLAG_UNSTABLE,
                )),
            );
        }
        if last < len {
            named.insert(
                NEXT_PAGE.to_string(),
                Continuation::Offset(OffsetContinuation::new(
                    id.clone(),
                    tag,
                    saturate(last),
                    FLAG_UNSTABLE,
                )),
            );
        }

        (first, last, named)
    }

    fn render_scalar(
        &self,
        aggregator: &Aggregator,
        children: &[(i32, ChildContent)],
    ) -> Option<Value> {
        match aggregator.value()? {
            AggregateValue::Count(count) => {
                Some(Value::Long(i64::try_from(*count).unwrap_or(i64::MAX)))
            }
            AggregateValue::Metric(value) => Some(value.clone()),
            AggregateValue::Estimate(estimate) => Some(Value::Long(self.corrected_estimate(
                aggregator.tag(),
                *estimate,
                children,
            ))),
            AggregateValue::Hits(_) => None,
        }
    }

    /// Prefer the observed distinct count over the estimator whenever it is
    /// known complete: non-zero and within the declared page size (meaning
    /// the fetch window was not truncated). Only the list the estimator was
    /// compiled against counts; sibling lists say nothing about it.
    fn corrected_estimate(
        &self,
        estimator_tag: i32,
        estimate: u64,
        children: &[(i32, ChildContent)],
    ) -> i64 {
        let observed = self
            .transform
            .estimator_target(estimator_tag)
            .and_then(|list_tag| {
                children.iter().find_map(|(tag, content)| match content {
                    ChildContent::Groups(list) if *tag == list_tag => self
                        .transform
                        .max(list_tag)
                        .map(|max| (list.groups.len() as u64, max)),
                    _ => None,
                })
            });

        let value = match observed {
            Some((count, max)) if count > 0 && count <= max => count,
            _ => estimate,
        };
        i64::try_from(value).unwrap_or(i64::MAX)
    }

    fn label_for(&self, tag: i32) -> String {
        self.transform
            .label(tag)
            .map_or_else(|| format!("tag{tag}"), str::to_string)
    }
}

fn saturate(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

///
/// TESTS
///
