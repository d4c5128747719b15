//! Backend request/response model: the compiled `Grouping` trees attached to
//! an outgoing query, and the partial trees returned per pass. The same
//! shapes travel in both directions; responses come back with group children
//! and aggregate values filled in.

use crate::{ast::TimePart, value::Value};
use serde::Serialize;
use std::collections::BTreeMap;

///
/// ExpressionNode
///
/// Closed backend expression vocabulary. Produced exclusively by
/// `translate`; every request-language expression maps to exactly one node.
///

#[derive(Clone, Debug, PartialEq)]
pub enum ExpressionNode {
    Attribute { name: String },
    Constant(Value),
    Relevance,
    Now,
    Neg(Box<ExpressionNode>),
    Arith { op: ArithOp, lhs: Box<ExpressionNode>, rhs: Box<ExpressionNode> },
    Bit { op: BitOp, lhs: Box<ExpressionNode>, rhs: Box<ExpressionNode> },
    StrLen(Box<ExpressionNode>),
    StrCat(Vec<ExpressionNode>),
    Convert { to: ConvertKind, arg: Box<ExpressionNode> },
    Size(Box<ExpressionNode>),
    Reverse(Box<ExpressionNode>),
    Sort(Box<ExpressionNode>),
    TimePart { part: TimePart, arg: Box<ExpressionNode> },
    FixedWidth { arg: Box<ExpressionNode>, width: u64 },
    RangeBucket { arg: Box<ExpressionNode>, buckets: Vec<(Value, Value)> },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BitOp {
    And,
    Or,
    Xor,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConvertKind {
    ToString,
    ToLong,
    ToDouble,
    ToRaw,
}

///
/// MetricOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricOp {
    Sum,
    Avg,
    Min,
    Max,
    Xor,
    Stddev,
}

///
/// OrderDirection
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

///
/// HitOrderSpec
///

#[derive(Clone, Debug, PartialEq)]
pub struct HitOrderSpec {
    pub expr: ExpressionNode,
    pub direction: OrderDirection,
}

///
/// AggregatorNode
///
/// What to compute per group. `ExpressionCount` estimates the number of
/// distinct values a group-by expression takes; the builder injects it on
/// paged levels so totals can be estimated without an extra round trip.
///

#[derive(Clone, Debug, PartialEq)]
pub enum AggregatorNode {
    Count,
    Metric { op: MetricOp, expr: ExpressionNode },
    ExpressionCount { expr: ExpressionNode },
    Hits {
        summary_class: Option<String>,
        max_hits: Option<u64>,
        order_by: Vec<HitOrderSpec>,
    },
}

///
/// AggregateValue
///
/// The accumulated payload of one aggregator, filled in by the backend.
///

#[derive(Clone, Debug, PartialEq)]
pub enum AggregateValue {
    Count(u64),
    Metric(Value),
    Estimate(u64),
    Hits(Vec<BackendHit>),
}

///
/// Aggregator
///
/// One tagged aggregation slot. A populated value is authoritative: merging
/// never overwrites it (first-wins per tag), which keeps accumulation across
/// passes and shards exactly-once.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Aggregator {
    tag: i32,
    node: AggregatorNode,
    value: Option<AggregateValue>,
}

impl Aggregator {
    #[must_use]
    pub const fn new(tag: i32, node: AggregatorNode) -> Self {
        Self {
            tag,
            node,
            value: None,
        }
    }

    #[must_use]
    pub const fn with_value(tag: i32, node: AggregatorNode, value: AggregateValue) -> Self {
        Self {
            tag,
            node,
            value: Some(value),
        }
    }

    #[must_use]
    pub const fn tag(&self) -> i32 {
        self.tag
    }

    #[must_use]
    pub const fn node(&self) -> &AggregatorNode {
        &self.node
    }

    #[must_use]
    pub const fn value(&self) -> Option<&AggregateValue> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: AggregateValue) {
        self.value = Some(value);
    }

    fn merge_from(&mut self, other: &Self) {
        if self.value.is_none() {
            self.value.clone_from(&other.value);
        }
    }
}

///
/// Group
///
/// One node of a grouping tree: the group key value, the tag of the list it
/// belongs to, its aggregation slots, and its child groups (next level).
/// In a request, groups act as prototypes; in a response they carry data.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    value: Value,
    tag: i32,
    aggregators: Vec<Aggregator>,
    children: Vec<Group>,
}

impl Group {
    #[must_use]
    pub const fn new(value: Value, tag: i32) -> Self {
        Self {
            value,
            tag,
            aggregators: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    #[must_use]
    pub const fn tag(&self) -> i32 {
        self.tag
    }

    pub const fn set_tag(&mut self, tag: i32) {
        self.tag = tag;
    }

    #[must_use]
    pub fn aggregators(&self) -> &[Aggregator] {
        &self.aggregators
    }

    pub fn add_aggregator(&mut self, aggregator: Aggregator) {
        self.aggregators.push(aggregator);
    }

    #[must_use]
    pub fn children(&self) -> &[Group] {
        &self.children
    }

    pub fn add_child(&mut self, child: Group) {
        self.children.push(child);
    }

    fn aggregator_mut(&mut self, tag: i32) -> Option<&mut Aggregator> {
        self.aggregators.iter_mut().find(|agg| agg.tag == tag)
    }

    fn child_by_value_mut(&mut self, value: &Value) -> Option<&mut Group> {
        self.children.iter_mut().find(|child| &child.value == value)
    }

    /// The distinct-group-count estimate attached to this group, if any.
    #[must_use]
    pub fn estimate(&self) -> Option<u64> {
        self.aggregators.iter().find_map(|agg| match agg.value() {
            Some(AggregateValue::Estimate(estimate))
                if matches!(agg.node(), AggregatorNode::ExpressionCount { .. }) =>
            {
                Some(*estimate)
            }
            _ => None,
        })
    }

    fn merge_from(&mut self, other: &Self) {
        for aggregator in &other.aggregators {
            match self.aggregator_mut(aggregator.tag) {
                Some(existing) => existing.merge_from(aggregator),
                None => self.aggregators.push(aggregator.clone()),
            }
        }

        for child in &other.children {
            match self.child_by_value_mut(&child.value) {
                Some(existing) => existing.merge_from(child),
                None => self.children.push(child.clone()),
            }
        }
    }

    // Raise distinct-count estimates that fell below the observed child
    // count. Returns the number of corrections applied.
    fn post_merge(&mut self) -> usize {
        let mut corrected = 0;
        let observed = self.children.len() as u64;

        for aggregator in &mut self.aggregators {
            if !matches!(aggregator.node, AggregatorNode::ExpressionCount { .. }) {
                continue;
            }
            if let Some(AggregateValue::Estimate(estimate)) = &mut aggregator.value {
                if *estimate < observed {
                    *estimate = observed;
                    corrected += 1;
                }
            }
        }

        for child in &mut self.children {
            corrected += child.post_merge();
        }

        corrected
    }
}

///
/// GroupingLevel
///
/// One declared nesting depth: the group-by expression and the prototype
/// describing what to compute per group at that depth.
///

#[derive(Clone, Debug, PartialEq)]
pub struct GroupingLevel {
    pub group_by: ExpressionNode,
    pub prototype: Group,
    pub max_groups: Option<u64>,
    pub precision: Option<u64>,
}

///
/// Grouping
///
/// One compiled aggregation-request tree. `first_level`/`last_level`
/// restrict which levels a given pass computes; level `k` means "the groups
/// at depth `k`", with level 0 the root aggregates.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Grouping {
    id: u32,
    root: Group,
    levels: Vec<GroupingLevel>,
    first_level: usize,
    last_level: usize,
    force_single_pass: bool,
    top_n: Option<u64>,
    select_all: bool,
}

impl Grouping {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self {
            id,
            root: Group::new(Value::Null, 0),
            levels: Vec::new(),
            first_level: 0,
            last_level: 0,
            force_single_pass: false,
            top_n: None,
            select_all: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    pub const fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    #[must_use]
    pub const fn root(&self) -> &Group {
        &self.root
    }

    pub const fn root_mut(&mut self) -> &mut Group {
        &mut self.root
    }

    #[must_use]
    pub fn levels(&self) -> &[GroupingLevel] {
        &self.levels
    }

    pub fn add_level(&mut self, level: GroupingLevel) {
        self.levels.push(level);
        self.last_level = self.levels.len();
    }

    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level_mut(&mut self, index: usize) -> Option<&mut GroupingLevel> {
        self.levels.get_mut(index)
    }

    /// Restrict which levels a pass computes (inclusive bounds, level 0 is
    /// the root aggregates).
    pub const fn set_level_range(&mut self, first: usize, last: usize) {
        self.first_level = first;
        self.last_level = last;
    }

    #[must_use]
    pub const fn first_level(&self) -> usize {
        self.first_level
    }

    #[must_use]
    pub const fn last_level(&self) -> usize {
        self.last_level
    }

    pub const fn use_single_pass(&mut self) {
        self.force_single_pass = true;
    }

    /// Single-level groupings need no identity discovery and always run in
    /// one pass; deeper ones only when forced.
    #[must_use]
    pub fn is_single_pass(&self) -> bool {
        self.force_single_pass || self.levels.len() <= 1
    }

    #[must_use]
    pub const fn top_n(&self) -> Option<u64> {
        self.top_n
    }

    pub const fn set_top_n(&mut self, top_n: u64) {
        self.top_n = Some(top_n);
    }

    #[must_use]
    pub const fn select_all(&self) -> bool {
        self.select_all
    }

    pub const fn set_select_all(&mut self, select_all: bool) {
        self.select_all = select_all;
    }

    /// True when any aggregation output exists anywhere in the level chain.
    /// Output-less groupings are pruned before any backend work is issued.
    #[must_use]
    pub fn has_outputs(&self) -> bool {
        !self.root.aggregators().is_empty()
            || self
                .levels
                .iter()
                .any(|level| !level.prototype.aggregators().is_empty())
    }

    /// Accumulate a partial result with the same id into this tree.
    /// Commutative and associative; populated aggregator tags are never
    /// overwritten, so re-merging the same partial is a no-op.
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.id, other.id, "merge requires matching grouping ids");
        self.root.merge_from(&other.root);
    }

    /// Finalize pass-independent corrections after a merge round. Returns
    /// the number of estimates corrected.
    pub fn post_merge(&mut self) -> usize {
        self.root.post_merge()
    }

    /// Normalize the backend's root null marker so value-keyed merging
    /// treats every partial root as the same group.
    pub fn unify_null(&mut self) {
        if !self.root.value().is_null() {
            self.root.set_value(Value::Null);
        }
    }
}

///
/// BackendHit
///
/// One backend hit inside a hits aggregator, before conversion at the
/// `HitConverter` boundary.
///

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BackendHit {
    pub id: String,
    pub relevance: f64,
    pub fields: BTreeMap<String, Value>,
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{
        AggregateValue, Aggregator, AggregatorNode, ExpressionNode, Group, Grouping,
        GroupingLevel, MetricOp,
    };
    use crate::value::Value;

    fn attribute(name: &str) -> ExpressionNode {
        ExpressionNode::Attribute {
            name: name.to_string(),
        }
    }

    fn partial_with_group(id: u32, key: i64, count: u64) -> Grouping {
        let mut grouping = Grouping::new(id);
        grouping.add_level(GroupingLevel {
            group_by: attribute("a"),
            prototype: Group::new(Value::Null, 2),
            max_groups: None,
            precision: None,
        });

        let mut group = Group::new(Value::Long(key), 2);
        group.add_aggregator(Aggregator::with_value(
            3,
            AggregatorNode::Count,
            AggregateValue::Count(count),
        ));
        grouping.root_mut().add_child(group);
        grouping
    }

    #[test]
    fn merge_is_idempotent_per_tag() {
        let mut merged = partial_with_group(0, 7, 10);
        let partial = partial_with_group(0, 7, 10);

        merged.merge(&partial);
        merged.merge(&partial);

        let children = merged.root().children();
        assert_eq!(children.len(), 1);
        assert_eq!(
            children[0].aggregators()[0].value(),
            Some(&AggregateValue::Count(10))
        );
    }

    #[test]
    fn merge_never_overwrites_populated_tags() {
        let mut merged = partial_with_group(0, 7, 10);
        let conflicting = partial_with_group(0, 7, 999);

        merged.merge(&conflicting);

        assert_eq!(
            merged.root().children()[0].aggregators()[0].value(),
            Some(&AggregateValue::Count(10)),
            "first populated value must win",
        );
    }

    #[test]
    fn merge_adds_unseen_groups_by_value() {
        let mut merged = partial_with_group(0, 7, 10);
        merged.merge(&partial_with_group(0, 8, 4));

        let keys: Vec<&Value> = merged
            .root()
            .children()
            .iter()
            .map(super::Group::value)
            .collect();
        assert_eq!(keys, vec![&Value::Long(7), &Value::Long(8)]);
    }

    #[test]
    fn post_merge_raises_low_estimates_to_observed_count() {
        let mut grouping = partial_with_group(0, 1, 1);
        grouping.merge(&partial_with_group(0, 2, 1));
        grouping.merge(&partial_with_group(0, 3, 1));
        grouping.root_mut().add_aggregator(Aggregator::with_value(
            9,
            AggregatorNode::ExpressionCount {
                expr: attribute("a"),
            },
            AggregateValue::Estimate(1),
        ));

        assert_eq!(grouping.post_merge(), 1);
        assert_eq!(grouping.root().estimate(), Some(3));

        // Already-exact estimates are left alone.
        assert_eq!(grouping.post_merge(), 0);
    }

    #[test]
    fn single_level_groupings_are_single_pass() {
        let single = partial_with_group(0, 1, 1);
        assert!(single.is_single_pass());

        let mut deep = partial_with_group(0, 1, 1);
        deep.add_level(GroupingLevel {
            group_by: attribute("b"),
            prototype: Group::new(Value::Null, 5),
            max_groups: None,
            precision: None,
        });
        assert!(!deep.is_single_pass());

        deep.use_single_pass();
        assert!(deep.is_single_pass());
    }

    #[test]
    fn groupings_without_outputs_are_detectable() {
        let mut empty = Grouping::new(0);
        empty.add_level(GroupingLevel {
            group_by: attribute("a"),
            prototype: Group::new(Value::Null, 1),
            max_groups: None,
            precision: None,
        });
        assert!(!empty.has_outputs());

        empty
            .level_mut(0)
            .expect("level exists")
            .prototype
            .add_aggregator(Aggregator::new(
                2,
                AggregatorNode::Metric {
                    op: MetricOp::Sum,
                    expr: attribute("b"),
                },
            ));
        assert!(empty.has_outputs());
    }

    #[test]
    fn unify_null_normalizes_root_markers() {
        let mut grouping = Grouping::new(0);
        grouping.root_mut().set_value(Value::Text(String::new()));
        grouping.unify_null();
        assert!(grouping.root().value().is_null());
    }
}
