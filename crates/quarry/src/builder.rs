//! Request compiler: walks one declarative operation tree and produces the
//! backend `Grouping` trees plus the `GroupingTransform` bookkeeping the
//! result builder needs to reassemble pages later.

use crate::{
    MAX_GROUPING_LEVELS, PAGE_LOOKAHEAD,
    ast::{AggregationOp, Expression, GroupingOperation, OperationKind},
    continuation::CompositeContinuation,
    error::GroupingError,
    request::{Aggregator, AggregatorNode, Group, Grouping, GroupingLevel},
    transform::GroupingTransform,
    translate,
    value::Value,
};

const WHERE_TRUE: &str = "true";
const WHERE_QUERY: &str = "$query";

///
/// CompiledRequest
///
/// Output of one compilation: the groupings to attach to the backend query
/// and the transform to hand to the result builder afterwards.
///

#[derive(Debug)]
pub struct CompiledRequest {
    pub groupings: Vec<Grouping>,
    pub transform: GroupingTransform,
}

///
/// BuildState
///
/// The pending, not-yet-converted declarations carried down one branch of
/// the walk. Cloned when branching into a non-last sibling so each subtree
/// consumes its own copy.
///

#[derive(Clone, Debug, Default)]
struct BuildState {
    group_by: Option<Expression>,
    label: Option<String>,
    max: Option<u64>,
    precision: Option<u64>,
    order_by: Vec<Expression>,
}

struct Frame<'a> {
    op: &'a GroupingOperation,
    parent_level: u32,
    grouping: usize,
    level_index: Option<usize>,
    parent_tag: i32,
    state: BuildState,
    is_root: bool,
}

///
/// RequestBuilder
///
/// One-shot compiler for one request. Tags are assigned from a counter
/// scoped to this builder, so the numbering is deterministic for a given
/// operation tree and reproduces across page requests.
///

pub struct RequestBuilder {
    next_tag: i32,
    next_grouping_id: u32,
}

impl RequestBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_tag: 0,
            next_grouping_id: 0,
        }
    }

    /// Compile `root` into backend groupings, folding any caller-supplied
    /// continuation positions into the transform first.
    pub fn build(
        mut self,
        request_index: u32,
        root: &GroupingOperation,
        continuations: &CompositeContinuation,
    ) -> Result<CompiledRequest, GroupingError> {
        let mut transform = GroupingTransform::new(
            crate::continuation::ResultId::root().child(request_index),
        );
        for continuation in continuations.children() {
            transform.add_continuation(continuation);
        }

        let mut initial = Grouping::new(self.take_grouping_id());
        let root_tag = self.take_tag();
        initial.root_mut().set_tag(root_tag);
        let mut groupings = vec![initial];

        let mut stack = vec![Frame {
            op: root,
            parent_level: 0,
            grouping: 0,
            level_index: None,
            parent_tag: root_tag,
            state: BuildState::default(),
            is_root: true,
        }];

        while let Some(mut frame) = stack.pop() {
            let level = self.process(&mut frame, &mut groupings, &mut transform)?;

            // Non-last siblings branch onto a deep clone taken before any
            // child subtree has mutated the shared prefix; the last child
            // keeps building on the original.
            let children = frame.op.children();
            for (i, child) in children.iter().enumerate().rev() {
                let grouping = if i + 1 == children.len() {
                    frame.grouping
                } else {
                    let mut clone = groupings[frame.grouping].clone();
                    clone.set_id(self.take_grouping_id());
                    groupings.push(clone);
                    groupings.len() - 1
                };

                stack.push(Frame {
                    op: child,
                    parent_level: level,
                    grouping,
                    level_index: frame.level_index,
                    parent_tag: frame.parent_tag,
                    state: frame.state.clone(),
                    is_root: false,
                });
            }
        }

        // No backend work for output-less subtrees.
        groupings.retain(Grouping::has_outputs);

        Ok(CompiledRequest {
            groupings,
            transform,
        })
    }

    /// Handle one operation node; returns the level its children see.
    fn process(
        &mut self,
        frame: &mut Frame<'_>,
        groupings: &mut [Grouping],
        transform: &mut GroupingTransform,
    ) -> Result<u32, GroupingError> {
        let op = frame.op;
        let level = op.resolve_level(frame.parent_level);
        if level > MAX_GROUPING_LEVELS {
            return Err(GroupingError::unsupported_request(format!(
                "grouping nests deeper than {MAX_GROUPING_LEVELS} levels"
            )));
        }

        Self::apply_where(frame, groupings)?;

        if op.forces_single_pass() {
            groupings[frame.grouping].use_single_pass();
        }

        // A label names the list this node is about to create, so it must
        // register against the enclosing parent tag before any conversion
        // moves the frame onto the new level.
        if let Some(label) = op.label() {
            transform.register_sibling_label(frame.parent_tag, label)?;
            frame.state.label = Some(label.to_string());
        }

        if op.kind() == OperationKind::Each && frame.state.group_by.is_some() {
            self.convert_level(frame, groupings, transform)?;
        }

        if !op.order_by_exprs().is_empty() {
            if level != MAX_GROUPING_LEVELS {
                return Err(GroupingError::unsupported_request(
                    "ordering is only supported for hit lists",
                ));
            }
            frame.state.order_by.extend_from_slice(op.order_by_exprs());
        }

        if let Some(group_by) = op.group_by_expr() {
            if frame.state.group_by.is_some() {
                return Err(GroupingError::unsupported_request(
                    "group-by declared while another group-by is still pending",
                ));
            }
            frame.state.group_by = Some(group_by.clone());
        }
        if let Some(max) = op.max_value() {
            // The backend top-N shortcut applies only at the root with no
            // grouping pending; everywhere else max becomes a page window.
            if frame.is_root
                && op.kind() == OperationKind::All
                && frame.state.group_by.is_none()
            {
                groupings[frame.grouping].set_top_n(max);
            } else {
                frame.state.max = Some(max);
            }
        }
        if let Some(precision) = op.precision_value() {
            frame.state.precision = Some(precision);
        }

        self.apply_outputs(frame, level, groupings, transform)?;

        Ok(level)
    }

    fn apply_where(frame: &Frame<'_>, groupings: &mut [Grouping]) -> Result<(), GroupingError> {
        let Some(clause) = frame.op.where_value() else {
            return Ok(());
        };

        if !frame.is_root {
            return Err(GroupingError::unsupported_request(
                "where clause is only allowed on the root operation",
            ));
        }

        match clause {
            WHERE_TRUE => groupings[frame.grouping].set_select_all(true),
            WHERE_QUERY => {}
            other => {
                return Err(GroupingError::unsupported_request(format!(
                    "unsupported where clause: '{other}'"
                )));
            }
        }

        Ok(())
    }

    /// Convert the pending group-by into a new grouping level, widening its
    /// fetch window by the lookahead row and any carried-in offset, and
    /// planting a distinct-count estimator on the parent prototype when the
    /// level is paged.
    fn convert_level(
        &mut self,
        frame: &mut Frame<'_>,
        groupings: &mut [Grouping],
        transform: &mut GroupingTransform,
    ) -> Result<(), GroupingError> {
        let Some(group_by) = frame.state.group_by.take() else {
            return Ok(());
        };

        let tag = self.take_tag();
        let label = frame
            .state
            .label
            .take()
            .unwrap_or_else(|| group_by.to_string());
        transform.set_label(tag, label)?;

        let mut max_groups = None;
        if let Some(max) = frame.state.max.take() {
            max_groups = Some(PAGE_LOOKAHEAD + max + transform.offset_for_tag(tag));
            transform.set_max(tag, max)?;

            let estimator_tag = self.take_tag();
            transform.set_label(estimator_tag, format!("groupcount({group_by})"))?;
            transform.set_estimator_target(estimator_tag, tag)?;
            let estimator = Aggregator::new(
                estimator_tag,
                AggregatorNode::ExpressionCount {
                    expr: translate::expression(&group_by),
                },
            );
            Self::prototype_mut(&mut groupings[frame.grouping], frame.level_index)?
                .add_aggregator(estimator);
        }

        groupings[frame.grouping].add_level(GroupingLevel {
            group_by: translate::expression(&group_by),
            prototype: Group::new(Value::Null, tag),
            max_groups,
            precision: frame.state.precision.take(),
        });

        frame.level_index = Some(groupings[frame.grouping].level_count() - 1);
        frame.parent_tag = tag;
        Ok(())
    }

    fn apply_outputs(
        &mut self,
        frame: &mut Frame<'_>,
        level: u32,
        groupings: &mut [Grouping],
        transform: &mut GroupingTransform,
    ) -> Result<(), GroupingError> {
        for output in frame.op.outputs() {
            let tag = self.take_tag();
            let label = output
                .label
                .clone()
                .unwrap_or_else(|| output.op.to_string());
            if output.label.is_some() {
                transform.register_sibling_label(frame.parent_tag, &label)?;
            }
            transform.set_label(tag, label)?;

            let node = if let AggregationOp::Summary { .. } = &output.op {
                if level != MAX_GROUPING_LEVELS {
                    return Err(GroupingError::unsupported_request(
                        "hit summaries are only supported at the hit level",
                    ));
                }

                let max_hits = match frame.state.max.take() {
                    Some(max) => {
                        transform.set_max(tag, max)?;
                        Some(PAGE_LOOKAHEAD + max + transform.offset_for_tag(tag))
                    }
                    None => None,
                };

                translate::aggregation(
                    &output.op,
                    translate::HitsSpec {
                        max_hits,
                        order_by: &frame.state.order_by,
                    },
                )
            } else {
                translate::aggregation(&output.op, translate::HitsSpec::default())
            };

            Self::prototype_mut(&mut groupings[frame.grouping], frame.level_index)?
                .add_aggregator(Aggregator::new(tag, node));
        }

        Ok(())
    }

    fn prototype_mut(
        grouping: &mut Grouping,
        level_index: Option<usize>,
    ) -> Result<&mut Group, GroupingError> {
        match level_index {
            None => Ok(grouping.root_mut()),
            Some(index) => grouping
                .level_mut(index)
                .map(|level| &mut level.prototype)
                .ok_or_else(|| {
                    GroupingError::transform_invariant("current grouping level out of range")
                }),
        }
    }

    fn take_tag(&mut self) -> i32 {
        let tag = self.next_tag;
        self.next_tag += 1;
        tag
    }

    fn take_grouping_id(&mut self) -> u32 {
        let id = self.next_grouping_id;
        self.next_grouping_id += 1;
        id
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

///
/// TESTS
///
