//! Request-language to backend-node translation. Both vocabularies are
//! closed sum types, so every mapping is compiler-checked exhaustive; there
//! is no "unknown expression" arm to fail at runtime.

use crate::{
    ast::{AggregationOp, Expression},
    request::{
        AggregatorNode, ArithOp, BitOp, ConvertKind, ExpressionNode, HitOrderSpec, MetricOp,
        OrderDirection,
    },
    value::Value,
};

/// Hit-collection context for translating a summary output. Scalar
/// aggregations ignore it.
#[derive(Clone, Copy, Debug, Default)]
pub struct HitsSpec<'a> {
    pub max_hits: Option<u64>,
    pub order_by: &'a [Expression],
}

/// Map one request expression to its backend node.
#[must_use]
pub fn expression(expr: &Expression) -> ExpressionNode {
    fn boxed(expr: &Expression) -> Box<ExpressionNode> {
        Box::new(expression(expr))
    }

    fn arith(op: ArithOp, lhs: &Expression, rhs: &Expression) -> ExpressionNode {
        ExpressionNode::Arith {
            op,
            lhs: boxed(lhs),
            rhs: boxed(rhs),
        }
    }

    fn bit(op: BitOp, lhs: &Expression, rhs: &Expression) -> ExpressionNode {
        ExpressionNode::Bit {
            op,
            lhs: boxed(lhs),
            rhs: boxed(rhs),
        }
    }

    fn convert(to: ConvertKind, arg: &Expression) -> ExpressionNode {
        ExpressionNode::Convert {
            to,
            arg: boxed(arg),
        }
    }

    match expr {
        Expression::Attribute(name) => ExpressionNode::Attribute { name: name.clone() },
        Expression::LongConstant(v) => ExpressionNode::Constant(Value::Long(*v)),
        Expression::DoubleConstant(v) => ExpressionNode::Constant(Value::Double(*v)),
        Expression::StringConstant(v) => ExpressionNode::Constant(Value::Text(v.clone())),
        Expression::Relevance => ExpressionNode::Relevance,
        Expression::Now => ExpressionNode::Now,
        Expression::Neg(e) => ExpressionNode::Neg(boxed(e)),
        Expression::Add(a, b) => arith(ArithOp::Add, a, b),
        Expression::Sub(a, b) => arith(ArithOp::Sub, a, b),
        Expression::Mul(a, b) => arith(ArithOp::Mul, a, b),
        Expression::Div(a, b) => arith(ArithOp::Div, a, b),
        Expression::Mod(a, b) => arith(ArithOp::Mod, a, b),
        Expression::BitAnd(a, b) => bit(BitOp::And, a, b),
        Expression::BitOr(a, b) => bit(BitOp::Or, a, b),
        Expression::BitXor(a, b) => bit(BitOp::Xor, a, b),
        Expression::StrLen(e) => ExpressionNode::StrLen(boxed(e)),
        Expression::StrCat(args) => ExpressionNode::StrCat(args.iter().map(expression).collect()),
        Expression::ToString(e) => convert(ConvertKind::ToString, e),
        Expression::ToLong(e) => convert(ConvertKind::ToLong, e),
        Expression::ToDouble(e) => convert(ConvertKind::ToDouble, e),
        Expression::ToRaw(e) => convert(ConvertKind::ToRaw, e),
        Expression::Size(e) => ExpressionNode::Size(boxed(e)),
        Expression::Reverse(e) => ExpressionNode::Reverse(boxed(e)),
        Expression::Sort(e) => ExpressionNode::Sort(boxed(e)),
        Expression::Time(part, e) => ExpressionNode::TimePart {
            part: *part,
            arg: boxed(e),
        },
        Expression::FixedWidth(e, width) => ExpressionNode::FixedWidth {
            arg: boxed(e),
            width: *width,
        },
        Expression::Predefined(e, buckets) => ExpressionNode::RangeBucket {
            arg: boxed(e),
            buckets: buckets
                .iter()
                .map(|bucket| (bucket.from.clone(), bucket.to.clone()))
                .collect(),
        },
    }
}

/// Map one declared aggregation output to its backend aggregator.
#[must_use]
pub fn aggregation(op: &AggregationOp, hits: HitsSpec<'_>) -> AggregatorNode {
    fn metric(op: MetricOp, expr: &Expression) -> AggregatorNode {
        AggregatorNode::Metric {
            op,
            expr: expression(expr),
        }
    }

    match op {
        AggregationOp::Count => AggregatorNode::Count,
        AggregationOp::Sum(e) => metric(MetricOp::Sum, e),
        AggregationOp::Avg(e) => metric(MetricOp::Avg, e),
        AggregationOp::Min(e) => metric(MetricOp::Min, e),
        AggregationOp::Max(e) => metric(MetricOp::Max, e),
        AggregationOp::Xor(e) => metric(MetricOp::Xor, e),
        AggregationOp::Stddev(e) => metric(MetricOp::Stddev, e),
        AggregationOp::Summary { class } => AggregatorNode::Hits {
            summary_class: class.clone(),
            max_hits: hits.max_hits,
            order_by: order_by(hits.order_by),
        },
    }
}

/// Map declared hit ordering. A `neg(..)` wrapper flips the direction and is
/// stripped from the translated expression.
#[must_use]
pub fn order_by(exprs: &[Expression]) -> Vec<HitOrderSpec> {
    exprs
        .iter()
        .map(|expr| match expr {
            Expression::Neg(inner) => HitOrderSpec {
                expr: expression(inner),
                direction: OrderDirection::Descending,
            },
            other => HitOrderSpec {
                expr: expression(other),
                direction: OrderDirection::Ascending,
            },
        })
        .collect()
}

///
/// TESTS
///
