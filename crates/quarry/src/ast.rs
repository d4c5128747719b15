//! Input AST contract: the declarative group/aggregate request as produced
//! by the query-language front end. This module is pure data; compilation
//! lives in `builder`.

use crate::value::Value;
use std::fmt;

///
/// OperationKind
///
/// `All` operates on the current content, `Each` descends one level into it.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationKind {
    All,
    Each,
}

///
/// GroupingOperation
///
/// One node of the declarative request tree. Level 0 is the root, level 1 a
/// group list, level 2 a hit list; levels are positional and resolved during
/// compilation.
///

#[derive(Clone, Debug)]
pub struct GroupingOperation {
    kind: OperationKind,
    children: Vec<GroupingOperation>,
    group_by: Option<Expression>,
    outputs: Vec<OutputSpec>,
    order_by: Vec<Expression>,
    max: Option<u64>,
    precision: Option<u64>,
    label: Option<String>,
    where_clause: Option<String>,
    force_single_pass: bool,
}

impl GroupingOperation {
    #[must_use]
    pub fn all() -> Self {
        Self::new(OperationKind::All)
    }

    #[must_use]
    pub fn each() -> Self {
        Self::new(OperationKind::Each)
    }

    fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            group_by: None,
            outputs: Vec::new(),
            order_by: Vec::new(),
            max: None,
            precision: None,
            label: None,
            where_clause: None,
            force_single_pass: false,
        }
    }

    // fluent constructors

    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn group_by(mut self, expr: Expression) -> Self {
        self.group_by = Some(expr);
        self
    }

    #[must_use]
    pub fn output(mut self, op: AggregationOp) -> Self {
        self.outputs.push(OutputSpec { op, label: None });
        self
    }

    #[must_use]
    pub fn output_as(mut self, op: AggregationOp, label: impl Into<String>) -> Self {
        self.outputs.push(OutputSpec {
            op,
            label: Some(label.into()),
        });
        self
    }

    /// Declare hit ordering. A `neg(..)` wrapper flips to descending.
    #[must_use]
    pub fn order_by(mut self, expr: Expression) -> Self {
        self.order_by.push(expr);
        self
    }

    #[must_use]
    pub const fn max(mut self, max: u64) -> Self {
        self.max = Some(max);
        self
    }

    #[must_use]
    pub const fn precision(mut self, precision: u64) -> Self {
        self.precision = Some(precision);
        self
    }

    #[must_use]
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    #[must_use]
    pub const fn force_single_pass(mut self) -> Self {
        self.force_single_pass = true;
        self
    }

    // accessors

    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    #[must_use]
    pub const fn group_by_expr(&self) -> Option<&Expression> {
        self.group_by.as_ref()
    }

    #[must_use]
    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    #[must_use]
    pub fn order_by_exprs(&self) -> &[Expression] {
        &self.order_by
    }

    #[must_use]
    pub const fn max_value(&self) -> Option<u64> {
        self.max
    }

    #[must_use]
    pub const fn precision_value(&self) -> Option<u64> {
        self.precision
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[must_use]
    pub fn where_value(&self) -> Option<&str> {
        self.where_clause.as_deref()
    }

    #[must_use]
    pub const fn forces_single_pass(&self) -> bool {
        self.force_single_pass
    }

    /// Resolve the level this node operates at given its parent's level.
    #[must_use]
    pub const fn resolve_level(&self, parent_level: u32) -> u32 {
        match self.kind {
            OperationKind::All => parent_level,
            OperationKind::Each => parent_level + 1,
        }
    }
}

///
/// OutputSpec
///
/// One declared aggregation output, possibly labeled. Unlabeled outputs are
/// named after their source text.
///

#[derive(Clone, Debug)]
pub struct OutputSpec {
    pub op: AggregationOp,
    pub label: Option<String>,
}

///
/// Expression
///
/// Closed expression vocabulary of the request language. The compiler maps
/// each variant to exactly one backend node; see `translate`.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Attribute(String),
    LongConstant(i64),
    DoubleConstant(f64),
    StringConstant(String),
    Relevance,
    Now,
    Neg(Box<Expression>),
    Add(Box<Expression>, Box<Expression>),
    Sub(Box<Expression>, Box<Expression>),
    Mul(Box<Expression>, Box<Expression>),
    Div(Box<Expression>, Box<Expression>),
    Mod(Box<Expression>, Box<Expression>),
    BitAnd(Box<Expression>, Box<Expression>),
    BitOr(Box<Expression>, Box<Expression>),
    BitXor(Box<Expression>, Box<Expression>),
    StrLen(Box<Expression>),
    StrCat(Vec<Expression>),
    ToString(Box<Expression>),
    ToLong(Box<Expression>),
    ToDouble(Box<Expression>),
    ToRaw(Box<Expression>),
    Size(Box<Expression>),
    Reverse(Box<Expression>),
    Sort(Box<Expression>),
    Time(TimePart, Box<Expression>),
    FixedWidth(Box<Expression>, u64),
    Predefined(Box<Expression>, Vec<BucketSpec>),
}

impl Expression {
    #[must_use]
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute(name.into())
    }

    #[must_use]
    pub fn neg(expr: Self) -> Self {
        Self::Neg(Box::new(expr))
    }
}

///
/// TimePart
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimePart {
    Year,
    MonthOfYear,
    DayOfMonth,
    DayOfWeek,
    DayOfYear,
    HourOfDay,
    MinuteOfHour,
    SecondOfMinute,
}

impl TimePart {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::MonthOfYear => "monthofyear",
            Self::DayOfMonth => "dayofmonth",
            Self::DayOfWeek => "dayofweek",
            Self::DayOfYear => "dayofyear",
            Self::HourOfDay => "hourofday",
            Self::MinuteOfHour => "minuteofhour",
            Self::SecondOfMinute => "secondofminute",
        }
    }
}

///
/// BucketSpec
///
/// One half-open `[from, to)` range of a predefined bucket list.
///

#[derive(Clone, Debug, PartialEq)]
pub struct BucketSpec {
    pub from: Value,
    pub to: Value,
}

///
/// AggregationOp
///
/// Closed aggregation vocabulary. Scalar aggregates apply per group;
/// `Summary` collects the hits of a group into a hit list.
///

#[derive(Clone, Debug, PartialEq)]
pub enum AggregationOp {
    Count,
    Sum(Expression),
    Avg(Expression),
    Min(Expression),
    Max(Expression),
    Xor(Expression),
    Stddev(Expression),
    Summary { class: Option<String> },
}

fn write_call(f: &mut fmt::Formatter<'_>, name: &str, args: &[&Expression]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{arg}")?;
    }
    write!(f, ")")
}

impl fmt::Display for Expression {
    // Renders the request-language source text; used as the default label.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute(name) => write!(f, "{name}"),
            Self::LongConstant(v) => write!(f, "{v}"),
            Self::DoubleConstant(v) => write!(f, "{v}"),
            Self::StringConstant(v) => write!(f, "\"{v}\""),
            Self::Relevance => write!(f, "relevance()"),
            Self::Now => write!(f, "now()"),
            Self::Neg(e) => write_call(f, "neg", &[e]),
            Self::Add(a, b) => write_call(f, "add", &[a, b]),
            Self::Sub(a, b) => write_call(f, "sub", &[a, b]),
            Self::Mul(a, b) => write_call(f, "mul", &[a, b]),
            Self::Div(a, b) => write_call(f, "div", &[a, b]),
            Self::Mod(a, b) => write_call(f, "mod", &[a, b]),
            Self::BitAnd(a, b) => write_call(f, "and", &[a, b]),
            Self::BitOr(a, b) => write_call(f, "or", &[a, b]),
            Self::BitXor(a, b) => write_call(f, "xor", &[a, b]),
            Self::StrLen(e) => write_call(f, "strlen", &[e]),
            Self::StrCat(args) => {
                let refs: Vec<&Self> = args.iter().collect();
                write_call(f, "strcat", &refs)
            }
            Self::ToString(e) => write_call(f, "tostring", &[e]),
            Self::ToLong(e) => write_call(f, "tolong", &[e]),
            Self::ToDouble(e) => write_call(f, "todouble", &[e]),
            Self::ToRaw(e) => write_call(f, "toraw", &[e]),
            Self::Size(e) => write_call(f, "size", &[e]),
            Self::Reverse(e) => write_call(f, "reverse", &[e]),
            Self::Sort(e) => write_call(f, "sort", &[e]),
            Self::Time(part, e) => {
                write!(f, "time.{}({e})", part.name())
            }
            Self::FixedWidth(e, width) => write!(f, "fixedwidth({e},{width})"),
            Self::Predefined(e, buckets) => {
                write!(f, "predefined({e}")?;
                for bucket in buckets {
                    write!(f, ",bucket({},{})", bucket.from, bucket.to)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for AggregationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "count()"),
            Self::Sum(e) => write_call(f, "sum", &[e]),
            Self::Avg(e) => write_call(f, "avg", &[e]),
            Self::Min(e) => write_call(f, "min", &[e]),
            Self::Max(e) => write_call(f, "max", &[e]),
            Self::Xor(e) => write_call(f, "xor", &[e]),
            Self::Stddev(e) => write_call(f, "stddev", &[e]),
            Self::Summary { class: None } => write!(f, "summary()"),
            Self::Summary { class: Some(c) } => write!(f, "summary({c})"),
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{AggregationOp, Expression, TimePart};

    #[test]
    fn expression_text_matches_request_language() {
        let expr = Expression::Add(
            Box::new(Expression::attribute("a")),
            Box::new(Expression::Mul(
                Box::new(Expression::attribute("b")),
                Box::new(Expression::LongConstant(2)),
            )),
        );
        assert_eq!(expr.to_string(), "add(a,mul(b,2))");

        let time = Expression::Time(TimePart::DayOfWeek, Box::new(Expression::attribute("ts")));
        assert_eq!(time.to_string(), "time.dayofweek(ts)");
    }

    #[test]
    fn aggregation_text_matches_request_language() {
        assert_eq!(AggregationOp::Count.to_string(), "count()");
        assert_eq!(
            AggregationOp::Sum(Expression::attribute("price")).to_string(),
            "sum(price)"
        );
        assert_eq!(
            AggregationOp::Summary {
                class: Some("short".to_string())
            }
            .to_string(),
            "summary(short)"
        );
    }

    #[test]
    fn resolve_level_descends_on_each_only() {
        let all = super::GroupingOperation::all();
        let each = super::GroupingOperation::each();
        assert_eq!(all.resolve_level(0), 0);
        assert_eq!(each.resolve_level(0), 1);
        assert_eq!(each.resolve_level(2), 3);
    }
}
