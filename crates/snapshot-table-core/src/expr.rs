//! Row filter expressions.
//!
//! Expressions are built unbound (by column name) and bound against a
//! [`Schema`](crate::metadata::Schema) and
//! [`PartitionSpec`](crate::metadata::PartitionSpec) before evaluation. The
//! evaluators in [`evaluator`] answer a single conservative question: *can*
//! a file (or a manifest) contain rows matching the expression? A `false`
//! answer is definitive; `true` only means "maybe".

pub mod evaluator;

use std::fmt;

use snafu::prelude::*;

use crate::metadata::{Datum, PrimitiveType};

pub use evaluator::{FileOverlapEvaluator, ManifestEvaluator};

/// Errors binding an expression.
#[derive(Debug, Clone, Snafu, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum ExpressionError {
    /// The expression names a column the schema does not have.
    #[snafu(display("Cannot find field '{column}' in schema"))]
    UnknownColumn {
        /// Column name used in the expression.
        column: String,
    },

    /// A literal cannot be converted to the column type.
    #[snafu(display("Cannot compare {column} ({ty}) with literal {literal:?}"))]
    IncompatibleLiteral {
        /// Column name.
        column: String,
        /// Column type.
        ty: PrimitiveType,
        /// The literal.
        literal: Datum,
    },

    /// A comparison predicate has no literal.
    #[snafu(display("Predicate {op} on {column} requires a literal"))]
    MissingLiteral {
        /// Column name.
        column: String,
        /// Operator.
        op: PredicateOp,
    },
}

/// Predicate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateOp {
    /// `col IS NULL`
    IsNull,
    /// `col IS NOT NULL`
    NotNull,
    /// `col = lit`
    Eq,
    /// `col != lit`
    NotEq,
    /// `col < lit`
    Lt,
    /// `col <= lit`
    LtEq,
    /// `col > lit`
    Gt,
    /// `col >= lit`
    GtEq,
    /// `col IN (lits)`
    In,
    /// `col NOT IN (lits)`
    NotIn,
}

impl PredicateOp {
    /// The operator matching exactly the rows this one rejects.
    pub fn negate(self) -> Self {
        match self {
            PredicateOp::IsNull => PredicateOp::NotNull,
            PredicateOp::NotNull => PredicateOp::IsNull,
            PredicateOp::Eq => PredicateOp::NotEq,
            PredicateOp::NotEq => PredicateOp::Eq,
            PredicateOp::Lt => PredicateOp::GtEq,
            PredicateOp::GtEq => PredicateOp::Lt,
            PredicateOp::LtEq => PredicateOp::Gt,
            PredicateOp::Gt => PredicateOp::LtEq,
            PredicateOp::In => PredicateOp::NotIn,
            PredicateOp::NotIn => PredicateOp::In,
        }
    }

    fn is_unary(self) -> bool {
        matches!(self, PredicateOp::IsNull | PredicateOp::NotNull)
    }
}

impl fmt::Display for PredicateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PredicateOp::IsNull => "is_null",
            PredicateOp::NotNull => "not_null",
            PredicateOp::Eq => "==",
            PredicateOp::NotEq => "!=",
            PredicateOp::Lt => "<",
            PredicateOp::LtEq => "<=",
            PredicateOp::Gt => ">",
            PredicateOp::GtEq => ">=",
            PredicateOp::In => "in",
            PredicateOp::NotIn => "not_in",
        };
        f.write_str(s)
    }
}

/// A predicate on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Column name.
    pub column: String,
    /// Operator.
    pub op: PredicateOp,
    /// Literals; empty for unary operators, several for `In`/`NotIn`.
    pub literals: Vec<Datum>,
}

/// A boolean filter over rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Matches every row.
    AlwaysTrue,
    /// Matches no row.
    AlwaysFalse,
    /// Both sides match.
    And(Box<Expression>, Box<Expression>),
    /// Either side matches.
    Or(Box<Expression>, Box<Expression>),
    /// The inner expression does not match.
    Not(Box<Expression>),
    /// A column predicate.
    Predicate(Predicate),
}

impl Expression {
    fn predicate(column: impl Into<String>, op: PredicateOp, literals: Vec<Datum>) -> Self {
        Expression::Predicate(Predicate {
            column: column.into(),
            op,
            literals,
        })
    }

    /// `column IS NULL`
    pub fn is_null(column: impl Into<String>) -> Self {
        Self::predicate(column, PredicateOp::IsNull, Vec::new())
    }

    /// `column IS NOT NULL`
    pub fn not_null(column: impl Into<String>) -> Self {
        Self::predicate(column, PredicateOp::NotNull, Vec::new())
    }

    /// `column = value`
    pub fn equal(column: impl Into<String>, value: impl Into<Datum>) -> Self {
        Self::predicate(column, PredicateOp::Eq, vec![value.into()])
    }

    /// `column != value`
    pub fn not_equal(column: impl Into<String>, value: impl Into<Datum>) -> Self {
        Self::predicate(column, PredicateOp::NotEq, vec![value.into()])
    }

    /// `column < value`
    pub fn less_than(column: impl Into<String>, value: impl Into<Datum>) -> Self {
        Self::predicate(column, PredicateOp::Lt, vec![value.into()])
    }

    /// `column <= value`
    pub fn less_than_or_equal(column: impl Into<String>, value: impl Into<Datum>) -> Self {
        Self::predicate(column, PredicateOp::LtEq, vec![value.into()])
    }

    /// `column > value`
    pub fn greater_than(column: impl Into<String>, value: impl Into<Datum>) -> Self {
        Self::predicate(column, PredicateOp::Gt, vec![value.into()])
    }

    /// `column >= value`
    pub fn greater_than_or_equal(column: impl Into<String>, value: impl Into<Datum>) -> Self {
        Self::predicate(column, PredicateOp::GtEq, vec![value.into()])
    }

    /// `column IN (values)`
    pub fn is_in<I, D>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Datum>,
    {
        Self::predicate(
            column,
            PredicateOp::In,
            values.into_iter().map(Into::into).collect(),
        )
    }

    /// `self AND other`
    pub fn and(self, other: Expression) -> Self {
        Expression::And(Box::new(self), Box::new(other))
    }

    /// `self OR other`
    pub fn or(self, other: Expression) -> Self {
        Expression::Or(Box::new(self), Box::new(other))
    }

    /// `NOT self`
    pub fn negate(self) -> Self {
        Expression::Not(Box::new(self))
    }

    /// Push every `Not` down to the predicates.
    pub fn rewrite_not(self) -> Self {
        match self {
            Expression::Not(inner) => inner.negated(),
            Expression::And(l, r) => l.rewrite_not().and(r.rewrite_not()),
            Expression::Or(l, r) => l.rewrite_not().or(r.rewrite_not()),
            other => other,
        }
    }

    fn negated(self) -> Self {
        match self {
            Expression::AlwaysTrue => Expression::AlwaysFalse,
            Expression::AlwaysFalse => Expression::AlwaysTrue,
            Expression::Not(inner) => inner.rewrite_not(),
            Expression::And(l, r) => l.negated().or(r.negated()),
            Expression::Or(l, r) => l.negated().and(r.negated()),
            Expression::Predicate(p) => Expression::Predicate(Predicate {
                op: p.op.negate(),
                ..p
            }),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::AlwaysTrue => f.write_str("true"),
            Expression::AlwaysFalse => f.write_str("false"),
            Expression::And(l, r) => write!(f, "({l} and {r})"),
            Expression::Or(l, r) => write!(f, "({l} or {r})"),
            Expression::Not(e) => write!(f, "not({e})"),
            Expression::Predicate(p) if p.op.is_unary() => write!(f, "{}({})", p.op, p.column),
            Expression::Predicate(p) => {
                let lits: Vec<String> = p.literals.iter().map(ToString::to_string).collect();
                write!(f, "{} {} {}", p.column, p.op, lits.join(", "))
            }
        }
    }
}
