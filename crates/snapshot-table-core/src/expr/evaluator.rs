//! Conservative overlap checks against file statistics.
//!
//! Range information for a column comes from the file's identity partition
//! value when the column is an identity partition source, and from the
//! column's lower/upper bounds otherwise. Missing information never rules a
//! file out.

use std::cmp::Ordering;

use snafu::prelude::*;

use super::{
    Expression, ExpressionError, IncompatibleLiteralSnafu, MissingLiteralSnafu, PredicateOp,
    UnknownColumnSnafu,
};
use crate::metadata::{
    DataFile, Datum, ManifestFile, PartitionFieldSummary, PartitionSpec, PrimitiveType, Schema,
};

#[derive(Debug, Clone)]
struct BoundPredicate {
    field_id: i32,
    ty: PrimitiveType,
    partition_pos: Option<usize>,
    op: PredicateOp,
    literals: Vec<Datum>,
}

#[derive(Debug, Clone)]
enum Bound {
    True,
    False,
    And(Box<Bound>, Box<Bound>),
    Or(Box<Bound>, Box<Bound>),
    Pred(BoundPredicate),
}

fn bind(schema: &Schema, spec: &PartitionSpec, expr: Expression) -> Result<Bound, ExpressionError> {
    Ok(match expr {
        Expression::AlwaysTrue => Bound::True,
        Expression::AlwaysFalse => Bound::False,
        Expression::And(l, r) => Bound::And(
            Box::new(bind(schema, spec, *l)?),
            Box::new(bind(schema, spec, *r)?),
        ),
        Expression::Or(l, r) => Bound::Or(
            Box::new(bind(schema, spec, *l)?),
            Box::new(bind(schema, spec, *r)?),
        ),
        // rewrite_not runs before binding
        Expression::Not(_) => Bound::True,
        Expression::Predicate(p) => {
            let field = schema
                .field_by_name(&p.column)
                .context(UnknownColumnSnafu { column: &p.column })?;
            if !p.op.is_unary() {
                ensure!(
                    !p.literals.is_empty(),
                    MissingLiteralSnafu {
                        column: &p.column,
                        op: p.op
                    }
                );
            }
            let mut literals = Vec::with_capacity(p.literals.len());
            for literal in p.literals {
                let cast = literal
                    .cast_to(field.field_type)
                    .context(IncompatibleLiteralSnafu {
                        column: &p.column,
                        ty: field.field_type,
                        literal: literal.clone(),
                    })?;
                literals.push(cast);
            }
            Bound::Pred(BoundPredicate {
                field_id: field.id,
                ty: field.field_type,
                partition_pos: spec.identity_position(field.id),
                op: p.op,
                literals,
            })
        }
    })
}

fn bind_expression(
    schema: &Schema,
    spec: &PartitionSpec,
    expr: Expression,
) -> Result<Bound, ExpressionError> {
    bind(schema, spec, expr.rewrite_not())
}

/// Exact evaluation against a single known value (`None` is null).
///
/// Values that cannot be ordered against a literal count as a match.
fn eval_value(op: PredicateOp, literals: &[Datum], value: Option<&Datum>) -> bool {
    let Some(value) = value else {
        return op == PredicateOp::IsNull;
    };
    let test =
        |lit: &Datum, accept: fn(Ordering) -> bool| value.partial_cmp(lit).is_none_or(accept);
    match op {
        PredicateOp::IsNull => false,
        PredicateOp::NotNull => true,
        PredicateOp::Eq => literals.first().is_none_or(|l| test(l, Ordering::is_eq)),
        PredicateOp::NotEq => literals.first().is_none_or(|l| test(l, Ordering::is_ne)),
        PredicateOp::Lt => literals.first().is_none_or(|l| test(l, Ordering::is_lt)),
        PredicateOp::LtEq => literals.first().is_none_or(|l| test(l, Ordering::is_le)),
        PredicateOp::Gt => literals.first().is_none_or(|l| test(l, Ordering::is_gt)),
        PredicateOp::GtEq => literals.first().is_none_or(|l| test(l, Ordering::is_ge)),
        PredicateOp::In => literals.iter().any(|l| test(l, Ordering::is_eq)),
        PredicateOp::NotIn => literals.iter().all(|l| test(l, Ordering::is_ne)),
    }
}

/// Range check given optional bounds. `all_null` means the column holds no
/// non-null value at all.
fn eval_range(
    op: PredicateOp,
    literals: &[Datum],
    lower: Option<&Datum>,
    upper: Option<&Datum>,
    may_have_nulls: bool,
    all_null: bool,
) -> bool {
    let is = |bound: Option<&Datum>, lit: &Datum, ord: Ordering| {
        bound.and_then(|b| b.partial_cmp(lit)) == Some(ord)
    };
    match op {
        PredicateOp::IsNull => may_have_nulls,
        PredicateOp::NotNull => !all_null,
        _ if all_null => matches!(op, PredicateOp::NotEq | PredicateOp::NotIn),
        PredicateOp::Eq | PredicateOp::In => literals
            .iter()
            .any(|lit| !is(lower, lit, Ordering::Greater) && !is(upper, lit, Ordering::Less)),
        PredicateOp::Lt => literals.first().is_none_or(|lit| {
            !is(lower, lit, Ordering::Greater) && !is(lower, lit, Ordering::Equal)
        }),
        PredicateOp::LtEq => literals
            .first()
            .is_none_or(|lit| !is(lower, lit, Ordering::Greater)),
        PredicateOp::Gt => literals
            .first()
            .is_none_or(|lit| !is(upper, lit, Ordering::Less) && !is(upper, lit, Ordering::Equal)),
        PredicateOp::GtEq => literals
            .first()
            .is_none_or(|lit| !is(upper, lit, Ordering::Less)),
        PredicateOp::NotEq | PredicateOp::NotIn => {
            let single_value = match (lower, upper) {
                (Some(l), Some(u)) if l.partial_cmp(u) == Some(Ordering::Equal) => Some(l),
                _ => None,
            };
            match single_value {
                Some(v) if !may_have_nulls => literals
                    .iter()
                    .all(|lit| v.partial_cmp(lit) != Some(Ordering::Equal)),
                _ => true,
            }
        }
    }
}

fn eval_bound(bound: &Bound, pred: &mut impl FnMut(&BoundPredicate) -> bool) -> bool {
    match bound {
        Bound::True => true,
        Bound::False => false,
        Bound::And(l, r) => eval_bound(l, pred) && eval_bound(r, pred),
        Bound::Or(l, r) => eval_bound(l, pred) || eval_bound(r, pred),
        Bound::Pred(p) => pred(p),
    }
}

/// Decides whether a data file may hold rows matching an expression.
#[derive(Debug, Clone)]
pub struct FileOverlapEvaluator {
    bound: Bound,
}

impl FileOverlapEvaluator {
    /// Bind `expr` against the table's schema and partition spec.
    pub fn new(
        schema: &Schema,
        spec: &PartitionSpec,
        expr: &Expression,
    ) -> Result<Self, ExpressionError> {
        Ok(Self {
            bound: bind_expression(schema, spec, expr.clone())?,
        })
    }

    /// `false` only if no row of `file` can match.
    pub fn may_overlap(&self, file: &DataFile) -> bool {
        eval_bound(&self.bound, &mut |p| predicate_may_match_file(p, file))
    }
}

fn predicate_may_match_file(p: &BoundPredicate, file: &DataFile) -> bool {
    if let Some(pos) = p.partition_pos
        && pos < file.partition.len()
    {
        return eval_value(p.op, &p.literals, file.partition.get(pos));
    }

    let decode = |raw: Option<&[u8]>| raw.and_then(|b| Datum::from_bytes(p.ty, b).ok());
    let lower = decode(file.lower_bound(p.field_id));
    let upper = decode(file.upper_bound(p.field_id));
    let nulls = file.null_count(p.field_id);
    let values = file.value_count(p.field_id);
    let may_have_nulls = nulls != Some(0);
    let all_null = matches!((nulls, values), (Some(n), Some(v)) if n == v);
    eval_range(
        p.op,
        &p.literals,
        lower.as_ref(),
        upper.as_ref(),
        may_have_nulls,
        all_null,
    )
}

/// Decides whether a manifest may hold matching files, using its
/// partition summaries. Only identity-partitioned columns can prune.
#[derive(Debug, Clone)]
pub struct ManifestEvaluator {
    bound: Bound,
    spec: PartitionSpec,
}

impl ManifestEvaluator {
    /// Bind `expr` against the table's schema and partition spec.
    pub fn new(
        schema: &Schema,
        spec: &PartitionSpec,
        expr: &Expression,
    ) -> Result<Self, ExpressionError> {
        Ok(Self {
            bound: bind_expression(schema, spec, expr.clone())?,
            spec: spec.clone(),
        })
    }

    /// `false` only if no file tracked by `manifest` can match.
    pub fn may_match(&self, manifest: &ManifestFile) -> bool {
        eval_bound(&self.bound, &mut |p| {
            let Some(pos) = p.partition_pos else {
                return true;
            };
            match manifest.partitions.get(pos) {
                Some(summary) => summary_may_match(p, summary, self.spec.field_type(pos)),
                None => true,
            }
        })
    }
}

fn summary_may_match(
    p: &BoundPredicate,
    summary: &PartitionFieldSummary,
    ty: Option<PrimitiveType>,
) -> bool {
    let Some(ty) = ty else { return true };
    let decode = |raw: &Option<Vec<u8>>| raw.as_deref().and_then(|b| Datum::from_bytes(ty, b).ok());
    let lower = decode(&summary.lower_bound);
    let upper = decode(&summary.upper_bound);
    let all_null = summary.contains_null && summary.lower_bound.is_none();
    eval_range(
        p.op,
        &p.literals,
        lower.as_ref(),
        upper.as_ref(),
        summary.contains_null,
        all_null,
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::metadata::{Metrics, NestedField};

    fn schema() -> Schema {
        Schema::new(vec![
            NestedField::required(1, "id", PrimitiveType::Long),
            NestedField::optional(2, "data", PrimitiveType::String),
            NestedField::required(3, "date", PrimitiveType::String),
        ])
        .expect("schema")
    }

    fn spec(schema: &Schema) -> PartitionSpec {
        PartitionSpec::builder(schema)
            .identity("date")
            .expect("date column")
            .build()
    }

    fn file(spec: &PartitionSpec, path: &str, day: &str, lo: i64, hi: i64) -> DataFile {
        DataFile::builder(spec)
            .with_path(path)
            .with_file_size_in_bytes(10)
            .with_partition_path(&format!("date={day}"))
            .expect("partition")
            .with_metrics(Metrics {
                record_count: 5,
                value_counts: Some(BTreeMap::from([(1, 5), (2, 5)])),
                null_value_counts: Some(BTreeMap::from([(1, 0), (2, 5)])),
                lower_bounds: Some(BTreeMap::from([(1, Datum::Long(lo).to_bytes())])),
                upper_bounds: Some(BTreeMap::from([(1, Datum::Long(hi).to_bytes())])),
                ..Metrics::default()
            })
            .build()
            .expect("data file")
    }

    #[test]
    fn partition_values_decide_identity_columns() -> Result<(), ExpressionError> {
        let schema = schema();
        let spec = spec(&schema);
        let day1 = file(&spec, "a.parquet", "2018-06-08", 0, 4);
        let day2 = file(&spec, "b.parquet", "2018-06-09", 5, 9);

        let eval =
            FileOverlapEvaluator::new(&schema, &spec, &Expression::equal("date", "2018-06-09"))?;
        assert!(!eval.may_overlap(&day1));
        assert!(eval.may_overlap(&day2));

        let not = FileOverlapEvaluator::new(
            &schema,
            &spec,
            &Expression::equal("date", "2018-06-09").negate(),
        )?;
        assert!(not.may_overlap(&day1));
        assert!(!not.may_overlap(&day2));
        Ok(())
    }

    #[test]
    fn column_bounds_decide_range_predicates() -> Result<(), ExpressionError> {
        let schema = schema();
        let spec = spec(&schema);
        let day1 = file(&spec, "a.parquet", "2018-06-08", 0, 4);
        let day2 = file(&spec, "b.parquet", "2018-06-09", 5, 9);

        let range = Expression::greater_than_or_equal("id", 5i64)
            .and(Expression::less_than_or_equal("id", 9i64));
        let eval = FileOverlapEvaluator::new(&schema, &spec, &range)?;
        assert!(!eval.may_overlap(&day1));
        assert!(eval.may_overlap(&day2));

        let lt = FileOverlapEvaluator::new(&schema, &spec, &Expression::less_than("id", 5i64))?;
        assert!(lt.may_overlap(&day1));
        assert!(!lt.may_overlap(&day2));

        let any = FileOverlapEvaluator::new(&schema, &spec, &Expression::is_in("id", [4i64, 12]))?;
        assert!(any.may_overlap(&day1));
        assert!(!any.may_overlap(&day2));
        Ok(())
    }

    #[test]
    fn null_counts_decide_null_predicates() -> Result<(), ExpressionError> {
        let schema = schema();
        let spec = spec(&schema);
        let f = file(&spec, "a.parquet", "2018-06-08", 0, 4);

        let id_null = FileOverlapEvaluator::new(&schema, &spec, &Expression::is_null("id"))?;
        assert!(!id_null.may_overlap(&f));

        let data_not_null =
            FileOverlapEvaluator::new(&schema, &spec, &Expression::not_null("data"))?;
        assert!(!data_not_null.may_overlap(&f));

        let data_eq = FileOverlapEvaluator::new(&schema, &spec, &Expression::equal("data", "x"))?;
        assert!(!data_eq.may_overlap(&f));
        Ok(())
    }

    #[test]
    fn missing_statistics_mean_maybe() -> Result<(), ExpressionError> {
        let schema = schema();
        let spec = spec(&schema);
        let bare = DataFile::builder(&spec)
            .with_path("c.parquet")
            .with_file_size_in_bytes(1)
            .with_record_count(1)
            .with_partition_path("date=2018-06-08")
            .expect("partition")
            .build()
            .expect("data file");

        let eval =
            FileOverlapEvaluator::new(&schema, &spec, &Expression::greater_than("id", 100i64))?;
        assert!(eval.may_overlap(&bare));
        Ok(())
    }

    #[test]
    fn binding_rejects_unknown_columns_and_bad_literals() {
        let schema = schema();
        let spec = spec(&schema);
        assert!(matches!(
            FileOverlapEvaluator::new(&schema, &spec, &Expression::equal("nope", 1i64)),
            Err(ExpressionError::UnknownColumn { .. })
        ));
        assert!(matches!(
            FileOverlapEvaluator::new(&schema, &spec, &Expression::equal("id", "five")),
            Err(ExpressionError::IncompatibleLiteral { .. })
        ));
    }

    #[test]
    fn manifest_summaries_prune_identity_partitions() -> Result<(), ExpressionError> {
        let schema = schema();
        let spec = spec(&schema);
        let manifest = ManifestFile {
            path: "m.json".into(),
            length: 1,
            partition_spec_id: 0,
            added_snapshot_id: 1,
            added_files_count: 1,
            existing_files_count: 0,
            deleted_files_count: 0,
            added_rows_count: 1,
            existing_rows_count: 0,
            deleted_rows_count: 0,
            partitions: vec![PartitionFieldSummary {
                contains_null: false,
                lower_bound: Some(Datum::from("2018-06-08").to_bytes()),
                upper_bound: Some(Datum::from("2018-06-08").to_bytes()),
            }],
        };

        let day2 =
            ManifestEvaluator::new(&schema, &spec, &Expression::equal("date", "2018-06-09"))?;
        assert!(!day2.may_match(&manifest));

        let day1 =
            ManifestEvaluator::new(&schema, &spec, &Expression::equal("date", "2018-06-08"))?;
        assert!(day1.may_match(&manifest));

        let by_id = ManifestEvaluator::new(&schema, &spec, &Expression::equal("id", 1i64))?;
        assert!(by_id.may_match(&manifest));
        Ok(())
    }
}
