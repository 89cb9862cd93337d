//! `WHERE`-clause evaluation: a parsed [`Expr`] tree resolved against a
//! table [`Schema`] once, then evaluated per-row with three-valued
//! logic. Resolving column names up front means a typo surfaces before
//! a single row is scanned, not mid-scan.

use crate::error::{DbError, DbResult, ErrorKind};
use crate::record::{Field, Row, Schema, Tri, TypeId};
use crate::sql::ast::{CompareOp, Expr, Literal};

/// An [`Expr`] with column names resolved to indices and literals
/// resolved to typed [`Field`]s, ready to evaluate against any row
/// conforming to the [`Schema`] it was compiled from.
#[derive(Debug, Clone)]
pub enum CompiledExpr {
    Compare { column: usize, op: CompareOp, value: Field },
    IsNull(usize),
    IsNotNull(usize),
    And(Box<CompiledExpr>, Box<CompiledExpr>),
    Or(Box<CompiledExpr>, Box<CompiledExpr>),
}

pub(crate) fn literal_to_field(literal: &Literal, type_id: TypeId) -> DbResult<Field> {
    match (literal, type_id) {
        (Literal::Null, ty) => Ok(Field::null(ty)),
        (Literal::Int(v), TypeId::Int) => Ok(Field::int(*v)),
        (Literal::Float(v), TypeId::Float) => Ok(Field::float(*v)),
        (Literal::Str(s), TypeId::Char(n)) => Ok(Field::char(n, s)),
        _ => Err(DbError::failed("literal does not match the column's declared type")),
    }
}

impl CompiledExpr {
    pub fn compile(expr: &Expr, schema: &Schema) -> DbResult<Self> {
        let resolve = |name: &str| -> DbResult<usize> {
            schema
                .index_of(name)
                .ok_or_else(|| DbError::new(ErrorKind::ColumnNameNotExist, name))
        };
        Ok(match expr {
            Expr::Compare { column, op, value } => {
                let column = resolve(column)?;
                let type_id = schema.column(column).type_id;
                CompiledExpr::Compare {
                    column,
                    op: *op,
                    value: literal_to_field(value, type_id)?,
                }
            }
            Expr::IsNull(column) => CompiledExpr::IsNull(resolve(column)?),
            Expr::IsNotNull(column) => CompiledExpr::IsNotNull(resolve(column)?),
            Expr::And(a, b) => CompiledExpr::And(
                Box::new(CompiledExpr::compile(a, schema)?),
                Box::new(CompiledExpr::compile(b, schema)?),
            ),
            Expr::Or(a, b) => CompiledExpr::Or(
                Box::new(CompiledExpr::compile(a, schema)?),
                Box::new(CompiledExpr::compile(b, schema)?),
            ),
        })
    }

    pub fn eval(&self, row: &Row) -> Tri {
        match self {
            CompiledExpr::Compare { column, op, value } => {
                let field = row.field(*column);
                match op {
                    CompareOp::Eq => field.tri_eq(value),
                    CompareOp::Ne => field.tri_ne(value),
                    CompareOp::Lt => field.tri_lt(value),
                    CompareOp::Le => field.tri_le(value),
                    CompareOp::Gt => field.tri_gt(value),
                    CompareOp::Ge => field.tri_ge(value),
                }
            }
            CompiledExpr::IsNull(column) => Tri::from_bool(row.field(*column).is_null()),
            CompiledExpr::IsNotNull(column) => Tri::from_bool(!row.field(*column).is_null()),
            CompiledExpr::And(a, b) => a.eval(row).and(b.eval(row)),
            CompiledExpr::Or(a, b) => a.eval(row).or(b.eval(row)),
        }
    }
}

/// One leg of a top-level `AND` conjunction of equality/inequality
/// comparisons — the shape the executor's index-acceleration path looks
/// for (spec §4.8).
#[derive(Debug, Clone)]
pub struct Conjunct {
    pub column: usize,
    pub op: CompareOp,
    pub value: Field,
}

/// Flattens a conjunction of `Compare` nodes joined by top-level `AND`
/// into a flat list. Any `Or`, `IsNull`, or `IsNotNull` node anywhere in
/// the tree disqualifies the whole expression from acceleration — the
/// executor falls back to evaluating it as a residual filter instead.
pub fn flatten_conjunction(expr: &CompiledExpr) -> Option<Vec<Conjunct>> {
    match expr {
        CompiledExpr::Compare { column, op, value } => Some(vec![Conjunct {
            column: *column,
            op: *op,
            value: value.clone(),
        }]),
        CompiledExpr::And(a, b) => {
            let mut left = flatten_conjunction(a)?;
            left.extend(flatten_conjunction(b)?);
            Some(left)
        }
        CompiledExpr::Or(_, _) | CompiledExpr::IsNull(_) | CompiledExpr::IsNotNull(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Column;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false, false),
            Column::new("score", TypeId::Float, 1, true, false),
        ])
    }

    fn row(id: i32, score: Option<f32>) -> Row {
        Row::new(vec![
            Field::int(id),
            score.map(Field::float).unwrap_or_else(|| Field::null(TypeId::Float)),
        ])
    }

    #[test]
    fn compiled_and_short_circuits_to_false() {
        let expr = Expr::And(
            Box::new(Expr::Compare { column: "id".into(), op: CompareOp::Eq, value: Literal::Int(1) }),
            Box::new(Expr::Compare { column: "id".into(), op: CompareOp::Eq, value: Literal::Int(2) }),
        );
        let compiled = CompiledExpr::compile(&expr, &schema()).unwrap();
        assert_eq!(compiled.eval(&row(1, Some(1.0))), Tri::False);
    }

    #[test]
    fn null_score_makes_comparison_null_but_is_null_check_true() {
        let cmp = CompiledExpr::compile(
            &Expr::Compare { column: "score".into(), op: CompareOp::Gt, value: Literal::Float(0.0) },
            &schema(),
        )
        .unwrap();
        assert_eq!(cmp.eval(&row(1, None)), Tri::Null);

        let is_null = CompiledExpr::compile(&Expr::IsNull("score".into()), &schema()).unwrap();
        assert_eq!(is_null.eval(&row(1, None)), Tri::True);
    }

    #[test]
    fn unknown_column_fails_to_compile() {
        let expr = Expr::Compare { column: "nope".into(), op: CompareOp::Eq, value: Literal::Int(1) };
        let err = CompiledExpr::compile(&expr, &schema()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNameNotExist);
    }

    #[test]
    fn flatten_conjunction_rejects_or() {
        let expr = Expr::Or(
            Box::new(Expr::Compare { column: "id".into(), op: CompareOp::Eq, value: Literal::Int(1) }),
            Box::new(Expr::Compare { column: "id".into(), op: CompareOp::Eq, value: Literal::Int(2) }),
        );
        let compiled = CompiledExpr::compile(&expr, &schema()).unwrap();
        assert!(flatten_conjunction(&compiled).is_none());
    }

    #[test]
    fn flatten_conjunction_collects_every_leg() {
        let expr = Expr::And(
            Box::new(Expr::Compare { column: "id".into(), op: CompareOp::Ge, value: Literal::Int(1) }),
            Box::new(Expr::Compare { column: "id".into(), op: CompareOp::Le, value: Literal::Int(10) }),
        );
        let compiled = CompiledExpr::compile(&expr, &schema()).unwrap();
        let legs = flatten_conjunction(&compiled).unwrap();
        assert_eq!(legs.len(), 2);
    }
}
