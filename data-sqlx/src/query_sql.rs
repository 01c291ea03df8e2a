//! Turns a [`QueryIntent`] into an executable `sqlx::QueryBuilder` fragment.
//!
//! Column identifiers are spliced as raw SQL (after validation); every
//! value is passed through `push_bind`, never string-interpolated.

use sqlx::{Database, QueryBuilder};

use trellis_data::query_parser::{Condition, ConditionOp, Connector, Direction, QueryIntent};

use crate::dialect::is_valid_identifier;
use crate::error::SqlxDataError;

/// A value bound into a generated query. The `#[repository]` macro converts
/// each method argument into one of these in declaration order; list
/// variants back `In`/`NotIn` conditions.
#[derive(Debug, Clone)]
pub enum QueryParam {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    TextList(Vec<String>),
    IntList(Vec<i64>),
}

/// Appends ` WHERE ...` and ` ORDER BY ...` clauses for `intent` to `qb`,
/// consuming `params` in bind order (one entry per condition, except
/// `Between` which consumes two and `IsNull`/`IsNotNull`/`True`/`False`
/// which consume none — see [`trellis_data::ConditionOp::param_count`]).
pub fn append_intent<'a, DB>(
    qb: &mut QueryBuilder<'a, DB>,
    intent: &QueryIntent,
    params: Vec<QueryParam>,
) -> Result<(), SqlxDataError>
where
    DB: Database,
    String: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB> + 'a,
    i64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB> + 'a,
    f64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB> + 'a,
    bool: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB> + 'a,
{
    let mut params = params.into_iter();

    if !intent.conditions.is_empty() {
        qb.push(" WHERE ");
        for (i, cond) in intent.conditions.iter().enumerate() {
            if i > 0 {
                match cond.connector {
                    Some(Connector::Or) => {
                        qb.push(" OR ");
                    }
                    _ => {
                        qb.push(" AND ");
                    }
                }
            }
            append_condition(qb, cond, &mut params)?;
        }
    }

    if !intent.order_by.is_empty() {
        qb.push(" ORDER BY ");
        for (i, term) in intent.order_by.iter().enumerate() {
            if !is_valid_identifier(&term.field) {
                return Err(SqlxDataError::InvalidIdentifier(term.field.clone()));
            }
            if i > 0 {
                qb.push(", ");
            }
            qb.push(term.field.as_str());
            qb.push(match term.direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
        }
    }

    Ok(())
}

fn append_condition<'a, DB, I>(
    qb: &mut QueryBuilder<'a, DB>,
    cond: &Condition,
    params: &mut I,
) -> Result<(), SqlxDataError>
where
    DB: Database,
    I: Iterator<Item = QueryParam>,
    String: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB> + 'a,
    i64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB> + 'a,
    f64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB> + 'a,
    bool: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB> + 'a,
{
    if !is_valid_identifier(&cond.field) {
        return Err(SqlxDataError::InvalidIdentifier(cond.field.clone()));
    }

    match cond.op {
        ConditionOp::IsNull => {
            qb.push(cond.field.as_str()).push(" IS NULL");
        }
        ConditionOp::IsNotNull => {
            qb.push(cond.field.as_str()).push(" IS NOT NULL");
        }
        ConditionOp::True => {
            qb.push(cond.field.as_str()).push(" = TRUE");
        }
        ConditionOp::False => {
            qb.push(cond.field.as_str()).push(" = FALSE");
        }
        ConditionOp::Between => {
            qb.push(cond.field.as_str()).push(" BETWEEN ");
            bind_scalar(qb, next_param(params)?)?;
            qb.push(" AND ");
            bind_scalar(qb, next_param(params)?)?;
        }
        ConditionOp::In | ConditionOp::NotIn => {
            qb.push(cond.field.as_str());
            qb.push(if matches!(cond.op, ConditionOp::NotIn) {
                " NOT IN ("
            } else {
                " IN ("
            });
            match next_param(params)? {
                QueryParam::TextList(values) => {
                    let mut sep = qb.separated(", ");
                    for v in values {
                        sep.push_bind(v);
                    }
                }
                QueryParam::IntList(values) => {
                    let mut sep = qb.separated(", ");
                    for v in values {
                        sep.push_bind(v);
                    }
                }
                other => return Err(SqlxDataError::ParamMismatch(format!("{other:?}"))),
            }
            qb.push(")");
        }
        ConditionOp::Like | ConditionOp::Containing | ConditionOp::StartingWith | ConditionOp::EndingWith => {
            qb.push(cond.field.as_str()).push(" LIKE ");
            let value = match next_param(params)? {
                QueryParam::Text(s) => s,
                other => return Err(SqlxDataError::ParamMismatch(format!("{other:?}"))),
            };
            let pattern = match cond.op.wildcard_template() {
                Some(template) => template.replace("{}", &value),
                None => value,
            };
            qb.push_bind(pattern);
        }
        ConditionOp::Equals
        | ConditionOp::GreaterThan
        | ConditionOp::GreaterThanEqual
        | ConditionOp::LessThan
        | ConditionOp::LessThanEqual
        | ConditionOp::Not => {
            qb.push(cond.field.as_str());
            qb.push(match cond.op {
                ConditionOp::Equals => " = ",
                ConditionOp::GreaterThan => " > ",
                ConditionOp::GreaterThanEqual => " >= ",
                ConditionOp::LessThan => " < ",
                ConditionOp::LessThanEqual => " <= ",
                ConditionOp::Not => " != ",
                _ => unreachable!(),
            });
            bind_scalar(qb, next_param(params)?)?;
        }
    }
    Ok(())
}

fn next_param<I: Iterator<Item = QueryParam>>(params: &mut I) -> Result<QueryParam, SqlxDataError> {
    params.next().ok_or(SqlxDataError::MissingParam)
}

fn bind_scalar<'a, DB>(qb: &mut QueryBuilder<'a, DB>, param: QueryParam) -> Result<(), SqlxDataError>
where
    DB: Database,
    String: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB> + 'a,
    i64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB> + 'a,
    f64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB> + 'a,
    bool: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB> + 'a,
{
    match param {
        QueryParam::Text(v) => {
            qb.push_bind(v);
            Ok(())
        }
        QueryParam::Int(v) => {
            qb.push_bind(v);
            Ok(())
        }
        QueryParam::Float(v) => {
            qb.push_bind(v);
            Ok(())
        }
        QueryParam::Bool(v) => {
            qb.push_bind(v);
            Ok(())
        }
        other => Err(SqlxDataError::ParamMismatch(format!("{other:?}"))),
    }
}
