use trellis_data::Entity;

use crate::query_sql::QueryParam;

/// Extends [`Entity`] with the column values needed to build `INSERT`/
/// `UPDATE` statements generically, independent of the concrete Rust field
/// types. The `#[entity]` macro generates this impl; it is equivalent to
/// asking the entity to describe itself once in terms the query builder
/// already knows how to bind (see [`QueryParam`]).
pub trait SqlxEntity: Entity {
    /// Column name/value pairs in the same order as [`Entity::columns`],
    /// excluding the id column.
    fn column_values(&self) -> Vec<(&'static str, QueryParam)>;
}

/// Gives a type access to the pool it should run its queries against.
/// Implemented once per application state struct (mirrors the teacher's
/// `HasPool` trait used by transaction-scoped resources).
pub trait HasPool<DB: sqlx::Database> {
    fn pool(&self) -> &sqlx::Pool<DB>;
}

/// Converts a scalar field value into the [`QueryParam`] the query builder
/// binds. The `#[entity]` macro calls this once per column when building
/// [`SqlxEntity::column_values`], so an entity only needs ordinary Rust
/// field types, never a hand-written `QueryParam` match.
pub trait IntoQueryParam {
    fn into_query_param(self) -> QueryParam;
}

impl IntoQueryParam for String {
    fn into_query_param(self) -> QueryParam {
        QueryParam::Text(self)
    }
}

impl IntoQueryParam for i64 {
    fn into_query_param(self) -> QueryParam {
        QueryParam::Int(self)
    }
}

impl IntoQueryParam for i32 {
    fn into_query_param(self) -> QueryParam {
        QueryParam::Int(self as i64)
    }
}

impl IntoQueryParam for f64 {
    fn into_query_param(self) -> QueryParam {
        QueryParam::Float(self)
    }
}

impl IntoQueryParam for f32 {
    fn into_query_param(self) -> QueryParam {
        QueryParam::Float(self as f64)
    }
}

impl IntoQueryParam for bool {
    fn into_query_param(self) -> QueryParam {
        QueryParam::Bool(self)
    }
}
