//! Entities, repositories, pagination, and the query-method-name parser that
//! the repository synthesizer is built on top of. Backend-agnostic: see
//! `trellis-data-sqlx` for the `sqlx` execution engine.

pub mod entity;
pub mod error;
pub mod page;
pub mod query_parser;
pub mod repository;

pub use entity::Entity;
pub use error::DataError;
pub use page::{Page, Pageable};
pub use query_parser::{parse as parse_query_method, Condition, ConditionOp, Connector, Direction, OrderTerm, QueryIntent, QueryParseError, Operation as QueryOperation};
pub use repository::Repository;
