//! `sqlx`-backed execution engine for Trellis repositories: runs the
//! [`trellis_data::query_parser`]'s precomputed [`trellis_data::QueryIntent`]s
//! against a pool, and provides the base CRUD implementation the
//! Repository Synthesizer falls back to for undeclared methods.
//!
//! Enable the `sqlite`, `postgres`, or `mysql` feature matching the pool
//! type in use; all three are re-exports of the corresponding `sqlx`
//! feature.

pub mod dialect;
pub mod entity_ext;
pub mod error;
pub mod query_sql;
pub mod repository;
pub mod tx;

pub use dialect::Dialect;
pub use entity_ext::{HasPool, IntoQueryParam, SqlxEntity};
pub use error::{SqlxDataError, SqlxErrorExt, SqlxResult};
pub use query_sql::QueryParam;
pub use repository::SqlxRepository;
pub use tx::{run_in_transaction, Tx};
