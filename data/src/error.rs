use std::error::Error as StdError;
use std::fmt;

/// Errors surfaced by entities, repositories, and the query-method parser.
#[derive(Debug)]
pub enum DataError {
    /// No row matched the requested id / predicate.
    NotFound(String),
    /// The underlying database driver returned an error.
    Database(Box<dyn StdError + Send + Sync>),
    /// A method name could not be parsed into a query intent.
    QueryParse(super::query_parser::QueryParseError),
    /// Anything else (constraint violation translated to a message, etc).
    Other(String),
}

impl DataError {
    pub fn database<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        DataError::Database(Box::new(err))
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::NotFound(what) => write!(f, "not found: {what}"),
            DataError::Database(e) => write!(f, "database error: {e}"),
            DataError::QueryParse(e) => write!(f, "query parse error: {e}"),
            DataError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl StdError for DataError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DataError::Database(e) => Some(e.as_ref()),
            DataError::QueryParse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<super::query_parser::QueryParseError> for DataError {
    fn from(err: super::query_parser::QueryParseError) -> Self {
        DataError::QueryParse(err)
    }
}
