use std::fmt;

use trellis_data::DataError;

/// Errors local to building/running a generated SQL statement, before they
/// are folded into the backend-agnostic [`DataError`].
#[derive(Debug)]
pub enum SqlxDataError {
    InvalidIdentifier(String),
    MissingParam,
    ParamMismatch(String),
    Sqlx(sqlx::Error),
}

impl fmt::Display for SqlxDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlxDataError::InvalidIdentifier(ident) => write!(f, "invalid identifier: {ident}"),
            SqlxDataError::MissingParam => write!(f, "query intent expected more bind parameters than were supplied"),
            SqlxDataError::ParamMismatch(desc) => write!(f, "bound parameter type did not match the condition: {desc}"),
            SqlxDataError::Sqlx(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SqlxDataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SqlxDataError::Sqlx(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for SqlxDataError {
    fn from(err: sqlx::Error) -> Self {
        SqlxDataError::Sqlx(err)
    }
}

impl From<SqlxDataError> for DataError {
    fn from(err: SqlxDataError) -> Self {
        match err {
            SqlxDataError::Sqlx(sqlx::Error::RowNotFound) => DataError::NotFound("row not found".into()),
            SqlxDataError::Sqlx(e) => DataError::database(e),
            other => DataError::Other(other.to_string()),
        }
    }
}

/// Maps a raw `sqlx::Error` to the framework's [`DataError`], the way the
/// rest of the pipeline expects to see data-layer failures.
pub trait SqlxErrorExt {
    fn into_data_error(self) -> DataError;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_data_error(self) -> DataError {
        match self {
            sqlx::Error::RowNotFound => DataError::NotFound("row not found".into()),
            other => DataError::database(other),
        }
    }
}

pub type SqlxResult<T> = Result<T, DataError>;
