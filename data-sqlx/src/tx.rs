use std::ops::{Deref, DerefMut};

use sqlx::{Database, Pool, Transaction};

use crate::error::SqlxErrorExt;
use trellis_data::DataError;

/// A borrowed transaction handed to a controller method via a `#[managed]`
/// parameter. Dropping it without calling [`Tx::commit`] rolls back, which
/// is what makes an early `?` return inside a handler safe.
pub struct Tx<'a, DB: Database>(Transaction<'a, DB>);

impl<'a, DB: Database> Tx<'a, DB> {
    pub async fn begin(pool: &Pool<DB>) -> Result<Self, DataError> {
        let tx = pool.begin().await.map_err(SqlxErrorExt::into_data_error)?;
        Ok(Tx(tx))
    }

    pub async fn commit(self) -> Result<(), DataError> {
        self.0.commit().await.map_err(SqlxErrorExt::into_data_error)
    }

    pub async fn rollback(self) -> Result<(), DataError> {
        self.0.rollback().await.map_err(SqlxErrorExt::into_data_error)
    }

    pub fn into_inner(self) -> Transaction<'a, DB> {
        self.0
    }

    pub fn as_mut(&mut self) -> &mut Transaction<'a, DB> {
        &mut self.0
    }
}

impl<'a, DB: Database> Deref for Tx<'a, DB> {
    type Target = Transaction<'a, DB>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a, DB: Database> DerefMut for Tx<'a, DB> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Runs `work` inside a fresh transaction, committing if it returns `Ok` and
/// rolling back (implicitly, on drop) if it returns `Err`. This is the
/// shape the Repository Synthesizer's execution engine runs every
/// write-bearing generated method through.
pub async fn run_in_transaction<DB, F, Fut, T>(pool: &Pool<DB>, work: F) -> Result<T, DataError>
where
    DB: Database,
    F: FnOnce(&mut Transaction<'_, DB>) -> Fut,
    Fut: std::future::Future<Output = Result<T, DataError>>,
{
    let mut tx = pool.begin().await.map_err(SqlxErrorExt::into_data_error)?;
    match work(&mut tx).await {
        Ok(value) => {
            tx.commit().await.map_err(SqlxErrorExt::into_data_error)?;
            Ok(value)
        }
        Err(err) => {
            let _ = tx.rollback().await;
            Err(err)
        }
    }
}
