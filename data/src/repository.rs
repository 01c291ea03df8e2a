use async_trait::async_trait;

use crate::entity::Entity;
use crate::error::DataError;
use crate::page::{Page, Pageable};

/// Base CRUD surface every synthesized repository provides, independent of
/// whichever query methods an application adds on top.
///
/// Implemented once per backend (see `trellis-data-sqlx::SqlxRepository`);
/// the `#[repository]` macro wires an application's repository trait to
/// delegate here for the operations it doesn't declare a query method for.
#[async_trait]
pub trait Repository<T, ID>: Send + Sync
where
    T: Entity<Id = ID> + Send + Sync,
    ID: Send + Sync + Clone + 'static,
{
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, DataError>;
    async fn find_all(&self) -> Result<Vec<T>, DataError>;
    async fn find_all_paged(&self, pageable: &Pageable) -> Result<Page<T>, DataError>;
    async fn find_all_by_id(&self, ids: &[ID]) -> Result<Vec<T>, DataError>;

    async fn save(&self, entity: T) -> Result<T, DataError>;
    async fn save_all(&self, entities: Vec<T>) -> Result<Vec<T>, DataError>;
    async fn save_and_flush(&self, entity: T) -> Result<T, DataError> {
        let saved = self.save(entity).await?;
        self.flush().await?;
        Ok(saved)
    }

    async fn delete(&self, id: ID) -> Result<(), DataError>;
    async fn delete_all_by_id(&self, ids: &[ID]) -> Result<(), DataError>;
    async fn delete_all_in_batch(&self) -> Result<u64, DataError>;

    async fn exists_by_id(&self, id: ID) -> Result<bool, DataError> {
        Ok(self.find_by_id(id).await?.is_some())
    }
    async fn count(&self) -> Result<u64, DataError>;

    /// Case-insensitive contains filter across `filters`' fields. `match_any`
    /// ORs the predicates together (the generic `q`-parameter fallback);
    /// otherwise they're ANDed (field-specific query parameters narrowing
    /// the same search).
    async fn search(&self, filters: &[(String, String)], match_any: bool) -> Result<Vec<T>, DataError>;

    /// No-op for backends without a write-behind cache; present so callers
    /// have a uniform flush point after batches of writes.
    async fn flush(&self) -> Result<(), DataError> {
        Ok(())
    }
}

/// Lets an `Arc`-held repository (the shape every injected dependency takes)
/// stand in for the base trait directly, so macro-generated code can call
/// `Repository::method(&self.0.repository_field, ...)` without reaching
/// through an extra accessor.
#[async_trait]
impl<R, E, ID> Repository<E, ID> for std::sync::Arc<R>
where
    R: Repository<E, ID> + ?Sized,
    E: Entity<Id = ID> + Send + Sync,
    ID: Send + Sync + Clone + 'static,
{
    async fn find_by_id(&self, id: ID) -> Result<Option<E>, DataError> {
        R::find_by_id(self, id).await
    }
    async fn find_all(&self) -> Result<Vec<E>, DataError> {
        R::find_all(self).await
    }
    async fn find_all_paged(&self, pageable: &Pageable) -> Result<Page<E>, DataError> {
        R::find_all_paged(self, pageable).await
    }
    async fn find_all_by_id(&self, ids: &[ID]) -> Result<Vec<E>, DataError> {
        R::find_all_by_id(self, ids).await
    }

    async fn save(&self, entity: E) -> Result<E, DataError> {
        R::save(self, entity).await
    }
    async fn save_all(&self, entities: Vec<E>) -> Result<Vec<E>, DataError> {
        R::save_all(self, entities).await
    }

    async fn delete(&self, id: ID) -> Result<(), DataError> {
        R::delete(self, id).await
    }
    async fn delete_all_by_id(&self, ids: &[ID]) -> Result<(), DataError> {
        R::delete_all_by_id(self, ids).await
    }
    async fn delete_all_in_batch(&self) -> Result<u64, DataError> {
        R::delete_all_in_batch(self).await
    }

    async fn count(&self) -> Result<u64, DataError> {
        R::count(self).await
    }

    async fn search(&self, filters: &[(String, String)], match_any: bool) -> Result<Vec<E>, DataError> {
        R::search(self, filters, match_any).await
    }
}
