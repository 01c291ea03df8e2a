use async_trait::async_trait;
use sqlx::{Database, Pool, QueryBuilder};

use trellis_data::page::{Page, Pageable};
use trellis_data::query_parser::QueryIntent;
use trellis_data::{DataError, Entity, Repository};

use crate::entity_ext::SqlxEntity;
use crate::error::SqlxErrorExt;
use crate::query_sql::{self, QueryParam};

/// The concrete, `sqlx`-backed implementation of [`Repository`]. One
/// instance is created per entity type by the `#[repository]` macro
/// expansion and reused as a singleton bean.
#[derive(Clone)]
pub struct SqlxRepository<T, DB: Database> {
    pool: Pool<DB>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T, DB: Database> SqlxRepository<T, DB> {
    pub fn new(pool: Pool<DB>) -> Self {
        SqlxRepository {
            pool,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }

    /// Starts a `SELECT <columns> FROM <table>` builder applications can
    /// extend for ad hoc queries outside the generated set.
    pub fn select_builder(&self) -> QueryBuilder<'static, DB>
    where
        T: Entity,
    {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(T::columns().join(", "));
        qb.push(" FROM ");
        qb.push(T::table_name());
        qb
    }

    /// Runs a precomputed [`QueryIntent`] (from `trellis-data::query_parser`)
    /// against this entity's table and returns the matching rows. This is
    /// what a generated `findBy...` method calls at request time; the
    /// intent itself is parsed once and cached at startup.
    pub async fn find_by_intent(
        &self,
        intent: &QueryIntent,
        params: Vec<QueryParam>,
    ) -> Result<Vec<T>, DataError>
    where
        T: Entity + Send + Sync + Unpin + for<'r> sqlx::FromRow<'r, DB::Row>,
        String: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
        i64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
        f64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
        bool: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
        for<'c> &'c Pool<DB>: sqlx::Executor<'c, Database = DB>,
    {
        let mut qb = self.select_builder();
        query_sql::append_intent(&mut qb, intent, params)
            .map_err(|e| DataError::Other(e.to_string()))?;
        let rows = qb
            .build_query_as::<T>()
            .fetch_all(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        Ok(rows)
    }

    /// `count`/`exists`/`delete` variants of the same precomputed intent.
    pub async fn count_by_intent(&self, intent: &QueryIntent, params: Vec<QueryParam>) -> Result<i64, DataError>
    where
        T: Entity,
        String: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
        i64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
        f64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
        bool: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
        for<'c> &'c Pool<DB>: sqlx::Executor<'c, Database = DB>,
        (i64,): for<'r> sqlx::FromRow<'r, DB::Row>,
    {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM ");
        qb.push(T::table_name());
        query_sql::append_intent(&mut qb, intent, params).map_err(|e| DataError::Other(e.to_string()))?;
        let (count,): (i64,) = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        Ok(count)
    }

    pub async fn delete_by_intent(&self, intent: &QueryIntent, params: Vec<QueryParam>) -> Result<u64, DataError>
    where
        T: Entity,
        String: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
        i64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
        f64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
        bool: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
        for<'c> &'c Pool<DB>: sqlx::Executor<'c, Database = DB>,
    {
        let mut qb = QueryBuilder::new("DELETE FROM ");
        qb.push(T::table_name());
        query_sql::append_intent(&mut qb, intent, params).map_err(|e| DataError::Other(e.to_string()))?;
        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl<T, DB> Repository<T, T::Id> for SqlxRepository<T, DB>
where
    T: Entity + SqlxEntity + Send + Sync + Unpin + for<'r> sqlx::FromRow<'r, DB::Row>,
    DB: Database,
    T::Id: Send + Sync + Clone + for<'q> sqlx::Encode<'q, DB> + sqlx::Type<DB> + 'static,
    String: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
    i64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
    f64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
    bool: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
    for<'c> &'c Pool<DB>: sqlx::Executor<'c, Database = DB>,
{
    async fn find_by_id(&self, id: T::Id) -> Result<Option<T>, DataError> {
        let mut qb = self.select_builder();
        qb.push(" WHERE ");
        qb.push(T::id_column());
        qb.push(" = ");
        qb.push_bind(id);
        push_not_deleted::<T, DB>(&mut qb, true);
        let row = qb
            .build_query_as::<T>()
            .fetch_optional(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        Ok(row)
    }

    async fn find_all(&self) -> Result<Vec<T>, DataError> {
        let mut qb = self.select_builder();
        if let Some(col) = T::deleted_at_column() {
            qb.push(" WHERE ");
            qb.push(col);
            qb.push(" IS NULL");
        }
        let rows = qb
            .build_query_as::<T>()
            .fetch_all(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        Ok(rows)
    }

    async fn find_all_paged(&self, pageable: &Pageable) -> Result<Page<T>, DataError> {
        let mut count_qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", T::table_name()));
        if let Some(col) = T::deleted_at_column() {
            count_qb.push(" WHERE ");
            count_qb.push(col);
            count_qb.push(" IS NULL");
        }
        let total: (i64,) = count_qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;

        let mut qb = self.select_builder();
        if let Some(col) = T::deleted_at_column() {
            qb.push(" WHERE ");
            qb.push(col);
            qb.push(" IS NULL");
        }
        if let Some(sort) = &pageable.sort {
            if crate::dialect::is_valid_identifier(sort) {
                qb.push(" ORDER BY ");
                qb.push(sort.as_str());
            }
        }
        qb.push(" LIMIT ");
        qb.push_bind(pageable.size as i64);
        qb.push(" OFFSET ");
        qb.push_bind(pageable.offset() as i64);

        let content = qb
            .build_query_as::<T>()
            .fetch_all(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;

        Ok(Page::new(content, pageable, total.0.max(0) as u64))
    }

    async fn find_all_by_id(&self, ids: &[T::Id]) -> Result<Vec<T>, DataError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = self.select_builder();
        qb.push(" WHERE ");
        qb.push(T::id_column());
        qb.push(" IN (");
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id.clone());
        }
        qb.push(")");
        push_not_deleted::<T, DB>(&mut qb, true);
        let rows = qb
            .build_query_as::<T>()
            .fetch_all(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        Ok(rows)
    }

    /// Case-insensitive `LIKE` across `filters`' fields, `match_any` toggling
    /// OR (the generic `q` fallback) vs AND (explicit per-field filters).
    /// Field names come from the entity's own declared columns, never from
    /// unvalidated request input, so no identifier-injection check is needed
    /// beyond that the caller upholds it.
    async fn search(&self, filters: &[(String, String)], match_any: bool) -> Result<Vec<T>, DataError> {
        if filters.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = self.select_builder();
        qb.push(" WHERE (");
        for (i, (field, value)) in filters.iter().enumerate() {
            if !crate::dialect::is_valid_identifier(field) {
                return Err(DataError::Other(format!("invalid search field '{field}'")));
            }
            if i > 0 {
                qb.push(if match_any { " OR " } else { " AND " });
            }
            qb.push("LOWER(");
            qb.push(field.as_str());
            qb.push(") LIKE LOWER(");
            qb.push_bind(format!("%{value}%"));
            qb.push(")");
        }
        qb.push(")");
        push_not_deleted::<T, DB>(&mut qb, true);
        let rows = qb
            .build_query_as::<T>()
            .fetch_all(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        Ok(rows)
    }

    /// Upsert by id: `UPDATE` first, and only `INSERT` (with the id column
    /// included explicitly) if no row matched. Entities are expected to
    /// carry a caller-assigned id — this framework has no reflection to
    /// distinguish "new" from "existing" any other way.
    async fn save(&self, entity: T) -> Result<T, DataError> {
        let values = entity.column_values();
        let id = entity.id();

        let mut update_qb = QueryBuilder::new(format!("UPDATE {} SET ", T::table_name()));
        for (i, (name, value)) in values.iter().enumerate() {
            if i > 0 {
                update_qb.push(", ");
            }
            update_qb.push(*name);
            update_qb.push(" = ");
            bind_value(&mut update_qb, value.clone());
        }
        update_qb.push(" WHERE ");
        update_qb.push(T::id_column());
        update_qb.push(" = ");
        update_qb.push_bind(id.clone());

        let result = update_qb.build().execute(&self.pool).await.map_err(SqlxErrorExt::into_data_error)?;

        if result.rows_affected() == 0 {
            let mut insert_qb = QueryBuilder::new(format!("INSERT INTO {} (", T::table_name()));
            let mut names = insert_qb.separated(", ");
            names.push(T::id_column());
            for (name, _) in &values {
                names.push(*name);
            }
            insert_qb.push(") VALUES (");
            insert_qb.push_bind(id.clone());
            for (_, value) in values {
                insert_qb.push(", ");
                bind_value(&mut insert_qb, value);
            }
            insert_qb.push(")");

            insert_qb.build().execute(&self.pool).await.map_err(SqlxErrorExt::into_data_error)?;
        }

        self.find_by_id(id).await?.ok_or_else(|| DataError::Other("row vanished immediately after save".into()))
    }

    async fn save_all(&self, entities: Vec<T>) -> Result<Vec<T>, DataError> {
        let mut saved = Vec::with_capacity(entities.len());
        for entity in entities {
            saved.push(self.save(entity).await?);
        }
        Ok(saved)
    }

    /// Tombstones the row (`deleted_at = CURRENT_TIMESTAMP`) when the entity
    /// opts into soft-delete, hard-deletes otherwise. Either way, a no-op
    /// delete (id already gone, or already tombstoned) is reported as
    /// [`DataError::NotFound`] rather than silently succeeding, since batch
    /// callers rely on this to tell which ids actually did something.
    async fn delete(&self, id: T::Id) -> Result<(), DataError> {
        let rows_affected = match T::deleted_at_column() {
            Some(col) => {
                let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", T::table_name()));
                qb.push(col);
                qb.push(" = CURRENT_TIMESTAMP WHERE ");
                qb.push(T::id_column());
                qb.push(" = ");
                qb.push_bind(id);
                qb.push(" AND ");
                qb.push(col);
                qb.push(" IS NULL");
                qb.build().execute(&self.pool).await.map_err(SqlxErrorExt::into_data_error)?.rows_affected()
            }
            None => {
                let mut qb = QueryBuilder::new(format!("DELETE FROM {} WHERE ", T::table_name()));
                qb.push(T::id_column());
                qb.push(" = ");
                qb.push_bind(id);
                qb.build().execute(&self.pool).await.map_err(SqlxErrorExt::into_data_error)?.rows_affected()
            }
        };
        if rows_affected == 0 {
            return Err(DataError::NotFound("no row matched the given id".to_string()));
        }
        Ok(())
    }

    async fn delete_all_by_id(&self, ids: &[T::Id]) -> Result<(), DataError> {
        if ids.is_empty() {
            return Ok(());
        }
        match T::deleted_at_column() {
            Some(col) => {
                let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", T::table_name()));
                qb.push(col);
                qb.push(" = CURRENT_TIMESTAMP WHERE ");
                qb.push(T::id_column());
                qb.push(" IN (");
                let mut sep = qb.separated(", ");
                for id in ids {
                    sep.push_bind(id.clone());
                }
                qb.push(") AND ");
                qb.push(col);
                qb.push(" IS NULL");
                qb.build().execute(&self.pool).await.map_err(SqlxErrorExt::into_data_error)?;
            }
            None => {
                let mut qb = QueryBuilder::new(format!("DELETE FROM {} WHERE ", T::table_name()));
                qb.push(T::id_column());
                qb.push(" IN (");
                let mut sep = qb.separated(", ");
                for id in ids {
                    sep.push_bind(id.clone());
                }
                qb.push(")");
                qb.build().execute(&self.pool).await.map_err(SqlxErrorExt::into_data_error)?;
            }
        }
        Ok(())
    }

    async fn delete_all_in_batch(&self) -> Result<u64, DataError> {
        let result = match T::deleted_at_column() {
            Some(col) => {
                QueryBuilder::new(format!("UPDATE {} SET {} = CURRENT_TIMESTAMP WHERE {} IS NULL", T::table_name(), col, col))
                    .build()
                    .execute(&self.pool)
                    .await
                    .map_err(SqlxErrorExt::into_data_error)?
            }
            None => {
                QueryBuilder::new(format!("DELETE FROM {}", T::table_name()))
                    .build()
                    .execute(&self.pool)
                    .await
                    .map_err(SqlxErrorExt::into_data_error)?
            }
        };
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64, DataError> {
        let (count,): (i64,) = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", T::table_name()))
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        Ok(count.max(0) as u64)
    }
}

/// Appends the soft-delete tombstone predicate when the entity declares one.
/// `has_preceding_predicate` picks `AND` (there's already a `WHERE`) vs
/// `WHERE` (this is the first predicate on the query).
fn push_not_deleted<'a, T: Entity, DB: Database>(qb: &mut QueryBuilder<'a, DB>, has_preceding_predicate: bool) {
    if let Some(col) = T::deleted_at_column() {
        qb.push(if has_preceding_predicate { " AND " } else { " WHERE " });
        qb.push(col);
        qb.push(" IS NULL");
    }
}

fn bind_value<DB: Database>(qb: &mut QueryBuilder<'_, DB>, value: QueryParam)
where
    String: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
    i64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
    f64: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
    bool: sqlx::Type<DB> + for<'q> sqlx::Encode<'q, DB>,
{
    match value {
        QueryParam::Text(v) => {
            qb.push_bind(v);
        }
        QueryParam::Int(v) => {
            qb.push_bind(v);
        }
        QueryParam::Float(v) => {
            qb.push_bind(v);
        }
        QueryParam::Bool(v) => {
            qb.push_bind(v);
        }
        QueryParam::TextList(_) | QueryParam::IntList(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_queries_project_a_single_column() {
        // Compile-time shape check only: count_by_intent relies on `(i64,)`
        // implementing FromRow, which sqlx provides for single-column rows.
        fn _assert<DB: Database>()
        where
            (i64,): for<'r> sqlx::FromRow<'r, DB::Row>,
        {
        }
    }
}
