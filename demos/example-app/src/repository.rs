use trellis::{repository, DataError};

use crate::models::User;

/// Query methods parsed and bound to SQL once, at `#[repository]`
/// expansion time — nothing here re-parses a method name per request.
#[repository(entity = User, db = sqlx::Sqlite)]
pub trait UserRepository {
    async fn find_by_email(&self, email: String) -> Result<Option<User>, DataError>;
    async fn find_by_username(&self, username: String) -> Result<Option<User>, DataError>;
    async fn exists_by_email(&self, email: String) -> Result<bool, DataError>;
}
