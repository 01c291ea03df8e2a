use std::sync::Arc;

use crate::models::User;
use crate::repository::UserRepositoryImpl;

/// Full generated CRUD surface over `User` (`find_all`/`find_by_id`/`create`/
/// `update`/`delete`/`search`/`count`/`exists`/batch variants).
pub struct UserController {
    repo: Arc<UserRepositoryImpl>,
}

#[trellis::component]
impl UserController {
    pub fn new(repo: Arc<UserRepositoryImpl>) -> Self {
        UserController { repo }
    }
}

#[trellis::crud(entity = User, repository_field = repo, base = "/api/user")]
impl UserController {}
