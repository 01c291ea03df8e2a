use serde::{Deserialize, Serialize};
use trellis::Entity;

/// A registered user. `password_hash` never leaves this process — it is
/// dropped from every response via `#[serde(skip_serializing)]`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, Entity)]
#[entity(table = "users")]
pub struct User {
    #[id]
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub roles: String,
}

impl User {
    /// Roles are stored as a comma-joined column; nothing in this demo
    /// needs a join table for a handful of flat role names.
    pub fn role_list(&self) -> Vec<String> {
        self.roles.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Either an email or a username, per the "BOTH" login method.
    pub credential: String,
    pub password: String,
}
