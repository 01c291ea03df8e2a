use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use http::StatusCode;
use serde_json::json;
use trellis::{AppError, Jwt, Repository};

use crate::models::{LoginRequest, RegisterRequest, User};
use crate::repository::{UserRepository, UserRepositoryImpl};

/// Registration, login, and profile lookup. Holds the repository and the
/// token issuer it needs, nothing more.
pub struct UserService {
    repo: Arc<UserRepositoryImpl>,
    jwt: Arc<Jwt>,
    /// `save` is an id-keyed upsert with no reflection to tell new from
    /// existing, so ids are assigned here rather than left to the database.
    next_id: AtomicI64,
}

#[trellis::component]
impl UserService {
    pub fn new(repo: Arc<UserRepositoryImpl>, jwt: Arc<Jwt>) -> Self {
        UserService { repo, jwt, next_id: AtomicI64::new(1) }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<User, AppError> {
        if self.repo.exists_by_email(req.email.clone()).await? {
            return Err(AppError::Custom {
                status: StatusCode::CONFLICT,
                body: json!({ "error": "an account with that email already exists" }),
            });
        }

        let password_hash = trellis_security::password::hash_password(&req.password)
            .map_err(|err| AppError::Internal(err.to_string()))?;

        let user = User {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            email: req.email,
            username: req.username,
            password_hash,
            roles: "USER".to_string(),
        };
        self.repo.inner().save(user).await.map_err(AppError::from)
    }

    /// `credential` is an email or a username — per the "BOTH" login
    /// method, looked up by whether it contains `@`.
    pub async fn login(&self, req: LoginRequest) -> Result<String, AppError> {
        let found = if req.credential.contains('@') {
            self.repo.find_by_email(req.credential.clone()).await?
        } else {
            self.repo.find_by_username(req.credential.clone()).await?
        };

        let user = found.ok_or_else(|| AppError::Unauthorized("invalid credentials".to_string()))?;

        let valid = trellis_security::password::verify_password(&req.password, &user.password_hash)
            .map_err(|err| AppError::Internal(err.to_string()))?;
        if !valid {
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        }

        self.jwt
            .issue(&user.id.to_string(), Some(&user.email), user.role_list())
            .map_err(|err| AppError::Internal(err.to_string()))
    }

    pub async fn find_by_subject(&self, subject: &str) -> Result<User, AppError> {
        let id: i64 = subject.parse().map_err(|_| AppError::Unauthorized("invalid subject".to_string()))?;
        self.repo
            .inner()
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("no such user".to_string()))
    }
}
