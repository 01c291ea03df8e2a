use std::sync::Arc;

use http::StatusCode;
use trellis::{success_response, AppError, RequestContext};

use crate::services::UserService;

pub struct AuthController {
    users: Arc<UserService>,
}

#[trellis::component]
impl AuthController {
    pub fn new(users: Arc<UserService>) -> Self {
        AuthController { users }
    }
}

#[trellis::routes(base = "/auth")]
impl AuthController {
    #[post("/register")]
    async fn register(&self, ctx: RequestContext) -> Result<http::Response<bytes::Bytes>, AppError> {
        let req = serde_json::from_slice(&ctx.body).map_err(|e| AppError::BadRequest(e.to_string()))?;
        let user = self.users.register(req).await?;
        Ok(success_response(
            StatusCode::CREATED,
            serde_json::to_value(user).map_err(|e| AppError::Internal(e.to_string()))?,
        ))
    }

    #[post("/login")]
    async fn login(&self, ctx: RequestContext) -> Result<http::Response<bytes::Bytes>, AppError> {
        let req = serde_json::from_slice(&ctx.body).map_err(|e| AppError::BadRequest(e.to_string()))?;
        let token = self.users.login(req).await?;
        Ok(success_response(StatusCode::OK, serde_json::json!({ "token": token })))
    }

    #[get("/me")]
    async fn me(&self, ctx: RequestContext) -> Result<http::Response<bytes::Bytes>, AppError> {
        let identity = ctx.identity.ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))?;
        let user = self.users.find_by_subject(&identity.subject).await?;
        Ok(success_response(
            StatusCode::OK,
            serde_json::to_value(user).map_err(|e| AppError::Internal(e.to_string()))?,
        ))
    }
}
