use std::sync::Arc;

use http::{HeaderMap, Method, Response, StatusCode};
use tokio::sync::RwLock;
use trellis::async_trait::async_trait;
use trellis::{success_response, AppError, Handler, Metrics, Pipeline, RequestContext, RouteTable, SecurityRules};
use trellis_security::{Jwt, JwtSecurityPolicy, SecurityConfig};

// Dispatching through `Pipeline` directly (see `trellis-core`'s own pipeline
// tests) exercises routing, the security interceptor, and handler dispatch
// without opening a socket. The service below is reimplemented in miniature
// here rather than imported, since this crate builds only a binary target.

#[derive(Clone, serde::Serialize)]
struct User {
    id: i64,
    email: String,
    #[serde(skip_serializing)]
    password_hash: String,
}

struct UserStore {
    users: RwLock<Vec<User>>,
    jwt: Jwt,
}

impl UserStore {
    fn new(jwt: Jwt) -> Self {
        UserStore { users: RwLock::new(Vec::new()), jwt }
    }
}

struct RegisterHandler(Arc<UserStore>);
#[async_trait]
impl Handler for RegisterHandler {
    fn requires_body(&self) -> bool {
        true
    }
    async fn call(&self, ctx: RequestContext) -> Result<Response<bytes::Bytes>, AppError> {
        #[derive(serde::Deserialize)]
        struct Req {
            email: String,
            password: String,
        }
        let req: Req = serde_json::from_slice(&ctx.body).map_err(|e| AppError::BadRequest(e.to_string()))?;

        let mut users = self.0.users.write().await;
        if users.iter().any(|u| u.email == req.email) {
            return Err(AppError::BadRequest("email already registered".to_string()));
        }
        let password_hash = trellis_security::password::hash_password(&req.password)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let user = User { id: users.len() as i64 + 1, email: req.email, password_hash };
        users.push(user.clone());
        Ok(success_response(
            StatusCode::CREATED,
            serde_json::to_value(&user).map_err(|e| AppError::Internal(e.to_string()))?,
        ))
    }
}

struct LoginHandler(Arc<UserStore>);
#[async_trait]
impl Handler for LoginHandler {
    fn requires_body(&self) -> bool {
        true
    }
    async fn call(&self, ctx: RequestContext) -> Result<Response<bytes::Bytes>, AppError> {
        #[derive(serde::Deserialize)]
        struct Req {
            email: String,
            password: String,
        }
        let req: Req = serde_json::from_slice(&ctx.body).map_err(|e| AppError::BadRequest(e.to_string()))?;

        let users = self.0.users.read().await;
        let user = users
            .iter()
            .find(|u| u.email == req.email)
            .ok_or_else(|| AppError::Unauthorized("invalid credentials".to_string()))?;
        let valid = trellis_security::password::verify_password(&req.password, &user.password_hash)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        if !valid {
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        }
        let token = self
            .0
            .jwt
            .issue(&user.id.to_string(), Some(&user.email), vec!["USER".to_string()])
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(success_response(StatusCode::OK, serde_json::json!({ "token": token })))
    }
}

struct MeHandler;
#[async_trait]
impl Handler for MeHandler {
    async fn call(&self, ctx: RequestContext) -> Result<Response<bytes::Bytes>, AppError> {
        let identity = ctx.identity.ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))?;
        Ok(success_response(StatusCode::OK, serde_json::json!({ "subject": identity.subject })))
    }
}

fn build_pipeline() -> Pipeline {
    let config = SecurityConfig::new("test-secret");
    // `Jwt` isn't `Clone`; the store and the policy each get their own
    // instance over the same secret, so tokens minted by one validate
    // against the other.
    let store = Arc::new(UserStore::new(Jwt::new(config.clone())));

    let mut rules = SecurityRules::new();
    rules.public("/auth/register");
    rules.public("/auth/login");

    let mut routes = RouteTable::new();
    routes.push(Method::POST, "/auth/register", Arc::new(RegisterHandler(store.clone())) as Arc<dyn Handler>);
    routes.push(Method::POST, "/auth/login", Arc::new(LoginHandler(store.clone())) as Arc<dyn Handler>);
    routes.push(Method::GET, "/auth/me", Arc::new(MeHandler) as Arc<dyn Handler>);

    let policy = JwtSecurityPolicy::new(rules, Jwt::new(config));
    Pipeline::new(routes, Arc::new(policy), Arc::new(Metrics::new()))
}

fn json_body(body: &bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(body).expect("response body is valid JSON")
}

#[tokio::test]
async fn register_then_login_issues_a_usable_token() {
    let pipeline = build_pipeline();

    let register_body = bytes::Bytes::from(serde_json::json!({ "email": "a@example.com", "password": "hunter2" }).to_string());
    let resp = pipeline.dispatch(Method::POST, "/auth/register", HeaderMap::new(), register_body).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let login_body = bytes::Bytes::from(serde_json::json!({ "email": "a@example.com", "password": "hunter2" }).to_string());
    let resp = pipeline.dispatch(Method::POST, "/auth/login", HeaderMap::new(), login_body).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body();
    let token = json_body(&body)["data"]["token"].as_str().unwrap().to_string();

    let mut headers = HeaderMap::new();
    headers.insert(http::header::AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
    let resp = pipeline.dispatch(Method::GET, "/auth/me", headers, bytes::Bytes::new()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(&resp.into_body())["data"]["subject"], "1");
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let pipeline = build_pipeline();
    let body = || bytes::Bytes::from(serde_json::json!({ "email": "dup@example.com", "password": "hunter2" }).to_string());

    let resp = pipeline.dispatch(Method::POST, "/auth/register", HeaderMap::new(), body()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = pipeline.dispatch(Method::POST, "/auth/register", HeaderMap::new(), body()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_with_wrong_password_is_401() {
    let pipeline = build_pipeline();
    let register_body = bytes::Bytes::from(serde_json::json!({ "email": "b@example.com", "password": "correct" }).to_string());
    pipeline.dispatch(Method::POST, "/auth/register", HeaderMap::new(), register_body).await;

    let login_body = bytes::Bytes::from(serde_json::json!({ "email": "b@example.com", "password": "wrong" }).to_string());
    let resp = pipeline.dispatch(Method::POST, "/auth/login", HeaderMap::new(), login_body).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_route_without_a_token_is_401() {
    let pipeline = build_pipeline();
    let resp = pipeline.dispatch(Method::GET, "/auth/me", HeaderMap::new(), bytes::Bytes::new()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
