use std::any::TypeId;
use std::sync::Arc;

use trellis::{AppBuilder, BeanContext, BeanError, BeanRegistry, BeanScope, Producer, SecurityRules, TrellisConfig};
use trellis_security::{Jwt, JwtSecurityPolicy, SecurityConfig};

mod controllers;
mod models;
mod repository;
mod services;

use controllers::auth_controller::AuthController;
use controllers::user_controller::UserController;
use models::User;
use repository::UserRepositoryImpl;
use services::UserService;

/// Hands the bean graph an already-opened pool. Pool creation is async and
/// has to happen before the (synchronous) `Producer` API runs.
struct PoolProducer(sqlx::SqlitePool);

impl Producer for PoolProducer {
    type Output = sqlx::SqlitePool;
    fn produce(&self, _ctx: &BeanContext) -> Result<Self::Output, BeanError> {
        Ok(self.0.clone())
    }
}

/// Likewise for the token issuer: it needs a runtime secret, not anything
/// derivable from another bean.
struct JwtProducer(SecurityConfig);

impl Producer for JwtProducer {
    type Output = Jwt;
    fn produce(&self, _ctx: &BeanContext) -> Result<Self::Output, BeanError> {
        Ok(Jwt::new(self.0.clone()))
    }
}

/// `UserRepositoryImpl::new` takes a raw `sqlx::Pool`, not another bean
/// type it could name in a `#[component]` constructor, so it is wired as a
/// producer instead.
struct UserRepositoryProducer;

impl Producer for UserRepositoryProducer {
    type Output = UserRepositoryImpl;
    fn produce(&self, ctx: &BeanContext) -> Result<Self::Output, BeanError> {
        let pool = ctx.get::<sqlx::SqlitePool>()?;
        Ok(UserRepositoryImpl::new((*pool).clone()))
    }
    fn dependencies(&self) -> Vec<TypeId> {
        vec![TypeId::of::<sqlx::SqlitePool>()]
    }
}

fn generate_test_token(jwt: &Jwt) -> String {
    jwt.issue("1", Some("demo@trellis.dev"), vec!["USER".to_string()])
        .expect("static demo claims always encode")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let security_config = SecurityConfig::new("trellis-demo-secret-change-in-production");

    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            roles TEXT NOT NULL
        )",
    )
    .execute(&pool)
    .await?;

    let mut registry = BeanRegistry::new();
    registry.register_producer("sqlite_pool", BeanScope::Singleton, true, PoolProducer(pool))?;
    registry.register_producer("jwt", BeanScope::Singleton, true, JwtProducer(security_config.clone()))?;
    registry.register_producer("user_repository", BeanScope::Singleton, true, UserRepositoryProducer)?;
    registry.register::<UserService>("user_service", BeanScope::Singleton, true)?;
    registry.register::<AuthController>("auth_controller", BeanScope::Singleton, true)?;
    registry.register::<UserController>("user_controller", BeanScope::Singleton, true)?;

    let mut config = TrellisConfig::empty();
    config.set("metrics.enabled", trellis::ConfigValue::Bool(true));
    let container = registry.resolve(&config).await?;

    let jwt = container.get::<Jwt>()?;
    let token = generate_test_token(&jwt);
    println!("=== Test JWT (valid 1h) ===");
    println!("{token}");
    println!();

    let mut rules = SecurityRules::new();
    rules.public("/auth/register");
    rules.public("/auth/login");
    rules.public("/metrics");
    rules.authenticated("/api/user/**");
    let policy = JwtSecurityPolicy::new(rules, Jwt::new(security_config));

    let mut builder = AppBuilder::new(config)
        .security_policy(Arc::new(policy))
        .with_entity::<User>()
        .with_repository::<User>("user_repository")
        .with_component::<UserRepositoryImpl>()
        .with_component::<UserService>()
        .with_component::<AuthController>()
        .with_component::<UserController>()
        .with_route_registrations(AuthController::__trellis_route_registrations())
        .with_route_registrations(UserController::__trellis_route_registrations());

    let auth_controller = container.get::<AuthController>()?;
    for (method, path, handler) in AuthController::__trellis_routes(auth_controller) {
        builder = builder.route(method, &path, handler);
    }

    let user_controller = container.get::<UserController>()?;
    for (method, path, handler) in UserController::__trellis_routes(user_controller) {
        builder = builder.route(method, &path, handler);
    }

    builder.serve("0.0.0.0:3000").await
}
