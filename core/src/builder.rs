//! `AppBuilder`: fluent assembly of config, beans, routes, and security
//! rules into a running server. Simpler than it could be: the teacher's
//! builder tracks bean provisions/requirements as a compile-time type list
//! so a missing dependency is a compile error; this one checks the same
//! thing at `build()` time via [`BeanRegistry::resolve`], which is enough
//! for a framework whose bean graph is assembled at macro-expansion time
//! rather than hand-written call by call.

use std::any::TypeId;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::beans::{AsyncBean, Bean, BeanContainer, BeanError, BeanRegistry, BeanScope, Producer};
use crate::config::TrellisConfig;
use crate::metrics::Metrics;
use crate::pipeline::Handler;
use crate::registry::{ComponentRegistration, EntityRegistration, RouteRegistration, StartupRegistry};
use crate::router::RouteTable;
use crate::security::{SecurityPolicy, SecurityRules};

type StartupHook = Box<dyn FnOnce(&BeanContainer) -> Result<(), BeanError> + Send>;
type ShutdownHook = Box<dyn FnOnce() + Send>;

/// Accumulates beans, routes, and security rules; resolves the bean graph
/// and starts listening when [`build`](Self::build) or [`serve`](Self::serve)
/// is called.
pub struct AppBuilder {
    config: TrellisConfig,
    bean_registry: BeanRegistry,
    startup_registry: StartupRegistry,
    security_rules: SecurityRules,
    routes: RouteTable<Arc<dyn Handler>>,
    startup_hooks: Vec<StartupHook>,
    shutdown_hooks: Vec<ShutdownHook>,
    max_body_bytes: usize,
    security_policy: Option<Arc<dyn SecurityPolicy>>,
}

impl AppBuilder {
    pub fn new(config: TrellisConfig) -> Self {
        AppBuilder {
            config,
            bean_registry: BeanRegistry::new(),
            startup_registry: StartupRegistry::new(),
            security_rules: SecurityRules::new(),
            routes: RouteTable::new(),
            startup_hooks: Vec::new(),
            shutdown_hooks: Vec::new(),
            max_body_bytes: 10 * 1024 * 1024,
            security_policy: None,
        }
    }

    /// Installs the concrete authorization backend (JWT-backed, in
    /// practice). Without one, every route is treated as public, which is
    /// only appropriate for local development against an unauthenticated
    /// demo.
    pub fn security_policy(mut self, policy: Arc<dyn SecurityPolicy>) -> Self {
        self.security_policy = Some(policy);
        self
    }

    pub fn with_bean<B: Bean + 'static>(mut self, name: impl Into<String>, scope: BeanScope, primary: bool) -> Self {
        if let Err(err) = self.bean_registry.register::<B>(name, scope, primary) {
            panic!("bean registration failed: {err}");
        }
        self
    }

    pub fn with_async_bean<B: AsyncBean + 'static>(mut self, name: impl Into<String>, scope: BeanScope, primary: bool) -> Self {
        if let Err(err) = self.bean_registry.register_async::<B>(name, scope, primary) {
            panic!("bean registration failed: {err}");
        }
        self
    }

    pub fn with_producer<P: Producer>(mut self, name: impl Into<String>, scope: BeanScope, primary: bool, producer: P) -> Self {
        if let Err(err) = self.bean_registry.register_producer(name, scope, primary, producer) {
            panic!("bean registration failed: {err}");
        }
        self
    }

    /// Registers a route directly. Controllers generated by `#[routes]`
    /// call this once per handler method; the CRUD generator calls it once
    /// per synthesized operation.
    pub fn route(mut self, method: Method, path: &str, handler: Arc<dyn Handler>) -> Self {
        self.routes.push(method, path, handler);
        self
    }

    pub fn public(mut self, pattern: &str) -> Self {
        self.security_rules.public(pattern);
        self
    }

    pub fn authenticated(mut self, pattern: &str) -> Self {
        self.security_rules.authenticated(pattern);
        self
    }

    pub fn role(mut self, pattern: &str, role: impl Into<String>) -> Self {
        self.security_rules.role(pattern, role);
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&BeanContainer) -> Result<(), BeanError> + Send + 'static,
    {
        self.startup_hooks.push(Box::new(hook));
        self
    }

    pub fn on_stop<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.shutdown_hooks.push(Box::new(hook));
        self
    }

    pub fn startup_registry_mut(&mut self) -> &mut StartupRegistry {
        &mut self.startup_registry
    }

    /// Files an entity into the startup scanner table, standing in for the
    /// classpath scan a reflection-capable runtime would do to discover
    /// `@Entity`-annotated types.
    pub fn with_entity<E: trellis_data::Entity>(mut self) -> Self {
        self.startup_registry.register_entity(EntityRegistration {
            entity_type: TypeId::of::<E>(),
            entity_name: E::type_name(),
            table_name: E::table_name(),
        });
        self
    }

    /// Files any `#[component]`-built type into the startup scanner table.
    /// Purely a ledger entry: actual construction still goes through
    /// [`with_bean`](Self::with_bean)/[`with_async_bean`](Self::with_async_bean)/
    /// [`with_producer`](Self::with_producer) against the bean graph, the
    /// same way `with_entity` records an entity without itself creating a
    /// repository for it.
    pub fn with_component<T: 'static>(mut self) -> Self {
        self.startup_registry.register_component(ComponentRegistration {
            component_type: TypeId::of::<T>(),
            component_name: std::any::type_name::<T>(),
        });
        self
    }

    /// Records that a repository targets entity `E`. If `E` was never
    /// registered via [`with_entity`](Self::with_entity), this is recorded
    /// as a startup warning and the repository is excluded from the active
    /// set rather than failing `build()` outright — promotion to a hard
    /// failure only happens if something else ends up depending on it.
    pub fn with_repository<E: trellis_data::Entity>(mut self, repository_name: &'static str) -> Self {
        self.startup_registry.register_repository_entity_ref(repository_name, TypeId::of::<E>());
        self
    }

    /// Files a controller's generated routes into the startup scanner
    /// table. Controllers emit these via their macro-generated
    /// `__trellis_route_registrations()`; call this alongside the matching
    /// `.route(...)` calls built from `__trellis_routes()`.
    pub fn with_route_registrations(mut self, registrations: Vec<RouteRegistration>) -> Self {
        for registration in registrations {
            self.startup_registry.register_route(registration);
        }
        self
    }

    /// Resolves the bean graph and assembles the request pipeline, without
    /// starting a listener. Useful for tests that dispatch requests in
    /// process.
    pub async fn build(self) -> Result<(BeanContainer, BuiltApp), BeanError> {
        for warning in self.startup_registry.warnings() {
            warn!(%warning, "startup registration warning");
        }

        let container = self.bean_registry.resolve(&self.config).await?;

        for hook in self.startup_hooks {
            hook(&container)?;
        }

        let metrics = container.get::<Metrics>().unwrap_or_else(|_| Arc::new(Metrics::new()));

        let mut routes = self.routes;
        if self.config.get_or("metrics.enabled", false) {
            routes.push(Method::GET, "/metrics", Arc::new(MetricsHandler(metrics.clone())) as Arc<dyn Handler>);
            info!("/metrics route registered");
        }

        let security: Arc<dyn SecurityPolicy> = match self.security_policy {
            Some(policy) => {
                if !self.security_rules.is_empty() {
                    warn!("AppBuilder::public/authenticated/role rules are ignored once a security_policy is installed");
                }
                policy
            }
            None => {
                warn!("no security_policy installed; routes are classified but never authenticated");
                Arc::new(DevSecurityPolicy { rules: self.security_rules })
            }
        };

        let pipeline = crate::pipeline::Pipeline::new(routes, security, metrics).with_max_body_bytes(self.max_body_bytes);

        Ok((container, BuiltApp { pipeline: Arc::new(pipeline), shutdown_hooks: self.shutdown_hooks }))
    }

    /// Builds the app and serves it on `addr` until a shutdown signal
    /// (Ctrl-C, or SIGTERM on Unix) arrives.
    pub async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
        let (_container, app) = self.build().await?;
        app.serve(addr).await
    }
}

/// Installed when no application-provided [`SecurityPolicy`] was given to
/// [`AppBuilder::security_policy`]. Public routes dispatch normally;
/// anything else is rejected, since there is no token scheme to validate
/// against without a real policy.
struct DevSecurityPolicy {
    rules: SecurityRules,
}

impl SecurityPolicy for DevSecurityPolicy {
    fn classify(&self, path: &str) -> crate::security::Classification {
        self.rules.classify(path)
    }

    fn authorize(
        &self,
        classification: &crate::security::Classification,
        _bearer_token: Option<&str>,
    ) -> Result<Option<crate::security::Identity>, crate::error::AppError> {
        match classification {
            crate::security::Classification::Public => Ok(None),
            _ => Err(crate::error::AppError::Unauthorized(
                "no security policy installed to authenticate this route".to_string(),
            )),
        }
    }
}

/// Serves `GET /metrics`, registered by [`AppBuilder::build`] when
/// `metrics.enabled` is set — off by default, per spec.
struct MetricsHandler(Arc<Metrics>);

#[async_trait::async_trait]
impl Handler for MetricsHandler {
    async fn call(&self, _ctx: crate::pipeline::RequestContext) -> Result<Response<Bytes>, crate::error::AppError> {
        Ok(crate::pipeline::success_response(http::StatusCode::OK, self.0.public_snapshot()))
    }
}

/// The resolved pipeline plus whatever shutdown hooks should run after the
/// listener stops.
pub struct BuiltApp {
    pipeline: Arc<crate::pipeline::Pipeline>,
    shutdown_hooks: Vec<ShutdownHook>,
}

impl BuiltApp {
    pub fn pipeline(&self) -> Arc<crate::pipeline::Pipeline> {
        self.pipeline.clone()
    }

    pub async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
        let addr: SocketAddr = addr.parse()?;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "trellis server listening");

        let pipeline = self.pipeline.clone();
        let mut shutdown = std::pin::pin!(shutdown_signal());

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            error!(%err, "failed to accept connection");
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);
                    let pipeline = pipeline.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req: Request<Incoming>| {
                            let pipeline = pipeline.clone();
                            async move { Ok::<_, Infallible>(serve_one(pipeline, req).await) }
                        });
                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            error!(%err, %peer, "connection error");
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        for hook in self.shutdown_hooks {
            hook();
        }
        info!("trellis server stopped");
        Ok(())
    }
}

async fn serve_one(pipeline: Arc<crate::pipeline::Pipeline>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path_and_query = req.uri().path_and_query().map(|pq| pq.as_str().to_string()).unwrap_or_default();
    let headers = req.headers().clone();
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            error!(%err, "failed to read request body");
            return Response::builder()
                .status(http::StatusCode::BAD_REQUEST)
                .body(Full::new(Bytes::from_static(b"{\"success\":false,\"message\":\"failed to read request body\"}")))
                .expect("static response is always valid");
        }
    };

    let response = pipeline.dispatch(method, &path_and_query, headers, body).await;
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Full::new(body))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RequestContext;
    use http::StatusCode;

    struct EchoHandler;
    #[async_trait::async_trait]
    impl Handler for EchoHandler {
        async fn call(&self, ctx: RequestContext) -> Result<Response<Bytes>, crate::error::AppError> {
            Ok(crate::pipeline::success_response(StatusCode::OK, serde_json::json!({ "path": ctx.path })))
        }
    }

    struct Widget;
    impl trellis_data::Entity for Widget {
        type Id = i64;
        fn table_name() -> &'static str {
            "widgets"
        }
        fn columns() -> &'static [&'static str] {
            &["id"]
        }
        fn id(&self) -> Self::Id {
            0
        }
        fn with_id(self, _id: Self::Id) -> Self {
            self
        }
    }

    #[test]
    fn with_entity_then_repository_leaves_no_warning() {
        let mut builder = AppBuilder::new(TrellisConfig::empty()).with_entity::<Widget>().with_repository::<Widget>("widget_repo");
        assert!(builder.startup_registry_mut().warnings().is_empty());
    }

    #[test]
    fn with_repository_for_an_unregistered_entity_warns() {
        let mut builder = AppBuilder::new(TrellisConfig::empty()).with_repository::<Widget>("widget_repo");
        assert_eq!(builder.startup_registry_mut().warnings().len(), 1);
    }

    struct WidgetService;

    #[test]
    fn with_component_files_the_type_once() {
        let mut builder = AppBuilder::new(TrellisConfig::empty()).with_component::<WidgetService>();
        assert_eq!(builder.startup_registry_mut().components().count(), 1);
    }

    #[tokio::test]
    async fn build_resolves_empty_graph_and_dispatches() {
        let builder = AppBuilder::new(TrellisConfig::empty())
            .public("/health")
            .route(Method::GET, "/health", Arc::new(EchoHandler));
        let (_container, app) = builder.build().await.unwrap();
        let resp = app
            .pipeline()
            .dispatch(Method::GET, "/health", http::HeaderMap::new(), Bytes::new())
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_route_is_absent_unless_enabled() {
        let builder = AppBuilder::new(TrellisConfig::empty());
        let (_container, app) = builder.build().await.unwrap();
        let resp = app.pipeline().dispatch(Method::GET, "/metrics", http::HeaderMap::new(), Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_route_reports_a_snapshot_once_enabled() {
        let mut config = TrellisConfig::empty();
        config.set("metrics.enabled", crate::config::ConfigValue::Bool(true));
        let builder = AppBuilder::new(config).public("/metrics");
        let (_container, app) = builder.build().await.unwrap();
        let resp = app.pipeline().dispatch(Method::GET, "/metrics", http::HeaderMap::new(), Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_bean_dependency_surfaces_as_build_error() {
        struct NeedsMissing;
        impl Bean for NeedsMissing {
            fn build(ctx: &crate::beans::BeanContext) -> Result<Self, BeanError> {
                ctx.get::<Metrics>()?;
                Ok(NeedsMissing)
            }
            fn dependencies() -> Vec<std::any::TypeId> {
                vec![std::any::TypeId::of::<Metrics>()]
            }
        }
        let builder = AppBuilder::new(TrellisConfig::empty()).with_bean::<NeedsMissing>("needs_missing", BeanScope::Singleton, true);
        let err = builder.build().await.unwrap_err();
        assert!(matches!(err, BeanError::MissingDependency { .. }));
    }
}
