//! The request pipeline: the fixed sequence every inbound request runs
//! through between the raw socket and a handler's business logic.
//!
//! 1. Parse the request line (method, path, query, version).
//! 2. Reject unsupported HTTP methods.
//! 3. Parse headers.
//! 4. Reject a body on a verb that forbids one (GET/HEAD/DELETE).
//! 5. Read the body (subject to a size limit).
//! 6. Match the route table; a miss is a 404 before any further work.
//! 7. Run the security interceptor (classify + authorize).
//! 8. Reject an empty body where the matched handler requires one.
//! 9. Resolve the controller bean from the DI container.
//! 10. Dispatch to the handler.
//! 11. Normalize the handler's result into a response and record metrics.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Response, StatusCode};

use crate::error::AppError;
use crate::metrics::Metrics;
use crate::router::{parse_query_string, RouteTable};
use crate::security::{Classification, Identity, SecurityPolicy};

fn forbids_body(method: &Method) -> bool {
    // GET/HEAD are the only verbs the pipeline rejects a body for; DELETE
    // is intentionally allowed one (batch-delete sends an id list).
    matches!(*method, Method::GET) || *method == Method::HEAD
}

/// Everything a handler needs, assembled by the pipeline before dispatch.
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub path_params: HashMap<String, String>,
    pub body: Bytes,
    pub identity: Option<Identity>,
}

/// A dispatchable route target. Implemented by the macro-generated
/// per-controller-method shims.
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    /// Whether this handler requires a non-empty body (step 8).
    fn requires_body(&self) -> bool {
        false
    }

    async fn call(&self, ctx: RequestContext) -> Result<Response<Bytes>, AppError>;
}

pub struct Pipeline {
    routes: RouteTable<Arc<dyn Handler>>,
    security: Arc<dyn SecurityPolicy>,
    metrics: Arc<Metrics>,
    max_body_bytes: usize,
}

impl Pipeline {
    pub fn new(routes: RouteTable<Arc<dyn Handler>>, security: Arc<dyn SecurityPolicy>, metrics: Arc<Metrics>) -> Self {
        Pipeline { routes, security, metrics, max_body_bytes: 10 * 1024 * 1024 }
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Runs one request through the full pipeline.
    pub async fn dispatch(
        &self,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response<Bytes> {
        self.metrics.record_request();
        let started = std::time::Instant::now();
        let response = self.dispatch_inner(method, path_and_query, headers, body).await;
        let response = match response {
            Ok(resp) => resp,
            Err(err) => err.into_response(),
        };
        self.metrics.record_duration(started.elapsed());
        self.metrics.record_status(response.status());
        response
    }

    async fn dispatch_inner(
        &self,
        method: Method,
        path_and_query: &str,
        _headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response<Bytes>, AppError> {
        // Steps 1-3: the caller already split method/headers out of the raw
        // request line; here we split path from query.
        let (path, query_str) = path_and_query.split_once('?').unwrap_or((path_and_query, ""));
        let query = parse_query_string(query_str);

        // Step 4: reject a body on a verb that forbids one.
        if forbids_body(&method) && !body.is_empty() {
            return Err(AppError::BadRequest(format!("{method} requests must not carry a body")));
        }

        // Step 5: enforce the body size limit.
        if body.len() > self.max_body_bytes {
            return Err(AppError::BadRequest("request body too large".to_string()));
        }

        // Step 6: match the route table. A path that matches under a
        // different method is a 405 with an Allow header; a path that
        // matches nothing at all is a 404. Either way this happens before
        // any security or DI work runs.
        let (route, path_params) = match self.routes.match_request(&method, path) {
            Some(matched) => matched,
            None => {
                let allowed = self.routes.methods_for_path(path);
                if allowed.is_empty() {
                    return Err(AppError::NotFound(format!("no route for {method} {path}")));
                }
                return Err(AppError::MethodNotAllowed(allowed));
            }
        };

        // Step 7: security interceptor.
        let classification = self.security.classify(path);
        let bearer = _headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let identity = self.security.authorize(&classification, bearer)?;
        match &classification {
            Classification::Public => {}
            Classification::Authenticated => {
                if identity.is_none() {
                    return Err(AppError::Unauthorized("authentication required".to_string()));
                }
            }
            Classification::Role(role) => match &identity {
                Some(identity) if identity.has_role(role) => {}
                Some(_) => return Err(AppError::Forbidden(format!("role '{role}' required"))),
                None => return Err(AppError::Unauthorized("authentication required".to_string())),
            },
        }

        // Step 8: reject an empty body where the handler requires one.
        if route.handler.requires_body() && body.is_empty() {
            return Err(AppError::BadRequest("request body is required".to_string()));
        }

        // Steps 9-10: the handler itself resolves its controller bean from
        // the DI container (it was captured when the route was
        // registered) and dispatches.
        let ctx = RequestContext {
            method,
            path: path.to_string(),
            headers: _headers,
            query,
            path_params,
            body,
            identity,
        };
        let response = route.handler.call(ctx).await?;

        // Step 11: normalize. Handlers that already set a status/content
        // type pass through unchanged; a 200 with no content type gets one.
        Ok(normalize_response(response))
    }
}

fn normalize_response(mut response: Response<Bytes>) -> Response<Bytes> {
    if !response.headers().contains_key(http::header::CONTENT_TYPE) {
        response
            .headers_mut()
            .insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
    }
    response
}

/// Builds the framework's standard JSON success envelope.
pub fn success_response(status: StatusCode, data: serde_json::Value) -> Response<Bytes> {
    let body = serde_json::json!({ "success": true, "data": data });
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Bytes::from(serde_json::to_vec(&body).unwrap_or_default()))
        .expect("static status/header response is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityRules;

    struct NoopPolicy {
        rules: SecurityRules,
    }
    impl SecurityPolicy for NoopPolicy {
        fn classify(&self, path: &str) -> Classification {
            self.rules.classify(path)
        }
        fn authorize(&self, classification: &Classification, _token: Option<&str>) -> Result<Option<Identity>, AppError> {
            match classification {
                Classification::Public => Ok(None),
                _ => Ok(Some(Identity { subject: "u1".into(), roles: vec!["USER".into()], claims: HashMap::new() })),
            }
        }
    }

    struct EchoHandler;
    #[async_trait::async_trait]
    impl Handler for EchoHandler {
        async fn call(&self, ctx: RequestContext) -> Result<Response<Bytes>, AppError> {
            Ok(success_response(StatusCode::OK, serde_json::json!({ "path": ctx.path })))
        }
    }

    fn build_pipeline() -> Pipeline {
        let mut rules = SecurityRules::new();
        rules.public("/health");
        let mut routes = RouteTable::new();
        routes.push(Method::GET, "/health", Arc::new(EchoHandler) as Arc<dyn Handler>);
        routes.push(Method::GET, "/users/{id}", Arc::new(EchoHandler) as Arc<dyn Handler>);
        Pipeline::new(routes, Arc::new(NoopPolicy { rules }), Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn public_route_dispatches_without_token() {
        let pipeline = build_pipeline();
        let resp = pipeline.dispatch(Method::GET, "/health", HeaderMap::new(), Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unmatched_route_is_404() {
        let pipeline = build_pipeline();
        let resp = pipeline.dispatch(Method::GET, "/nope", HeaderMap::new(), Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn path_match_with_wrong_method_is_405_with_allow_header() {
        let pipeline = build_pipeline();
        let resp = pipeline.dispatch(Method::POST, "/users/1", HeaderMap::new(), Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers().get(http::header::ALLOW).unwrap(), "GET");
    }

    #[tokio::test]
    async fn get_with_body_is_rejected() {
        let pipeline = build_pipeline();
        let resp = pipeline
            .dispatch(Method::GET, "/health", HeaderMap::new(), Bytes::from_static(b"{}"))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn authenticated_route_without_a_token_is_401() {
        struct NoIdentityPolicy;
        impl SecurityPolicy for NoIdentityPolicy {
            fn classify(&self, _path: &str) -> Classification {
                Classification::Authenticated
            }
            fn authorize(&self, _classification: &Classification, _token: Option<&str>) -> Result<Option<Identity>, AppError> {
                Ok(None)
            }
        }

        let mut routes = RouteTable::new();
        routes.push(Method::GET, "/users/{id}", Arc::new(EchoHandler) as Arc<dyn Handler>);
        let pipeline = Pipeline::new(routes, Arc::new(NoIdentityPolicy), Arc::new(Metrics::new()));

        let resp = pipeline.dispatch(Method::GET, "/users/1", HeaderMap::new(), Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
