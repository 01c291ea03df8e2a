use bytes::Bytes;
use http::{Method, Response, StatusCode};
use serde_json::json;

/// The error taxonomy the request pipeline converts into an HTTP response.
/// Every error a controller, repository, or security check can raise funnels
/// through here before it reaches the client.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    MethodNotAllowed(Vec<Method>),
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    Internal(String),
    Custom { status: StatusCode, body: serde_json::Value },
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Custom { status, .. } => *status,
        }
    }

    /// The client-facing envelope. Internal error detail is never echoed
    /// here; callers should `tracing::error!` the underlying cause before
    /// converting to this variant.
    pub fn body(&self) -> serde_json::Value {
        match self {
            AppError::NotFound(msg) => json!({ "success": false, "message": msg }),
            AppError::MethodNotAllowed(allowed) => {
                json!({ "success": false, "message": format!("method not allowed, expected one of: {}", allowed_list(allowed)) })
            }
            AppError::Unauthorized(msg) => json!({ "success": false, "message": msg }),
            AppError::Forbidden(msg) => json!({ "success": false, "message": msg }),
            AppError::BadRequest(msg) => json!({ "success": false, "message": msg }),
            AppError::Internal(_) => json!({ "success": false, "message": "internal server error" }),
            AppError::Custom { body, .. } => body.clone(),
        }
    }

    pub fn into_response(self) -> Response<Bytes> {
        let status = self.status();
        let allow_header = match &self {
            AppError::MethodNotAllowed(allowed) => Some(allowed_list(allowed)),
            _ => None,
        };
        let body = serde_json::to_vec(&self.body()).unwrap_or_else(|_| b"{}".to_vec());
        let mut builder = Response::builder().status(status).header(http::header::CONTENT_TYPE, "application/json");
        if let Some(allow) = allow_header {
            builder = builder.header(http::header::ALLOW, allow);
        }
        builder
            .body(Bytes::from(body))
            .expect("static status/header response is always valid")
    }
}

/// Comma-joined, alphabetically sorted method list for the `Allow` header
/// and its matching error message.
fn allowed_list(allowed: &[Method]) -> String {
    let mut names: Vec<&str> = allowed.iter().map(Method::as_str).collect();
    names.sort_unstable();
    names.join(", ")
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::MethodNotAllowed(allowed) => write!(f, "method not allowed: expected one of {}", allowed_list(allowed)),
            AppError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            AppError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            AppError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            AppError::Internal(msg) => write!(f, "internal error: {msg}"),
            AppError::Custom { status, .. } => write!(f, "custom error: {status}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<trellis_data::DataError> for AppError {
    fn from(err: trellis_data::DataError) -> Self {
        match err {
            trellis_data::DataError::NotFound(msg) => AppError::NotFound(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Declares `From<$source> for AppError` mappings in one line, the way the
/// teacher's equivalent macro collapses repetitive error-conversion
/// boilerplate at call sites that use `?`.
#[macro_export]
macro_rules! map_error {
    ($source:ty => $variant:ident) => {
        impl From<$source> for $crate::error::AppError {
            fn from(err: $source) -> Self {
                $crate::error::AppError::$variant(err.to_string())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError::NotFound("user 1".into());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.body()["message"], "user 1");
    }

    #[test]
    fn internal_never_echoes_cause() {
        let err = AppError::Internal("db connection string leaked here".into());
        assert_eq!(err.body()["message"], "internal server error");
    }

    #[test]
    fn custom_status_round_trips() {
        let err = AppError::Custom {
            status: StatusCode::IM_A_TEAPOT,
            body: json!({ "success": false, "message": "teapot" }),
        };
        assert_eq!(err.status(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Internal(_)));
    }

    #[test]
    fn display_formats_are_stable() {
        assert_eq!(AppError::BadRequest("bad".into()).to_string(), "bad request: bad");
    }

    #[test]
    fn method_not_allowed_maps_to_405_with_allow_header() {
        let err = AppError::MethodNotAllowed(vec![http::Method::GET, http::Method::PUT]);
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(http::header::ALLOW).unwrap(), "GET, PUT");
    }
}
