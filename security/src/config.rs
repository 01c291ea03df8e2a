//! Configuration for self-issued JWTs: a single configured HMAC secret
//! rather than the teacher's JWKS/OIDC-backed key discovery, since these
//! tokens are issued by the application itself, not validated against an
//! external identity provider.

use jsonwebtoken::Algorithm;

#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// Shared HMAC signing secret.
    pub secret: String,
    /// Token lifetime in seconds, used to compute `exp` from `iat` at issuance.
    pub token_ttl_secs: i64,
    /// HMAC variant. Default `HS256`.
    pub algorithm: Algorithm,
}

impl SecurityConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        SecurityConfig {
            secret: secret.into(),
            token_ttl_secs: 3600,
            algorithm: Algorithm::HS256,
        }
    }

    pub fn with_ttl(mut self, ttl_secs: i64) -> Self {
        self.token_ttl_secs = ttl_secs;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
}
