//! Self-issued JWT issuance and validation.
//!
//! Grounded on the teacher's `JwtClaimsValidator` (header decode, key lookup,
//! `jsonwebtoken::decode` with issuer/audience/exp checks), simplified to a
//! single configured HMAC secret: these tokens are minted by the application
//! itself at `/auth/login`, not validated against an external JWKS endpoint.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::SecurityConfig;
use crate::error::SecurityError;

/// Token claims: `{sub, email, roles, iat, exp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and validates tokens against one configured HMAC secret.
pub struct Jwt {
    config: SecurityConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl Jwt {
    pub fn new(config: SecurityConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Jwt { config, encoding_key, decoding_key }
    }

    /// Mints a bearer token for `sub`, stamping `iat` as now and `exp` as
    /// `now + token_ttl_secs`.
    pub fn issue(&self, sub: &str, email: Option<&str>, roles: Vec<String>) -> Result<String, SecurityError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            email: email.map(str::to_string),
            roles,
            iat: now,
            exp: now + self.config.token_ttl_secs,
        };
        let header = Header::new(self.config.algorithm);
        encode(&header, &claims, &self.encoding_key).map_err(|e| SecurityError::InvalidToken(e.to_string()))
    }

    /// Validates signature, algorithm, and expiry, and returns the claims.
    pub fn validate(&self, token: &str) -> Result<Claims, SecurityError> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => SecurityError::TokenExpired,
            _ => SecurityError::InvalidToken(e.to_string()),
        })?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt() -> Jwt {
        Jwt::new(SecurityConfig::new("test-secret").with_ttl(60))
    }

    #[test]
    fn issues_and_validates_a_token() {
        let jwt = jwt();
        let token = jwt.issue("user-1", Some("a@b.com"), vec!["USER".to_string()]).unwrap();
        let claims = jwt.validate(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.roles, vec!["USER".to_string()]);
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = Jwt::new(SecurityConfig::new("test-secret").with_ttl(-1));
        let token = jwt.issue("user-1", None, vec![]).unwrap();
        let err = jwt.validate(&token).unwrap_err();
        assert!(matches!(err, SecurityError::TokenExpired));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let jwt = jwt();
        let token = jwt.issue("user-1", None, vec![]).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        let err = Jwt::new(SecurityConfig::new("test-secret")).validate(&tampered).unwrap_err();
        assert!(matches!(err, SecurityError::InvalidToken(_)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = jwt().issue("user-1", None, vec![]).unwrap();
        let other = Jwt::new(SecurityConfig::new("different-secret"));
        assert!(other.validate(&token).is_err());
    }
}
