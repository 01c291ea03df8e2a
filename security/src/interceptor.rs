//! The JWT-backed [`SecurityPolicy`] installed via `AppBuilder::security_policy`.
//!
//! `classify` defers entirely to the configured [`SecurityRules`]; `authorize`
//! validates the bearer token (if any) against the configured secret and
//! turns it into an [`Identity`]. Role gating past that point is the
//! pipeline's own job — see `trellis-core::pipeline::Pipeline::dispatch_inner`.

use trellis_core::error::AppError;
use trellis_core::security::{Classification, Identity, SecurityPolicy, SecurityRules};

use crate::error::SecurityError;
use crate::identity::identity_from_claims;
use crate::jwt::Jwt;

pub struct JwtSecurityPolicy {
    rules: SecurityRules,
    jwt: Jwt,
}

impl JwtSecurityPolicy {
    pub fn new(rules: SecurityRules, jwt: Jwt) -> Self {
        JwtSecurityPolicy { rules, jwt }
    }
}

impl SecurityPolicy for JwtSecurityPolicy {
    fn classify(&self, path: &str) -> Classification {
        self.rules.classify(path)
    }

    fn authorize(&self, classification: &Classification, bearer_token: Option<&str>) -> Result<Option<Identity>, AppError> {
        // No token at all: the pipeline turns this into 401 for anything but
        // a public route, so there is nothing further to classify here.
        let Some(token) = bearer_token else {
            return Ok(None);
        };

        let claims = self.jwt.validate(token).map_err(|err: SecurityError| AppError::from(err))?;
        Ok(Some(identity_from_claims(claims)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;

    fn policy() -> JwtSecurityPolicy {
        let mut rules = SecurityRules::new();
        rules.public("/auth/**");
        rules.role("/admin/**", "ADMIN");
        JwtSecurityPolicy::new(rules, Jwt::new(SecurityConfig::new("test-secret")))
    }

    #[test]
    fn no_token_on_public_route_is_anonymous() {
        let policy = policy();
        let identity = policy.authorize(&Classification::Public, None).unwrap();
        assert!(identity.is_none());
    }

    #[test]
    fn valid_token_resolves_an_identity() {
        let policy = policy();
        let token = policy.jwt.issue("u1", None, vec!["ADMIN".to_string()]).unwrap();
        let identity = policy
            .authorize(&Classification::Role("ADMIN".to_string()), Some(&token))
            .unwrap()
            .unwrap();
        assert_eq!(identity.subject, "u1");
        assert!(identity.has_role("ADMIN"));
    }

    #[test]
    fn invalid_token_is_rejected() {
        let policy = policy();
        let err = policy.authorize(&Classification::Authenticated, Some("garbage")).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
