//! Maps validated JWT [`Claims`](crate::jwt::Claims) onto the pipeline's
//! [`Identity`](trellis_core::security::Identity).
//!
//! Simplified from the teacher's Keycloak/OIDC `RoleExtractor` composite
//! (`realm_access.roles` vs. standard `roles` claim): this design has exactly
//! one, self-issued, flat `roles` claim, so there is nothing to extract from.

use std::collections::HashMap;

use trellis_core::security::Identity;

use crate::jwt::Claims;

/// Builds the pipeline [`Identity`] the security interceptor attaches to a
/// request once its bearer token has validated.
pub fn identity_from_claims(claims: Claims) -> Identity {
    let mut extra = HashMap::new();
    if let Some(email) = &claims.email {
        extra.insert("email".to_string(), serde_json::Value::String(email.clone()));
    }
    extra.insert("iat".to_string(), serde_json::Value::from(claims.iat));
    extra.insert("exp".to_string(), serde_json::Value::from(claims.exp));

    Identity {
        subject: claims.sub,
        roles: claims.roles,
        claims: extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_claims_onto_an_identity() {
        let claims = Claims {
            sub: "user-1".to_string(),
            email: Some("a@b.com".to_string()),
            roles: vec!["ADMIN".to_string()],
            iat: 1,
            exp: 2,
        };
        let identity = identity_from_claims(claims);
        assert_eq!(identity.subject, "user-1");
        assert!(identity.has_role("ADMIN"));
        assert_eq!(identity.claims.get("email").unwrap().as_str(), Some("a@b.com"));
    }
}
