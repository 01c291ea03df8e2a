//! Supplementary role checks for use inside handler bodies.
//!
//! The pipeline's `Classification::Role` gate already enforces the primary
//! route-level role requirement before a handler ever runs, so nothing here
//! duplicates that check. These helpers are for the secondary case: a
//! handler itself needs to branch on which of several roles the caller has
//! (e.g. an owner-or-admin check), grounded on the teacher's `RolesGuard`
//! but expressed as plain functions over `Identity` rather than a `Guard`
//! trait object, since there is no separate guard-pipeline stage here.

use trellis_core::security::Identity;

/// True if `identity` holds at least one of `roles`.
pub fn has_any_role(identity: &Identity, roles: &[&str]) -> bool {
    roles.iter().any(|role| identity.has_role(role))
}

/// True if `identity` holds every one of `roles`.
pub fn has_all_roles(identity: &Identity, roles: &[&str]) -> bool {
    roles.iter().all(|role| identity.has_role(role))
}

/// True if `identity`'s subject matches `owner_subject`, or it holds one of
/// `admin_roles` — the common "owner or admin" handler-body check.
pub fn is_owner_or_has_role(identity: &Identity, owner_subject: &str, admin_roles: &[&str]) -> bool {
    identity.subject == owner_subject || has_any_role(identity, admin_roles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn identity(subject: &str, roles: &[&str]) -> Identity {
        Identity {
            subject: subject.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            claims: HashMap::new(),
        }
    }

    #[test]
    fn any_role_matches_when_one_overlaps() {
        let id = identity("u1", &["USER", "EDITOR"]);
        assert!(has_any_role(&id, &["ADMIN", "EDITOR"]));
        assert!(!has_any_role(&id, &["ADMIN"]));
    }

    #[test]
    fn all_roles_requires_every_match() {
        let id = identity("u1", &["USER", "EDITOR"]);
        assert!(has_all_roles(&id, &["USER", "EDITOR"]));
        assert!(!has_all_roles(&id, &["USER", "ADMIN"]));
    }

    #[test]
    fn owner_or_role_allows_owner_without_roles() {
        let id = identity("u1", &[]);
        assert!(is_owner_or_has_role(&id, "u1", &["ADMIN"]));
        assert!(!is_owner_or_has_role(&id, "u2", &["ADMIN"]));
    }
}
