//! URL-pattern authorization classification. The JWT-specific validation
//! that backs [`SecurityPolicy::authorize`] lives in `trellis-security`;
//! this module only owns the pattern grammar and the classification rule,
//! since both are needed by the request pipeline regardless of which
//! identity scheme an application plugs in.

use std::collections::HashMap;

/// How a route is gated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Public,
    Authenticated,
    Role(String),
}

/// One segment of a URL pattern: a literal, a single-segment wildcard
/// (`*`), or a trailing multi-segment wildcard (`**`).
#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Single,
    Multi,
}

#[derive(Debug, Clone)]
struct Pattern {
    segments: Vec<PatternSegment>,
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        let segments = pattern
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|seg| match seg {
                "**" => PatternSegment::Multi,
                "*" => PatternSegment::Single,
                lit => PatternSegment::Literal(lit.to_string()),
            })
            .collect();
        Pattern { segments }
    }

    fn matches(&self, path_segments: &[&str]) -> bool {
        let mut p = 0;
        let mut s = 0;
        while p < self.segments.len() {
            match &self.segments[p] {
                PatternSegment::Multi => return true,
                PatternSegment::Single => {
                    if s >= path_segments.len() {
                        return false;
                    }
                    s += 1;
                    p += 1;
                }
                PatternSegment::Literal(lit) => {
                    if s >= path_segments.len() || &path_segments[s] != lit {
                        return false;
                    }
                    s += 1;
                    p += 1;
                }
            }
        }
        s == path_segments.len()
    }
}

/// Registered in declaration order; the first pattern whose glob matches
/// the request path determines the route's classification, mirroring the
/// router's own first-match-wins rule.
pub struct SecurityRules {
    entries: Vec<(Pattern, Classification)>,
}

impl Default for SecurityRules {
    fn default() -> Self {
        SecurityRules { entries: Vec::new() }
    }
}

impl SecurityRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public(&mut self, pattern: &str) -> &mut Self {
        self.entries.push((Pattern::parse(pattern), Classification::Public));
        self
    }

    pub fn authenticated(&mut self, pattern: &str) -> &mut Self {
        self.entries.push((Pattern::parse(pattern), Classification::Authenticated));
        self
    }

    pub fn role(&mut self, pattern: &str, role: impl Into<String>) -> &mut Self {
        self.entries.push((Pattern::parse(pattern), Classification::Role(role.into())));
        self
    }

    /// Defaults to [`Classification::Authenticated`] when nothing matches,
    /// the conservative choice a new route should get until explicitly
    /// opened up.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn classify(&self, path: &str) -> Classification {
        let path_segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.matches(&path_segments))
            .map(|(_, class)| class.clone())
            .unwrap_or(Classification::Authenticated)
    }
}

/// A validated caller identity, as produced by whatever token scheme an
/// application's [`SecurityPolicy`] implements.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub roles: Vec<String>,
    pub claims: HashMap<String, serde_json::Value>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// The pipeline's security hook: classify a path, then authorize the
/// incoming request against that classification. `trellis-security`
/// provides the JWT-backed implementation.
pub trait SecurityPolicy: Send + Sync {
    fn classify(&self, path: &str) -> Classification;

    /// `bearer_token` is the raw token from the `Authorization: Bearer ...`
    /// header, if present. Returns the resolved identity for authenticated
    /// routes, or `None` for public routes that had no token.
    fn authorize(
        &self,
        classification: &Classification,
        bearer_token: Option<&str>,
    ) -> Result<Option<Identity>, crate::error::AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_matches_exactly() {
        let mut rules = SecurityRules::new();
        rules.public("/auth/login");
        assert_eq!(rules.classify("/auth/login"), Classification::Public);
        assert_eq!(rules.classify("/auth/logout"), Classification::Authenticated);
    }

    #[test]
    fn single_wildcard_matches_one_segment() {
        let mut rules = SecurityRules::new();
        rules.public("/static/*");
        assert_eq!(rules.classify("/static/logo.png"), Classification::Public);
        assert_eq!(rules.classify("/static/img/logo.png"), Classification::Authenticated);
    }

    #[test]
    fn multi_wildcard_matches_rest_of_path() {
        let mut rules = SecurityRules::new();
        rules.public("/public/**");
        assert_eq!(rules.classify("/public/a/b/c"), Classification::Public);
    }

    #[test]
    fn role_restricted_pattern() {
        let mut rules = SecurityRules::new();
        rules.role("/admin/**", "ADMIN");
        assert_eq!(rules.classify("/admin/users"), Classification::Role("ADMIN".to_string()));
    }

    #[test]
    fn first_match_wins_for_overlapping_patterns() {
        let mut rules = SecurityRules::new();
        rules.public("/users/public-profile");
        rules.role("/users/**", "ADMIN");
        assert_eq!(rules.classify("/users/public-profile"), Classification::Public);
        assert_eq!(rules.classify("/users/secret"), Classification::Role("ADMIN".to_string()));
    }

    #[test]
    fn unmatched_path_defaults_to_authenticated() {
        let rules = SecurityRules::new();
        assert_eq!(rules.classify("/anything"), Classification::Authenticated);
    }
}
