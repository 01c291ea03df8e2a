//! The route table: ordered registration, first-match-wins, single-segment
//! `{name}` placeholders. Deliberately not a trie or radix matcher — those
//! data structures reorder by specificity, which would violate the
//! first-registered-wins guarantee this framework promises callers.

use std::collections::HashMap;

use http::Method;

/// One path segment pattern: either a literal that must match exactly, or a
/// named placeholder that captures one (and only one) path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A single registered route.
pub struct Route<H> {
    method: Method,
    segments: Vec<Segment>,
    pub handler: H,
}

impl<H> Route<H> {
    fn matches_path(&self, path_segments: &[&str]) -> Option<HashMap<String, String>> {
        if self.segments.len() != path_segments.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (pattern, actual) in self.segments.iter().zip(path_segments) {
            match pattern {
                Segment::Literal(lit) => {
                    if lit != actual {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let decoded = percent_decode(actual);
                    params.insert(name.clone(), decoded);
                }
            }
        }
        Some(params)
    }
}

/// An ordered list of routes. Dispatch walks it front to back and returns
/// the first route whose method and path both match.
pub struct RouteTable<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        RouteTable { routes: Vec::new() }
    }
}

impl<H> RouteTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route. `pattern` is a path like `/users/{id}/posts`;
    /// each `{name}` segment captures exactly one path segment.
    pub fn push(&mut self, method: Method, pattern: &str, handler: H) {
        let segments = pattern
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|seg| {
                if let Some(name) = seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Segment::Param(name.to_string())
                } else {
                    Segment::Literal(seg.to_string())
                }
            })
            .collect();
        self.routes.push(Route { method, segments, handler });
    }

    /// Returns the first matching route plus its extracted path params.
    pub fn match_request(&self, method: &Method, path: &str) -> Option<(&Route<H>, HashMap<String, String>)> {
        let path_segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        self.routes
            .iter()
            .filter(|r| &r.method == method)
            .find_map(|r| r.matches_path(&path_segments).map(|params| (r, params)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route<H>> {
        self.routes.iter()
    }

    /// Methods of every registered route whose path matches, regardless of
    /// method — used to build the `Allow` header on a 405.
    pub fn methods_for_path(&self, path: &str) -> Vec<Method> {
        let path_segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        let mut methods = Vec::new();
        for route in &self.routes {
            if route.matches_path(&path_segments).is_some() && !methods.contains(&route.method) {
                methods.push(route.method.clone());
            }
        }
        methods
    }
}

fn percent_decode(segment: &str) -> String {
    percent_encoding::percent_decode_str(segment)
        .decode_utf8()
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// Parses a query string into a flat map, last value wins on duplicate
/// keys, percent-decoded per `application/x-www-form-urlencoded`.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        map.insert(key.into_owned(), value.into_owned());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_route_matches() {
        let mut table: RouteTable<&'static str> = RouteTable::new();
        table.push(Method::GET, "/users", "list");
        let (route, params) = table.match_request(&Method::GET, "/users").unwrap();
        assert_eq!(route.handler, "list");
        assert!(params.is_empty());
    }

    #[test]
    fn placeholder_captures_single_segment() {
        let mut table: RouteTable<&'static str> = RouteTable::new();
        table.push(Method::GET, "/users/{id}", "get_by_id");
        let (_, params) = table.match_request(&Method::GET, "/users/42").unwrap();
        assert_eq!(params.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn placeholder_does_not_span_segments() {
        let mut table: RouteTable<&'static str> = RouteTable::new();
        table.push(Method::GET, "/users/{id}", "get_by_id");
        assert!(table.match_request(&Method::GET, "/users/42/posts").is_none());
    }

    #[test]
    fn first_registered_route_wins() {
        let mut table: RouteTable<&'static str> = RouteTable::new();
        table.push(Method::GET, "/users/{id}", "specific");
        table.push(Method::GET, "/users/{anything}", "fallback");
        let (route, _) = table.match_request(&Method::GET, "/users/7").unwrap();
        assert_eq!(route.handler, "specific");
    }

    #[test]
    fn method_mismatch_does_not_match() {
        let mut table: RouteTable<&'static str> = RouteTable::new();
        table.push(Method::GET, "/users", "list");
        assert!(table.match_request(&Method::POST, "/users").is_none());
    }

    #[test]
    fn placeholder_is_percent_decoded() {
        let mut table: RouteTable<&'static str> = RouteTable::new();
        table.push(Method::GET, "/search/{term}", "search");
        let (_, params) = table.match_request(&Method::GET, "/search/caf%C3%A9").unwrap();
        assert_eq!(params.get("term"), Some(&"café".to_string()));
    }

    #[test]
    fn methods_for_path_reports_path_matches_across_methods() {
        let mut table: RouteTable<&'static str> = RouteTable::new();
        table.push(Method::GET, "/users/{id}", "get_by_id");
        table.push(Method::PUT, "/users/{id}", "update");
        table.push(Method::DELETE, "/users/{id}", "delete");
        let mut methods = table.methods_for_path("/users/7");
        methods.sort_by_key(|m| m.to_string());
        assert_eq!(methods, vec![Method::DELETE, Method::GET, Method::PUT]);
    }

    #[test]
    fn methods_for_path_is_empty_when_no_route_matches_the_path() {
        let mut table: RouteTable<&'static str> = RouteTable::new();
        table.push(Method::GET, "/users/{id}", "get_by_id");
        assert!(table.methods_for_path("/nope").is_empty());
    }

    #[test]
    fn query_string_last_write_wins() {
        let params = parse_query_string("page=1&page=2&size=10");
        assert_eq!(params.get("page"), Some(&"2".to_string()));
        assert_eq!(params.get("size"), Some(&"10".to_string()));
    }
}
