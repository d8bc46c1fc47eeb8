//! Compile-time-ordered route table (spec §4.7).
//!
//! Differs from the teacher's own `DefaultRouter`, which scores every
//! registered route by longest-literal-match length and a wildcard/param/
//! literal precedence tiebreak and picks the single best match: this table
//! is a plain ordered list checked in registration order, first match wins,
//! no scoring. The segment vocabulary (`Literal`/`Param`/`Wildcard`/
//! `DoubleWildcard`) and its `parse_route`-style tokenizer are kept from the
//! teacher's `router.rs`; only the matching policy changed. Matching itself
//! is behind a `PatternMatcher` trait so a compiled/regex matcher can stand
//! in for the default segment matcher without touching the table.

use std::collections::HashMap;

use crate::method::Method;

pub type Params<'r> = HashMap<&'r str, &'r str>;

/// A single request-target pattern matcher. The default implementation is
/// [`SegmentPattern`]; a compile-time regex matcher is an external
/// collaborator this crate doesn't provide, but anything implementing this
/// trait plugs into [`Router`] the same way.
pub trait PatternMatcher: Send + Sync {
    fn matches<'r>(&self, path: &'r str) -> Option<Params<'r>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
    DoubleWildcard,
}

fn parse_segment(s: &str) -> Segment {
    match s {
        "*" => Segment::Wildcard,
        "**" => Segment::DoubleWildcard,
        _ if s.starts_with(':') => Segment::Param(s[1..].to_string()),
        lit => Segment::Literal(lit.to_string()),
    }
}

/// Segment-by-segment path matcher (`/users/:id`, `/static/**`).
pub struct SegmentPattern {
    segments: Vec<Segment>,
}

impl SegmentPattern {
    pub fn parse(pattern: &str) -> Self {
        Self {
            segments: pattern.split('/').filter(|s| !s.is_empty()).map(parse_segment).collect(),
        }
    }
}

impl PatternMatcher for SegmentPattern {
    fn matches<'r>(&self, path: &'r str) -> Option<Params<'r>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Params::new();
        let mut pi = 0;

        for seg in &self.segments {
            match seg {
                Segment::DoubleWildcard => return Some(params),
                Segment::Wildcard => {
                    parts.get(pi)?;
                    pi += 1;
                }
                Segment::Param(name) => {
                    params.insert(name.as_str(), *parts.get(pi)?);
                    pi += 1;
                }
                Segment::Literal(lit) => {
                    if parts.get(pi) != Some(&lit.as_str()) {
                        return None;
                    }
                    pi += 1;
                }
            }
        }

        if pi == parts.len() {
            Some(params)
        } else {
            None
        }
    }
}

/// Matches only the asterisk-form request-target (`OPTIONS *`).
pub struct AsteriskPattern;

impl PatternMatcher for AsteriskPattern {
    fn matches<'r>(&self, path: &'r str) -> Option<Params<'r>> {
        (path == "*").then(Params::new)
    }
}

struct RouteEntry<H> {
    method: Method,
    matcher: Box<dyn PatternMatcher>,
    handler: H,
}

/// An ordered, first-match-wins route table (spec §4.7: "Routes are known at
/// compile time as an ordered sequence").
pub struct Router<H> {
    routes: Vec<RouteEntry<H>>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers a route matching `method` and the segment pattern `path`.
    pub fn add(&mut self, method: Method, path: &str, handler: H) -> &mut Self {
        self.add_with_matcher(method, Box::new(SegmentPattern::parse(path)), handler)
    }

    pub fn add_with_matcher(
        &mut self,
        method: Method,
        matcher: Box<dyn PatternMatcher>,
        handler: H,
    ) -> &mut Self {
        self.routes.push(RouteEntry {
            method,
            matcher,
            handler,
        });
        self
    }

    /// Returns the first registered route whose method and pattern both
    /// match, along with any extracted path parameters.
    pub fn find<'r>(&self, method: Method, path: &'r str) -> Option<(&H, Params<'r>)> {
        for route in &self.routes {
            if route.method != method {
                continue;
            }
            if let Some(params) = route.matcher.matches(path) {
                return Some((&route.handler, params));
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_route_matches_exact_path() {
        let mut r = Router::new();
        r.add(Method::Get, "/health", "health-handler");
        assert_eq!(r.find(Method::Get, "/health").unwrap().0, &"health-handler");
        assert!(r.find(Method::Get, "/healthz").is_none());
    }

    #[test]
    fn param_segment_captures_value() {
        let mut r = Router::new();
        r.add(Method::Get, "/users/:id", "user-handler");
        let (h, params) = r.find(Method::Get, "/users/42").unwrap();
        assert_eq!(h, &"user-handler");
        assert_eq!(params.get("id"), Some(&"42"));
    }

    #[test]
    fn double_wildcard_matches_any_suffix() {
        let mut r = Router::new();
        r.add(Method::Get, "/static/**", "static-handler");
        assert!(r.find(Method::Get, "/static/a/b/c.css").is_some());
    }

    #[test]
    fn first_registered_match_wins_over_a_later_broader_one() {
        let mut r = Router::new();
        r.add(Method::Get, "/users/me", "me-handler");
        r.add(Method::Get, "/users/:id", "id-handler");
        let (h, _) = r.find(Method::Get, "/users/me").unwrap();
        assert_eq!(h, &"me-handler");
    }

    #[test]
    fn method_mismatch_does_not_match() {
        let mut r = Router::new();
        r.add(Method::Post, "/users", "create-handler");
        assert!(r.find(Method::Get, "/users").is_none());
    }

    #[test]
    fn asterisk_pattern_matches_only_literal_asterisk() {
        let mut r = Router::new();
        r.add_with_matcher(Method::Options, Box::new(AsteriskPattern), "options-handler");
        assert!(r.find(Method::Options, "*").is_some());
        assert!(r.find(Method::Options, "/foo").is_none());
    }
}
