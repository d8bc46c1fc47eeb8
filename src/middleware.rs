//! Pre/post request hooks run around dispatch (spec §4.8: PreMiddleware,
//! PostMiddleware steps), grounded in the teacher's `pre_routing_hook`
//! (`server/mod.rs`) but generalized from a single optional closure into a
//! statically-ordered list, with separate pre- and post-dispatch hooks.

use crate::request::Request;
use crate::response::Response;

/// A single middleware. Both hooks default to a no-op so implementors only
/// override the one they need.
pub trait Middleware: Send + Sync {
    /// Runs before routing. Setting `response.finished` short-circuits
    /// dispatch entirely — the router is never consulted and the response
    /// is emitted as-is (spec §4.8 PreMiddleware step).
    fn pre(&self, _request: &Request<'_>, _response: &mut Response<'_>) {}

    /// Runs after the handler (or the pre-hook short-circuit) has produced a
    /// response, before it's emitted (spec §4.8 PostMiddleware step).
    fn post(&self, _request: &Request<'_>, _response: &mut Response<'_>) {}
}

/// An ordered chain of middlewares, run front-to-back for `pre` and
/// back-to-front for `post` — the usual wrapping-layer convention.
#[derive(Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn push(&mut self, middleware: Box<dyn Middleware>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// Runs `pre` hooks in order, stopping as soon as one finishes the
    /// response.
    pub fn run_pre(&self, request: &Request<'_>, response: &mut Response<'_>) {
        for mw in &self.middlewares {
            mw.pre(request, response);
            if response.finished {
                break;
            }
        }
    }

    pub fn run_post(&self, request: &Request<'_>, response: &mut Response<'_>) {
        for mw in self.middlewares.iter().rev() {
            mw.post(request, response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::Cookies;
    use crate::headers::Headers;
    use crate::method::Method;
    use crate::status::Status;
    use crate::uri::RequestUri;

    fn sample_request() -> Request<'static> {
        Request {
            method: Method::Get,
            version: 1,
            uri: RequestUri::origin("/", "/", None),
            headers: Headers::new(),
            cookies: Cookies::new(8),
            content_length: 0,
            head_slice: b"",
            client_address: "127.0.0.1:1".parse().unwrap(),
        }
    }

    struct Auth;
    impl Middleware for Auth {
        fn pre(&self, _req: &Request<'_>, resp: &mut Response<'_>) {
            resp.set_status(Status::UNAUTHORIZED);
            resp.finish();
        }
    }

    struct NeverRuns;
    impl Middleware for NeverRuns {
        fn pre(&self, _req: &Request<'_>, resp: &mut Response<'_>) {
            resp.set_status(Status::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn pre_hook_short_circuits_remaining_middlewares() {
        let mut chain = MiddlewareChain::new();
        chain.push(Box::new(Auth)).push(Box::new(NeverRuns));

        let request = sample_request();
        let mut response = Response::new();
        chain.run_pre(&request, &mut response);

        assert_eq!(response.status, Status::UNAUTHORIZED);
        assert!(response.finished);
    }

    struct AppendsTag(&'static str);
    impl Middleware for AppendsTag {
        fn post(&self, _req: &Request<'_>, resp: &mut Response<'_>) {
            let _ = resp.headers.append("X-Tag", self.0.as_bytes());
        }
    }

    #[test]
    fn post_hooks_run_in_reverse_order() {
        let mut chain = MiddlewareChain::new();
        chain.push(Box::new(AppendsTag("a"))).push(Box::new(AppendsTag("b")));

        let request = sample_request();
        let mut response = Response::new();
        chain.run_post(&request, &mut response);

        let tags: Vec<_> = response
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("X-Tag"))
            .map(|(_, v)| String::from_utf8_lossy(v).into_owned())
            .collect();
        assert_eq!(tags, vec!["b", "a"]);
    }
}
