//! Parsed request view and the pooled `ServerRequest` container that holds
//! it between pool checkouts (spec §3: Request, ServerRequest).

use std::net::SocketAddr;

use crate::cookies::Cookies;
use crate::error::RequestError;
use crate::headers::Headers;
use crate::method::Method;
use crate::uri::RequestUri;

/// A single parsed request. Every borrowed field points into the
/// connection's scratch buffer and is only valid for the duration of the
/// handler call that receives it — it is never stored back into the pooled
/// `ServerRequest` (spec §9 design note: "may enforce this by typing the
/// Request with a lifetime parameter").
#[derive(Debug)]
pub struct Request<'b> {
    pub method: Method,
    pub version: u8,
    pub uri: RequestUri<'b>,
    pub headers: Headers<'b>,
    pub cookies: Cookies<'b>,
    pub content_length: u64,
    /// The exact bytes making up the request line and header block,
    /// including the terminating CRLF (spec §3: Request.head_slice).
    pub head_slice: &'b [u8],
    pub client_address: SocketAddr,
}

impl<'b> Request<'b> {
    /// The effective host: absolute-form URI authority if present, else the
    /// `Host` header (spec §4.4). Bound to `&self` rather than `'b` since a
    /// header value may be owned (e.g. rewritten by middleware).
    pub fn host(&self) -> Option<&str> {
        match self.uri.host {
            Some(h) => Some(h),
            None => self.headers.get_str("Host"),
        }
    }

    pub fn path(&self) -> &'b str {
        self.uri.path
    }

    pub fn query(&self) -> Option<&'b str> {
        self.uri.query
    }
}

/// State machine position of a pooled request, mirroring the connection
/// state machine's coarse phases (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Start,
    Finished,
}

/// Pool entry holding the scratch buffer and any error recorded for the
/// current request cycle (spec §3: ServerRequest). The `Request<'_>` view
/// itself is *not* a field here — see the lifetime note above — it's
/// constructed fresh in the connection loop and passed to handlers by
/// reference.
pub struct ServerRequest {
    pub state: RequestState,
    pub err: Option<RequestError>,
    /// Owns one request's head bytes, independent of the connection's
    /// `IOStream` in-buffer: the head is copied in once its length is known,
    /// then reparsed from here, so the `Request<'_>` view never aliases a
    /// buffer the connection mutates later in the same cycle.
    pub scratch: Vec<u8>,
}

impl ServerRequest {
    pub fn new(scratch_capacity: usize) -> Self {
        Self {
            state: RequestState::Start,
            err: None,
            scratch: vec![0u8; scratch_capacity],
        }
    }

    pub fn reset(&mut self) {
        self.state = RequestState::Start;
        self.err = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_prefers_absolute_form_over_header() {
        let mut headers = Headers::new();
        headers.append("Host", &b"header-host"[..]).unwrap();
        let req = Request {
            method: Method::Get,
            version: 1,
            uri: RequestUri::absolute("http://uri-host/a", "http", "uri-host", "/a", None),
            headers,
            cookies: Cookies::new(8),
            content_length: 0,
            head_slice: b"",
            client_address: "127.0.0.1:1234".parse().unwrap(),
        };
        assert_eq!(req.host(), Some("uri-host"));
    }

    #[test]
    fn host_falls_back_to_header_for_origin_form() {
        let mut headers = Headers::new();
        headers.append("Host", &b"example.com"[..]).unwrap();
        let req = Request {
            method: Method::Get,
            version: 1,
            uri: RequestUri::origin("/a", "/a", None),
            headers,
            cookies: Cookies::new(8),
            content_length: 0,
            head_slice: b"",
            client_address: "127.0.0.1:1234".parse().unwrap(),
        };
        assert_eq!(req.host(), Some("example.com"));
    }
}
