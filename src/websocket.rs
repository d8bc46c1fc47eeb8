//! WebSocket upgrade handshake and handoff (spec §4.7: `Route.websocket`;
//! spec §4.8: "WebSocket upgrade").
//!
//! No khttp counterpart — khttp has no WebSocket support at all. Grounded on
//! this crate's own `static_file.rs` for the "RouteHandler computing a fixed
//! header recipe, then handing off via `Response`" shape, and on RFC 6455
//! §1.3 for the handshake itself: the `Sec-WebSocket-Accept` derivation is
//! specified byte-for-byte, so there's nothing to resolve against a
//! reference implementation.

use std::io::Read;
use std::sync::Arc;

use base64::Engine;
use sha1::{Digest, Sha1};

use crate::connection::RouteHandler;
use crate::error::ServerError;
use crate::io_stream::DuplexIo;
use crate::request::Request;
use crate::response::Response;
use crate::router::Params;
use crate::status::Status;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// A user-supplied WebSocket message handler (spec §4.7: "parameterised by
/// the user's Protocol"). Takes over the raw duplex connection once the 101
/// response is flushed (spec §4.8: "close on any exit from `stream`" — the
/// connection loop enforces the close, this trait just gets the socket).
pub trait Protocol: Send + Sync {
    fn handle(&self, io: &mut dyn DuplexIo);
}

impl<F: Fn(&mut dyn DuplexIo) + Send + Sync> Protocol for F {
    fn handle(&self, io: &mut dyn DuplexIo) {
        (self)(io)
    }
}

/// Built by `Route::websocket` (spec §4.7). Validates the upgrade handshake
/// and, once accepted, hands the connection to `protocol`.
pub struct WebSocketHandler<P> {
    protocol: Arc<P>,
    check_origin: bool,
}

impl<P: Protocol + 'static> WebSocketHandler<P> {
    pub fn new(protocol: P) -> Self {
        Self {
            protocol: Arc::new(protocol),
            check_origin: true,
        }
    }

    /// Disables the `Origin` vs `Host` check (spec §4.8: "origin != host
    /// (overridable)").
    pub fn allow_cross_origin(mut self) -> Self {
        self.check_origin = false;
        self
    }
}

impl<P: Protocol + 'static> RouteHandler for WebSocketHandler<P> {
    fn call(
        &self,
        request: &Request<'_>,
        _params: &Params<'_>,
        _body: &mut dyn Read,
        response: &mut Response<'_>,
    ) -> Result<(), ServerError> {
        let Some(key) = validate_handshake(request, self.check_origin) else {
            log::warn!("rejected websocket upgrade from {}: invalid handshake", request.client_address);
            response.set_status(Status::BAD_REQUEST);
            response.set_body(&b"invalid websocket upgrade request"[..]);
            return Ok(());
        };

        let accept = accept_key(key);
        response.set_status(Status::SWITCHING_PROTOCOLS);
        let _ = response.headers.put("Upgrade", &b"websocket"[..]);
        let _ = response.headers.put("Connection", &b"Upgrade"[..]);
        let _ = response.headers.put("Sec-WebSocket-Accept", accept.into_bytes());

        let protocol = self.protocol.clone();
        response.set_upgrade(move |io| protocol.handle(io));
        Ok(())
    }
}

/// Rejects anything but a well-formed upgrade request (spec §4.8: "rejects
/// if `Upgrade` != `websocket`, or `Connection` lacks `upgrade` token, or
/// origin != host (overridable), or version not in {7,8,13}"). Returns the
/// `Sec-WebSocket-Key` on success.
fn validate_handshake<'r>(request: &Request<'r>, check_origin: bool) -> Option<&'r str> {
    if !request.headers.eql_ignore_case("Upgrade", b"websocket") {
        return None;
    }
    if !request.headers.has_token("Connection", "upgrade") {
        return None;
    }
    let version = request.headers.get_str("Sec-WebSocket-Version")?;
    if !matches!(version, "7" | "8" | "13") {
        return None;
    }
    if check_origin {
        if let Some(origin) = request.headers.get_str("Origin") {
            let origin_host = origin.split("://").nth(1).unwrap_or(origin);
            if Some(origin_host) != request.host() {
                return None;
            }
        }
    }
    request.headers.get_str("Sec-WebSocket-Key")
}

fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::Cookies;
    use crate::headers::Headers;
    use crate::method::Method;
    use crate::uri::RequestUri;

    fn request_with<'b>(headers: Headers<'b>) -> Request<'b> {
        Request {
            method: Method::Get,
            version: 1,
            uri: RequestUri::origin("/chat", "/chat", None),
            headers,
            cookies: Cookies::new(8),
            content_length: 0,
            head_slice: b"",
            client_address: "127.0.0.1:1".parse().unwrap(),
        }
    }

    #[test]
    fn accept_key_matches_rfc6455_worked_example() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    fn valid_headers() -> Headers<'static> {
        let mut h = Headers::new();
        h.append("Upgrade", &b"websocket"[..]).unwrap();
        h.append("Connection", &b"Upgrade"[..]).unwrap();
        h.append("Sec-WebSocket-Version", &b"13"[..]).unwrap();
        h.append("Sec-WebSocket-Key", &b"dGhlIHNhbXBsZSBub25jZQ=="[..]).unwrap();
        h
    }

    #[test]
    fn accepts_well_formed_handshake() {
        let request = request_with(valid_headers());
        assert_eq!(validate_handshake(&request, true), Some("dGhlIHNhbXBsZSBub25jZQ=="));
    }

    #[test]
    fn rejects_missing_upgrade_token() {
        let mut headers = valid_headers();
        headers.put("Upgrade", &b"h2c"[..]).unwrap();
        let request = request_with(headers);
        assert_eq!(validate_handshake(&request, true), None);
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut headers = valid_headers();
        headers.put("Sec-WebSocket-Version", &b"6"[..]).unwrap();
        let request = request_with(headers);
        assert_eq!(validate_handshake(&request, true), None);
    }

    #[test]
    fn handler_emits_101_with_accept_header() {
        let request = request_with(valid_headers());
        let handler = WebSocketHandler::new(|_io: &mut dyn DuplexIo| {});
        let params: Params<'_> = Params::new();
        let mut response = Response::new();
        handler.call(&request, &params, &mut std::io::empty(), &mut response).unwrap();
        assert_eq!(response.status, Status::SWITCHING_PROTOCOLS);
        assert_eq!(
            response.headers.get_str("Sec-WebSocket-Accept"),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
        assert!(response.disconnect_on_finish);
    }

    #[test]
    fn handler_rejects_bad_handshake_with_400() {
        let request = request_with(Headers::new());
        let handler = WebSocketHandler::new(|_io: &mut dyn DuplexIo| {});
        let params: Params<'_> = Params::new();
        let mut response = Response::new();
        handler.call(&request, &params, &mut std::io::empty(), &mut response).unwrap();
        assert_eq!(response.status, Status::BAD_REQUEST);
    }
}
