//! The connection-level request/response loop (spec §4.8: the nine-step
//! connection state machine; spec §3: ServerConnection).
//!
//! Grounded in the teacher's `server/mod.rs` (`handle_connection`,
//! `handle_one_request`), generalized from a single read-parse-route-write
//! pass into the fuller Reset / Parse / PreMiddleware / Dispatch /
//! Body-Drain / Error-Handling / PostMiddleware / Emit / Keep-Alive cycle,
//! and from the teacher's thread-local scratch buffer to a pooled one so a
//! multi-listener server can still avoid per-request allocation.
//!
//! A parsed [`Request`]'s fields never borrow from the connection's
//! `IOStream` in-buffer directly. Reading the body (or writing the reply)
//! requires mutating that same `IOStream`, which would conflict with any
//! live borrow into it — so once the request head is located, its bytes are
//! copied once into the request's own scratch buffer and reparsed there,
//! independent of whatever the connection does with the socket next.

use std::io::{Read, Write};
use std::net::SocketAddr;

use crate::body::{self, BodyReader};
use crate::clock::Clock;
use crate::cookies::Cookies;
use crate::error::{RequestError, ServerError};
use crate::headers::Headers;
use crate::io_stream::IOStream;
use crate::method::Method;
use crate::middleware::MiddlewareChain;
use crate::parser::{self, HeadLimits};
use crate::request::{Request, ServerRequest};
use crate::response::Response;
use crate::router::Router;
use crate::status::Status;
use crate::uri::RequestUri;

/// Per-connection buffers recycled across accepted sockets (spec §3:
/// ServerConnection). Holds no socket of its own — a socket is only ever
/// borrowed for the lifetime of one `serve` call.
pub struct ServerConnection {
    in_buf: Vec<u8>,
    out_buf: Vec<u8>,
}

impl ServerConnection {
    pub fn new(in_capacity: usize, out_capacity: usize) -> Self {
        Self {
            in_buf: vec![0u8; in_capacity],
            out_buf: vec![0u8; out_capacity],
        }
    }
}

/// Handles one request once it's been parsed and dispatched (spec §4.7/§4.8
/// Dispatch step). Implementations report handler failures as `ServerError`
/// rather than panicking; the connection loop turns those into a 500.
pub trait RouteHandler: Send + Sync {
    fn call(
        &self,
        request: &Request<'_>,
        params: &crate::router::Params<'_>,
        body: &mut dyn Read,
        response: &mut Response<'_>,
    ) -> Result<(), ServerError>;
}

impl<F> RouteHandler for F
where
    F: Fn(&Request<'_>, &crate::router::Params<'_>, &mut dyn Read, &mut Response<'_>) -> Result<(), ServerError>
        + Send
        + Sync,
{
    fn call(
        &self,
        request: &Request<'_>,
        params: &crate::router::Params<'_>,
        body: &mut dyn Read,
        response: &mut Response<'_>,
    ) -> Result<(), ServerError> {
        (self)(request, params, body, response)
    }
}

pub type Handler = Box<dyn RouteHandler>;

/// The bounds and knobs the connection loop needs (spec §6: Options).
#[derive(Debug, Clone)]
pub struct ConnectionLimits {
    pub head: HeadLimits,
    pub max_content_length: u64,
    pub max_chunk_size: u64,
    pub max_cookie_count: usize,
    /// Mirrors `Options.debug` (spec §7): gates whether error responses and
    /// logs carry the underlying error's detail or just the generic status
    /// text/address.
    pub debug: bool,
}

/// Runs the request/response loop over `stream` until the peer disconnects,
/// a fatal transport error occurs, or keep-alive negotiation ends the
/// connection (spec §4.8). `conn` supplies the reusable in/out buffers;
/// its buffers are handed back to the caller on return so they can be
/// released to a pool.
pub fn serve<S: Read + Write>(
    stream: S,
    client_address: SocketAddr,
    mut conn: ServerConnection,
    limits: &ConnectionLimits,
    router: &Router<Handler>,
    middleware: &MiddlewareChain,
    clock: &Clock,
    request_pool: &crate::pool::ObjectPool<ServerRequest>,
    scratch_capacity: usize,
) -> ServerConnection {
    let in_buf = std::mem::take(&mut conn.in_buf);
    let out_buf = std::mem::take(&mut conn.out_buf);
    let mut io = IOStream::with_buffers(stream, in_buf, out_buf);

    loop {
        let mut server_request = request_pool.get(|| ServerRequest::new(scratch_capacity));
        server_request.reset();

        let outcome = run_one_request(
            &mut io,
            &mut server_request,
            limits,
            router,
            middleware,
            clock,
            client_address,
        );

        request_pool.release(server_request);

        match outcome {
            RequestOutcome::KeepAlive => continue,
            RequestOutcome::Close => break,
        }
    }

    let (in_buf, out_buf) = io.into_buffers();
    conn.in_buf = in_buf;
    conn.out_buf = out_buf;
    conn
}

enum RequestOutcome {
    KeepAlive,
    Close,
}

fn run_one_request<S: Read + Write>(
    io: &mut IOStream<S>,
    server_request: &mut ServerRequest,
    limits: &ConnectionLimits,
    router: &Router<Handler>,
    middleware: &MiddlewareChain,
    clock: &Clock,
    client_address: SocketAddr,
) -> RequestOutcome {
    // --- Parse ---------------------------------------------------------
    let head_len = match ensure_head_buffered(io, &limits.head) {
        Ok(None) => return RequestOutcome::Close, // clean EOF before any bytes
        Ok(Some(len)) => len,
        Err(e) => {
            let request = placeholder_request(client_address);
            return handle_error(io, server_request, &request, e.into(), middleware, clock, limits, 1);
        }
    };

    if head_len > server_request.scratch.len() {
        // Limits are expected to size the scratch buffer large enough; if a
        // caller misconfigures them, fail the request rather than panic.
        let request = placeholder_request(client_address);
        let err = RequestError::Server(ServerError::OutOfMemory);
        return handle_error(io, server_request, &request, err, middleware, clock, limits, 1);
    }
    server_request.scratch[..head_len].copy_from_slice(&io.buffered()[..head_len]);
    io.consume(head_len);

    let head = match parser::parse_head(&server_request.scratch[..head_len], &limits.head) {
        Ok(h) => h,
        Err(e) => {
            let request = placeholder_request(client_address);
            return handle_error(io, server_request, &request, e.into(), middleware, clock, limits, 1);
        }
    };

    let content_length = match parser::resolve_content_length(&head.headers, limits.max_content_length) {
        Ok(n) => n,
        Err(e) => {
            let cookies = Cookies::new(limits.max_cookie_count);
            let request = Request {
                method: head.method,
                version: head.version,
                uri: head.uri,
                headers: head.headers,
                cookies,
                content_length: 0,
                head_slice: &server_request.scratch[..head_len],
                client_address,
            };
            return handle_error(io, server_request, &request, e.into(), middleware, clock, limits, head.version);
        }
    };

    let mut cookies = Cookies::new(limits.max_cookie_count);
    if let Some(raw) = head.headers.get_str_borrowed("Cookie") {
        cookies.parse(raw);
    }

    let request_version = head.version;
    let request = Request {
        method: head.method,
        version: head.version,
        uri: head.uri,
        headers: head.headers,
        cookies,
        content_length,
        head_slice: &server_request.scratch[..head_len],
        client_address,
    };
    let wants_keep_alive = wants_keep_alive(&request, content_length);

    // --- PreMiddleware / Dispatch / Body-Drain / Error-Handling --------
    let mut response = Response::new();
    middleware.run_pre(&request, &mut response);

    if !response.finished {
        dispatch(io, &request, limits, router, &mut response);
    } else {
        // Pre-middleware short-circuited before the body was ever touched;
        // still drain it so a pipelined next request parses correctly.
        drain_body(
            io,
            content_length,
            is_chunked(&request),
            limits.max_chunk_size,
            limits.max_content_length,
        );
    }

    attach_ambient_headers(&mut response, clock);
    middleware.run_post(&request, &mut response);

    // --- Emit / Keep-Alive ----------------------------------------------
    match response.emit(io, request_version) {
        Ok(must_close) if !must_close && wants_keep_alive => RequestOutcome::KeepAlive,
        Ok(_) => RequestOutcome::Close,
        Err(_) => RequestOutcome::Close,
    }
}

/// Ensures a full request head is buffered, refilling from the socket as
/// needed (spec §4.4: "parser is resumable on EndOfBuffer"). Returns the
/// head's length in bytes, or `None` on a clean EOF with nothing buffered.
fn ensure_head_buffered<S: Read + Write>(
    io: &mut IOStream<S>,
    limits: &HeadLimits,
) -> Result<Option<usize>, crate::error::ParseError> {
    loop {
        match parser::parse_head(io.buffered(), limits) {
            Ok(head) => return Ok(Some(head.head_len)),
            Err(crate::error::ParseError::EndOfBuffer) => {
                if io.fill()? == 0 {
                    return if io.buffered().is_empty() {
                        Ok(None)
                    } else {
                        Err(crate::error::ParseError::BadRequest)
                    };
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// A request view for the error path when no head has been parsed yet (or
/// parsing failed before a `Request` could be built), so PreMiddleware's
/// sibling hook, PostMiddleware, still has something to run against (spec
/// §4.8 step 7: PostMiddleware always runs, even on the error path).
fn placeholder_request(client_address: SocketAddr) -> Request<'static> {
    Request {
        method: Method::Unknown,
        version: 1,
        uri: RequestUri::origin("", "", None),
        headers: Headers::new(),
        cookies: Cookies::new(0),
        content_length: 0,
        head_slice: &[],
        client_address,
    }
}

/// Appends `Date` and `Server` right before PostMiddleware runs, on every
/// path that reaches it, so middleware always observes the final header set
/// (spec §5 ordering guarantee).
fn attach_ambient_headers(response: &mut Response<'_>, clock: &Clock) {
    let _ = response.headers.put("Date", clock.now().into_bytes());
    let _ = response.headers.put("Server", b"httpd-core".to_vec());
}

/// Finishes a request that failed before or during parsing (spec §4.8 step 6
/// Error-Handling). Transport errors close the connection silently; anything
/// else still runs PostMiddleware and emits a response, so a failed request
/// is observable the same way a successful one is.
fn handle_error<S: Read + Write>(
    io: &mut IOStream<S>,
    server_request: &mut ServerRequest,
    request: &Request<'_>,
    err: RequestError,
    middleware: &MiddlewareChain,
    clock: &Clock,
    limits: &ConnectionLimits,
    request_version: u8,
) -> RequestOutcome {
    let is_transport = err.is_silent_transport();
    let status_code = err.status_code();
    let detail = err.to_string();

    if is_transport {
        log::debug!("closing connection after transport error: {detail}");
        server_request.err = Some(err);
        return RequestOutcome::Close;
    }

    if limits.debug {
        log::warn!("request from {} failed: {detail}", request.client_address);
    } else {
        log::warn!("request from {} failed", request.client_address);
    }
    server_request.err = Some(err);

    let status = Status::of(status_code);
    let mut response = Response::new();
    response.set_status(status);
    response.set_body(if limits.debug {
        detail.into_bytes()
    } else {
        status.description.as_bytes().to_vec()
    });
    response.disconnect_on_finish = true;

    attach_ambient_headers(&mut response, clock);
    middleware.run_post(request, &mut response);

    let _ = response.emit(io, request_version);
    RequestOutcome::Close
}

/// Keep-alive negotiation (spec §4.8 step 9): HTTP/1.1 stays open unless
/// `Connection: close` is present; HTTP/1.0 only stays open when the client
/// opted in with `Connection: keep-alive` *and* the message is framed well
/// enough to pipeline (a known length, chunked, or a body-less safe method).
fn wants_keep_alive(request: &Request<'_>, content_length: u64) -> bool {
    if request.version >= 1 {
        return !request.headers.has_token("Connection", "close");
    }
    let framed = content_length > 0 || is_chunked(request) || request.method.is_safe_for_http10_keepalive();
    framed && request.headers.has_token("Connection", "keep-alive")
}

fn dispatch<S: Read + Write>(
    io: &mut IOStream<S>,
    request: &Request<'_>,
    limits: &ConnectionLimits,
    router: &Router<Handler>,
    response: &mut Response<'_>,
) {
    let Some((handler, params)) = router.find(request.method, request.path()) else {
        response.set_status(Status::NOT_FOUND);
        response.set_body(&b"not found"[..]);
        drain_body(
            io,
            request.content_length,
            is_chunked(request),
            limits.max_chunk_size,
            limits.max_content_length,
        );
        return;
    };

    let chunked = is_chunked(request);
    let mut body_reader = if chunked {
        BodyReader::chunked(io, limits.max_chunk_size, limits.max_content_length)
    } else {
        BodyReader::fixed(io, request.content_length)
    };

    let result = handler.call(request, &params, &mut body_reader, response);
    // Whether the handler consumed the body or not, drain whatever is left
    // so a pipelined next request starts parsing at the right offset.
    let _ = body::drain(&mut body_reader);

    if let Err(err) = result {
        let status = Status::of(err.status_code());
        response.reset();
        response.set_status(status);
        response.set_body(if limits.debug {
            err.to_string().into_bytes()
        } else {
            status.description.as_bytes().to_vec()
        });
    }
}

fn is_chunked(request: &Request<'_>) -> bool {
    request.headers.has_token("Transfer-Encoding", "chunked")
}

fn drain_body<S: Read + Write>(
    io: &mut IOStream<S>,
    content_length: u64,
    chunked: bool,
    max_chunk_size: u64,
    max_content_length: u64,
) {
    let mut reader = if chunked {
        BodyReader::chunked(io, max_chunk_size, max_content_length)
    } else {
        BodyReader::fixed(io, content_length)
    };
    let _ = body::drain(&mut reader);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use std::io::Cursor;
    use std::sync::Arc;

    fn limits() -> ConnectionLimits {
        ConnectionLimits {
            head: HeadLimits {
                max_request_line_size: 4096,
                max_header_count: 32,
                max_request_headers_size: 8192,
            },
            max_content_length: 1024 * 1024,
            max_chunk_size: 1024 * 1024,
            max_cookie_count: 32,
            debug: false,
        }
    }

    #[test]
    fn responds_404_for_unmatched_route() {
        let router: Router<Handler> = Router::new();
        let stream = SharedStream::new(b"GET /missing HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n".to_vec());
        let out = stream.output.clone();
        let conn = ServerConnection::new(4096, 4096);
        let middleware = MiddlewareChain::new();
        let clock = Clock::new();
        let pool = crate::pool::ObjectPool::new();
        serve(
            stream,
            "127.0.0.1:1".parse().unwrap(),
            conn,
            &limits(),
            &router,
            &middleware,
            &clock,
            &pool,
            8192,
        );
        let written = String::from_utf8(out.lock().unwrap().clone()).unwrap();
        assert!(written.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn dispatches_to_matching_handler_and_keeps_alive_on_http11() {
        let mut router: Router<Handler> = Router::new();
        router.add(
            Method::Get,
            "/hello",
            Box::new(|_req: &Request<'_>, _p: &crate::router::Params<'_>, _b: &mut dyn Read, resp: &mut Response<'_>| {
                resp.set_status(Status::OK);
                resp.set_body(&b"hi"[..]);
                Ok(())
            }) as Handler,
        );

        let stream = SharedStream::new(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n".to_vec());
        let out = stream.output.clone();
        let conn = ServerConnection::new(4096, 4096);
        let middleware = MiddlewareChain::new();
        let clock = Clock::new();
        let pool = crate::pool::ObjectPool::new();
        serve(
            stream,
            "127.0.0.1:1".parse().unwrap(),
            conn,
            &limits(),
            &router,
            &middleware,
            &clock,
            &pool,
            8192,
        );
        let written = String::from_utf8(out.lock().unwrap().clone()).unwrap();
        assert!(written.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(written.ends_with("hi"));
    }

    #[test]
    fn success_response_carries_date_and_server_headers() {
        let mut router: Router<Handler> = Router::new();
        router.add(
            Method::Get,
            "/hello",
            Box::new(|_req: &Request<'_>, _p: &crate::router::Params<'_>, _b: &mut dyn Read, resp: &mut Response<'_>| {
                resp.set_status(Status::OK);
                resp.set_body(&b"hi"[..]);
                Ok(())
            }) as Handler,
        );

        let stream = SharedStream::new(b"GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n".to_vec());
        let out = stream.output.clone();
        let conn = ServerConnection::new(4096, 4096);
        let middleware = MiddlewareChain::new();
        let clock = Clock::new();
        let pool = crate::pool::ObjectPool::new();
        serve(
            stream,
            "127.0.0.1:1".parse().unwrap(),
            conn,
            &limits(),
            &router,
            &middleware,
            &clock,
            &pool,
            8192,
        );
        let written = String::from_utf8(out.lock().unwrap().clone()).unwrap();
        assert!(written.contains("\r\nDate: "));
        assert!(written.contains("\r\nServer: httpd-core\r\n"));
    }

    #[test]
    fn parse_error_still_runs_post_middleware_before_closing() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use crate::middleware::Middleware;

        struct CountPost(Arc<AtomicUsize>);
        impl Middleware for CountPost {
            fn post(&self, _req: &Request<'_>, _resp: &mut Response<'_>) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let router: Router<Handler> = Router::new();
        // "FROB" shares no first letter with any recognised method.
        let stream = SharedStream::new(b"FROB / HTTP/1.1\r\n\r\n".to_vec());
        let out = stream.output.clone();
        let conn = ServerConnection::new(4096, 4096);
        let count = Arc::new(AtomicUsize::new(0));
        let mut middleware = MiddlewareChain::new();
        middleware.push(Box::new(CountPost(count.clone())));
        let clock = Clock::new();
        let pool = crate::pool::ObjectPool::new();
        serve(
            stream,
            "127.0.0.1:1".parse().unwrap(),
            conn,
            &limits(),
            &router,
            &middleware,
            &clock,
            &pool,
            8192,
        );
        let written = String::from_utf8(out.lock().unwrap().clone()).unwrap();
        assert!(written.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    struct SharedStream {
        input: Cursor<Vec<u8>>,
        output: Arc<std::sync::Mutex<Vec<u8>>>,
    }

    impl SharedStream {
        fn new(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                output: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }
    }

    impl Read for SharedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for SharedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
