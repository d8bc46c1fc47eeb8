//! The embedding surface: `Application`/`ApplicationBuilder`, `Options`
//! configuration, `Route` convenience constructors, and the acceptor/janitor
//! loops (spec §4.9: Application).
//!
//! Grounded in the teacher's `server::{Server, ServerBuilder}` (bind_addrs,
//! router-building, builder pattern) and `threadpool::ThreadPool` (thread-
//! per-connection dispatch), generalized from one fixed `Router<Box<RouteFn>>`
//! to this crate's `Router<Handler>`/`MiddlewareChain`. The `Clock`-updating
//! janitor thread and `Options`' full configuration surface (spec §6) have
//! no khttp counterpart; see DESIGN.md for why the teacher's `epoll` reactor
//! (`server/epoll.rs`) was not carried forward.

use std::io;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::clock::Clock;
use crate::connection::{self, ConnectionLimits, Handler, ServerConnection};
use crate::method::Method;
use crate::middleware::{Middleware, MiddlewareChain};
use crate::parser::HeadLimits;
use crate::pool::ObjectPool;
use crate::request::ServerRequest;
use crate::router::{PatternMatcher, Router};
use crate::static_file::StaticFileHandler;
use crate::threadpool::{Job, ThreadPool};
use crate::websocket::{Protocol, WebSocketHandler};

/// Configuration surface (spec §6: "recognised options and effects").
/// Defaults match the values spec.md lists for each field.
#[derive(Debug, Clone)]
pub struct Options {
    pub max_header_count: usize,
    pub max_cookie_count: usize,
    pub max_request_headers_size: usize,
    pub request_buffer_size: usize,
    pub handler_buffer_size: usize,
    pub max_request_line_size: usize,
    pub max_content_length: u64,
    /// Not named in spec §6's list directly, but required to bound
    /// `ConnectionLimits.max_chunk_size` (spec §4.4: "accumulated size
    /// checked against the configured maximum after each chunk"). Defaults
    /// to `max_content_length`.
    pub max_chunk_size: u64,
    pub response_buffer_size: usize,
    pub response_header_count: usize,
    pub idle_connection_timeout: Duration,
    pub header_timeout: Duration,
    pub body_timeout: Duration,
    pub tcp_nodelay: bool,
    pub trust_x_headers: bool,
    pub debug: bool,
    pub kernel_backlog: u32,
    pub reuse_address: bool,
    /// Worker thread count for the thread-per-connection acceptor loop
    /// (spec §5: "configurable to blocking-sequential"; not itself a spec §6
    /// option, grounded on the teacher's `ServerBuilder::thread_count`).
    pub thread_count: usize,
}

impl Default for Options {
    fn default() -> Self {
        let max_content_length = 50 * 1024 * 1024;
        Self {
            max_header_count: 32,
            max_cookie_count: 32,
            max_request_headers_size: 10 * 1024,
            request_buffer_size: 64 * 1024,
            handler_buffer_size: 5 * 1024,
            max_request_line_size: 4 * 1024,
            max_content_length,
            max_chunk_size: max_content_length,
            response_buffer_size: 64 * 1024,
            response_header_count: 12,
            idle_connection_timeout: Duration::from_secs(60),
            header_timeout: Duration::from_secs(10),
            body_timeout: Duration::from_secs(30),
            tcp_nodelay: true,
            trust_x_headers: true,
            debug: false,
            kernel_backlog: 1024,
            reuse_address: true,
            thread_count: 20,
        }
    }
}

impl Options {
    fn connection_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            head: HeadLimits {
                max_request_line_size: self.max_request_line_size,
                max_header_count: self.max_header_count,
                max_request_headers_size: self.max_request_headers_size,
            },
            max_content_length: self.max_content_length,
            max_chunk_size: self.max_chunk_size,
            max_cookie_count: self.max_cookie_count,
            debug: self.debug,
        }
    }
}

/// A route registered on an [`ApplicationBuilder`] (spec §4.7). The plain
/// constructors (`get`/`post`/...) wrap a user handler; `static_files` and
/// `websocket` build the composed handlers spec §4.7/§4.8 describe.
pub struct Route {
    method: Method,
    matcher: RouteMatcher,
    handler: Handler,
}

enum RouteMatcher {
    Segment(String),
    Custom(Box<dyn PatternMatcher>),
}

impl Route {
    fn new(method: Method, path: impl Into<String>, handler: Handler) -> Self {
        Self {
            method,
            matcher: RouteMatcher::Segment(path.into()),
            handler,
        }
    }

    pub fn get(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::Get, path, handler)
    }

    pub fn post(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::Post, path, handler)
    }

    pub fn put(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::Put, path, handler)
    }

    pub fn patch(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::Patch, path, handler)
    }

    pub fn delete(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::Delete, path, handler)
    }

    pub fn options(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(Method::Options, path, handler)
    }

    /// `Route.static(url_prefix, filesystem_root)` (spec §4.7): serves files
    /// under `filesystem_root` for any path under `url_prefix`.
    pub fn static_files(url_prefix: impl Into<String>, filesystem_root: impl Into<std::path::PathBuf>) -> Self {
        let url_prefix = url_prefix.into();
        let handler = Box::new(StaticFileHandler::new(url_prefix.clone(), filesystem_root)) as Handler;
        Self {
            method: Method::Get,
            matcher: RouteMatcher::Segment(format!("{url_prefix}**")),
            handler,
        }
    }

    /// `Route.websocket(name, path, Protocol)` (spec §4.7): the handshake
    /// runs on GET, per RFC 6455.
    pub fn websocket<P: Protocol + 'static>(path: impl Into<String>, protocol: P) -> Self {
        Self::new(Method::Get, path, Box::new(WebSocketHandler::new(protocol)))
    }

    pub fn with_matcher(method: Method, matcher: Box<dyn PatternMatcher>, handler: Handler) -> Self {
        Self {
            method,
            matcher: RouteMatcher::Custom(matcher),
            handler,
        }
    }
}

/// Builds an [`Application`] (spec §4.9).
pub struct ApplicationBuilder {
    options: Options,
    router: Router<Handler>,
    middleware: MiddlewareChain,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            options: Options::default(),
            router: Router::new(),
            middleware: MiddlewareChain::new(),
        }
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        match route.matcher {
            RouteMatcher::Segment(path) => {
                self.router.add(route.method, &path, route.handler);
            }
            RouteMatcher::Custom(matcher) => {
                self.router.add_with_matcher(route.method, matcher, route.handler);
            }
        }
        self
    }

    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    pub fn build(self) -> Application {
        Application {
            options: self.options,
            router: Arc::new(self.router),
            middleware: Arc::new(self.middleware),
            clock: Arc::new(Clock::new()),
            connection_pool: Arc::new(ObjectPool::new()),
            request_pool: Arc::new(ObjectPool::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the listening socket, pools, and the shared `Clock` (spec §4.9).
/// `serve` runs the acceptor loop until `shutdown` is set (by the SIGINT
/// handler installed in `serve`, or by a test driving `shutdown_handle`
/// directly).
pub struct Application {
    options: Options,
    router: Arc<Router<Handler>>,
    middleware: Arc<MiddlewareChain>,
    clock: Arc<Clock>,
    connection_pool: Arc<ObjectPool<ServerConnection>>,
    request_pool: Arc<ObjectPool<ServerRequest>>,
    shutdown: Arc<AtomicBool>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// A clone-able flag the caller can set to stop `serve`'s acceptor loop
    /// (e.g. from a signal handler or a test's own thread).
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Runs the acceptor and janitor loops until shutdown (spec §4.9).
    /// Ignores `SIGPIPE` and installs a `SIGINT` handler that sets the
    /// shutdown flag so in-flight connections finish their current request.
    pub fn serve<A: ToSocketAddrs>(&self, addr: A) -> io::Result<()> {
        install_signal_handlers(self.shutdown.clone());

        let listener = TcpListener::bind(addr)?;
        log::info!("listening");

        self.spawn_janitor();

        let pool = ThreadPool::new(self.options.thread_count);
        for stream in listener.incoming() {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("accept failed: {e}");
                    continue;
                }
            };
            self.dispatch_connection(&pool, stream);
        }
        Ok(())
    }

    /// Handles `stream` on the calling thread instead of a pool worker, for
    /// embedders that already manage their own scheduling (spec §5: "the
    /// core is agnostic to the scheduler").
    pub fn handle(&self, stream: TcpStream) {
        self.serve_one(stream);
    }

    fn dispatch_connection(&self, pool: &ThreadPool<Job>, stream: TcpStream) {
        let router = self.router.clone();
        let middleware = self.middleware.clone();
        let clock = self.clock.clone();
        let connection_pool = self.connection_pool.clone();
        let request_pool = self.request_pool.clone();
        let limits = self.options.connection_limits();
        let request_buffer_size = self.options.request_buffer_size;
        let response_buffer_size = self.options.response_buffer_size;
        let tcp_nodelay = self.options.tcp_nodelay;
        let handler_buffer_size = self.options.handler_buffer_size;

        pool.execute(Job::new(move || {
            if tcp_nodelay {
                let _ = stream.set_nodelay(true);
            }
            let client_address = match stream.peer_addr() {
                Ok(a) => a,
                Err(_) => return,
            };
            let conn = connection_pool.get(|| ServerConnection::new(request_buffer_size, response_buffer_size));
            let conn = connection::serve(
                stream,
                client_address,
                conn,
                &limits,
                &router,
                &middleware,
                &clock,
                &request_pool,
                handler_buffer_size,
            );
            connection_pool.release(conn);
        }));
    }

    fn serve_one(&self, stream: TcpStream) {
        if self.options.tcp_nodelay {
            let _ = stream.set_nodelay(true);
        }
        let client_address = match stream.peer_addr() {
            Ok(a) => a,
            Err(_) => return,
        };
        let conn = self
            .connection_pool
            .get(|| ServerConnection::new(self.options.request_buffer_size, self.options.response_buffer_size));
        let limits = self.options.connection_limits();
        let conn = connection::serve(
            stream,
            client_address,
            conn,
            &limits,
            &self.router,
            &self.middleware,
            &self.clock,
            &self.request_pool,
            self.options.handler_buffer_size,
        );
        self.connection_pool.release(conn);
    }

    /// Janitor loop (spec §4.9): sleeps 1s, refreshes the clock, evicts at
    /// most one idle connection and one idle request from their pools.
    fn spawn_janitor(&self) {
        let clock = self.clock.clone();
        let connection_pool = self.connection_pool.clone();
        let request_pool = self.request_pool.clone();
        let shutdown = self.shutdown.clone();

        thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_secs(1));
                let _ = clock.now();
                if connection_pool.evict_one() {
                    log::debug!("janitor evicted an idle connection");
                }
                if request_pool.evict_one() {
                    log::debug!("janitor evicted an idle request");
                }
            }
        });
    }
}

#[cfg(unix)]
fn install_signal_handlers(shutdown: Arc<AtomicBool>) {
    use std::sync::OnceLock;

    static SHUTDOWN_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();
    let _ = SHUTDOWN_FLAG.set(shutdown);

    extern "C" fn on_sigint(_sig: libc::c_int) {
        if let Some(flag) = SHUTDOWN_FLAG.get() {
            flag.store(true, Ordering::Relaxed);
        }
    }

    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
fn install_signal_handlers(_shutdown: Arc<AtomicBool>) {}
