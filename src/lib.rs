// src/lib.rs
pub mod app;
pub mod body;
pub mod clock;
pub mod connection;
pub mod cookies;
pub mod error;
pub mod headers;
pub mod io_stream;
pub mod method;
pub mod middleware;
pub mod parser;
pub mod pool;
pub mod request;
pub mod response;
pub mod router;
pub mod static_file;
pub mod status;
pub mod threadpool;
pub mod uri;
pub mod websocket;

pub use app::{Application, ApplicationBuilder, Options, Route};
pub use body::{BodyReader, ChunkedReader, Content};
pub use clock::Clock;
pub use connection::{ConnectionLimits, Handler, RouteHandler, ServerConnection};
pub use cookies::Cookies;
pub use error::{BodyError, ParseError, RequestError, ServerError};
pub use headers::Headers;
pub use io_stream::{DuplexIo, IOStream};
pub use method::Method;
pub use middleware::{Middleware, MiddlewareChain};
pub use pool::ObjectPool;
pub use request::{Request, ServerRequest};
pub use response::{Body, Response};
pub use router::{Params, PatternMatcher, Router};
pub use static_file::StaticFileHandler;
pub use status::Status;
pub use uri::{RequestUri, UriForm};
pub use websocket::{Protocol, WebSocketHandler};
