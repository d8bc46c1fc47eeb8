use std::fmt;
use std::io;

/// Parser-layer errors (spec §7 "Parser" + "Capacity" kinds), hand-rolled in
/// khttp's `HttpParsingError` style rather than via `thiserror`: the taxonomy
/// is small, closed, and the `Display` text is user-facing wire-adjacent
/// wording, not a derive-friendly debug format.
#[derive(Debug)]
#[non_exhaustive]
pub enum ParseError {
    BadRequest,
    MethodNotAllowed,
    UnsupportedHttpVersion,
    RequestUriTooLong,
    RequestHeaderFieldsTooLarge,
    RequestEntityTooLarge,
    ImproperlyTerminatedChunk,
    /// Internal signal: the scratch buffer ran out before a terminator was
    /// seen. Callers refill from the socket and retry the failed step
    /// (spec §4.4: "Parser is resumable on EndOfBuffer").
    EndOfBuffer,
    Io(io::Error),
}

impl PartialEq for ParseError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Io(_), Self::Io(_)) => true,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ParseError::*;
        match self {
            BadRequest => write!(f, "bad request"),
            MethodNotAllowed => write!(f, "method not allowed"),
            UnsupportedHttpVersion => write!(f, "unsupported http version"),
            RequestUriTooLong => write!(f, "request-uri too long"),
            RequestHeaderFieldsTooLarge => write!(f, "request header fields too large"),
            RequestEntityTooLarge => write!(f, "request entity too large"),
            ImproperlyTerminatedChunk => write!(f, "improperly terminated chunk"),
            EndOfBuffer => write!(f, "end of buffer"),
            Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => ParseError::EndOfBuffer,
            _ => ParseError::Io(e),
        }
    }
}

impl ParseError {
    /// Transport-layer errors terminate the connection silently rather than
    /// producing a response (spec §7 propagation policy).
    pub fn is_transport(&self) -> bool {
        matches!(self, ParseError::Io(e) if matches!(
            e.kind(),
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof
        ))
    }

    pub fn status_code(&self) -> u16 {
        use ParseError::*;
        match self {
            BadRequest | ImproperlyTerminatedChunk | EndOfBuffer => 400,
            MethodNotAllowed => 405,
            UnsupportedHttpVersion => 505,
            RequestUriTooLong => 414,
            RequestHeaderFieldsTooLarge => 431,
            RequestEntityTooLarge => 413,
            Io(_) => 500,
        }
    }
}

/// Errors surfaced while draining or spooling a request body.
#[derive(Debug)]
#[non_exhaustive]
pub enum BodyError {
    RequestEntityTooLarge,
    ImproperlyTerminatedChunk,
    Io(io::Error),
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyError::RequestEntityTooLarge => write!(f, "request entity too large"),
            BodyError::ImproperlyTerminatedChunk => write!(f, "improperly terminated chunk"),
            BodyError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}
impl std::error::Error for BodyError {}
impl From<io::Error> for BodyError {
    fn from(e: io::Error) -> Self {
        BodyError::Io(e)
    }
}

/// Errors raised by the server/emission layer proper (spec §7 "Server" kind).
#[derive(Debug)]
#[non_exhaustive]
pub enum ServerError {
    /// The emitted byte count disagreed with the advertised `Content-Length`.
    ContentLengthMismatch { advertised: u64, emitted: u64 },
    OutOfMemory,
    Handler(Box<dyn std::error::Error + Send + Sync>),
    Io(io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::ContentLengthMismatch {
                advertised,
                emitted,
            } => write!(
                f,
                "content-length mismatch: advertised {advertised}, emitted {emitted}"
            ),
            ServerError::OutOfMemory => write!(f, "handler scratch allocator exhausted"),
            ServerError::Handler(e) => write!(f, "handler error: {e}"),
            ServerError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}
impl std::error::Error for ServerError {}
impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::Io(e)
    }
}

impl ServerError {
    /// Status code for a handler failure. A body reader that rejected an
    /// oversized chunked body (see [`BodyError::RequestEntityTooLarge`])
    /// surfaces here as a plain `io::Error` carrying that error as its
    /// source, since `dyn Read::read` can't return anything richer — this
    /// recovers the original classification rather than collapsing every
    /// handler error to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::Io(e) => e
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<BodyError>())
                .map(|b| match b {
                    BodyError::RequestEntityTooLarge => 413,
                    BodyError::ImproperlyTerminatedChunk => 400,
                    BodyError::Io(_) => 500,
                })
                .unwrap_or(500),
            _ => 500,
        }
    }
}

/// Top-level error attached to `ServerRequest.err` (spec §3: ServerRequest).
#[derive(Debug)]
pub enum RequestError {
    Parse(ParseError),
    Body(BodyError),
    Server(ServerError),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Parse(e) => e.fmt(f),
            RequestError::Body(e) => e.fmt(f),
            RequestError::Server(e) => e.fmt(f),
        }
    }
}
impl std::error::Error for RequestError {}

impl From<ParseError> for RequestError {
    fn from(e: ParseError) -> Self {
        RequestError::Parse(e)
    }
}
impl From<BodyError> for RequestError {
    fn from(e: BodyError) -> Self {
        RequestError::Body(e)
    }
}
impl From<ServerError> for RequestError {
    fn from(e: ServerError) -> Self {
        RequestError::Server(e)
    }
}

impl RequestError {
    pub fn status_code(&self) -> u16 {
        match self {
            RequestError::Parse(e) => e.status_code(),
            RequestError::Body(BodyError::RequestEntityTooLarge) => 413,
            RequestError::Body(_) => 400,
            RequestError::Server(_) => 500,
        }
    }

    /// Transport errors that should close the connection silently rather than
    /// attempt a response (spec §4.8 step 6 classification).
    pub fn is_silent_transport(&self) -> bool {
        matches!(self, RequestError::Parse(e) if e.is_transport())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(ParseError::BadRequest.status_code(), 400);
        assert_eq!(ParseError::RequestHeaderFieldsTooLarge.status_code(), 431);
        assert_eq!(ParseError::UnsupportedHttpVersion.status_code(), 505);
    }

    #[test]
    fn server_error_recovers_entity_too_large_from_wrapped_body_error() {
        let io_err = io::Error::new(io::ErrorKind::Other, BodyError::RequestEntityTooLarge);
        let err = ServerError::Io(io_err);
        assert_eq!(err.status_code(), 413);
    }

    #[test]
    fn unexpected_eof_maps_to_end_of_buffer() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "x");
        let err: ParseError = io_err.into();
        assert_eq!(err, ParseError::EndOfBuffer);
    }
}
