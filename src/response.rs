//! Response model and streaming emission (spec §3 Response, §4.5 response
//! emission, §4.6 static-file streaming).
//!
//! Grounded in the teacher's `printer.rs` (`HttpPrinter`, body-strategy
//! selection, chunk framing), but writes go through the connection's
//! [`IOStream`] out-buffer instead of a `BufWriter`, and the body-length
//! decision is made once up front by the handler/static-file path rather
//! than probed after the fact — a pooled, per-request `Response` is built
//! once and emitted once, it never needs to sniff an unknown-length body.

use std::borrow::Cow;
use std::io::{self, Read, Write};

use crate::error::ServerError;
use crate::headers::Headers;
use crate::io_stream::{DuplexIo, IOStream};
use crate::status::Status;

const HTTP_VERSION: &[u8] = b"HTTP/1.1";
const CRLF: &[u8] = b"\r\n";

/// The response body, chosen by the handler or by a built-in like the
/// static-file handler (spec §3: Response.body_buffer / send_stream).
pub enum Body<'a> {
    Empty,
    Buffer(Cow<'a, [u8]>),
    /// A streamed body of known length (e.g. a file range).
    Stream(Box<dyn Read + 'a>, u64),
    /// A streamed body of unknown length; always emitted chunked (HTTP/1.1)
    /// or close-delimited (HTTP/1.0).
    StreamUnsized(Box<dyn Read + 'a>),
    /// Hands the connection's full duplex I/O to a protocol handler after the
    /// status line and headers are flushed (spec §4.8: WebSocket upgrade).
    /// The connection always closes once this returns.
    Upgrade(Box<dyn FnMut(&mut dyn DuplexIo) + 'a>),
}

impl<'a> std::fmt::Debug for Body<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Empty => write!(f, "Body::Empty"),
            Body::Buffer(b) => write!(f, "Body::Buffer({} bytes)", b.len()),
            Body::Stream(_, n) => write!(f, "Body::Stream({n} bytes)"),
            Body::StreamUnsized(_) => write!(f, "Body::StreamUnsized"),
            Body::Upgrade(_) => write!(f, "Body::Upgrade"),
        }
    }
}

/// A response under construction. Pooled alongside its `ServerRequest`
/// (spec §3: ServerRequest.response) and reset between requests.
#[derive(Debug)]
pub struct Response<'a> {
    pub status: Status,
    pub headers: Headers<'a>,
    pub body: Body<'a>,
    /// Set once the handler (or the connection machinery on error) has
    /// decided this response is ready to emit; a pre-middleware that sets
    /// this short-circuits dispatch (spec §4.8 PreMiddleware step).
    pub finished: bool,
    /// Forces connection close after this response regardless of
    /// keep-alive negotiation (spec §3: Response.disconnect_on_finish).
    pub disconnect_on_finish: bool,
}

impl<'a> Default for Response<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Response<'a> {
    pub fn new() -> Self {
        Self {
            status: Status::OK,
            headers: Headers::with_capacity(32),
            body: Body::Empty,
            finished: false,
            disconnect_on_finish: false,
        }
    }

    pub fn reset(&mut self) {
        self.status = Status::OK;
        self.headers.reset();
        self.body = Body::Empty;
        self.finished = false;
        self.disconnect_on_finish = false;
    }

    pub fn set_status(&mut self, status: Status) -> &mut Self {
        self.status = status;
        self
    }

    pub fn set_body(&mut self, bytes: impl Into<Cow<'a, [u8]>>) -> &mut Self {
        self.body = Body::Buffer(bytes.into());
        self
    }

    pub fn set_stream(&mut self, reader: impl Read + 'a, content_length: u64) -> &mut Self {
        self.body = Body::Stream(Box::new(reader), content_length);
        self
    }

    pub fn set_stream_unsized(&mut self, reader: impl Read + 'a) -> &mut Self {
        self.body = Body::StreamUnsized(Box::new(reader));
        self
    }

    /// Hands the connection off to `handler` once the head is flushed (spec
    /// §4.8: WebSocket upgrade). `disconnect_on_finish` is forced since the
    /// connection is never reusable for another HTTP request afterward.
    pub fn set_upgrade(&mut self, handler: impl FnMut(&mut dyn DuplexIo) + 'a) -> &mut Self {
        self.body = Body::Upgrade(Box::new(handler));
        self.disconnect_on_finish = true;
        self
    }

    /// Builds a redirect response (spec §3: Response.redirect). `status`
    /// should be one of the 3xx redirect codes; the caller picks it since
    /// the right one (301/302/303/307/308) depends on request semantics
    /// this type doesn't know about.
    pub fn redirect(&mut self, location: impl Into<Cow<'a, str>>, status: Status) -> &mut Self {
        self.status = status;
        let location: Cow<'a, str> = location.into();
        let body = format!("{status}. Redirecting to {location}");
        let _ = self.headers.put(
            "Location",
            match location {
                Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
                Cow::Owned(s) => Cow::Owned(s.into_bytes()),
            },
        );
        self.set_body(body.into_bytes());
        self.finished = true;
        self
    }

    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Writes the status line, headers, and body to `io` (spec §4.5).
    /// `request_version` is 0 or 1 (HTTP/1.0 or HTTP/1.1); bodies of unknown
    /// length on HTTP/1.0 can't use chunked framing and close the connection
    /// instead, which this also reports back via the returned bool so the
    /// connection loop knows not to try keep-alive.
    pub fn emit<S: Read + Write>(
        &mut self,
        io: &mut IOStream<S>,
        request_version: u8,
    ) -> Result<bool, ServerError> {
        // A handler answering HEAD sets Content-Length by hand and leaves the
        // body empty; honor that instead of collapsing it to 0.
        let preset_length = self
            .headers
            .get_str("Content-Length")
            .and_then(|v| v.parse::<u64>().ok());
        self.headers.remove("Content-Length");
        self.headers.remove("Transfer-Encoding");

        if self.headers.get_str("Content-Type").is_none() {
            let _ = self.headers.put("Content-Type", &b"text/html"[..]);
        }

        let must_close = match &self.body {
            Body::Empty => {
                put_content_length(&mut self.headers, preset_length.unwrap_or(0));
                false
            }
            Body::Buffer(b) => {
                put_content_length(&mut self.headers, b.len() as u64);
                false
            }
            Body::Stream(_, len) => {
                put_content_length(&mut self.headers, *len);
                false
            }
            Body::StreamUnsized(_) if request_version >= 1 => {
                self.headers.put("Transfer-Encoding", &b"chunked"[..]).ok();
                false
            }
            Body::StreamUnsized(_) => true, // HTTP/1.0: frame by closing the connection
            Body::Upgrade(_) => true, // 101 responses carry no Content-Length
        };

        self.write_head(io)?;
        self.write_body(io)?;
        io.flush()?;

        Ok(must_close || self.disconnect_on_finish)
    }

    fn write_head<S: Read + Write>(&self, io: &mut IOStream<S>) -> Result<(), ServerError> {
        io.write_all(HTTP_VERSION)?;
        io.write_all(b" ")?;
        io.write_all(self.status.code.to_string().as_bytes())?;
        io.write_all(b" ")?;
        io.write_all(self.status.phrase.as_bytes())?;
        io.write_all(CRLF)?;

        for (name, value) in self.headers.iter() {
            io.write_all(name.as_bytes())?;
            io.write_all(b": ")?;
            io.write_all(value)?;
            io.write_all(CRLF)?;
        }
        io.write_all(CRLF)?;
        Ok(())
    }

    fn write_body<S: Read + Write>(&mut self, io: &mut IOStream<S>) -> Result<(), ServerError> {
        let chunked = self.headers.has_token("Transfer-Encoding", "chunked");
        match &mut self.body {
            Body::Empty => Ok(()),
            Body::Buffer(b) => {
                io.write_all(b)?;
                Ok(())
            }
            Body::Stream(reader, len) => {
                let emitted = io.write_from_reader(reader)?;
                if emitted != *len {
                    return Err(ServerError::ContentLengthMismatch {
                        advertised: *len,
                        emitted,
                    });
                }
                Ok(())
            }
            Body::StreamUnsized(reader) if chunked => write_chunked(io, reader),
            Body::StreamUnsized(reader) => {
                io.write_from_reader(reader)?;
                Ok(())
            }
            Body::Upgrade(handler) => {
                handler(io);
                Ok(())
            }
        }
    }
}

fn put_content_length(headers: &mut Headers, len: u64) {
    let _ = headers.put("Content-Length", len.to_string().into_bytes());
}

fn write_chunked<S: Read + Write>(
    io: &mut IOStream<S>,
    reader: &mut Box<dyn Read + '_>,
) -> Result<(), ServerError> {
    let mut buf = [0u8; 16 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(ServerError::from)?;
        if n == 0 {
            break;
        }
        io.write_all(format!("{:X}\r\n", n).as_bytes())?;
        io.write_all(&buf[..n])?;
        io.write_all(CRLF)?;
    }
    io.write_all(b"0\r\n\r\n")?;
    Ok(())
}
