use super::{parse_headers, trim_ows};
use crate::error::ParseError;
use crate::headers::Headers;
use crate::method::Method;
use crate::uri::RequestUri;
use memchr::memchr;

use super::simd::{match_path_vectored, match_uri_vectored};

/// Byte-size limits applied while parsing a single request head (spec §6:
/// `max_request_line_size`, `max_header_count`, `max_request_headers_size`).
#[derive(Debug, Clone, Copy)]
pub struct HeadLimits {
    pub max_request_line_size: usize,
    pub max_header_count: usize,
    pub max_request_headers_size: usize,
}

/// A fully parsed request head: method, request-target, version, and
/// headers, plus the exact byte length consumed from the start of the
/// request line through the terminating header CRLF (spec §3: `head_slice`).
#[derive(Debug)]
pub struct ParsedHead<'b> {
    pub method: Method,
    pub uri: RequestUri<'b>,
    pub version: u8,
    pub headers: Headers<'b>,
    pub head_len: usize,
}

/// Parses a request head out of `buf`. Returns `Err(ParseError::EndOfBuffer)`
/// if `buf` doesn't yet contain a complete head — the caller is expected to
/// refill its buffer and call this again from the start (spec §4.4: "Parser
/// is resumable on EndOfBuffer").
pub fn parse_head<'b>(buf: &'b [u8], limits: &HeadLimits) -> Result<ParsedHead<'b>, ParseError> {
    // tolerate a leading blank line before the request line, which shows up
    // between pipelined requests on some clients (spec §4.4 step 1).
    let mut line = buf;
    loop {
        if let Some(r) = line.strip_prefix(b"\r\n") {
            line = r;
            continue;
        }
        if let Some(r) = line.strip_prefix(b"\n") {
            line = r;
            continue;
        }
        break;
    }
    let head_start = buf.len() - line.len();

    let (method, rest) = parse_method(line, limits)?;
    let (uri, rest) = parse_uri(rest, limits)?;
    let (version, rest) = parse_version(rest)?;
    let rest = strip_line_ending(rest)?;

    let request_line_len = line.len() - rest.len();
    if request_line_len > limits.max_request_line_size {
        return Err(ParseError::RequestUriTooLong);
    }

    let (headers, tail) = parse_headers(rest, limits)?;
    let head_len = head_start + (line.len() - tail.len());

    Ok(ParsedHead {
        method,
        uri,
        version,
        headers,
        head_len,
    })
}

/// Resolves the effective request body length from `Content-Length` and
/// `Transfer-Encoding` (spec §4.4 step 5).
///
/// A `Content-Length` header whose value is itself a comma-separated list
/// (`Content-Length: 4,4`) is accepted and collapsed to its first member —
/// some proxies coalesce duplicate headers this way, and the alternative of
/// rejecting outright breaks otherwise well-formed requests.
pub fn resolve_content_length(
    headers: &Headers,
    max_content_length: u64,
) -> Result<u64, ParseError> {
    let chunked = headers.has_token("Transfer-Encoding", "chunked");
    let content_length = headers.get("Content-Length");

    match (content_length, chunked) {
        (Some(_), true) => Err(ParseError::BadRequest),
        (None, _) => Ok(0),
        (Some(raw), false) => {
            let first = raw.split(|&b| b == b',').next().unwrap_or(raw);
            let s = std::str::from_utf8(trim_ows(first)).map_err(|_| ParseError::BadRequest)?;
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseError::BadRequest);
            }
            let n: u64 = s.parse().map_err(|_| ParseError::BadRequest)?;
            if n > max_content_length {
                return Err(ParseError::RequestEntityTooLarge);
            }
            Ok(n)
        }
    }
}

fn strip_line_ending(buf: &[u8]) -> Result<&[u8], ParseError> {
    if let Some(r) = buf.strip_prefix(b"\r\n") {
        return Ok(r);
    }
    if let Some(r) = buf.strip_prefix(b"\n") {
        return Ok(r);
    }
    if buf.is_empty() {
        Err(ParseError::EndOfBuffer)
    } else {
        Err(ParseError::BadRequest)
    }
}

#[inline]
fn parse_method<'b>(buf: &'b [u8], limits: &HeadLimits) -> Result<(Method, &'b [u8]), ParseError> {
    // hot paths: GET and POST
    if let Some(rest) = buf.strip_prefix(b"GET ") {
        return Ok((Method::Get, rest));
    }
    if let Some(rest) = buf.strip_prefix(b"POST ") {
        return Ok((Method::Post, rest));
    }

    let sp = match memchr(b' ', buf) {
        Some(p) => p,
        None if buf.len() > limits.max_request_line_size => {
            return Err(ParseError::RequestUriTooLong)
        }
        None => return Err(ParseError::EndOfBuffer),
    };

    let token = &buf[..sp];
    if token.is_empty() || !token.iter().all(u8::is_ascii_alphabetic) {
        return Err(ParseError::BadRequest);
    }
    let method = match token {
        b"HEAD" => Method::Head,
        b"PUT" => Method::Put,
        b"PATCH" => Method::Patch,
        b"DELETE" => Method::Delete,
        b"OPTIONS" => Method::Options,
        // shares a first letter with a known method but isn't one of them
        // (e.g. "GETX", "POX") — syntactically a method token, just not one
        // this server special-cases (spec §4.4 step 3).
        _ if matches!(token[0], b'G' | b'P' | b'H' | b'D' | b'O') => Method::Unknown,
        // unknown first letter (e.g. "TRACE", "CONNECT") — rejected outright
        // rather than routed (spec §4.4 step 3: "unknown first letter ->
        // MethodNotAllowed").
        _ => return Err(ParseError::MethodNotAllowed),
    };
    Ok((method, &buf[sp + 1..]))
}

#[inline]
fn parse_uri<'b>(
    buf: &'b [u8],
    limits: &HeadLimits,
) -> Result<(RequestUri<'b>, &'b [u8]), ParseError> {
    match *buf.first().ok_or(ParseError::EndOfBuffer)? {
        b'*' => {
            let rest = buf.get(1..).ok_or(ParseError::EndOfBuffer)?;
            return match rest.first() {
                Some(b' ') => Ok((RequestUri::asterisk("*"), &rest[1..])),
                Some(_) => Err(ParseError::BadRequest),
                None => Err(ParseError::EndOfBuffer),
            };
        }
        b'/' => parse_origin_form(buf, limits),
        _ => parse_absolute_form(buf, limits),
    }
}

fn parse_origin_form<'b>(
    buf: &'b [u8],
    limits: &HeadLimits,
) -> Result<(RequestUri<'b>, &'b [u8]), ParseError> {
    let path_end = match_path_vectored(buf);
    if path_end >= buf.len() {
        return too_long_or(buf, limits, ParseError::EndOfBuffer);
    }
    let path = ascii_str(&buf[..path_end]);

    let (end, query) = parse_optional_query(buf, path_end, limits)?;
    match buf.get(end) {
        Some(b' ') => {}
        Some(_) => return Err(ParseError::BadRequest),
        None => return Err(ParseError::EndOfBuffer),
    }

    let raw = ascii_str(&buf[..end]);
    Ok((RequestUri::origin(raw, path, query), &buf[end + 1..]))
}

fn parse_absolute_form<'b>(
    buf: &'b [u8],
    limits: &HeadLimits,
) -> Result<(RequestUri<'b>, &'b [u8]), ParseError> {
    // scan scheme up to "://"
    let mut i = 0;
    let scheme_end = loop {
        if i >= buf.len() {
            return too_long_or(buf, limits, ParseError::EndOfBuffer);
        }
        match buf[i] {
            b':' if buf[i..].starts_with(b"://") => break i,
            b' ' => return Err(ParseError::BadRequest),
            b if is_valid_scheme_byte(b) => i += 1,
            _ => return Err(ParseError::BadRequest),
        }
    };
    let scheme = ascii_str(&buf[..scheme_end]);
    i = scheme_end + 3;

    let host_start = i;
    while i < buf.len() && buf[i] != b'/' && buf[i] != b' ' {
        if !is_valid_uri_byte(buf[i]) {
            return Err(ParseError::BadRequest);
        }
        i += 1;
    }
    if i >= buf.len() {
        return too_long_or(buf, limits, ParseError::EndOfBuffer);
    }
    if buf[i] == b' ' {
        // bare authority-form (CONNECT-style) is not a request-target this
        // server accepts; only origin/absolute/asterisk are (spec §3).
        return Err(ParseError::BadRequest);
    }
    let host = ascii_str(&buf[host_start..i]);

    let path_start = i;
    let path_end = i + match_path_vectored(&buf[i..]);
    if path_end >= buf.len() {
        return too_long_or(buf, limits, ParseError::EndOfBuffer);
    }
    let path = ascii_str(&buf[path_start..path_end]);

    let (end, query) = parse_optional_query(buf, path_end, limits)?;
    match buf.get(end) {
        Some(b' ') => {}
        Some(_) => return Err(ParseError::BadRequest),
        None => return Err(ParseError::EndOfBuffer),
    }

    let raw = ascii_str(&buf[..end]);
    Ok((
        RequestUri::absolute(raw, scheme, host, path, query),
        &buf[end + 1..],
    ))
}

/// If `buf[after..]` starts with `?`, scans the query up to the next SP and
/// returns `(end_of_query, Some(query))`; otherwise returns `(after, None)`.
fn parse_optional_query<'b>(
    buf: &'b [u8],
    after: usize,
    limits: &HeadLimits,
) -> Result<(usize, Option<&'b str>), ParseError> {
    if buf.get(after) != Some(&b'?') {
        return Ok((after, None));
    }
    let q_start = after + 1;
    let end = q_start + match_uri_vectored(&buf[q_start..]);
    if end >= buf.len() {
        return too_long_or(buf, limits, ParseError::EndOfBuffer);
    }
    Ok((end, Some(ascii_str(&buf[q_start..end]))))
}

fn too_long_or<T>(buf: &[u8], limits: &HeadLimits, fallback: ParseError) -> Result<T, ParseError> {
    if buf.len() > limits.max_request_line_size {
        Err(ParseError::RequestUriTooLong)
    } else {
        Err(fallback)
    }
}

#[inline]
fn parse_version(buf: &[u8]) -> Result<(u8, &[u8]), ParseError> {
    if let Some(rest) = buf.strip_prefix(b"HTTP/1.") {
        return match rest.first() {
            Some(b'1') => Ok((1, &rest[1..])),
            Some(b'0') => Ok((0, &rest[1..])),
            Some(_) => Err(ParseError::UnsupportedHttpVersion),
            None => Err(ParseError::EndOfBuffer),
        };
    }
    if buf.len() < 7 && b"HTTP/1.".starts_with(buf) {
        return Err(ParseError::EndOfBuffer);
    }
    Err(ParseError::UnsupportedHttpVersion)
}

#[inline(always)]
fn ascii_str(b: &[u8]) -> &str {
    // SAFETY: every byte was validated against the URI or path byte mask,
    // both ASCII subsets, before this slice was carved out.
    unsafe { std::str::from_utf8_unchecked(b) }
}

const fn make_uri_byte_mask() -> [bool; 256] {
    let mut mask = [false; 256];
    let valid =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~:/?#[]@!$&'()*+,;=%";
    let mut i = 0;
    while i < valid.len() {
        mask[valid[i] as usize] = true;
        i += 1;
    }
    mask
}

static URI_BYTE_MASK: [bool; 256] = make_uri_byte_mask();

#[inline(always)]
pub(crate) fn is_valid_uri_byte(b: u8) -> bool {
    URI_BYTE_MASK[b as usize]
}

#[inline(always)]
fn is_valid_scheme_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> HeadLimits {
        HeadLimits {
            max_request_line_size: 4096,
            max_header_count: 32,
            max_request_headers_size: 10 * 1024,
        }
    }

    #[test]
    fn parses_simple_get() {
        let buf = b"GET /foo?bar=1 HTTP/1.1\r\nHost: x\r\n\r\nextra";
        let head = parse_head(buf, &limits()).unwrap();
        assert_eq!(head.method, Method::Get);
        assert_eq!(head.uri.path, "/foo");
        assert_eq!(head.uri.query, Some("bar=1"));
        assert_eq!(head.version, 1);
        assert_eq!(head.headers.get("Host"), Some(&b"x"[..]));
        assert_eq!(&buf[head.head_len..], b"extra");
    }

    #[test]
    fn parses_asterisk_form() {
        let buf = b"OPTIONS * HTTP/1.1\r\n\r\n";
        let head = parse_head(buf, &limits()).unwrap();
        assert_eq!(head.method, Method::Options);
        assert_eq!(head.uri.raw, "*");
    }

    #[test]
    fn parses_absolute_form() {
        let buf = b"GET http://example.com/a HTTP/1.1\r\n\r\n";
        let head = parse_head(buf, &limits()).unwrap();
        assert_eq!(head.uri.scheme, Some("http"));
        assert_eq!(head.uri.host, Some("example.com"));
        assert_eq!(head.uri.path, "/a");
    }

    #[test]
    fn skips_leading_blank_line_before_request_line() {
        let buf = b"\r\nGET / HTTP/1.1\r\n\r\n";
        let head = parse_head(buf, &limits()).unwrap();
        assert_eq!(head.method, Method::Get);
    }

    #[test]
    fn incomplete_head_reports_end_of_buffer() {
        let buf = b"GET / HTTP/1.1\r\nHost: x\r\n";
        assert_eq!(parse_head(buf, &limits()), Err(ParseError::EndOfBuffer));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let buf = b"GET / HTTP/2.0\r\n\r\n";
        assert_eq!(
            parse_head(buf, &limits()),
            Err(ParseError::UnsupportedHttpVersion)
        );
    }

    #[test]
    fn unrecognized_token_sharing_a_known_first_letter_maps_to_unknown() {
        let buf = b"POX / HTTP/1.1\r\n\r\n";
        let head = parse_head(buf, &limits()).unwrap();
        assert_eq!(head.method, Method::Unknown);
    }

    #[test]
    fn unrecognized_first_letter_is_method_not_allowed() {
        let buf = b"FROB / HTTP/1.1\r\n\r\n";
        assert_eq!(parse_head(buf, &limits()), Err(ParseError::MethodNotAllowed));
    }

    #[test]
    fn content_length_and_transfer_encoding_conflict_rejected() {
        let mut headers = Headers::new();
        headers.append("Content-Length", &b"4"[..]).unwrap();
        headers
            .append("Transfer-Encoding", &b"chunked"[..])
            .unwrap();
        assert_eq!(
            resolve_content_length(&headers, 1024),
            Err(ParseError::BadRequest)
        );
    }

    #[test]
    fn content_length_list_collapses_to_first() {
        let mut headers = Headers::new();
        headers.append("Content-Length", &b"4,4"[..]).unwrap();
        assert_eq!(resolve_content_length(&headers, 1024), Ok(4));
    }

    #[test]
    fn content_length_over_limit_rejected() {
        let mut headers = Headers::new();
        headers.append("Content-Length", &b"99999"[..]).unwrap();
        assert_eq!(
            resolve_content_length(&headers, 1024),
            Err(ParseError::RequestEntityTooLarge)
        );
    }

    #[test]
    fn absent_content_length_defaults_to_zero() {
        let headers = Headers::new();
        assert_eq!(resolve_content_length(&headers, 1024), Ok(0));
    }
}
