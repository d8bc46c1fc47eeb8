//! Single-pass HTTP/1.x request-head parsing (spec §4.4).
//!
//! `request::parse_head` is a pure function over an already-buffered `&[u8]`:
//! it never touches a socket and returns `ParseError::EndOfBuffer` when the
//! slice doesn't yet hold a complete head, so the caller (the connection's
//! "ensure head is buffered" driver in [`crate::connection`]) can refill and
//! retry the whole parse. This mirrors khttp's own split between buffered I/O
//! and its pure `Request::parse`, adapted into a retry-on-`EndOfBuffer` loop
//! because our buffer is caller-supplied and may need to grow up to
//! `max_request_headers_size` before a head fits.

pub mod request;
pub mod simd;

pub use request::{parse_head, resolve_content_length, HeadLimits, ParsedHead};

use crate::error::ParseError;
use crate::headers::Headers;
use memchr::memchr;

/// Parses the header block following the request line, up to and including
/// the terminating blank line. Tolerates a bare `\n` terminator in addition
/// to `\r\n` (spec §4.4: line endings may be relaxed on input).
pub(crate) fn parse_headers<'b>(
    buf: &'b [u8],
    limits: &HeadLimits,
) -> Result<(Headers<'b>, &'b [u8]), ParseError> {
    let mut headers = Headers::with_capacity(limits.max_header_count);
    let mut rest = buf;

    loop {
        if let Some(r) = rest.strip_prefix(b"\r\n") {
            return Ok((headers, r));
        }
        if let Some(r) = rest.strip_prefix(b"\n") {
            return Ok((headers, r));
        }

        let nl = match memchr(b'\n', rest) {
            Some(p) => p,
            None if buf.len() > limits.max_request_headers_size => {
                return Err(ParseError::RequestHeaderFieldsTooLarge)
            }
            None => return Err(ParseError::EndOfBuffer),
        };
        let line = if nl > 0 && rest[nl - 1] == b'\r' {
            &rest[..nl - 1]
        } else {
            &rest[..nl]
        };

        // A line folding into the previous header's value (spec §4.2:
        // continuation lines, leading SP/HT, accepted only if a prior
        // header exists).
        if matches!(line.first(), Some(b' ') | Some(b'\t')) {
            if headers.is_empty() {
                return Err(ParseError::BadRequest);
            }
            headers.fold_last(trim_ows(line));
        } else {
            let (name, value) = parse_header_line(line)?;
            headers
                .append(name, value)
                .map_err(|_| ParseError::RequestHeaderFieldsTooLarge)?;
        }

        rest = &rest[nl + 1..];
        if buf.len() - rest.len() > limits.max_request_headers_size {
            return Err(ParseError::RequestHeaderFieldsTooLarge);
        }
    }
}

#[inline(always)]
fn parse_header_line(line: &[u8]) -> Result<(&str, &[u8]), ParseError> {
    let colon = memchr(b':', line).ok_or(ParseError::BadRequest)?;
    if !line[..colon].iter().copied().all(is_valid_header_field_byte) {
        return Err(ParseError::BadRequest);
    }
    // SAFETY: every byte up to `colon` was checked against the header field
    // byte mask, which is an ASCII subset.
    let name = unsafe { std::str::from_utf8_unchecked(&line[..colon]) };
    Ok((name, trim_ows(&line[colon + 1..])))
}

pub(crate) fn trim_ows(b: &[u8]) -> &[u8] {
    let start = b.iter().position(|&c| c != b' ' && c != b'\t').unwrap_or(b.len());
    let end = b
        .iter()
        .rposition(|&c| c != b' ' && c != b'\t')
        .map(|i| i + 1)
        .unwrap_or(start);
    &b[start..end]
}

const fn make_header_field_byte_mask() -> [bool; 256] {
    let mut mask = [false; 256];
    let valid = b"!#$%&'*+-.^_`|~ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut i = 0;
    while i < valid.len() {
        mask[valid[i] as usize] = true;
        i += 1;
    }
    mask
}

static HEADER_FIELD_BYTE_MASK: [bool; 256] = make_header_field_byte_mask();

#[inline(always)]
fn is_valid_header_field_byte(b: u8) -> bool {
    HEADER_FIELD_BYTE_MASK[b as usize]
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
    fn parses_headers_up_to_blank_line() {
        let buf = b"Host: example.com\r\nX-A: 1\r\n\r\nBODY";
        let (headers, rest) = parse_headers(buf, &limits()).unwrap();
        assert_eq!(headers.get("Host"), Some(&b"example.com"[..]));
        assert_eq!(headers.get("X-A"), Some(&b"1"[..]));
        assert_eq!(rest, b"BODY");
    }

    #[test]
    fn tolerates_bare_lf_terminator() {
        let buf = b"Host: example.com\n\nBODY";
        let (headers, rest) = parse_headers(buf, &limits()).unwrap();
        assert_eq!(headers.get("Host"), Some(&b"example.com"[..]));
        assert_eq!(rest, b"BODY");
    }

    #[test]
    fn reports_end_of_buffer_without_terminator() {
        let buf = b"Host: example.com\r\n";
        assert_eq!(parse_headers(buf, &limits()), Err(ParseError::EndOfBuffer));
    }

    #[test]
    fn rejects_malformed_header_line() {
        let buf = b"not-a-header-line\r\n\r\n";
        assert_eq!(parse_headers(buf, &limits()), Err(ParseError::BadRequest));
    }

    #[test]
    fn continuation_line_folds_into_prior_header_value() {
        let buf = b"X-A: one\r\n two\r\n\r\nBODY";
        let (headers, rest) = parse_headers(buf, &limits()).unwrap();
        assert_eq!(headers.get("X-A"), Some(&b"one two"[..]));
        assert_eq!(rest, b"BODY");
    }

    #[test]
    fn leading_continuation_without_prior_header_is_rejected() {
        let buf = b" leading\r\n\r\n";
        assert_eq!(parse_headers(buf, &limits()), Err(ParseError::BadRequest));
    }
}
