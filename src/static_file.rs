//! Byte-range-aware static file serving (spec §4.7: `Route.static`; spec
//! §4.8: "Static file handling").
//!
//! Grounded in messense-dav-server-rs's `handle_get` (`handle_gethead.rs`)
//! for the conditional-request and single-range decision structure, adapted
//! from its async/webdav-specific plumbing to a synchronous `RouteHandler`
//! that streams through [`Response::set_stream`].

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::clock;
use crate::connection::RouteHandler;
use crate::error::ServerError;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Params;
use crate::status::Status;

/// Serves files under `root` for requests whose path starts with
/// `url_prefix`. Built by `Route::static` (spec §4.7); `url_prefix` must
/// begin and end with `/`.
pub struct StaticFileHandler {
    url_prefix: String,
    root: PathBuf,
}

impl StaticFileHandler {
    pub fn new(url_prefix: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let url_prefix = url_prefix.into();
        assert!(
            url_prefix.starts_with('/') && url_prefix.ends_with('/'),
            "static file url_prefix must begin and end with '/'"
        );
        Self {
            url_prefix,
            root: root.into(),
        }
    }
}

impl RouteHandler for StaticFileHandler {
    fn call(
        &self,
        request: &Request<'_>,
        _params: &Params<'_>,
        _body: &mut dyn Read,
        response: &mut Response<'_>,
    ) -> Result<(), ServerError> {
        serve_file(&self.root, &self.url_prefix, request, response)
    }
}

/// Rejects a request path that doesn't sit under `url_prefix`, is empty once
/// stripped, starts with `.`, or contains a `..` segment (spec §4.8: "reject
/// if empty or starts with `.`"; the `..` check guards against escaping
/// `root` via a traversal segment the spec doesn't call out explicitly).
fn relative_path<'a>(url_prefix: &str, request_path: &'a str) -> Option<&'a str> {
    let rel = request_path.strip_prefix(url_prefix)?;
    if rel.is_empty() || rel.starts_with('.') {
        return None;
    }
    if rel.split('/').any(|segment| segment == "..") {
        return None;
    }
    Some(rel)
}

fn not_found(response: &mut Response<'_>) -> Result<(), ServerError> {
    response.set_status(Status::NOT_FOUND);
    response.set_body(&b"not found"[..]);
    Ok(())
}

fn serve_file(root: &Path, url_prefix: &str, request: &Request<'_>, response: &mut Response<'_>) -> Result<(), ServerError> {
    let Some(rel) = relative_path(url_prefix, request.path()) else {
        return not_found(response);
    };

    let file = match File::open(root.join(rel)) {
        Ok(f) => f,
        Err(_) => return not_found(response),
    };
    let meta = file.metadata()?;
    if !meta.is_file() {
        return not_found(response);
    }

    let len = meta.len();
    let modified_secs = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let last_modified = clock::format_date(modified_secs);
    let etag = format!("\"{:x}-{:x}\"", modified_secs, len);

    if conditional_not_modified(request, &etag, &last_modified) {
        response.set_status(Status::NOT_MODIFIED);
        let _ = response.headers.put("ETag", etag.into_bytes());
        let _ = response.headers.put("Last-Modified", last_modified.into_bytes());
        return Ok(());
    }

    let _ = response.headers.put("Accept-Ranges", &b"bytes"[..]);
    let _ = response.headers.put("Last-Modified", last_modified.clone().into_bytes());
    let _ = response.headers.put("ETag", etag.clone().into_bytes());
    let content_type = mime_guess::from_path(root.join(rel)).first_or_octet_stream().to_string();
    let _ = response.headers.put("Content-Type", content_type.into_bytes());

    let head = request.method == Method::Head;

    match decide_range(request, len, &etag, &last_modified) {
        RangeDecision::Unsatisfiable => {
            response.set_status(Status::RANGE_NOT_SATISFIABLE);
            let _ = response.headers.put("Content-Range", format!("bytes */{len}").into_bytes());
        }
        RangeDecision::Partial(start, end) => {
            let count = end - start + 1;
            response.set_status(Status::PARTIAL_CONTENT);
            let _ = response
                .headers
                .put("Content-Range", format!("bytes {start}-{end}/{len}").into_bytes());
            if head {
                let _ = response.headers.put("Content-Length", count.to_string().into_bytes());
            } else {
                let mut file = file;
                file.seek(SeekFrom::Start(start))?;
                response.set_stream(file.take(count), count);
            }
        }
        RangeDecision::Full => {
            response.set_status(Status::OK);
            if head {
                let _ = response.headers.put("Content-Length", len.to_string().into_bytes());
            } else {
                response.set_stream(file, len);
            }
        }
    }

    Ok(())
}

/// `If-None-Match` (preferred) or `If-Modified-Since` decide 304 (spec
/// §4.8). Comparisons are exact string matches against the same formatting
/// this handler itself produces, rather than full HTTP-date parsing.
fn conditional_not_modified(request: &Request<'_>, etag: &str, last_modified: &str) -> bool {
    if let Some(inm) = request.headers.get_str("If-None-Match") {
        return inm == etag || inm == "*";
    }
    if let Some(ims) = request.headers.get_str("If-Modified-Since") {
        return ims == last_modified;
    }
    false
}

enum RangeDecision {
    Full,
    /// Inclusive byte range.
    Partial(u64, u64),
    Unsatisfiable,
}

/// Honors `Range` unless `If-Range` names a stale validator (spec §4.8:
/// "Parse `Range: bytes=start-end` ... invalid forms ignored per RFC 7233").
fn decide_range(request: &Request<'_>, len: u64, etag: &str, last_modified: &str) -> RangeDecision {
    let if_range_ok = match request.headers.get_str("If-Range") {
        None => true,
        Some(v) => v == etag || v == last_modified,
    };
    if !if_range_ok {
        return RangeDecision::Full;
    }

    let Some(range_header) = request.headers.get_str("Range") else {
        return RangeDecision::Full;
    };
    let Some((start, end)) = parse_range(range_header, len) else {
        return RangeDecision::Full;
    };
    if start >= len {
        return RangeDecision::Unsatisfiable;
    }
    let end = end.min(len.saturating_sub(1));
    if end < start {
        return RangeDecision::Unsatisfiable;
    }
    RangeDecision::Partial(start, end)
}

/// Parses the first range of a `Range: bytes=...` header (a comma-separated
/// list is legal; only the first spec-significant entry is honored). Returns
/// `None` for anything malformed, which the caller treats as "no range".
fn parse_range(header: &str, len: u64) -> Option<(u64, u64)> {
    let rest = header.strip_prefix("bytes=")?;
    let first = rest.split(',').next()?.trim();
    let (start_str, end_str) = first.split_once('-')?;

    if start_str.is_empty() {
        // suffix range: last `n` bytes.
        let n: u64 = end_str.parse().ok()?;
        if n == 0 {
            return None;
        }
        let start = len.saturating_sub(n);
        return Some((start, len.saturating_sub(1)));
    }

    let start: u64 = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        len.saturating_sub(1)
    } else {
        end_str.parse().ok()?
    };
    Some((start, end))
}
