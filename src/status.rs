use std::fmt;

/// HTTP status code plus its IANA reason phrase. `Status::of` resolves an
/// arbitrary code against the static table (spec §4.5: "status defaults to 200
/// OK, taken from a static table of IANA codes with phrase and description").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub phrase: &'static str,
    pub description: &'static str,
}

impl Status {
    pub const fn new(code: u16, phrase: &'static str, description: &'static str) -> Self {
        Self {
            code,
            phrase,
            description,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.phrase)
    }
}

impl PartialEq<u16> for Status {
    fn eq(&self, other: &u16) -> bool {
        self.code == *other
    }
}

macro_rules! define_statuses {
    ($( $code:literal => $ident:ident, $phrase:expr, $desc:expr );* $(;)?) => {
        impl Status {
            $(
                pub const $ident: Status = Status::new($code, $phrase, $desc);
            )*

            /// Resolves a numeric status code against the static table, falling
            /// back to an empty phrase/description for codes the table doesn't know.
            pub const fn of(code: u16) -> Self {
                match code {
                    $(
                        $code => Status::$ident,
                    )*
                    _ => Status::new(code, "", ""),
                }
            }
        }
    };
}

define_statuses! {
    100 => CONTINUE, "Continue", "The initial part of a request has been received and the client should continue.";
    101 => SWITCHING_PROTOCOLS, "Switching Protocols", "The server is switching protocols per an Upgrade header.";

    200 => OK, "OK", "The request succeeded.";
    201 => CREATED, "Created", "The request succeeded and a new resource was created.";
    204 => NO_CONTENT, "No Content", "The request succeeded; there is no body to send.";
    206 => PARTIAL_CONTENT, "Partial Content", "The server is delivering only part of the resource due to a Range header.";

    301 => MOVED_PERMANENTLY, "Moved Permanently", "The resource has moved permanently to a new URI.";
    302 => FOUND, "Found", "The resource resides temporarily under a different URI.";
    304 => NOT_MODIFIED, "Not Modified", "The resource has not been modified since the value in the conditional request header.";

    400 => BAD_REQUEST, "Bad Request", "The server cannot process the request due to a client error.";
    401 => UNAUTHORIZED, "Unauthorized", "Authentication is required and has failed or not been provided.";
    403 => FORBIDDEN, "Forbidden", "The request was valid but the server refuses to authorize it.";
    404 => NOT_FOUND, "Not Found", "The requested resource could not be found.";
    405 => METHOD_NOT_ALLOWED, "Method Not Allowed", "The request method is not supported for this resource.";
    408 => REQUEST_TIMEOUT, "Request Timeout", "The server timed out waiting for the request.";
    411 => LENGTH_REQUIRED, "Length Required", "The request did not specify the length of its content.";
    413 => PAYLOAD_TOO_LARGE, "Payload Too Large", "The request body is larger than the server is willing to process.";
    414 => URI_TOO_LONG, "URI Too Long", "The request-target is longer than the server is willing to interpret.";
    416 => RANGE_NOT_SATISFIABLE, "Range Not Satisfiable", "None of the ranges in the request's Range header overlap the resource.";
    431 => REQUEST_HEADER_FIELDS_TOO_LARGE, "Request Header Fields Too Large", "The header block is larger than the server is willing to process.";

    500 => INTERNAL_SERVER_ERROR, "Internal Server Error", "The server encountered an unexpected condition.";
    501 => NOT_IMPLEMENTED, "Not Implemented", "The server does not support the functionality required to fulfill the request.";
    505 => HTTP_VERSION_NOT_SUPPORTED, "HTTP Version Not Supported", "The server does not support the HTTP protocol version used in the request.";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_code_resolves_phrase() {
        assert_eq!(Status::of(404), Status::NOT_FOUND);
        assert_eq!(Status::of(404).phrase, "Not Found");
    }

    #[test]
    fn unknown_code_has_empty_phrase() {
        let s = Status::of(499);
        assert_eq!(s.code, 499);
        assert_eq!(s.phrase, "");
    }

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", Status::OK), "200 OK");
    }
}
