use std::fmt;

/// HTTP request method. `Unknown` covers methods the parser accepts syntactically
/// but that the server does not special-case (see spec §3: Request.method).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Patch,
    Head,
    Delete,
    Options,
    Unknown,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Unknown => "UNKNOWN",
        }
    }

    pub fn is_safe_for_http10_keepalive(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_token() {
        assert_eq!(Method::Get.as_str(), "GET");
        assert_eq!(Method::Unknown.as_str(), "UNKNOWN");
    }

    #[test]
    fn keepalive_default_methods() {
        assert!(Method::Get.is_safe_for_http10_keepalive());
        assert!(Method::Head.is_safe_for_http10_keepalive());
        assert!(!Method::Post.is_safe_for_http10_keepalive());
    }
}
