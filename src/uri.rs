/// The three request-target shapes RFC 7230 permits (spec GLOSSARY: origin /
/// absolute / asterisk form), plus `Unknown` is never constructed — every
/// successfully parsed request has one of the three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriForm {
    Origin,
    Absolute,
    Asterisk,
}

/// A parsed request-target. All fields borrow from the request's scratch
/// buffer (spec §3: Request — "`path` and `query` are slices into
/// `head_slice`").
#[derive(Debug, Clone, Copy)]
pub struct RequestUri<'b> {
    pub raw: &'b str,
    pub form: UriForm,
    pub scheme: Option<&'b str>,
    pub host: Option<&'b str>,
    pub path: &'b str,
    pub query: Option<&'b str>,
}

impl<'b> RequestUri<'b> {
    pub fn asterisk(raw: &'b str) -> Self {
        Self {
            raw,
            form: UriForm::Asterisk,
            scheme: None,
            host: None,
            path: "",
            query: None,
        }
    }

    pub fn origin(raw: &'b str, path: &'b str, query: Option<&'b str>) -> Self {
        Self {
            raw,
            form: UriForm::Origin,
            scheme: None,
            host: None,
            path,
            query,
        }
    }

    pub fn absolute(
        raw: &'b str,
        scheme: &'b str,
        host: &'b str,
        path: &'b str,
        query: Option<&'b str>,
    ) -> Self {
        Self {
            raw,
            form: UriForm::Absolute,
            scheme: Some(scheme),
            host: Some(host),
            path,
            query,
        }
    }
}
