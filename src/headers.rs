use std::borrow::Cow;
use std::fmt;

/// Order-preserving, case-insensitive header list (spec §3: Headers).
///
/// Backed by a flat `Vec` rather than a map: header counts are small and
/// bounded (`max_header_count`, default 32), so linear scans beat hashing —
/// the same call khttp's `http::Headers` makes.
///
/// `Cow` lets the same type serve both directions: a parsed request borrows
/// `name`/`value` out of the connection's scratch buffer (spec §3: "Keys and
/// values are borrowed slices into the request's scratch buffer"), while a
/// handler building a response owns freshly formatted strings.
#[derive(Debug, Clone, Default)]
pub struct Headers<'a> {
    entries: Vec<(Cow<'a, str>, Cow<'a, [u8]>)>,
    cap: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded;

impl<'a> Headers<'a> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            cap: None,
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: Vec::with_capacity(cap.min(64)),
            cap: Some(cap),
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_ref(), v.as_ref()))
    }

    /// Always adds a new entry, even if `name` is already present.
    pub fn append<N, V>(&mut self, name: N, value: V) -> Result<(), CapacityExceeded>
    where
        N: Into<Cow<'a, str>>,
        V: Into<Cow<'a, [u8]>>,
    {
        if let Some(cap) = self.cap {
            if self.entries.len() >= cap {
                return Err(CapacityExceeded);
            }
        }
        self.entries.push((name.into(), value.into()));
        Ok(())
    }

    /// Replaces the first case-insensitive match of `name`, or appends if absent.
    pub fn put<N, V>(&mut self, name: N, value: V) -> Result<(), CapacityExceeded>
    where
        N: Into<Cow<'a, str>>,
        V: Into<Cow<'a, [u8]>>,
    {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name.as_ref()))
        {
            slot.1 = value;
            return Ok(());
        }
        self.append(name, value)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_ref())
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn get_or<'v>(&'v self, name: &str, default: &'v [u8]) -> &'v [u8] {
        self.get(name).unwrap_or(default)
    }

    /// Like `get`, but only returns a value actually borrowed from the
    /// original `'a` buffer (`None` for a value middleware rewrote in
    /// place). Needed wherever a caller must hand out a `'a`-lifetime
    /// reference rather than one bound to `&self` — `get`/`get_str` can't
    /// promise `'a` since `Cow::as_ref` ties its return to the receiver
    /// regardless of which variant is active.
    pub fn get_borrowed(&self, name: &str) -> Option<&'a [u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| match v {
                Cow::Borrowed(b) => Some(*b),
                Cow::Owned(_) => None,
            })
    }

    pub fn get_str_borrowed(&self, name: &str) -> Option<&'a str> {
        self.get_borrowed(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Folds a continuation line (leading SP/HT) into the most recently
    /// appended header's value, separated by a single space (spec §4.2:
    /// continuation lines are accepted only if a prior header exists — the
    /// caller is expected to check `is_empty()` before calling this).
    pub fn fold_last(&mut self, extra: &[u8]) {
        if let Some((_, value)) = self.entries.last_mut() {
            let mut combined = value.to_vec();
            combined.push(b' ');
            combined.extend_from_slice(extra);
            *value = Cow::Owned(combined);
        }
    }

    /// Removes and returns the first case-insensitive match of `name`.
    pub fn pop(&mut self, name: &str) -> Option<Cow<'a, [u8]>> {
        let idx = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    /// Structural equality ignoring order (used by tests, not the hot path).
    pub fn eql(&self, other: &Headers) -> bool {
        self.entries.len() == other.entries.len()
            && self.iter().all(|(k, v)| {
                other
                    .iter()
                    .any(|(ok, ov)| ok == k && ov == v)
            })
    }

    pub fn eql_ignore_case(&self, name: &str, value: &[u8]) -> bool {
        self.get(name)
            .map(|v| v.eq_ignore_ascii_case(value))
            .unwrap_or(false)
    }

    /// Comma-split, OWS-trimmed tokens for a header that may repeat or carry a
    /// list value (e.g. `Connection`, `Transfer-Encoding`).
    pub fn token_values(&self, name: &str) -> Vec<&[u8]> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| v.split(|&b| b == b',').map(|t| trim_ows(t)))
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.token_values(name)
            .iter()
            .any(|v| v.eq_ignore_ascii_case(token.as_bytes()))
    }
}

fn trim_ows(b: &[u8]) -> &[u8] {
    let start = b.iter().position(|&c| c != b' ' && c != b'\t').unwrap_or(b.len());
    let end = b
        .iter()
        .rposition(|&c| c != b' ' && c != b'\t')
        .map(|i| i + 1)
        .unwrap_or(start);
    &b[start..end]
}

impl fmt::Display for CapacityExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "header capacity exceeded")
    }
}
impl std::error::Error for CapacityExceeded {}

impl<'a> fmt::Display for Headers<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in self.iter() {
            writeln!(f, "{}: {}", k, String::from_utf8_lossy(v))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_lookup_preserves_insertion_order() {
        let mut h = Headers::new();
        h.append("Host", &b"a"[..]).unwrap();
        h.append("X-Foo", &b"1"[..]).unwrap();
        h.append("x-foo", &b"2"[..]).unwrap();

        assert_eq!(h.get("HOST"), Some(&b"a"[..]));
        let names: Vec<_> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Host", "X-Foo", "x-foo"]);
    }

    #[test]
    fn put_replaces_first_match_case_insensitively() {
        let mut h = Headers::new();
        h.append("Content-Type", &b"text/plain"[..]).unwrap();
        h.put("content-type", &b"text/html"[..]).unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("Content-Type"), Some(&b"text/html"[..]));
    }

    #[test]
    fn bounded_capacity_rejects_overflow() {
        let mut h = Headers::with_capacity(1);
        h.append("A", &b"1"[..]).unwrap();
        assert!(h.append("B", &b"2"[..]).is_err());
    }

    #[test]
    fn fold_last_appends_continuation_to_prior_value() {
        let mut h = Headers::new();
        h.append("X-Thing", &b"a"[..]).unwrap();
        h.fold_last(b"b");
        assert_eq!(h.get("X-Thing"), Some(&b"a b"[..]));
    }

    #[test]
    fn token_values_split_trim_and_drop_empties() {
        let mut h = Headers::new();
        h.append("Connection", &b" keep-alive ,  close"[..]).unwrap();
        let tokens = h.token_values("connection");
        assert_eq!(tokens, vec![&b"keep-alive"[..], &b"close"[..]]);
        assert!(h.has_token("Connection", "close"));
    }
}
