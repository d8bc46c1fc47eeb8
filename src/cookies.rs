/// Capacity-bounded, lazily-parsed `Cookie:` header (spec §4.3).
///
/// Parsing is deferred until `parse` is called — a request with no cookie
/// reader never pays for the split/trim pass. Keys compare case-*sensitively*,
/// matching browser semantics (spec §9 open question: this is deliberate, not
/// an oversight — RFC 6265 cookie names are opaque byte strings and browsers
/// never fold their case).
#[derive(Debug, Default)]
pub struct Cookies<'a> {
    entries: Vec<(&'a str, &'a str)>,
    cap: usize,
    parsed: bool,
}

impl<'a> Cookies<'a> {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::with_capacity(cap.min(32)),
            cap,
            parsed: false,
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.parsed = false;
    }

    /// Idempotent: parsing the same header value twice yields the same list.
    pub fn parse(&mut self, header_value: &'a str) {
        if self.parsed {
            return;
        }
        self.parsed = true;
        for pair in header_value.split(';') {
            if self.entries.len() >= self.cap {
                break;
            }
            let pair = pair.trim();
            if let Some((k, v)) = pair.split_once('=') {
                self.entries.push((k.trim(), v.trim()));
            }
            // entries without '=' are skipped, per spec §4.3
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        // case-sensitive on the key, deliberately
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_before_parse() {
        let c = Cookies::new(8);
        assert_eq!(c.get("session"), None);
    }

    #[test]
    fn parses_key_value_pairs_and_skips_bare_tokens() {
        let mut c = Cookies::new(8);
        c.parse("session=abc; theme=dark; malformed; lang = en");
        assert_eq!(c.get("session"), Some("abc"));
        assert_eq!(c.get("theme"), Some("dark"));
        assert_eq!(c.get("lang"), Some("en"));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn parse_is_idempotent() {
        let mut c = Cookies::new(8);
        c.parse("a=1; b=2");
        c.parse("c=3"); // second call is a no-op
        assert_eq!(c.len(), 2);
        assert_eq!(c.get("c"), None);
    }

    #[test]
    fn key_comparison_is_case_sensitive() {
        let mut c = Cookies::new(8);
        c.parse("Session=abc");
        assert_eq!(c.get("session"), None);
        assert_eq!(c.get("Session"), Some("abc"));
    }

    #[test]
    fn capacity_bounds_parsed_entries() {
        let mut c = Cookies::new(2);
        c.parse("a=1; b=2; c=3; d=4");
        assert_eq!(c.len(), 2);
    }
}
