//! URI value type. Parsing is deferred: the original string is stored
//! verbatim and each accessor scans it on demand, so construction never
//! fails and `full()` always round-trips.

use std::fmt;

/// Characters allowed in a scheme name.
fn is_scheme_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'
}

/// Outcome of scanning the authority for a `:port` segment.
enum PortSpec {
    Absent,
    Malformed,
    Value(u16),
}

/// A URI in the subset needed for HTTP fetching.
///
/// Two URIs compare by lexicographic order over the original string and are
/// equal exactly when the original strings are equal, which makes `Uri`
/// usable as a key in ordered and hashed containers.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uri {
    raw: String,
}

impl Uri {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The original string, unchanged.
    pub fn full(&self) -> &str {
        &self.raw
    }

    /// Scheme name before `://`, if present and made of scheme characters.
    pub fn scheme(&self) -> Option<&str> {
        let end = self.raw.find("://")?;
        let scheme = &self.raw[..end];
        if !scheme.is_empty() && scheme.chars().all(is_scheme_char) {
            Some(scheme)
        } else {
            None
        }
    }

    /// Host name: the run between the optional `scheme://` prefix and the
    /// first of `:`, `/`, `?`, `#` or the end of the string.
    pub fn host(&self) -> Option<&str> {
        let rest = self.after_scheme();
        let end = rest
            .find([':', '/', '?', '#'])
            .unwrap_or(rest.len());
        let host = &rest[..end];
        if host.is_empty() {
            None
        } else {
            Some(host)
        }
    }

    /// Port with the HTTP default applied: `Some(80)` when the authority has
    /// no port at all, `None` when a port is present but not a valid decimal
    /// number in 0..=65535.
    pub fn port(&self) -> Option<u16> {
        match self.port_spec() {
            PortSpec::Absent => Some(80),
            PortSpec::Malformed => None,
            PortSpec::Value(v) => Some(v),
        }
    }

    /// Port only when it is spelled out in the authority and valid. Used by
    /// transports that must tell "no port given" apart from the default.
    pub fn explicit_port(&self) -> Option<u16> {
        match self.port_spec() {
            PortSpec::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Path from the first `/` after the authority up to `?`, `#` or the
    /// end. An empty path and a bare `/` both yield `None`.
    pub fn path(&self) -> Option<&str> {
        let rest = self.after_scheme();
        let start = rest.find(['/', '?', '#'])?;
        if rest.as_bytes()[start] != b'/' {
            return None;
        }
        let tail = &rest[start..];
        let end = tail.find(['?', '#']).unwrap_or(tail.len());
        let path = &tail[..end];
        if path.is_empty() || path == "/" {
            None
        } else {
            Some(path)
        }
    }

    /// Query between `?` and `#` or the end; `None` when `?` is absent.
    pub fn query(&self) -> Option<&str> {
        let start = self.raw.find('?')? + 1;
        let tail = &self.raw[start..];
        let end = tail.find('#').unwrap_or(tail.len());
        Some(&tail[..end])
    }

    /// Fragment after `#`; `None` when absent or empty.
    pub fn fragment(&self) -> Option<&str> {
        let start = self.raw.find('#')? + 1;
        let fragment = &self.raw[start..];
        if fragment.is_empty() {
            None
        } else {
            Some(fragment)
        }
    }

    /// Everything after `scheme://`, or the whole string when there is no
    /// scheme separator.
    fn after_scheme(&self) -> &str {
        match self.raw.find("://") {
            Some(i) => &self.raw[i + 3..],
            None => &self.raw,
        }
    }

    fn port_spec(&self) -> PortSpec {
        let rest = self.after_scheme();
        // Only a colon inside the authority starts a port; one in the path,
        // query or fragment does not.
        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let authority = &rest[..authority_end];
        let colon = match authority.find(':') {
            Some(i) => i,
            None => return PortSpec::Absent,
        };
        let digits = &authority[colon + 1..];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return PortSpec::Malformed;
        }
        match digits.parse::<u16>() {
            Ok(v) => PortSpec::Value(v),
            Err(_) => PortSpec::Malformed,
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
