//! Response cookies with their full attribute set.

use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax    => "Lax",
            Self::None   => "None",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("strict") {
            Some(Self::Strict)
        } else if s.eq_ignore_ascii_case("lax") {
            Some(Self::Lax)
        } else if s.eq_ignore_ascii_case("none") {
            Some(Self::None)
        } else {
            None
        }
    }
}

/// One cookie as carried by a `set-cookie` header.
///
/// `expires` is kept verbatim (an HTTP-date); it is relayed, never interpreted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub expires: Option<String>,
    pub max_age: Option<i64>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), ..Self::default() }
    }

    /// Parses a `set-cookie` header value. Unknown attributes are ignored;
    /// a missing `name=value` pair yields `None`.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let mut cookie = Self::new(name, value.trim().trim_matches('"'));

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (attr.trim(), None),
            };
            match (key.to_ascii_lowercase().as_str(), val) {
                ("expires", Some(v)) => cookie.expires = Some(v.to_owned()),
                ("max-age", Some(v)) => cookie.max_age = v.parse().ok(),
                ("domain", Some(v)) => cookie.domain = Some(v.to_owned()),
                ("path", Some(v)) => cookie.path = Some(v.to_owned()),
                ("samesite", Some(v)) => cookie.same_site = SameSite::parse(v),
                ("secure", _) => cookie.secure = true,
                ("httponly", _) => cookie.http_only = true,
                _ => {}
            }
        }
        Some(cookie)
    }
}

/// Renders the `set-cookie` header value.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(expires) = &self.expires {
            write!(f, "; Expires={expires}")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={max_age}")?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; SameSite={}", same_site.as_str())?;
        }
        Ok(())
    }
}

/// Parses a request `cookie` header into name/value pairs.
pub(crate) fn parse_cookie_header(header: &str) -> impl Iterator<Item = (String, String)> + '_ {
    header.split(';').filter_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        (!name.is_empty()).then(|| (name.to_owned(), value.trim().to_owned()))
    })
}
