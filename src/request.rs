//! Request type seen by the mounted endpoint.

use bytes::Bytes;
use http::header::COOKIE;
use http::{HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use url::form_urlencoded;

use crate::cookie::parse_cookie_header;
use crate::protocol::Scope;

/// A request as delivered to the endpoint, body already read.
///
/// Cheap to clone: the body is reference-counted, so every dependency gets
/// its own copy.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(HeaderName, HeaderValue)>,
    pub(crate) cookies: Vec<(String, String)>,
    pub(crate) body: Bytes,
}

impl Request {
    /// `path` is the scope path with the root path already removed.
    pub(crate) fn new(scope: &Scope, path: String, body: Bytes) -> Self {
        let query = form_urlencoded::parse(&scope.query_string).into_owned().collect();
        let cookies = scope.headers.iter()
            .filter(|(k, _)| *k == COOKIE)
            .filter_map(|(_, v)| v.to_str().ok())
            .flat_map(|v| parse_cookie_header(v))
            .collect();
        Self {
            method: scope.method.clone(),
            path,
            query,
            headers: scope.headers.clone(),
            cookies,
            body,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Every query pair, in order. A key may repeat.
    pub fn queries(&self) -> &[(String, String)] { &self.query }

    /// First value of a query parameter.
    ///
    /// For `/?start_date=2024-01-01`, `req.query("start_date")` returns `Some("2024-01-01")`.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.as_str().eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// The body decoded as a URL-encoded form.
    pub fn form(&self) -> Vec<(String, String)> {
        form_urlencoded::parse(&self.body).into_owned().collect()
    }

    /// The body decoded as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
