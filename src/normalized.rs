//! The bridge's own HTTP message representation.
//!
//! [`NormalizedRequest`] is what the host request is turned into and what
//! the transport consumes; [`NormalizedResponse`] is what the transport
//! reassembles from the application's messages.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, SET_COOKIE};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use url::{Url, form_urlencoded};

use crate::cookie::Cookie;
use crate::error::Error;
use crate::multipart;
use crate::stream::{AsyncByteStream, ByteStream};

pub(crate) const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Request body, before it is encoded for the wire.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
    /// Decoded form fields; a field may repeat.
    Form(Vec<(String, String)>),
}

/// One uploaded file.
#[derive(Debug)]
pub struct FilePart {
    pub field: String,
    pub filename: Option<String>,
    /// Declared media type of the part.
    pub content_type: Option<String>,
    /// The part's own headers.
    pub headers: Vec<(String, String)>,
    pub content: ByteStream,
}

impl FilePart {
    pub fn new(field: impl Into<String>, content: ByteStream) -> Self {
        Self {
            field: field.into(),
            filename: None,
            content_type: None,
            headers: Vec::new(),
            content,
        }
    }
}

/// A request as the bridge understands it.
///
/// Whenever `files` is non-empty the body goes out as `multipart/form-data`
/// and `body` may only be [`RequestBody::Empty`] or [`RequestBody::Form`].
/// `content-length` is never trusted: it is recomputed on encoding.
#[derive(Debug)]
pub struct NormalizedRequest {
    pub method: Method,
    /// Absolute, or relative to the client's base URL.
    pub url: String,
    /// Lower-case names, arrival order, duplicates kept.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    /// Merged into the URL's query string; a key here replaces the same key there.
    pub query: Vec<(String, String)>,
    /// Sent as a `cookie` header unless one is already present.
    pub cookies: Vec<(String, String)>,
    pub body: RequestBody,
    pub files: Vec<FilePart>,
}

/// A request encoded for the transport.
pub(crate) struct WireRequest {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: Vec<(HeaderName, HeaderValue)>,
    pub(crate) body: AsyncByteStream,
}

impl NormalizedRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            cookies: Vec::new(),
            body: RequestBody::Empty,
            files: Vec::new(),
        }
    }

    /// First value of `name`.
    pub fn header(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Replaces every value of `name` with `value`.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.remove_header(&name);
        self.headers.push((name, value));
    }

    pub fn remove_header(&mut self, name: &HeaderName) {
        self.headers.retain(|(k, _)| k != name);
    }

    /// Resolves the URL against `base` and turns the body into a byte stream,
    /// fixing up `content-type` and `content-length` to match.
    pub(crate) fn encode(self, base: &Url) -> Result<WireRequest, Error> {
        let mut url = base.join(&self.url)
            .map_err(|e| Error::InvalidRequest(format!("url {:?}: {e}", self.url)))?;
        if !self.query.is_empty() {
            merge_query(&mut url, &self.query);
        }

        let mut headers = self.headers;
        headers.retain(|(k, _)| *k != CONTENT_LENGTH);

        if !self.cookies.is_empty() && !headers.iter().any(|(k, _)| *k == COOKIE) {
            let pairs: Vec<String> = self.cookies.iter().map(|(k, v)| format!("{k}={v}")).collect();
            headers.push((COOKIE, header_value(&pairs.join("; "))?));
        }

        let body = match (self.body, self.files.is_empty()) {
            (RequestBody::Empty, true) => AsyncByteStream::empty(),
            (RequestBody::Bytes(bytes), true) if bytes.is_empty() => AsyncByteStream::empty(),
            (RequestBody::Bytes(bytes), true) => {
                headers.push((CONTENT_LENGTH, HeaderValue::from(bytes.len())));
                AsyncByteStream::once(bytes)
            }
            (RequestBody::Form(fields), true) => {
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(&fields)
                    .finish();
                replace(&mut headers, CONTENT_TYPE, HeaderValue::from_static(FORM_URLENCODED));
                if encoded.is_empty() {
                    AsyncByteStream::empty()
                } else {
                    headers.push((CONTENT_LENGTH, HeaderValue::from(encoded.len())));
                    AsyncByteStream::once(encoded)
                }
            }
            (RequestBody::Bytes(_), false) => {
                return Err(Error::InvalidRequest(
                    "a raw body cannot be combined with file parts".to_owned(),
                ));
            }
            (body, false) => {
                let fields = match body {
                    RequestBody::Form(fields) => fields,
                    _ => Vec::new(),
                };
                // Keep the inbound boundary when there is one, like any
                // re-encoding client would.
                let boundary = headers.iter()
                    .find(|(k, _)| *k == CONTENT_TYPE)
                    .and_then(|(_, v)| multipart::boundary_of(v))
                    .unwrap_or_else(multipart::new_boundary);
                let content_type = header_value(&multipart::content_type(&boundary))?;
                replace(&mut headers, CONTENT_TYPE, content_type);
                multipart::encode(&boundary, fields, self.files)
            }
        };

        Ok(WireRequest { method: self.method, url, headers, body })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::InvalidRequest(format!("header value {value:?}: {e}")))
}

fn replace(headers: &mut Vec<(HeaderName, HeaderValue)>, name: HeaderName, value: HeaderValue) {
    headers.retain(|(k, _)| *k != name);
    headers.push((name, value));
}

fn merge_query(url: &mut Url, params: &[(String, String)]) {
    let kept: Vec<(String, String)> = url.query_pairs()
        .filter(|(k, _)| !params.iter().any(|(p, _)| p == k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut().clear().extend_pairs(kept.iter().chain(params));
}

/// A response as reassembled from the application's messages.
#[derive(Debug)]
pub struct NormalizedResponse {
    pub status: StatusCode,
    /// Arrival order, duplicates kept.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    /// The first `content-type` header, surfaced on its own.
    pub content_type: Option<HeaderValue>,
    /// Every parseable `set-cookie` header.
    pub cookies: Vec<Cookie>,
    /// Produced lazily; nothing is buffered up front.
    pub body: AsyncByteStream,
}

impl NormalizedResponse {
    pub fn new(
        status: StatusCode,
        headers: Vec<(HeaderName, HeaderValue)>,
        body: AsyncByteStream,
    ) -> Self {
        let content_type = headers.iter()
            .find(|(k, _)| *k == CONTENT_TYPE)
            .map(|(_, v)| v.clone());
        let cookies = headers.iter()
            .filter(|(k, _)| *k == SET_COOKIE)
            .filter_map(|(_, v)| v.to_str().ok())
            .filter_map(Cookie::parse)
            .collect();
        Self { status, headers, content_type, cookies, body }
    }

    /// First value of `name`.
    pub fn header(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}
