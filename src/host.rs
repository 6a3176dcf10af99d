//! The function host's request and response objects.
//!
//! A serverless host hands the function one already-parsed request and
//! expects one response back, whose body it pulls by blocking. These types
//! model exactly that contract, nothing more.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, HOST, SET_COOKIE};
use http::{HeaderName, HeaderValue, StatusCode};
use url::form_urlencoded;

use crate::cookie::{Cookie, parse_cookie_header};
use crate::normalized::FORM_URLENCODED;
use crate::stream::SyncByteStream;

/// One uploaded file, as parsed by the host.
#[derive(Debug)]
pub struct UploadedFile {
    pub field: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub stream: SyncByteStream,
}

impl UploadedFile {
    pub fn new(field: impl Into<String>, stream: SyncByteStream) -> Self {
        Self {
            field: field.into(),
            filename: None,
            content_type: None,
            headers: Vec::new(),
            stream,
        }
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

// ── HostRequest ───────────────────────────────────────────────────────────────

/// The inbound request object, as the host parsed it.
///
/// Query arguments are derived from the URL and cookies from `cookie`
/// headers as they are added, the way host frameworks expose them.
#[derive(Debug)]
pub struct HostRequest {
    pub(crate) method: String,
    pub(crate) url: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) form: Vec<(String, String)>,
    pub(crate) data: Bytes,
    pub(crate) args: Vec<(String, String)>,
    pub(crate) cookies: Vec<(String, String)>,
    pub(crate) files: Vec<UploadedFile>,
}

impl HostRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let args = url.split_once('?')
            .map(|(_, query)| query.split('#').next().unwrap_or(""))
            .map(|query| form_urlencoded::parse(query.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self {
            method: method.into(),
            url,
            headers: Vec::new(),
            form: Vec::new(),
            data: Bytes::new(),
            args,
            cookies: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        if name.eq_ignore_ascii_case(COOKIE.as_str()) {
            self.cookies.extend(parse_cookie_header(&value));
        }
        self.headers.push((name, value));
        self
    }

    pub fn form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    /// Builds a host request from a raw `http` request.
    ///
    /// URL-encoded form bodies are decoded into form fields and leave `data`
    /// empty. Any other body, multipart included, is kept as raw `data`
    /// together with its original content type.
    pub fn from_http(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();

        let host = parts.headers.get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost");
        let path = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
        let scheme = parts.uri.scheme_str().unwrap_or("http");

        let mut request = Self::new(parts.method.as_str(), format!("{scheme}://{host}{path}"));
        for (name, value) in &parts.headers {
            if let Ok(value) = value.to_str() {
                request = request.header(name.as_str(), value);
            }
        }

        let is_form = parts.headers.get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(FORM_URLENCODED));
        if is_form {
            request.form = form_urlencoded::parse(&body).into_owned().collect();
        } else {
            request.data = body;
        }
        request
    }

    pub fn method(&self) -> &str { &self.method }
    pub fn url(&self) -> &str { &self.url }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn form_fields(&self) -> &[(String, String)] { &self.form }
    pub fn body(&self) -> &[u8] { &self.data }
    pub fn args(&self) -> &[(String, String)] { &self.args }
    pub fn cookies(&self) -> &[(String, String)] { &self.cookies }
    pub fn files(&self) -> &[UploadedFile] { &self.files }
}

// ── HostResponse ──────────────────────────────────────────────────────────────

/// The outbound response object handed back to the host.
///
/// Headers are single-valued: setting a header replaces any earlier value
/// under the same name. Cookies live beside the headers and are rendered as
/// one `set-cookie` header each.
#[derive(Debug)]
pub struct HostResponse {
    status: StatusCode,
    content_type: Option<HeaderValue>,
    headers: Vec<(HeaderName, HeaderValue)>,
    cookies: Vec<Cookie>,
    body: SyncByteStream,
}

impl HostResponse {
    /// A response whose body is pulled lazily from `body`.
    pub fn streamed(body: SyncByteStream, status: StatusCode, content_type: Option<HeaderValue>) -> Self {
        Self { status, content_type, headers: Vec::new(), cookies: Vec::new(), body }
    }

    /// Sets `name`, replacing any earlier value. `content-type` updates the
    /// declared content type.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if name == CONTENT_TYPE {
            self.content_type = Some(value);
            return;
        }
        match self.headers.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn content_type(&self) -> Option<&HeaderValue> { self.content_type.as_ref() }
    pub fn cookies(&self) -> &[Cookie] { &self.cookies }
    pub fn body_mut(&mut self) -> &mut SyncByteStream { &mut self.body }
    pub fn into_body(self) -> SyncByteStream { self.body }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        if name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
            return self.content_type.as_ref();
        }
        self.headers.iter()
            .find(|(k, _)| k.as_str().eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Every header as it goes on the wire: content type, the header store,
    /// then one `set-cookie` per cookie.
    pub fn wire_headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        let mut out = Vec::with_capacity(self.headers.len() + self.cookies.len() + 1);
        if let Some(content_type) = &self.content_type {
            out.push((CONTENT_TYPE, content_type.clone()));
        }
        out.extend(self.headers.iter().cloned());
        out.extend(
            self.cookies.iter()
                .filter_map(|c| HeaderValue::from_str(&c.to_string()).ok())
                .map(|v| (SET_COOKIE, v)),
        );
        out
    }

    /// Splits into status, wire headers, and the body stream.
    pub fn into_parts(self) -> (StatusCode, Vec<(HeaderName, HeaderValue)>, SyncByteStream) {
        let headers = self.wire_headers();
        (self.status, headers, self.body)
    }
}
