//! Outgoing response type and the [`IntoResponse`] conversion trait.
//!
//! Build a [`Response`] in your endpoint and return it, or return anything
//! that implements [`IntoResponse`]. The app turns it into start and body
//! messages; you never talk to the transport directly.

use bytes::Bytes;
use futures::StreamExt;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE};
use http::{HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::cookie::Cookie;
use crate::error::Error;
use crate::protocol::Outbound;
use crate::stream::AsyncByteStream;
use crate::transport::Respond;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// A response body: fully known up front, or produced chunk by chunk.
#[derive(Debug)]
pub enum Body {
    Full(Bytes),
    Stream(AsyncByteStream),
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK, no custom headers needed)
///
/// ```rust
/// use fnbridge::{Response, StatusCode};
///
/// Response::json(r#"{"id":1}"#);
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status, headers, cookies, streamed bodies)
///
/// ```rust
/// use fnbridge::{ContentType, Cookie, Response, StatusCode};
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .cookie(Cookie::new("session", "abc"))
///     .json(r#"{"id":42}"#);
///
/// Response::builder().bytes(ContentType::Xml, "<ok/>");
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(HeaderName, HeaderValue)>,
    pub(crate) body: Body,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self::builder().status(code).no_body()
    }

    /// Builder for responses that need a custom status, extra headers,
    /// cookies, or a streamed body.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] { &self.headers }

    /// Emits the start message, then the body.
    ///
    /// A full body goes out as one final message with its `content-length`.
    /// A streamed body goes out chunk by chunk, then an empty final message;
    /// a failing chunk aborts the response with that error.
    pub(crate) async fn send_to(self, respond: &mut Respond) -> Result<(), Error> {
        let mut headers = self.headers;
        match self.body {
            Body::Full(bytes) => {
                headers.push((CONTENT_LENGTH, HeaderValue::from(bytes.len())));
                respond.send(Outbound::start(self.status, headers)).await?;
                respond.send(Outbound::body(bytes)).await
            }
            Body::Stream(mut stream) => {
                respond.send(Outbound::start(self.status, headers)).await?;
                while let Some(chunk) = stream.next().await {
                    respond.send(Outbound::chunk(chunk?)).await?;
                }
                respond.send(Outbound::body(Bytes::new())).await
            }
        }
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method: you always know what you're sending.
pub struct ResponseBuilder {
    headers: Vec<(HeaderName, HeaderValue)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. A name or value that is not valid HTTP is dropped
    /// with a warning.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            _ => warn!(name, "dropping invalid response header"),
        }
        self
    }

    /// Appends a `set-cookie` header.
    pub fn cookie(mut self, cookie: Cookie) -> Self {
        match HeaderValue::try_from(cookie.to_string()) {
            Ok(value) => self.headers.push((SET_COOKIE, value)),
            Err(_) => warn!(name = %cookie.name, "dropping invalid cookie"),
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(ContentType::Json.as_str(), Body::Full(body.into()))
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text.as_str(), Body::Full(Bytes::from(body.into())))
    }

    /// Terminate with a typed body. Use this for XML, HTML, binary, etc.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type.as_str(), Body::Full(body.into()))
    }

    /// Terminate with a body produced chunk by chunk. Chunks are relayed to
    /// the host as they are produced, never collected.
    pub fn stream(self, content_type: ContentType, body: AsyncByteStream) -> Response {
        self.finish(content_type.as_str(), Body::Stream(body))
    }

    /// Terminate with no body (e.g. `204 No Content`, redirects).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Body::Full(Bytes::new()) }
    }

    fn finish(self, content_type: &'static str, body: Body) -> Response {
        let mut headers = vec![(CONTENT_TYPE, HeaderValue::from_static(content_type))];
        headers.extend(self.headers);
        Response { status: self.status, headers, body }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from endpoints.
///
/// ```rust,ignore
/// use fnbridge::{IntoResponse, Response, StatusCode};
///
/// struct Created(u64);
///
/// impl IntoResponse for Created {
///     fn into_response(self) -> Response {
///         Response::builder()
///             .status(StatusCode::CREATED)
///             .header("location", &format!("/items/{}", self.0))
///             .no_body()
///     }
/// }
/// ```
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from an endpoint: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// Override the status of any other response: `(StatusCode::CREATED, Json(item))`
impl<R: IntoResponse> IntoResponse for (StatusCode, R) {
    fn into_response(self) -> Response {
        let mut response = self.1.into_response();
        response.status = self.0;
        response
    }
}

impl<T: IntoResponse, E: IntoResponse> IntoResponse for Result<T, E> {
    fn into_response(self) -> Response {
        match self {
            Ok(ok) => ok.into_response(),
            Err(err) => err.into_response(),
        }
    }
}

// ── Json ──────────────────────────────────────────────────────────────────────

/// A serde-serialisable value sent as `application/json`.
///
/// ```rust,ignore
/// async fn get_user(_req: Request) -> Json<User> {
///     Json(User { id: 1, name: "alice".into() })
/// }
/// ```
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => Response::json(bytes),
            Err(e) => {
                warn!(error = %e, "failed to serialise JSON response");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;
    use crate::cookie::SameSite;

    fn header<'a>(response: &'a Response, name: &HeaderName) -> Vec<&'a str> {
        response.headers.iter()
            .filter(|(k, _)| k == name)
            .filter_map(|(_, v)| v.to_str().ok())
            .collect()
    }

    #[test]
    fn builder_sets_status_headers_and_cookies() {
        let mut cookie = Cookie::new("sid", "1");
        cookie.same_site = Some(SameSite::Lax);
        let response = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/x")
            .header("bad header", "v")
            .cookie(cookie)
            .json("{}");

        assert_eq!(response.status_code(), StatusCode::CREATED);
        assert_eq!(header(&response, &CONTENT_TYPE), ["application/json"]);
        assert_eq!(header(&response, &HeaderName::from_static("location")), ["/x"]);
        assert_eq!(header(&response, &SET_COOKIE), ["sid=1; SameSite=Lax"]);
        assert_eq!(response.headers().len(), 3);
    }

    #[test]
    fn json_serialises_or_fails_with_500() {
        let response = Json(serde_json::json!({ "a": 1 })).into_response();
        match response.body {
            Body::Full(bytes) => assert_eq!(bytes, r#"{"a":1}"#),
            Body::Stream(_) => panic!("expected a full body"),
        }

        let mut bad = std::collections::HashMap::new();
        bad.insert(vec![1u8], 1);
        assert_eq!(Json(bad).into_response().status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn tuples_and_results_pick_the_right_response() {
        assert_eq!((StatusCode::ACCEPTED, "ok").into_response().status, StatusCode::ACCEPTED);

        let failed: Result<&'static str, StatusCode> = Err(StatusCode::UNAUTHORIZED);
        assert_eq!(failed.into_response().status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn stream_keeps_the_body_lazy() {
        let chunks = stream::iter(vec![Ok(Bytes::from_static(b"a"))]);
        let response = Response::builder()
            .stream(ContentType::EventStream, AsyncByteStream::from_stream(chunks));
        assert!(matches!(response.body, Body::Stream(_)));
        assert_eq!(header(&response, &CONTENT_TYPE), ["text/event-stream"]);
    }
}
