//! The scope/receive/send contract between the bridge and an application.
//!
//! An application is called once per request with a read-only [`Scope`], a
//! [`Receive`] handle it awaits for request body chunks, and a [`Respond`]
//! handle it pushes response messages into:
//!
//! ```text
//! Respond::send(Outbound::Start { status, headers })      exactly once, first
//! Respond::send(Outbound::Body { body, more_body: true }) zero or more
//! Respond::send(Outbound::Body { body, more_body: false }) exactly once, last
//! ```
//!
//! Anything that can speak this contract can sit behind the bridge; the
//! crate's own single-route [`App`](crate::App) is one such application.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, StatusCode};

use crate::error::BoxError;
use crate::transport::{Receive, Respond};

/// Per-request metadata handed to the application. Built once, never mutated.
#[derive(Clone, Debug)]
pub struct Scope {
    /// Always `"http"`.
    pub kind: &'static str,
    pub protocol_version: &'static str,
    pub http_version: &'static str,
    pub method: Method,
    /// Header pairs in arrival order. Names are lower-case.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub scheme: String,
    /// Percent-decoded path.
    pub path: String,
    /// Path exactly as it appeared on the wire.
    pub raw_path: Bytes,
    /// Query string without the leading `?`, still encoded.
    pub query_string: Bytes,
    pub server: (String, Option<u16>),
    pub client: (String, u16),
    pub root_path: String,
}

impl Scope {
    /// First value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.as_str().eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.to_str().ok())
    }
}

/// A message returned by [`Receive::receive`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// `http.request`: the next request body chunk.
    Request { body: Bytes, more_body: bool },
    /// `http.disconnect`: the exchange is over.
    Disconnect,
}

/// A message accepted by [`Respond::send`].
#[derive(Clone, Debug)]
pub enum Outbound {
    /// `http.response.start`
    Start {
        status: StatusCode,
        headers: Vec<(HeaderName, HeaderValue)>,
    },
    /// `http.response.body`
    Body { body: Bytes, more_body: bool },
}

impl Outbound {
    pub fn start(status: StatusCode, headers: Vec<(HeaderName, HeaderValue)>) -> Self {
        Self::Start { status, headers }
    }

    /// A body chunk with more to follow.
    pub fn chunk(body: impl Into<Bytes>) -> Self {
        Self::Body { body: body.into(), more_body: true }
    }

    /// The final body message.
    pub fn body(body: impl Into<Bytes>) -> Self {
        Self::Body { body: body.into(), more_body: false }
    }
}

/// A boxed future borrowing the application for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An application driven through scope/receive/send.
///
/// Implemented for every closure of the shape
/// `Fn(Scope, Receive, Respond) -> impl Future<Output = Result<(), BoxError>>`,
/// and by [`App`](crate::App).
pub trait Application: Send + Sync + 'static {
    fn call<'a>(
        &'a self,
        scope: Scope,
        receive: Receive,
        respond: Respond,
    ) -> BoxFuture<'a, Result<(), BoxError>>;
}

/// A shared, type-erased application.
pub type BoxedApplication = Arc<dyn Application>;

impl<F, Fut> Application for F
where
    F: Fn(Scope, Receive, Respond) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn call<'a>(
        &'a self,
        scope: Scope,
        receive: Receive,
        respond: Respond,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin((self)(scope, receive, respond))
    }
}
