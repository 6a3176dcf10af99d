//! In-process HTTP client bound to one application.

use http::Method;

use crate::config::Config;
use crate::error::Error;
use crate::normalized::{NormalizedRequest, NormalizedResponse};
use crate::protocol::BoxedApplication;
use crate::transport::Transport;

/// Sends normalized requests straight into an application.
///
/// There is no connection and no pool: every [`send`](Client::send) is one
/// call through the [`Transport`]. Relative URLs resolve against the
/// configured base URL.
pub struct Client {
    transport: Transport,
}

impl Client {
    pub fn new(app: BoxedApplication, config: &Config) -> Self {
        Self { transport: Transport::new(app, config) }
    }

    /// Sends `request` and returns as soon as status and headers are known.
    /// The body streams afterwards.
    pub async fn send(&self, request: NormalizedRequest) -> Result<NormalizedResponse, Error> {
        self.transport.handle(request).await
    }

    /// Shorthand for a bodiless request.
    pub async fn request(&self, method: Method, url: &str) -> Result<NormalizedResponse, Error> {
        self.send(NormalizedRequest::new(method, url)).await
    }

    pub async fn get(&self, url: &str) -> Result<NormalizedResponse, Error> {
        self.request(Method::GET, url).await
    }
}
