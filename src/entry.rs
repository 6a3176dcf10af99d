//! Host-facing entry point and the registration helpers that create it.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use fnbridge::{Entry, HostRequest, Request, Response};
//!
//! async fn main_fn(req: Request) -> Response {
//!     Response::text(format!("hi {}", req.query("name").unwrap_or("there")))
//! }
//!
//! let entry = Entry::default().get(main_fn).unwrap();
//!
//! // The host calls this once per request:
//! let response = entry.invoke(HostRequest::new("GET", "http://fn/?name=ann")).unwrap();
//! ```

use std::sync::Arc;

use http::Method;

use crate::config::Config;
use crate::error::Error;
use crate::handler::{Dependency, Depends, Handler};
use crate::host::{HostRequest, HostResponse};
use crate::proxy::Bridge;

/// The function the host invokes. Cheap to clone; every clone serves the
/// same bridge.
#[derive(Clone)]
pub struct EntryPoint {
    bridge: Arc<Bridge>,
}

impl EntryPoint {
    /// Handles one request: convert, run the endpoint, convert back.
    pub fn invoke(&self, request: HostRequest) -> Result<HostResponse, Error> {
        self.bridge.proxy(request)
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }
}

/// Registers the endpoint of a bridge and hands back its [`EntryPoint`].
///
/// One method helper per HTTP method; [`route`](Entry::route) takes any set.
/// Dependencies are added with [`depends`](Entry::depends) and run in the
/// order they were added.
pub struct Entry {
    bridge: Arc<Bridge>,
    dependencies: Vec<Depends>,
}

impl Default for Entry {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Entry {
    /// Registration on a fresh bridge.
    pub fn new(config: Config) -> Self {
        Self::on(Arc::new(Bridge::new(config)))
    }

    /// Registration on an existing bridge.
    pub fn on(bridge: Arc<Bridge>) -> Self {
        Self { bridge, dependencies: Vec::new() }
    }

    pub fn depends(mut self, dependency: impl Dependency) -> Self {
        self.dependencies.push(Depends::new(dependency));
        self
    }

    pub fn get(self, endpoint: impl Handler) -> Result<EntryPoint, Error> {
        self.route(Some(vec![Method::GET]), endpoint)
    }

    pub fn put(self, endpoint: impl Handler) -> Result<EntryPoint, Error> {
        self.route(Some(vec![Method::PUT]), endpoint)
    }

    pub fn post(self, endpoint: impl Handler) -> Result<EntryPoint, Error> {
        self.route(Some(vec![Method::POST]), endpoint)
    }

    pub fn patch(self, endpoint: impl Handler) -> Result<EntryPoint, Error> {
        self.route(Some(vec![Method::PATCH]), endpoint)
    }

    pub fn delete(self, endpoint: impl Handler) -> Result<EntryPoint, Error> {
        self.route(Some(vec![Method::DELETE]), endpoint)
    }

    pub fn head(self, endpoint: impl Handler) -> Result<EntryPoint, Error> {
        self.route(Some(vec![Method::HEAD]), endpoint)
    }

    pub fn options(self, endpoint: impl Handler) -> Result<EntryPoint, Error> {
        self.route(Some(vec![Method::OPTIONS]), endpoint)
    }

    /// Mounts `endpoint` for `methods` (`GET` when `None`).
    pub fn route(self, methods: Option<Vec<Method>>, endpoint: impl Handler) -> Result<EntryPoint, Error> {
        self.bridge.mount(endpoint, self.dependencies, methods)?;
        Ok(EntryPoint { bridge: self.bridge })
    }
}
