//! The bridge: one application, one client, one mount.
//!
//! [`Bridge`] is the context object the host-side entry point holds for the
//! life of the process. It owns the application and the in-process client,
//! and the application's mount state moves `unmounted → mounted` exactly
//! once.
//!
//! # Per request
//!
//! ```text
//! HostRequest ─► to_normalized_request ─► Client::send ─► to_host_response ─► HostResponse
//!                                          (blocks on a fresh Executor)         body bound to it
//! ```

use std::sync::Arc;

use http::Method;
use tracing::{debug, error, info};

use crate::app::{App, Route};
use crate::client::Client;
use crate::config::Config;
use crate::convert::{to_host_response, to_normalized_request};
use crate::error::Error;
use crate::executor::Executor;
use crate::handler::{Depends, Handler};
use crate::host::{HostRequest, HostResponse};
use crate::normalized::NormalizedResponse;
use crate::protocol::BoxedApplication;

pub struct Bridge {
    app: Arc<App>,
    client: Arc<Client>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Bridge {
    pub fn new(config: Config) -> Self {
        let app = Arc::new(App::new());
        let application: BoxedApplication = app.clone();
        let client = Arc::new(Client::new(application, &config));
        Self { app, client }
    }

    /// A bridge configured from `FNBRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self::new(Config::from_env()?))
    }

    /// Registers `endpoint` as the application's only route, at `/`.
    ///
    /// `methods` defaults to `GET`. Dependencies run in order before the
    /// endpoint. A second call fails with [`Error::AlreadyMounted`] and
    /// leaves the first registration serving.
    pub fn mount<H: Handler>(
        &self,
        endpoint: H,
        dependencies: Vec<Depends>,
        methods: Option<Vec<Method>>,
    ) -> Result<(), Error> {
        let methods = methods.unwrap_or_else(|| vec![Method::GET]);
        let route = Route {
            handler: endpoint.into_boxed_handler(),
            dependencies,
            methods,
        };
        let methods = route.methods.clone();
        let dependencies = route.dependencies.len();

        match self.app.mount(route) {
            Ok(()) => {
                info!(?methods, dependencies, "entry point mounted");
                Ok(())
            }
            Err(e) => {
                error!("entry point is already mounted; keeping the first registration");
                Err(e)
            }
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.app.is_mounted()
    }

    /// The in-process client, for callers that already hold normalized requests.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Handles one host request synchronously.
    ///
    /// Blocks until the application has sent status and headers. The returned
    /// body keeps the request's executor alive and drives the application
    /// each time a chunk is pulled. Transport failures come back unchanged.
    pub fn proxy(&self, request: HostRequest) -> Result<HostResponse, Error> {
        let request = to_normalized_request(request)?;
        debug!(method = %request.method, url = %request.url, "proxying request");

        let executor = Arc::new(Executor::new()?);
        let client = Arc::clone(&self.client);
        let response = executor.block_on(async move { client.send(request).await })?;
        debug!(status = %response.status, "proxied response started");

        Ok(to_host_response(response, executor))
    }

    /// Handles one host request on the caller's runtime.
    ///
    /// For hosts that are async themselves: the application runs on the
    /// current runtime and the body is awaited rather than pulled.
    pub async fn proxy_async(&self, request: HostRequest) -> Result<NormalizedResponse, Error> {
        let request = to_normalized_request(request)?;
        debug!(method = %request.method, url = %request.url, "proxying request");

        let response = self.client.send(request).await?;
        debug!(status = %response.status, "proxied response started");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::request::Request;
    use crate::response::Response;

    async fn hello(req: Request) -> Response {
        Response::text(format!("hello {}", req.query("name").unwrap_or("nobody")))
    }

    #[test]
    fn proxy_runs_the_mounted_endpoint() {
        let bridge = Bridge::default();
        assert!(!bridge.is_mounted());
        bridge.mount(hello, vec![], None).unwrap();
        assert!(bridge.is_mounted());

        let response = bridge.proxy(HostRequest::new("GET", "http://fn/?name=ann")).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.into_body().collect_bytes().unwrap(), "hello ann");
    }

    #[test]
    fn second_mount_is_rejected() {
        let bridge = Bridge::default();
        bridge.mount(hello, vec![], Some(vec![Method::GET])).unwrap();
        let err = bridge.mount(hello, vec![], Some(vec![Method::POST])).unwrap_err();
        assert!(matches!(err, Error::AlreadyMounted));

        let response = bridge.proxy(HostRequest::new("GET", "http://fn/")).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn invalid_requests_fail_before_the_application_runs() {
        let bridge = Bridge::default();
        bridge.mount(hello, vec![], None).unwrap();
        let err = bridge.proxy(HostRequest::new("BAD METHOD", "http://fn/")).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn proxy_async_runs_on_the_callers_runtime() {
        let bridge = Bridge::default();
        bridge.mount(hello, vec![], None).unwrap();
        let response = bridge.proxy_async(HostRequest::new("GET", "http://fn/?name=bo")).await.unwrap();
        assert_eq!(response.body.collect_bytes().await.unwrap(), "hello bo");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blocking_proxy_tolerates_an_outer_runtime() {
        let bridge = Bridge::default();
        bridge.mount(hello, vec![], None).unwrap();
        let response = bridge.proxy(HostRequest::new("GET", "http://fn/?name=cy")).unwrap();
        assert_eq!(response.into_body().collect_bytes().unwrap(), "hello cy");
    }
}
