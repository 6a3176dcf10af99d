//! The in-process application: one endpoint mounted at the root path.
//!
//! [`App`] speaks the scope/receive/send contract, so the transport drives
//! it exactly like any other [`Application`]. Per request it:
//!
//! 1. answers `404` for any path other than `/` (or when nothing is mounted)
//! 2. answers `405` with an `allow` header for methods outside the route's set
//! 3. reads the request body through `receive`
//! 4. runs the dependencies in order; the first rejection is the response
//! 5. runs the endpoint and sends its response

use std::sync::OnceLock;

use bytes::{Bytes, BytesMut};
use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};

use crate::error::{BoxError, Error};
use crate::handler::{BoxedHandler, Depends};
use crate::protocol::{Application, BoxFuture, Inbound, Scope};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{Receive, Respond};

/// The mounted endpoint with its dependencies and accepted methods.
pub(crate) struct Route {
    pub(crate) handler: BoxedHandler,
    pub(crate) dependencies: Vec<Depends>,
    pub(crate) methods: Vec<Method>,
}

/// A single-route application.
///
/// Starts unmounted and serves `404` until [`mount`](App::mount) succeeds.
/// Mounting happens exactly once; the route is never replaced.
#[derive(Default)]
pub struct App {
    route: OnceLock<Route>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the route. Fails with [`Error::AlreadyMounted`] if one is
    /// already installed, leaving it untouched.
    pub(crate) fn mount(&self, route: Route) -> Result<(), Error> {
        self.route.set(route).map_err(|_| Error::AlreadyMounted)
    }

    pub fn is_mounted(&self) -> bool {
        self.route.get().is_some()
    }

    async fn dispatch(&self, scope: &Scope, receive: &mut Receive) -> Result<Response, Error> {
        let path = scope.path.strip_prefix(scope.root_path.as_str()).unwrap_or(&scope.path);
        let path = if path.is_empty() { "/" } else { path };

        let route = match self.route.get() {
            Some(route) if path == "/" => route,
            _ => return Ok(detail(StatusCode::NOT_FOUND, "Not Found")),
        };

        if !route.methods.contains(&scope.method) {
            let allow = route.methods.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
            let mut response = detail(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            if let Ok(allow) = HeaderValue::from_str(&allow) {
                response.headers.push((ALLOW, allow));
            }
            return Ok(response);
        }

        let body = read_body(receive).await?;
        let request = Request::new(scope, path.to_owned(), body);

        for Depends(dependency) in &route.dependencies {
            if let Err(rejection) = dependency.check(request.clone()).await {
                return Ok(rejection);
            }
        }

        Ok(route.handler.call(request).await)
    }
}

impl Application for App {
    fn call<'a>(
        &'a self,
        scope: Scope,
        mut receive: Receive,
        mut respond: Respond,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            let response = self.dispatch(&scope, &mut receive).await?;
            response.send_to(&mut respond).await?;
            Ok(())
        })
    }
}

/// Drains `receive` until the final body message or a disconnect.
async fn read_body(receive: &mut Receive) -> Result<Bytes, Error> {
    let mut buf = BytesMut::new();
    loop {
        match receive.receive().await? {
            Inbound::Request { body, more_body } => {
                buf.extend_from_slice(&body);
                if !more_body {
                    break;
                }
            }
            Inbound::Disconnect => break,
        }
    }
    Ok(buf.freeze())
}

/// A JSON `{"detail": ...}` error response.
fn detail(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({ "detail": message }).to_string();
    Response::builder().status(status).json(body)
}
