//! Local function host: serves an [`EntryPoint`] over real sockets.
//!
//! Production hosts call [`EntryPoint::invoke`] themselves. This server plays
//! that role on a developer machine: each HTTP request is collected, turned
//! into a [`HostRequest`], and handed to the entry point on a blocking thread,
//! exactly as a function host would. The host response body is relayed to the
//! socket chunk by chunk as the blocking stream yields it.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()`, so no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use futures::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::entry::EntryPoint;
use crate::error::Error;
use crate::host::HostRequest;

type Body = UnsyncBoxBody<Bytes, Error>;
type Head = (http::StatusCode, Vec<(http::HeaderName, http::HeaderValue)>);

/// Chunks buffered between the blocking body reader and the socket.
const RELAY_DEPTH: usize = 8;

/// The development host server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use fnbridge::Server;
    /// let server = Server::bind(([127, 0, 0, 1], 8080));
    /// ```
    pub fn bind(addr: impl Into<SocketAddr>) -> Self {
        Self { addr: addr.into() }
    }

    /// Starts accepting connections and dispatching them to `entry`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, entry: EntryPoint) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "fnbridge host listening");

        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Checked first, so a signal stops accepting even with
                // connections still queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let entry = entry.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let entry = entry.clone();
                            async move { dispatch(entry, req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("fnbridge host stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request through the entry point.
///
/// Never fails towards hyper: a bridge error becomes a bare `500`.
async fn dispatch(
    entry: EntryPoint,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Body>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("failed to read request body: {e}");
            return Ok(status_only(http::StatusCode::BAD_REQUEST));
        }
    };
    let request = HostRequest::from_http(http::Request::from_parts(parts, body));

    let (head_tx, head_rx) = oneshot::channel::<Result<Head, Error>>();
    let (chunk_tx, chunk_rx) = mpsc::channel(RELAY_DEPTH);

    // The host contract is blocking: invoke and pull the body off the runtime.
    tokio::task::spawn_blocking(move || {
        let response = match entry.invoke(request) {
            Ok(response) => response,
            Err(e) => {
                let _ = head_tx.send(Err(e));
                return;
            }
        };
        let (status, headers, body) = response.into_parts();
        if head_tx.send(Ok((status, headers))).is_err() {
            return;
        }
        for chunk in body {
            // The client went away; dropping `body` cancels the application.
            if chunk_tx.blocking_send(chunk).is_err() {
                break;
            }
        }
    });

    let (status, headers) = match head_rx.await {
        Ok(Ok(head)) => head,
        Ok(Err(e)) => {
            error!(error = %e, "entry point failed");
            return Ok(status_only(http::StatusCode::INTERNAL_SERVER_ERROR));
        }
        Err(_) => {
            error!("entry point panicked");
            return Ok(status_only(http::StatusCode::INTERNAL_SERVER_ERROR));
        }
    };

    let frames = stream::unfold(chunk_rx, |mut rx| async move {
        let chunk = rx.recv().await?;
        Some((chunk.map(Frame::data), rx))
    });

    let mut response = http::Response::new(StreamBody::new(frames).boxed_unsync());
    *response.status_mut() = status;
    for (name, value) in headers {
        response.headers_mut().append(name, value);
    }
    Ok(response)
}

fn status_only(status: http::StatusCode) -> http::Response<Body> {
    let body: Body = Full::new(Bytes::new()).map_err(|never| match never {}).boxed_unsync();
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    response
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available. A signal that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` is a future that never resolves: on non-Unix platforms
    // the SIGTERM arm is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
