//! In-process transport: an application called like a network peer.
//!
//! There is no socket. [`Transport::handle`] builds a [`Scope`], spawns the
//! application on the current runtime, and hands it a [`Receive`] and a
//! [`Respond`] wired to in-memory state:
//!
//! ```text
//!  request body ──► Receive::receive ──► application ──► Respond::send
//!                                                          │
//!             start ◄── oneshot ◄───────────────────────────┤
//!   body backlog (unbounded, FIFO) ◄── Chunk … Chunk, End ◄─┘
//! ```
//!
//! `handle` returns as soon as the start message arrives. The response body
//! is the backlog, drained lazily by whoever reads it, so status and headers
//! reach the caller before the first body byte is produced.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use percent_encoding::percent_decode_str;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinError;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Config;
use crate::error::Error;
use crate::normalized::{NormalizedRequest, NormalizedResponse, WireRequest};
use crate::protocol::{BoxedApplication, Inbound, Outbound, Scope};
use crate::stream::AsyncByteStream;

/// Status line and headers carried by `http.response.start`.
struct Head {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
}

/// One slot of the response body backlog.
enum Backlog {
    Chunk(Bytes),
    /// The application failed after the response started. Ends the body.
    Failed(Error),
    /// Sentinel. Pushed exactly once, never followed by anything.
    End,
}

/// Response progress, shared by [`Respond`], [`Receive`] and the run task.
struct Progress {
    started: AtomicBool,
    complete: watch::Sender<bool>,
}

impl Progress {
    fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn is_complete(&self) -> bool {
        *self.complete.borrow()
    }
}

// ── Receive ───────────────────────────────────────────────────────────────────

/// The application's source of inbound messages.
pub struct Receive {
    body: AsyncByteStream,
    request_complete: bool,
    response_complete: watch::Receiver<bool>,
}

impl Receive {
    /// Returns the next request body chunk.
    ///
    /// Once the body is exhausted a final `more_body: false` message is
    /// returned. Any later call waits until the response is complete and then
    /// reports [`Inbound::Disconnect`]; the body is never read again.
    pub async fn receive(&mut self) -> Result<Inbound, Error> {
        if self.request_complete {
            // Err means the response side is gone, which is a disconnect too.
            let _ = self.response_complete.wait_for(|done| *done).await;
            return Ok(Inbound::Disconnect);
        }

        match self.body.next().await {
            Some(chunk) => Ok(Inbound::Request { body: chunk?, more_body: true }),
            None => {
                self.request_complete = true;
                Ok(Inbound::Request { body: Bytes::new(), more_body: false })
            }
        }
    }
}

// ── Respond ───────────────────────────────────────────────────────────────────

/// The application's sink for outbound messages.
pub struct Respond {
    start: Option<oneshot::Sender<Head>>,
    backlog: mpsc::UnboundedSender<Backlog>,
    progress: Arc<Progress>,
    discard_body: bool,
}

impl Respond {
    /// Accepts one response message.
    ///
    /// Fails with [`Error::Protocol`] on a second start, on a body before the
    /// start, and on a body after the final one.
    pub async fn send(&mut self, message: Outbound) -> Result<(), Error> {
        match message {
            Outbound::Start { status, headers } => {
                let start = self.start.take()
                    .ok_or(Error::Protocol("response already started"))?;
                self.progress.started.store(true, Ordering::Release);
                // The caller may already have given up; nothing to tell it then.
                let _ = start.send(Head { status, headers });
            }
            Outbound::Body { body, more_body } => {
                if !self.progress.is_started() {
                    return Err(Error::Protocol("response body sent before start"));
                }
                if self.progress.is_complete() {
                    return Err(Error::Protocol("response body sent after completion"));
                }
                // A closed backlog only means the consumer stopped reading.
                if !body.is_empty() && !self.discard_body {
                    let _ = self.backlog.send(Backlog::Chunk(body));
                }
                if !more_body {
                    let _ = self.backlog.send(Backlog::End);
                    self.progress.complete.send_replace(true);
                }
            }
        }
        Ok(())
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// Drives one application as if it were on the other end of a connection.
pub struct Transport {
    app: BoxedApplication,
    raise_app_exceptions: bool,
    root_path: String,
    client: (String, u16),
    base_url: Url,
}

impl Transport {
    pub fn new(app: BoxedApplication, config: &Config) -> Self {
        Self {
            app,
            raise_app_exceptions: config.raise_app_exceptions,
            root_path: config.root_path.clone(),
            client: config.client.clone(),
            base_url: config.base_url.clone(),
        }
    }

    /// Runs the application for `request` until it starts the response.
    ///
    /// Must be awaited inside a tokio runtime; the application task is
    /// spawned on it and may outlive this call while the body streams.
    pub async fn handle(&self, request: NormalizedRequest) -> Result<NormalizedResponse, Error> {
        let wire = request.encode(&self.base_url)?;
        self.handle_wire(wire).await
    }

    async fn handle_wire(&self, request: WireRequest) -> Result<NormalizedResponse, Error> {
        let scope = self.scope(&request);
        let discard_body = request.method == Method::HEAD;

        let (start_tx, start_rx) = oneshot::channel();
        let (backlog_tx, backlog_rx) = mpsc::unbounded_channel();
        let (complete_tx, complete_rx) = watch::channel(false);
        let progress = Arc::new(Progress {
            started: AtomicBool::new(false),
            complete: complete_tx,
        });

        let receive = Receive {
            body: request.body,
            request_complete: false,
            response_complete: complete_rx,
        };
        let respond = Respond {
            start: Some(start_tx),
            backlog: backlog_tx.clone(),
            progress: Arc::clone(&progress),
            discard_body,
        };

        let app = Arc::clone(&self.app);
        let raise = self.raise_app_exceptions;
        let watched = Arc::clone(&progress);
        let run = tokio::spawn(async move {
            let outcome = app.call(scope, receive, respond).await;
            settle(outcome.map_err(Error::application), &watched, &backlog_tx, raise)
        });

        // The start sender only disappears without firing once the
        // application has let go of `Respond`, i.e. it is done.
        let head = match start_rx.await {
            Ok(head) => head,
            Err(_) => {
                joined(run.await)?;
                return Err(Error::NoResponse);
            }
        };
        debug!(status = %head.status, "response started");

        let body = backlog_stream(backlog_rx);

        if progress.is_complete() {
            // Everything was sent already; reap the task rather than leave it.
            joined(run.await)?;
        }

        Ok(NormalizedResponse::new(head.status, head.headers, body))
    }

    fn scope(&self, request: &WireRequest) -> Scope {
        let url = &request.url;
        Scope {
            kind: "http",
            protocol_version: "3.0",
            http_version: "1.1",
            method: request.method.clone(),
            headers: request.headers.clone(),
            scheme: url.scheme().to_owned(),
            path: percent_decode(url.path()),
            raw_path: Bytes::copy_from_slice(url.path().as_bytes()),
            query_string: Bytes::copy_from_slice(url.query().unwrap_or("").as_bytes()),
            server: (url.host_str().unwrap_or("").to_owned(), url.port()),
            client: self.client.clone(),
            root_path: self.root_path.clone(),
        }
    }
}

/// Applies the failure policy to the application's outcome.
///
/// - before start: the error goes back to `handle`
/// - after start, before completion: the error ends the body stream
/// - after completion: returned only when failures must always propagate
fn settle(
    outcome: Result<(), Error>,
    progress: &Progress,
    backlog: &mpsc::UnboundedSender<Backlog>,
    raise: bool,
) -> Result<(), Error> {
    let error = match outcome {
        Ok(()) => {
            if progress.is_started() && !progress.is_complete() {
                warn!("application returned before completing the response body");
            }
            return Ok(());
        }
        Err(error) => error,
    };

    if !progress.is_started() {
        return Err(error);
    }
    if !progress.is_complete() {
        let _ = backlog.send(Backlog::Failed(error));
        return Ok(());
    }
    if raise {
        error!(%error, "application failed after completing the response");
        Err(error)
    } else {
        debug!(%error, "suppressed application failure after a complete response");
        Ok(())
    }
}

fn joined(result: Result<Result<(), Error>, JoinError>) -> Result<(), Error> {
    result.unwrap_or_else(|e| Err(Error::Application(Box::new(e))))
}

/// Turns the backlog receiver into the response body.
///
/// Ends on the sentinel, after a failure, or when every producer is gone.
fn backlog_stream(rx: mpsc::UnboundedReceiver<Backlog>) -> AsyncByteStream {
    let chunks = stream::unfold(Some(rx), |rx| async move {
        let mut rx = rx?;
        match rx.recv().await? {
            Backlog::Chunk(bytes) => Some((Ok(bytes), Some(rx))),
            Backlog::Failed(error) => Some((Err(error), None)),
            Backlog::End => None,
        }
    });
    AsyncByteStream::from_stream(chunks.fuse())
}

fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}
