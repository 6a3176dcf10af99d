//! # fnbridge
//!
//! Run one async HTTP endpoint inside a serverless function host.
//!
//! ## The contract
//!
//! The host owns the socket, TLS, scaling, and request parsing. It calls the
//! function once per request, synchronously, with an already-parsed request,
//! and pulls the response body by blocking. fnbridge turns that call into a
//! normal async HTTP exchange with an in-process application:
//!
//! ```text
//! HostRequest ─► convert ─► Client ─► Transport ─► App (your endpoint)
//! HostResponse ◄─ convert ◄─ NormalizedResponse ◄─ start + body messages
//! ```
//!
//! There is no network hop. Each request gets its own executor; status and
//! headers come back as soon as the endpoint sends them, and the body keeps
//! streaming from the endpoint while the host reads it.
//!
//! What's here:
//!
//! - One route at `/`, with dependencies and a method set
//! - A scope/receive/send transport any [`Application`] can sit behind
//! - Blocking and async entry calls ([`Bridge::proxy`], [`Bridge::proxy_async`])
//! - A local [`Server`] that plays the function host during development
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use fnbridge::{Entry, Json, Request, Server};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let entry = Entry::default().get(dates).unwrap();
//!     Server::bind(([127, 0, 0, 1], 8080)).serve(entry).await.unwrap();
//! }
//!
//! async fn dates(req: Request) -> Json<serde_json::Value> {
//!     Json(json!({
//!         "start_date": req.query("start_date"),
//!         "end_date": req.query("end_date"),
//!     }))
//! }
//! ```

mod app;
mod client;
mod config;
mod convert;
mod cookie;
mod entry;
mod error;
mod executor;
mod handler;
mod host;
mod multipart;
mod normalized;
mod protocol;
mod proxy;
mod request;
mod response;
mod server;
mod stream;
mod transport;

pub use app::App;
pub use client::Client;
pub use config::{Config, ConfigError};
pub use convert::{to_host_response, to_normalized_request};
pub use cookie::{Cookie, SameSite};
pub use entry::{Entry, EntryPoint};
pub use error::{BoxError, Error};
pub use executor::Executor;
pub use handler::{Dependency, Depends, Handler};
pub use host::{HostRequest, HostResponse, UploadedFile};
pub use normalized::{FilePart, NormalizedRequest, NormalizedResponse, RequestBody};
pub use protocol::{Application, BoxFuture, BoxedApplication, Inbound, Outbound, Scope};
pub use proxy::Bridge;
pub use request::Request;
pub use response::{Body, ContentType, IntoResponse, Json, Response, ResponseBuilder};
pub use server::Server;
pub use stream::{AsyncByteStream, ByteStream, Chunk, SyncByteStream};
pub use transport::{Receive, Respond, Transport};

pub use http::{Method, StatusCode};
