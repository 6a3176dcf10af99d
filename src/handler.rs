//! Endpoint and dependency traits, and their type erasure.
//!
//! # How async endpoints are stored
//!
//! The app holds exactly one endpoint and a list of dependencies, each of a
//! different concrete type chosen by the user. They are stored as **trait
//! objects** so the app itself is not generic over them:
//!
//! ```text
//! async fn main(req: Request) -> Json<Dates> { … }   ← user writes this
//!        ↓ bridge.mount(main, deps, methods)
//! main.into_boxed_handler()                          ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(main))                          ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)  at request time                 ← one vtable dispatch
//!        ↓
//! Box::pin(async { main(req).await.into_response() })  ← ResponseFuture
//! ```
//!
//! Dependencies follow the same chain, except their future resolves to
//! `Result<(), Response>`: `Err` short-circuits the request with that response.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub(crate) type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A heap-allocated, type-erased future of one dependency check.
pub(crate) type CheckFuture = Pin<Box<dyn Future<Output = Result<(), Response>> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> ResponseFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

#[doc(hidden)]
pub trait ErasedDependency {
    fn check(&self, req: Request) -> CheckFuture;
}

#[doc(hidden)]
pub type BoxedDependency = Arc<dyn ErasedDependency + Send + Sync + 'static>;

// ── Public traits ─────────────────────────────────────────────────────────────

/// Implemented for every valid endpoint.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::SealedHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Implemented for every valid dependency.
///
/// A dependency runs before the endpoint and either lets the request through
/// or rejects it with a response of its own:
///
/// ```text
/// async fn name(req: Request) -> Result<(), impl IntoResponse>
/// ```
///
/// Sealed, like [`Handler`].
pub trait Dependency: private::SealedDependency + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_dependency(self) -> BoxedDependency;
}

/// The sealing module. External crates cannot name these traits and
/// therefore cannot implement `Handler` or `Dependency` on their own types.
mod private {
    pub trait SealedHandler {}
    pub trait SealedDependency {}
}

/// A registered dependency, as passed to [`Bridge::mount`](crate::Bridge::mount).
#[derive(Clone)]
pub struct Depends(pub(crate) BoxedDependency);

impl Depends {
    pub fn new(dependency: impl Dependency) -> Self {
        Self(dependency.into_boxed_dependency())
    }
}

impl fmt::Debug for Depends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Depends(..)")
    }
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::SealedHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

impl<F, Fut, E> private::SealedDependency for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: IntoResponse + Send + 'static,
{
}

impl<F, Fut, E> Dependency for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: IntoResponse + Send + 'static,
{
    fn into_boxed_dependency(self) -> BoxedDependency {
        Arc::new(FnDependency(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> ResponseFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

struct FnDependency<F>(F);

impl<F, Fut, E> ErasedDependency for FnDependency<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: IntoResponse + Send + 'static,
{
    fn check(&self, req: Request) -> CheckFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.map_err(IntoResponse::into_response) })
    }
}
