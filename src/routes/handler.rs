use crate::{Request, Response};
use std::{
    convert::Infallible,
    future::Future,
    marker::PhantomData,
    pin::Pin,
    task::{self, Poll},
};

/// A request handler.
///
/// This trait is blanket implemented for async functions and closures of the
/// following shapes:
///
/// - `async fn() -> Response`
/// - `async fn(Request) -> Response`
/// - `async fn() -> Result<Response, E>`
/// - `async fn(Request) -> Result<Response, E>`
///
/// where `E: Into<Response>`. The `Result` forms let handlers use `?` to
/// return early with an error response.
///
/// ```
/// use tcpchat::{Mux, Request, Response};
/// use http::StatusCode;
///
/// async fn user(req: Request) -> Result<Response, Response> {
///     let id: u64 = req
///         .param("id")
///         .parse()
///         .map_err(|_| Response::with_status(StatusCode::BAD_REQUEST, "bad id"))?;
///     Ok(Response::ok("found").with_body(id.to_string()))
/// }
///
/// let mux = Mux::new()
///     .route("GET", "/ping", || async { Response::ok("pong") })
///     .route("GET", "/user/{id}", user);
/// ```
///
/// Closures taking a request need the argument type spelled out, as in
/// `|req: Request| async move { .. }`, since several blanket impls could
/// otherwise apply.
///
/// ### Implementer's note:
///
/// The `T` type parameter is a **marker** and never needs be constructed. It
/// exists so the trait can be blanket implemented for several function
/// shapes without the impls overlapping.
pub trait Handler<T>: Clone + Send + Sync + Sized + 'static {
    /// The future returned by the handler.
    type Future: Future<Output = Response> + Send + 'static;

    /// Call the handler with the given request.
    fn call(self, req: Request) -> Self::Future;
}

/// A marker type for handlers that return a [`Response`].
///
/// This type should never be constructed, and importing it is almost certainly
/// a mistake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputResponse {
    _sealed: (),
}

/// A marker type for handlers that return a [`Result`].
///
/// This type should never be constructed, and importing it is almost certainly
/// a mistake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputResult {
    _sealed: (),
}

type BoxedResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

impl<F, Fut> Handler<(OutputResponse,)> for F
where
    F: FnOnce() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    type Future = BoxedResponseFuture;

    fn call(self, _req: Request) -> Self::Future {
        Box::pin(self())
    }
}

impl<F, Fut> Handler<(OutputResponse, Request)> for F
where
    F: FnOnce(Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    type Future = BoxedResponseFuture;

    fn call(self, req: Request) -> Self::Future {
        Box::pin(self(req))
    }
}

impl<F, Fut, E> Handler<(OutputResult,)> for F
where
    F: FnOnce() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, E>> + Send + 'static,
    E: Into<Response>,
{
    type Future = BoxedResponseFuture;

    fn call(self, _req: Request) -> Self::Future {
        Box::pin(async move { self().await.unwrap_or_else(Into::into) })
    }
}

impl<F, Fut, E> Handler<(OutputResult, Request)> for F
where
    F: FnOnce(Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, E>> + Send + 'static,
    E: Into<Response>,
{
    type Future = BoxedResponseFuture;

    fn call(self, req: Request) -> Self::Future {
        Box::pin(async move { self(req).await.unwrap_or_else(Into::into) })
    }
}

/// A [`Handler`] adapted into an infallible [`tower::Service`].
#[derive(Debug)]
pub(crate) struct HandlerService<H, T> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<H, T> Clone for HandlerService<H, T>
where
    H: Clone,
{
    fn clone(&self) -> Self {
        Self::new(self.handler.clone())
    }
}

impl<H, T> HandlerService<H, T> {
    /// Create a new handler service.
    pub(crate) const fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<H, T> tower::Service<Request> for HandlerService<H, T>
where
    H: Handler<T>,
    T: 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let fut = self.handler.clone().call(req);
        Box::pin(async move { Ok(fut.await) })
    }
}
