//! Pattern routing.
//!
//! The [`Mux`] holds a trie keyed first by method, then by url segment.
//! Patterns are `/`-separated, and a segment written as `{name}` matches any
//! single segment, capturing it under `name`. When both a literal and a
//! wildcard could match a segment, the literal subtree is searched first and
//! the wildcard is only tried if that subtree has no leaf for the rest of
//! the url.

mod error;
pub use error::RegistrationError;

mod pattern;
pub use pattern::{Pattern, Segment};

mod tree;
use tree::{Match, RoutingTree};

use crate::{
    routes::{Handler, Route, RouteFuture},
    Connection, HandlerCtx, Request, RequestError, Response,
};
use http::StatusCode;
use std::{convert::Infallible, fmt, sync::Arc};
use tower::{Layer, Service};
use tracing::{debug, debug_span, warn, Instrument};

type BoxedLayer = Arc<dyn Fn(Route) -> Route + Send + Sync>;

/// A router from method and url pattern to handler.
///
/// Middleware is added with [`Mux::layer`] and is applied to a handler at
/// the moment the handler is registered. Each layer wraps the handler as
/// composed by the layers added before it, so the most recently added layer
/// runs first. Layers added after a route is registered do not affect that
/// route.
///
/// ```
/// use tcpchat::{Mux, RequestIdLayer, Request, Response, TimeoutLayer};
/// use std::time::Duration;
///
/// let mux = Mux::new()
///     .layer(TimeoutLayer::new(Duration::from_secs(5)))
///     .layer(RequestIdLayer::default())
///     .route("GET", "/user/{id}", |req: Request| async move {
///         Response::ok("found").with_body(req.param("id").to_owned())
///     });
/// assert_eq!(mux.len(), 1);
/// ```
pub struct Mux {
    tree: RoutingTree<Route>,
    layers: Vec<BoxedLayer>,
}

impl fmt::Debug for Mux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mux")
            .field("routes", &self.tree.len())
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl Default for Mux {
    fn default() -> Self {
        Self::new()
    }
}

impl Mux {
    /// Create an empty mux.
    pub fn new() -> Self {
        Self {
            tree: RoutingTree::default(),
            layers: Vec::new(),
        }
    }

    /// Add a middleware layer. It applies to every route registered after
    /// this call.
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<Route> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Infallible>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.layers
            .push(Arc::new(move |route| Route::new(layer.layer(route))));
        self
    }

    fn wrap(&self, route: Route) -> Route {
        self.layers.iter().fold(route, |route, layer| layer(route))
    }

    fn handle_route(
        &mut self,
        method: &str,
        url: &str,
        route: Route,
    ) -> Result<(), RegistrationError> {
        let pattern = Pattern::parse(method, url)?;
        let route = self.wrap(route);
        self.tree.insert(pattern, route)?;
        debug!(method, url, "registered route");
        Ok(())
    }

    /// Register a handler. Fails if the pattern is empty, or if a route
    /// with the same shape is already registered.
    pub fn handle_fn<H, T>(
        &mut self,
        method: &str,
        url: &str,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        H: Handler<T>,
        T: 'static,
    {
        self.handle_route(method, url, Route::from_handler(handler))
    }

    /// Register a [`tower::Service`]. Fails under the same conditions as
    /// [`Mux::handle_fn`].
    pub fn handle_service<S>(
        &mut self,
        method: &str,
        url: &str,
        service: S,
    ) -> Result<(), RegistrationError>
    where
        S: Service<Request, Response = Response, Error = Infallible>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        self.handle_route(method, url, Route::new(service))
    }

    /// Register a handler, returning the mux.
    ///
    /// # Panics
    ///
    /// If [`Mux::handle_fn`] fails. Use this while building the mux at
    /// startup, before any connection is accepted.
    #[track_caller]
    pub fn route<H, T>(mut self, method: &str, url: &str, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        panic_on_err!(self.handle_fn(method, url, handler));
        self
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// True if no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Match a request and call its route. Returns `None` if no route
    /// matches.
    pub fn call(&self, mut req: Request) -> Option<RouteFuture> {
        let Some(Match {
            pattern,
            value,
            matches,
        }) = self.tree.at(req.method(), req.url())
        else {
            crate::metrics::record_not_found(req.method());
            debug!(method = req.method(), url = req.url(), "mismatched route");
            return None;
        };

        crate::metrics::record_call(pattern.method(), pattern.url());
        req.set_route(Arc::clone(pattern), matches);
        Some(value.clone().call(req))
    }

    /// Serve one accepted connection.
    ///
    /// Reads one request frame and dispatches it. The response is written
    /// once the handler returns. For a [`Proto::Streaming`] request whose
    /// response carries an upgrade hook, the response is written as the
    /// session acknowledgement and the hook then owns the connection until
    /// the session ends. Frames that are not requests receive a `400`.
    /// Requests that match no route are dropped without a response.
    ///
    /// [`Proto::Streaming`]: crate::Proto::Streaming
    pub async fn serve_connection(&self, mut conn: Connection, ctx: HandlerCtx) {
        let span = debug_span!(
            "Mux::serve_connection",
            conn_id = conn.id(),
            remote_addr = %conn.remote_addr(),
        );

        async move {
            let frame = match conn.read_frame().await {
                Ok(frame) => frame,
                Err(err) if err.is_eof() => {
                    debug!("connection closed before sending a request");
                    return;
                }
                Err(err) => {
                    crate::metrics::record_bad_frame();
                    debug!(%err, "error to read frame");
                    return;
                }
            };

            let req = match Request::decode(&frame) {
                Ok(req) => req.with_ctx(ctx),
                Err(err) => {
                    crate::metrics::record_bad_frame();
                    debug!(%err, "error to create new request");
                    let resp = bad_request(&err);
                    if let Err(err) = conn.write_response(&resp).await {
                        debug!(%err, "failed to write response");
                    }
                    return;
                }
            };

            let proto = req.proto();
            let Some(fut) = self.call(req) else {
                return;
            };
            let mut resp = unwrap_infallible!(fut.await);
            let upgrade = resp.take_upgrade();

            if let Err(err) = conn.write_response(&resp).await {
                debug!(%err, "failed to write response");
                return;
            }

            match upgrade {
                Some(upgrade) if proto.is_streaming() => upgrade(conn).await,
                Some(_) => warn!("handler returned an upgrade for a request/response call"),
                None => {}
            }
        }
        .instrument(span)
        .await
    }
}

fn bad_request(err: &RequestError) -> Response {
    Response::with_status(StatusCode::BAD_REQUEST, "malformed request").with_body(err.to_string())
}
