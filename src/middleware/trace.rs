use crate::{Request, Response};
use futures_util::future::BoxFuture;
use std::{
    convert::Infallible,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};
use tracing::info;

/// Logs one `info` event per completed call, with the request id, method,
/// url, peer address, status, response size and duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLayer {
    _priv: (),
}

impl TraceLayer {
    /// Create a new layer.
    pub const fn new() -> Self {
        Self { _priv: () }
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = Trace<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Trace { inner }
    }
}

/// Service produced by [`TraceLayer`].
#[derive(Debug, Clone)]
pub struct Trace<S> {
    inner: S,
}

impl<S> Service<Request> for Trace<S>
where
    S: Service<Request, Response = Response, Error = Infallible>,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let start = Instant::now();
        let request_id = req.ctx().request_id().unwrap_or_default();
        let method = req.method().to_owned();
        let url = req.url().to_owned();
        let remote_addr = req.ctx().remote_addr();
        let fut = self.inner.call(req);

        Box::pin(async move {
            let res = fut.await;
            if let Ok(resp) = &res {
                info!(
                    request_id,
                    method = %method,
                    url = %url,
                    remote_addr = ?remote_addr,
                    status_code = resp.status_code(),
                    status = resp.status(),
                    response_size = resp.content_length(),
                    duration = ?start.elapsed(),
                    "request completed"
                );
            }
            res
        })
    }
}
