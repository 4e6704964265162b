use crate::{Request, Response};
use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
};
use tower::{Layer, Service};

/// Assigns each request an id, unique among requests passing through this
/// layer and any of its clones. Ids start at 1 and increase monotonically.
///
/// The id is available to inner layers and handlers via
/// [`HandlerCtx::request_id`].
///
/// [`HandlerCtx::request_id`]: crate::HandlerCtx::request_id
#[derive(Debug, Clone, Default)]
pub struct RequestIdLayer {
    counter: Arc<AtomicU64>,
}

impl RequestIdLayer {
    /// Create a layer with a fresh counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently issued id, or 0 if none has been issued.
    pub fn last_id(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestId<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestId {
            inner,
            counter: self.counter.clone(),
        }
    }
}

/// Service produced by [`RequestIdLayer`].
#[derive(Debug, Clone)]
pub struct RequestId<S> {
    inner: S,
    counter: Arc<AtomicU64>,
}

impl<S> Service<Request> for RequestId<S>
where
    S: Service<Request, Response = Response, Error = Infallible>,
{
    type Response = Response;
    type Error = Infallible;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        req.ctx_mut().set_request_id(id);
        self.inner.call(req)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tower::{service_fn, ServiceExt};

    #[tokio::test]
    async fn ids_increase_across_clones() {
        let layer = RequestIdLayer::new();
        let echo = service_fn(|req: Request| async move {
            let id = req.ctx().request_id().unwrap_or_default();
            Ok::<_, Infallible>(Response::ok(id.to_string()))
        });

        let a = layer.layer(echo.clone());
        let b = layer.clone().layer(echo);

        let first = a.clone().oneshot(Request::new("GET", "/")).await.unwrap();
        let second = b.oneshot(Request::new("GET", "/")).await.unwrap();
        let third = a.oneshot(Request::new("GET", "/")).await.unwrap();

        assert_eq!(first.status(), "1");
        assert_eq!(second.status(), "2");
        assert_eq!(third.status(), "3");
        assert_eq!(layer.last_id(), 3);
    }
}
