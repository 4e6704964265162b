use crate::{Request, Response};
use futures_util::future::BoxFuture;
use http::StatusCode;
use std::{
    convert::Infallible,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::debug;

/// Status message of the response produced on timeout.
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// Bounds request/response calls by a deadline.
///
/// The deadline is recorded on the [`HandlerCtx`] before the inner route is
/// called. If the route has not produced a response by then, it is dropped
/// and a `502 deadline exceeded` response is returned instead.
///
/// Streaming calls pass through untouched, since a session is expected to
/// outlive any single-call timeout.
///
/// [`HandlerCtx`]: crate::HandlerCtx
#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    timeout: Duration,
}

impl TimeoutLayer {
    /// Create a layer with the given timeout.
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = Timeout<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Timeout {
            inner,
            timeout: self.timeout,
        }
    }
}

/// Service produced by [`TimeoutLayer`].
#[derive(Debug, Clone)]
pub struct Timeout<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Service<Request> for Timeout<S>
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

    fn call(&mut self, mut req: Request) -> Self::Future {
        if req.proto().is_streaming() {
            return Box::pin(self.inner.call(req));
        }

        req.ctx_mut().set_deadline(Instant::now() + self.timeout);
        let deadline = req.ctx().deadline().unwrap_or_else(Instant::now);
        let request_id = req.ctx().request_id();
        let fut = self.inner.call(req);

        Box::pin(async move {
            match tokio::time::timeout_at(deadline, fut).await {
                Ok(res) => res,
                Err(_) => {
                    debug!(?request_id, "handler missed its deadline");
                    Ok(Response::with_status(
                        StatusCode::BAD_GATEWAY,
                        DEADLINE_EXCEEDED,
                    ))
                }
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Proto;
    use tower::{service_fn, ServiceExt};

    /// Echoes whether a deadline was set, after sleeping for `delay`.
    fn slow(delay: Duration) -> impl Service<Request, Response = Response, Error = Infallible> {
        let svc = service_fn(move |req: Request| async move {
            let has_deadline = req.ctx().deadline().is_some();
            tokio::time::sleep(delay).await;
            Ok::<_, Infallible>(Response::ok("done").with_body(has_deadline.to_string()))
        });
        TimeoutLayer::new(Duration::from_millis(20)).layer(svc)
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let resp = slow(Duration::from_millis(500))
            .oneshot(Request::new("GET", "/"))
            .await
            .unwrap();
        assert_eq!(resp.status_code(), 502);
        assert_eq!(resp.status(), DEADLINE_EXCEEDED);
    }

    #[tokio::test]
    async fn fast_call_completes() {
        let resp = slow(Duration::ZERO)
            .oneshot(Request::new("GET", "/"))
            .await
            .unwrap();
        assert_eq!(resp.status(), "done");
        assert_eq!(resp.body(), "true");
    }

    #[tokio::test]
    async fn streaming_call_is_not_bounded() {
        let resp = slow(Duration::from_millis(100))
            .oneshot(Request::new("GET", "/").with_proto(Proto::Streaming))
            .await
            .unwrap();
        assert_eq!(resp.status(), "done");
        assert_eq!(resp.body(), "false");
    }
}
