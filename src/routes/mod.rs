mod ctx;
pub use ctx::HandlerCtx;

mod future;
pub use future::RouteFuture;

mod handler;
pub(crate) use handler::HandlerService;
pub use handler::{Handler, OutputResponse, OutputResult};

use crate::{Request, Response};
use std::{
    convert::Infallible,
    task::{Context, Poll},
};
use tower::{util::BoxCloneSyncService, Service, ServiceExt};
use tracing::debug_span;

/// A handler for a specific method and pattern, with its middleware applied.
///
/// A route is a [`BoxCloneSyncService`] from [`Request`] to [`Response`].
/// Routes are infallible. Any failure during handling should be expressed as
/// an error status on the response.
#[derive(Debug)]
pub struct Route(BoxCloneSyncService<Request, Response, Infallible>);

impl Route {
    /// Create a new route from a service.
    pub fn new<S>(inner: S) -> Self
    where
        S: Service<Request, Response = Response, Error = Infallible>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Self(BoxCloneSyncService::new(inner))
    }

    /// Create a route from a [`Handler`].
    pub(crate) fn from_handler<H, T>(handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        Self::new(HandlerService::new(handler))
    }

    /// Create a one-shot future for the given request.
    pub(crate) fn oneshot_inner(&self, req: Request) -> RouteFuture {
        RouteFuture::new(self.0.clone().oneshot(req))
    }
}

impl Clone for Route {
    #[track_caller]
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl From<BoxCloneSyncService<Request, Response, Infallible>> for Route {
    fn from(inner: BoxCloneSyncService<Request, Response, Infallible>) -> Self {
        Self(inner)
    }
}

impl Service<Request> for Route {
    type Response = Response;

    type Error = Infallible;

    type Future = RouteFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let span = debug_span!(
            "Route::call",
            method = req.method(),
            url = req.url(),
            conn_id = req.ctx().conn_id(),
        );
        self.oneshot_inner(req).with_span(span)
    }
}

// Some code is this file is reproduced under the terms of the MIT license. It
// originates from the `axum` crate. The original source code can be found at
// the following URL, and the original license is included below.
//
// https://github.com/tokio-rs/axum/
//
// The MIT License (MIT)
//
// Copyright (c) 2019 Axum Contributors
//
// Permission is hereby granted, free of charge, to any
// person obtaining a copy of this software and associated
// documentation files (the "Software"), to deal in the
// Software without restriction, including without
// limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software
// is furnished to do so, subject to the following
// conditions:
//
// The above copyright notice and this permission notice
// shall be included in all copies or substantial portions
// of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF
// ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED
// TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A
// PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
// SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY
// CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR
// IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.
