//! Middleware for the [`Mux`].
//!
//! Each middleware is a [`tower::Layer`] over [`Route`]s, added with
//! [`Mux::layer`]. All of them always call the wrapped route, except
//! [`TimeoutLayer`], which replaces the response when the route misses its
//! deadline.
//!
//! [`Mux`]: crate::Mux
//! [`Mux::layer`]: crate::Mux::layer
//! [`Route`]: crate::Route

mod request_id;
pub use request_id::{RequestId, RequestIdLayer};

mod timeout;
pub use timeout::{Timeout, TimeoutLayer, DEADLINE_EXCEEDED};

mod trace;
pub use trace::{Trace, TraceLayer};
