//! tcpchat: a chat transport speaking JSON frames over raw TCP.
//!
//! Clients open a TCP connection and send one JSON request frame. The
//! [`Mux`] routes it by method and url pattern to a [`Handler`], and the
//! handler's [`Response`] is written back as one JSON frame. A request with
//! the streaming protocol may instead be upgraded into a long lived duplex
//! session, which is how the chat application relays events between clients
//! through an [`EventBus`].
//!
//! ## Basic usage
//!
//! ```no_run
//! use tcpchat::{Connect, Mux, Request, Response, TimeoutLayer};
//! use std::{net::SocketAddr, time::Duration};
//!
//! # async fn _main() -> std::io::Result<()> {
//! let mux = Mux::new()
//!     .layer(TimeoutLayer::new(Duration::from_secs(5)))
//!     .route("GET", "/hello/{name}", |req: Request| async move {
//!         Response::ok("OK").with_body(format!("hello {}", req.param("name")))
//!     });
//!
//! // The server stops when the shutdown handle is dropped.
//! let shutdown = SocketAddr::from(([127, 0, 0, 1], 8080)).serve(mux).await?;
//! tokio::signal::ctrl_c().await?;
//! shutdown.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Wire format
//!
//! Frames are JSON objects, optionally separated by whitespace. Requests
//! look like
//!
//! ```json
//! {"method": "GET", "url": "/hello/ann", "proto": "http", "header": {}, "body": ""}
//! ```
//!
//! and responses like
//!
//! ```json
//! {"status": "OK", "status_code": 200, "header": {"Content-Length": 9}, "body": "hello ann"}
//! ```
//!
//! See the [`chat`] module for the application routes and the event
//! envelope used once a chat session is upgraded.

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
pub(crate) mod macros;

mod bus;
pub use bus::{EventBus, SlotId, Subscription};

pub mod chat;
pub use chat::ChatState;

mod codec;
pub use codec::{FrameCodec, FrameError, DEFAULT_MAX_FRAME_LEN};

mod config;
pub use config::{Cli, Config, ConfigError, Env, ServerConfig};

mod conn;
pub use conn::{Connection, ConnectionId, FrameReader, FrameWriter};

mod event;
pub use event::{
    Event, EventError, EventKind, EventPayload, MessageKind, NewMessage, PublicEvent,
    NEW_MESSAGE_EVENT,
};

pub mod logging;

mod metrics;

mod middleware;
pub use middleware::{
    RequestId, RequestIdLayer, Timeout, TimeoutLayer, Trace, TraceLayer, DEADLINE_EXCEEDED,
};

mod router;
pub use router::{Mux, Pattern, RegistrationError, Segment};

mod routes;
pub use routes::{Handler, HandlerCtx, OutputResponse, OutputResult, Route, RouteFuture};

mod server;
pub use server::{Connect, ServerShutdown};

mod store;
pub use store::{
    AuthService, Credentials, MemoryStore, Message, MessageStore, PublicUser, StoreError, Token,
    UserStore, DEFAULT_TOKEN_TTL,
};

mod tasks;
pub(crate) use tasks::TaskSet;

mod types;
pub use types::{OnUpgrade, Proto, Request, RequestError, Response};

/// Re-export of the `tower` crate, primarily to provide [`tower::Service`],
/// [`tower::Layer`] and [`tower::service_fn`].
pub use tower;

/// Re-export of the `http` crate, for [`http::StatusCode`].
pub use http;
