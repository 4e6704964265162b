//! The chat application.
//!
//! [`mux`] builds the router serving the account, member, history and
//! chatting routes. Everything after the chatting handshake is handled by
//! the session in [`session`], which relays events between its socket and
//! the [`EventBus`].

mod api;
pub use api::{NO_MORE_MESSAGES, PROTO_NOT_SUPPORTED, READY_FOR_MESSAGES, TOKEN_EXPIRED};

mod session;

use crate::{
    AuthService, EventBus, MessageStore, Mux, Request, RequestIdLayer, TimeoutLayer, TraceLayer,
    UserStore,
};
use std::time::Duration;

/// Capacity of a session's event channel unless configured otherwise.
pub const DEFAULT_CHAT_BUFFER: usize = 5;

/// Create an account.
pub const SIGN_UP: &str = "/api/v1/signup";
/// Sign in with login and password.
pub const SIGN_IN: &str = "/api/v1/signin";
/// Sign in with a previously issued token.
pub const SIGN_IN_TOKEN: &str = "/api/v1/signin/token";
/// Message history.
pub const MESSAGES: &str = "/api/v1/messages";
/// Public lookup of one chat member.
pub const MEMBER: &str = "/api/v1/member/{id}";
/// Every chat member.
pub const MEMBERS: &str = "/api/v1/member";
/// The streaming chat session.
pub const CHATTING: &str = "/api/v1/chatting";

/// State shared by the chat routes.
#[derive(Debug, Clone)]
pub struct ChatState<S> {
    store: S,
    bus: EventBus,
    buffer: usize,
}

impl<S> ChatState<S> {
    /// Create state over a store and bus.
    pub const fn new(store: S, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            buffer: DEFAULT_CHAT_BUFFER,
        }
    }

    /// Set the capacity of each session's event channel.
    pub const fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    /// The store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The bus sessions subscribe to.
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }
}

/// Build the chat router.
///
/// Every route runs with a request id, a completion log line and, for
/// request/response calls, `timeout` as its deadline.
pub fn mux<S>(state: ChatState<S>, timeout: Duration) -> Mux
where
    S: AuthService + UserStore + MessageStore + Clone,
{
    let mux = Mux::new()
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new())
        .layer(RequestIdLayer::new());

    let s = state.clone();
    let mux = mux.route("POST", SIGN_UP, move |req: Request| api::sign_up(s, req));
    let s = state.clone();
    let mux = mux.route("POST", SIGN_IN, move |req: Request| api::sign_in(s, req));
    let s = state.clone();
    let mux = mux.route("POST", SIGN_IN_TOKEN, move |req: Request| {
        api::sign_in_token(s, req)
    });
    let s = state.clone();
    let mux = mux.route("GET", MESSAGES, move |req: Request| api::messages(s, req));
    let s = state.clone();
    let mux = mux.route("GET", MEMBER, move |req: Request| api::member(s, req));
    let s = state.clone();
    let mux = mux.route("GET", MEMBERS, move || api::members(s));
    mux.route("GET", CHATTING, move |req: Request| api::chatting(state, req))
}
