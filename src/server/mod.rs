//! Serving a [`Mux`] over TCP.
//!
//! Typically users want to use a [`Connect`] implementor to create a server
//! using [`Connect::serve`]. This binds a listener and spawns the accept loop,
//! returning a [`ServerShutdown`] that controls the server's lifetime.
//!
//! ```no_run
//! # use tcpchat::{Connect, Mux};
//! # async fn _main(mux: Mux) -> std::io::Result<()> {
//! let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 8080));
//! // The shutdown object will stop the server when dropped.
//! let shutdown = addr.serve(mux).await?;
//! tokio::signal::ctrl_c().await?;
//! shutdown.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Internal Structure
//!
//! - `ListenerTask` accepts connections, waiting for an admission permit
//!   first if a connection limit is configured. A listener accept error is
//!   logged and the loop continues. The loop ends only when its task set is
//!   cancelled, which closes the listening socket.
//! - One connection task per accepted socket, spawned immediately. It gives
//!   the connection to [`Mux::serve_connection`], and the socket is closed
//!   when it returns. Streaming handlers spawn a second task on the same
//!   connection's task set.
//!
//! All tasks are tracked by one task set, which [`ServerShutdown`] waits on.
//!
//! [`Mux`]: crate::Mux
//! [`Mux::serve_connection`]: crate::Mux::serve_connection

mod shared;

mod shutdown;
pub use shutdown::ServerShutdown;

mod r#trait;
pub use r#trait::Connect;
