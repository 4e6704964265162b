use crate::{
    server::{
        shared::{ConnectionManager, ListenerTask},
        ServerShutdown,
    },
    FrameCodec, Mux, ServerConfig, TaskSet,
};
use std::{future::Future, io, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, runtime::Handle, sync::Semaphore};

/// Configuration objects for starting a server.
///
/// This object is intended to capture all connection-related configuration
/// and setup, and output only the bound [`TcpListener`]. Implemented for
/// [`SocketAddr`], for an already bound [`TcpListener`], and for
/// [`ServerConfig`], which also carries the admission limit and frame size
/// limit.
pub trait Connect: Send + Sync + Sized {
    /// The error type for binding the listener.
    type Error: core::error::Error + From<io::Error> + Send + 'static;

    /// Create the listener.
    fn make_listener(self) -> impl Future<Output = Result<TcpListener, Self::Error>> + Send;

    /// Maximum number of connections served at once. `None` is unbounded.
    fn max_connections(&self) -> Option<usize> {
        None
    }

    /// Codec used to frame each accepted connection.
    fn frame_codec(&self) -> FrameCodec {
        FrameCodec::default()
    }

    /// Instantiate and run a task to accept connections, returning a shutdown
    /// signal.
    ///
    /// We do not recommend overriding this method. Doing so will opt out of
    /// the library's task system. Users overriding this method must manually
    /// handle connection tasks.
    fn serve_on_handle(
        self,
        mux: Mux,
        handle: Handle,
    ) -> impl Future<Output = Result<ServerShutdown, Self::Error>> + Send {
        async move {
            let root_tasks: TaskSet = handle.into();
            let limit = self.max_connections().map(|n| Arc::new(Semaphore::new(n)));
            let codec = self.frame_codec();

            let listener = self.make_listener().await?;
            let shutdown = ServerShutdown::new(root_tasks.clone(), listener.local_addr()?);
            tracing::info!(local_addr = %shutdown.local_addr(), routes = mux.len(), "listening");

            ListenerTask {
                listener,
                limit,
                tasks: shutdown.accept.clone(),
                manager: ConnectionManager {
                    root_tasks,
                    next_id: 0,
                    mux: Arc::new(mux),
                    codec,
                    active: shutdown.active.clone(),
                },
            }
            .spawn();
            Ok(shutdown)
        }
    }

    /// Instantiate and run a task to accept connections, returning a shutdown
    /// signal.
    ///
    /// We do not recommend overriding this method. Doing so will opt out of
    /// the library's task system. Users overriding this method must manually
    /// handle connection tasks.
    fn serve(self, mux: Mux) -> impl Future<Output = Result<ServerShutdown, Self::Error>> + Send {
        self.serve_on_handle(mux, Handle::current())
    }
}

impl Connect for SocketAddr {
    type Error = io::Error;

    async fn make_listener(self) -> Result<TcpListener, Self::Error> {
        TcpListener::bind(self).await
    }
}

impl Connect for TcpListener {
    type Error = io::Error;

    async fn make_listener(self) -> Result<TcpListener, Self::Error> {
        Ok(self)
    }
}

impl Connect for ServerConfig {
    type Error = io::Error;

    async fn make_listener(self) -> Result<TcpListener, Self::Error> {
        TcpListener::bind(self.addr).await
    }

    fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }

    fn frame_codec(&self) -> FrameCodec {
        FrameCodec::new(self.max_frame_len)
    }
}
