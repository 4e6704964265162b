use crate::{ConnectionId, TaskSet};
use std::{future::Future, net::SocketAddr};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::WaitForCancellationFuture;

/// Per-request context.
///
/// Carries what the server knows about the connection, values set by
/// middleware (the request id and deadline), and a task set tied to the
/// connection's lifetime. Tasks spawned on the context are cancelled when the
/// server shuts down, and the server waits for them before
/// [`ServerShutdown::shutdown`] resolves.
///
/// [`ServerShutdown::shutdown`]: crate::ServerShutdown::shutdown
#[derive(Debug, Clone, Default)]
pub struct HandlerCtx {
    conn_id: ConnectionId,
    remote_addr: Option<SocketAddr>,

    request_id: Option<u64>,
    deadline: Option<Instant>,

    /// A task set on which to spawn tasks. Child of the server's set.
    pub(crate) tasks: TaskSet,
}

impl HandlerCtx {
    /// Create a context for a connection.
    pub(crate) const fn new(
        tasks: TaskSet,
        conn_id: ConnectionId,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            conn_id,
            remote_addr: Some(remote_addr),
            request_id: None,
            deadline: None,
            tasks,
        }
    }

    /// The id of the connection the request arrived on.
    pub const fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// The peer address, if the request arrived over a socket.
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// The request id assigned by [`RequestIdLayer`], if installed.
    ///
    /// [`RequestIdLayer`]: crate::RequestIdLayer
    pub const fn request_id(&self) -> Option<u64> {
        self.request_id
    }

    /// Set the request id.
    pub fn set_request_id(&mut self, id: u64) {
        self.request_id = Some(id);
    }

    /// The instant by which the handler should have responded, if any.
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Set the deadline. An existing earlier deadline is kept.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
    }

    /// Resolves when the connection's tasks are cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.tasks.cancelled()
    }

    /// True if the connection's tasks have been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.tasks.is_cancelled()
    }

    /// Spawn a task on the connection's task set. The task is dropped at its
    /// next await point when the set is cancelled, in which case the handle
    /// resolves to `None`.
    pub fn spawn<F>(&self, f: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tasks.spawn(f)
    }
}
