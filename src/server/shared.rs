use crate::{Connection, ConnectionId, FrameCodec, HandlerCtx, Mux, TaskSet};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
};
use tracing::{debug, error, instrument, trace};

/// The `ListenerTask` accepts new connections, and hands each to the
/// [`ConnectionManager`].
pub(crate) struct ListenerTask {
    pub(crate) listener: TcpListener,
    /// Admission limit. When set, a connection is only accepted once a
    /// permit is available, and holds it until it closes.
    pub(crate) limit: Option<Arc<Semaphore>>,
    /// Task set for the accept loop only.
    pub(crate) tasks: TaskSet,
    pub(crate) manager: ConnectionManager,
}

impl ListenerTask {
    async fn permit(&self) -> Option<OwnedSemaphorePermit> {
        let limit = self.limit.clone()?;
        // the semaphore is never closed
        limit.acquire_owned().await.ok()
    }

    /// Task future, which will be run by [`Self::spawn`].
    ///
    /// This future is a simple loop that accepts new connections, and uses
    /// the [`ConnectionManager`] to handle them. It ends only when the task
    /// set is cancelled, which drops the listener and closes the socket.
    #[instrument(
        name = "ListenerTask",
        skip(self),
        fields(local_addr = ?self.listener.local_addr().ok())
    )]
    pub(crate) async fn task_future(mut self) {
        loop {
            let permit = self.permit().await;

            let (stream, remote_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!(%err, "Failed to accept connection");
                    continue;
                }
            };

            self.manager
                .handle_new_connection(stream, remote_addr, permit);
        }
    }

    /// Spawn the future produced by [`Self::task_future`].
    pub(crate) fn spawn(self) -> JoinHandle<Option<()>> {
        let tasks = self.tasks.clone();
        let future = self.task_future();
        tasks.spawn(future)
    }
}

/// Decrements the active connection count when the connection task ends,
/// however it ends.
#[derive(Debug)]
struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        crate::metrics::record_connection_opened();
        Self { active }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        crate::metrics::record_connection_closed();
    }
}

/// The `ConnectionManager` provides connections with IDs, and handles spawning
/// the task serving each connection.
pub(crate) struct ConnectionManager {
    pub(crate) root_tasks: TaskSet,

    pub(crate) next_id: ConnectionId,

    pub(crate) mux: Arc<Mux>,

    pub(crate) codec: FrameCodec,

    pub(crate) active: Arc<AtomicUsize>,
}

impl ConnectionManager {
    /// Increment the connection ID counter and return an unused ID.
    fn next_id(&mut self) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Spawn the task serving a new connection. The task owns the socket, so
    /// the socket is closed when the task ends, whether it finished, was
    /// cancelled, or panicked.
    fn handle_new_connection(
        &mut self,
        stream: TcpStream,
        remote_addr: SocketAddr,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let conn_id = self.next_id();
        trace!(conn_id, %remote_addr, "accepted connection");

        if let Err(err) = stream.set_nodelay(true) {
            debug!(%err, conn_id, "failed to set TCP_NODELAY");
        }

        let conn = Connection::new(conn_id, stream, remote_addr, self.codec);
        let tasks = self.root_tasks.child();
        let ctx = HandlerCtx::new(tasks.clone(), conn_id, remote_addr);
        let guard = ActiveGuard::new(self.active.clone());
        let mux = self.mux.clone();

        let fut = {
            let tasks = tasks.clone();
            async move {
                let _guard = guard;
                let _permit = permit;
                mux.serve_connection(conn, ctx).await;
                // stop anything the handler left running on this connection
                tasks.cancel();
            }
        };
        tasks.spawn(fut);
    }
}
