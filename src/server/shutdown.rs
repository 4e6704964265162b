use crate::TaskSet;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio_util::{sync::WaitForCancellationFuture, task::task_tracker::TaskTrackerWaitFuture};

/// The shutdown signal for a running server. When dropped, will cancel all
/// tasks associated with the server. This includes the accept loop, every
/// connection task, and every task spawned through a [`HandlerCtx`], such as
/// the writer half of a chat session.
///
/// Two ways to stop are offered:
/// - [`Self::drain`] stops accepting and waits for in-flight connections to
///   finish on their own.
/// - [`Self::shutdown`] cancels everything, including sessions blocked on a
///   read from an idle client, and waits for the tasks to unwind.
///
/// The shutdown wraps a [`TaskTracker`] and a [`CancellationToken`], and
/// exposes methods from those APIs. Please see the documentation for those
/// types for more information.
///
/// [`TaskTracker`]: tokio_util::task::TaskTracker
/// [`CancellationToken`]: tokio_util::sync::CancellationToken
/// [`HandlerCtx`]: crate::HandlerCtx
#[derive(Debug)]
pub struct ServerShutdown {
    pub(crate) task_set: TaskSet,
    /// Child of `task_set` running only the accept loop.
    pub(crate) accept: TaskSet,
    pub(crate) local_addr: SocketAddr,
    pub(crate) active: Arc<AtomicUsize>,
}

impl ServerShutdown {
    /// Create a new [`ServerShutdown`] with the given [`TaskSet`].
    pub(crate) fn new(task_set: TaskSet, local_addr: SocketAddr) -> Self {
        Self {
            accept: task_set.child(),
            task_set,
            local_addr,
            active: Default::default(),
        }
    }

    /// The address the server is listening on.
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Wait for the tasks spawned by the server to complete. This is a wrapper
    /// for [`TaskTracker::wait`], and allows outside code to wait for the
    /// server to signal that it has completely shut down.
    ///
    /// This future will not resolve until both of the following are true:
    /// - [`Self::close`] has been called.
    /// - All tasks spawned by the server have finished running.
    ///
    /// [`TaskTracker::wait`]: tokio_util::task::TaskTracker::wait
    pub fn wait(&self) -> TaskTrackerWaitFuture<'_> {
        self.task_set.wait()
    }

    /// Close the intenal [`TaskTracker`], allowing [`Self::wait`] futures to
    /// resolve, provided all tasks are complete.
    ///
    /// This will not cancel running tasks, and will not prevent new tasks from
    /// being spawned.
    ///
    /// See [`TaskTracker::close`] for more information.
    ///
    /// [`TaskTracker`]: tokio_util::task::TaskTracker
    /// [`TaskTracker::close`]: tokio_util::task::TaskTracker::close
    pub fn close(&self) {
        self.task_set.close();
    }

    /// Check if the server's internal [`TaskTracker`] has been closed. This
    /// does not indicate that all tasks have completed, or that the server has
    /// been cancelled. See [`TaskTracker::is_closed`] for more information.
    ///
    /// [`TaskTracker`]: tokio_util::task::TaskTracker
    /// [`TaskTracker::is_closed`]: tokio_util::task::TaskTracker::is_closed
    pub fn is_closed(&self) -> bool {
        self.task_set.is_closed()
    }

    /// Stop the accept loop and close the listening socket. Connections
    /// already accepted keep running.
    pub fn stop_accepting(&self) {
        self.accept.cancel();
    }

    /// True until [`Self::stop_accepting`] or [`Self::cancel`] is called.
    pub fn is_accepting(&self) -> bool {
        !self.accept.is_cancelled()
    }

    /// Issue a cancellation signal to all tasks spawned by the server. Every
    /// connection task and every task spawned with [`HandlerCtx::spawn`] is
    /// dropped at its next await point.
    ///
    /// This will also cause new tasks spawned by the server to be immediately
    /// cancelled.
    ///
    /// [`HandlerCtx::spawn`]: crate::HandlerCtx::spawn
    pub fn cancel(&self) {
        self.task_set.cancel();
    }

    /// Check if the server has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.task_set.is_cancelled()
    }

    /// Get a future that resolves when the server has been cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.task_set.cancelled()
    }

    /// Stop accepting, then wait for every in-flight connection to finish.
    ///
    /// Live chat sessions only finish when their client disconnects. Use
    /// [`Self::shutdown`] to bound the wait.
    pub async fn drain(self) {
        self.stop_accepting();
        self.close();
        self.wait().await;
    }

    /// Shutdown the server, and wait for all tasks to complete.
    ///
    /// This is equivalent to calling [`Self::cancel`], [`Self::close`] and
    /// then awaiting [`Self::wait`].
    pub async fn shutdown(self) {
        self.task_set.shutdown().await;
    }
}

impl Drop for ServerShutdown {
    fn drop(&mut self) {
        self.task_set.cancel();
    }
}
