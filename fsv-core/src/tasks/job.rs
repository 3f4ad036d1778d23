//! ``src/tasks/job.rs``
//! ============================================================================
//! # Background Jobs: Cancellable Blocking Work with a Synchronous Join
//!
//! Indexing and decoding are blocking, CPU/IO bound loops. They run on the
//! tokio blocking pool and poll a [`CancellationToken`] between units of work.
//! The owner (the UI thread) must be able to wait, without an async context,
//! until such a job has *returned*: the job may still hold references into
//! buffers the owner is about to release.
//!
//! Completion is signalled by disconnection: the worker owns the only sender
//! of a zero-capacity crossbeam channel and drops it when the closure returns
//! or unwinds. `join()` blocks on the receiver until that happens.

use compact_str::CompactString;
use crossbeam::channel::{self, Receiver, TryRecvError};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Owner side of a job started with [`spawn_job`].
///
/// Dropping the handle cancels and joins the job.
#[derive(Debug)]
pub struct JobHandle {
    name: CompactString,
    token: CancellationToken,
    done: Receiver<()>,
    joined: bool,
}

/// Runs `work` on the runtime's blocking pool.
///
/// `work` receives the job's cancellation token; it should check
/// `is_cancelled()` between units of work and return promptly once set.
pub fn spawn_job<F>(runtime: &Handle, name: &str, work: F) -> JobHandle
where
    F: FnOnce(CancellationToken) + Send + 'static,
{
    let token = CancellationToken::new();
    let (done_tx, done_rx) = channel::bounded::<()>(0);

    let worker_token = token.clone();
    let worker_name = CompactString::new(name);

    // the JoinHandle is not needed: completion is observed through `done`
    drop(runtime.spawn_blocking(move || {
        let _done = done_tx;
        trace!(job = %worker_name, "job started");
        work(worker_token);
        trace!(job = %worker_name, "job returned");
    }));

    JobHandle {
        name: CompactString::new(name),
        token,
        done: done_rx,
        joined: false,
    }
}

impl JobHandle {
    /// Requests cooperative cancellation. Does not wait.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the worker closure has returned (or unwound).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.joined || matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Blocks until the worker closure has returned. Idempotent.
    pub fn join(&mut self) {
        if self.joined {
            return;
        }

        // nothing is ever sent: recv only returns on disconnect
        let _ = self.done.recv();
        self.joined = true;
        debug!(job = %self.name, "job joined");
    }

    /// Cancel, then wait for the worker to acknowledge by returning.
    pub fn cancel_and_join(&mut self) {
        self.cancel();
        self.join();
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.cancel_and_join();
    }
}
