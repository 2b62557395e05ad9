//! Scheduling boundary between callers and the engine.
//!
//! Engine calls block on disk I/O, on reader slots and on the writer lock.
//! Every transaction-bearing operation of [`Environment`] is therefore packed
//! into a [`Job`] and handed to a [`Dispatcher`], and the caller receives a
//! [`Dispatched`] handle for the outcome.
//!
//! - [`IoPool`] is the default: an elastic pool of named OS threads sized
//!   for blocking work.
//! - [`TokioDispatcher`] runs jobs on a tokio runtime's blocking pool.
//!
//! Any other executor can be plugged in by implementing [`Dispatcher`].
//!
//! [`Environment`]: crate::Environment

use crate::error::{DispatchError, Result};
use std::fmt;

mod handle;
pub use handle::{CancelToken, Dispatched};

mod pool;
pub use pool::{IoPool, IoPoolBuilder};

mod runtime;
pub use runtime::TokioDispatcher;

/// A unit of work submitted to a [`Dispatcher`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// An executor for [`Job`]s.
///
/// Implementations must run each accepted job exactly once, on a thread that
/// is allowed to block. Jobs may run concurrently and in any order.
pub trait Dispatcher: fmt::Debug + Send + Sync + 'static {
    /// A short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Accepts `job` for execution, or hands it back if the dispatcher no
    /// longer takes work.
    fn execute(&self, job: Job) -> std::result::Result<(), Job>;
}

/// Submits `f` to `dispatcher` and returns a handle to its outcome.
///
/// The job carries the submitting span. It is skipped without running `f`
/// if the handle was canceled or dropped before a worker picked it up.
pub(crate) fn submit<T, F>(dispatcher: &dyn Dispatcher, f: F) -> Dispatched<T>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken) -> Result<T> + Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();
    let cancel = CancelToken::default();
    let token = cancel.clone();
    let span = tracing::Span::current();

    let job: Job = Box::new(move || {
        let _guard = span.enter();
        if token.is_canceled() || tx.is_closed() {
            tracing::debug!(target: "libmdbx", "skipping canceled work unit");
            return;
        }
        let _ = tx.send(f(&token));
    });

    match dispatcher.execute(job) {
        Ok(()) => Dispatched::pending(rx, cancel),
        Err(_job) => {
            tracing::warn!(target: "libmdbx", dispatcher = dispatcher.name(), "work unit rejected");
            Dispatched::ready(Err(DispatchError::Rejected(dispatcher.name()).into()))
        }
    }
}
