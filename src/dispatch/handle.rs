use crate::error::{DispatchError, Error, Result};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::oneshot;

/// Shared cancellation flag of one dispatched work unit.
///
/// Setting the flag never interrupts engine calls. A unit that has not
/// started yet is skipped, and an internally-managed write that is still
/// running aborts instead of committing.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

enum Outcome<T> {
    Pending(oneshot::Receiver<Result<T>>),
    Ready(Option<Result<T>>),
}

/// The eventual outcome of a unit of work submitted to a [`Dispatcher`].
///
/// Await it from async code, or call [`Dispatched::wait`] from a plain
/// thread. Dropping the handle before the unit starts skips the unit.
///
/// [`Dispatcher`]: crate::Dispatcher
#[must_use = "dispatched work is skipped if its handle is dropped before it starts"]
pub struct Dispatched<T> {
    outcome: Outcome<T>,
    cancel: CancelToken,
}

impl<T> fmt::Debug for Dispatched<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.outcome {
            Outcome::Pending(_) => "pending",
            Outcome::Ready(Some(_)) => "ready",
            Outcome::Ready(None) => "taken",
        };
        f.debug_struct("Dispatched")
            .field("state", &state)
            .field("canceled", &self.cancel.is_canceled())
            .finish()
    }
}

impl<T> Dispatched<T> {
    pub(crate) const fn pending(rx: oneshot::Receiver<Result<T>>, cancel: CancelToken) -> Self {
        Self { outcome: Outcome::Pending(rx), cancel }
    }

    pub(crate) fn ready(result: Result<T>) -> Self {
        Self { outcome: Outcome::Ready(Some(result)), cancel: CancelToken::default() }
    }

    /// Returns the cancellation flag of this unit.
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Requests cancellation of this unit. See [`CancelToken`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Blocks the current thread until the unit completes.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context. Await
    /// the handle there instead.
    pub fn wait(self) -> Result<T> {
        match self.outcome {
            Outcome::Pending(rx) => rx.blocking_recv().unwrap_or_else(|_| Err(canceled())),
            Outcome::Ready(result) => result.unwrap_or_else(|| Err(canceled())),
        }
    }

    /// Waits for the unit for at most `duration`.
    ///
    /// On expiry the unit is canceled and [`Error::Timeout`] is returned. A
    /// commit the engine has already started is not interrupted; it runs to
    /// completion and its outcome is discarded.
    pub async fn timeout(mut self, duration: Duration) -> Result<T> {
        match tokio::time::timeout(duration, &mut self).await {
            Ok(result) => result,
            Err(_) => {
                self.cancel.cancel();
                tracing::debug!(target: "libmdbx", ?duration, "dispatched unit timed out");
                Err(Error::Timeout(duration))
            }
        }
    }
}

// The output value is only ever moved, never pinned.
impl<T> Unpin for Dispatched<T> {}

impl<T> Future for Dispatched<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.outcome {
            Outcome::Pending(rx) => {
                Pin::new(rx).poll(cx).map(|res| res.unwrap_or_else(|_| Err(canceled())))
            }
            Outcome::Ready(result) => Poll::Ready(result.take().unwrap_or_else(|| Err(canceled()))),
        }
    }
}

const fn canceled() -> Error {
    Error::Dispatch(DispatchError::Canceled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnvState;

    #[test]
    fn ready_handles_resolve_immediately() {
        assert_eq!(Dispatched::ready(Ok(7)).wait().unwrap(), 7);

        let err = Dispatched::<()>::ready(Err(EnvState::Closed.into())).wait().unwrap_err();
        assert!(matches!(err, Error::EnvironmentState(EnvState::Closed)));
    }

    #[test]
    fn dropped_sender_reports_cancellation() {
        let (tx, rx) = oneshot::channel::<Result<u8>>();
        drop(tx);
        let err = Dispatched::pending(rx, CancelToken::default()).wait().unwrap_err();
        assert!(matches!(err, Error::Dispatch(DispatchError::Canceled)));
    }

    #[tokio::test]
    async fn timeout_sets_the_cancel_flag() {
        let (_tx, rx) = oneshot::channel::<Result<u8>>();
        let handle = Dispatched::pending(rx, CancelToken::default());
        let token = handle.cancel_token().clone();

        let err = handle.timeout(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(token.is_canceled());
    }
}
