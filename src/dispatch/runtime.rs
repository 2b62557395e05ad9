use crate::dispatch::{Dispatcher, Job};
use tokio::runtime::{Handle, TryCurrentError};

/// Runs jobs on the blocking pool of a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioDispatcher {
    handle: Handle,
}

impl TokioDispatcher {
    /// Dispatches onto the runtime behind `handle`.
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Dispatches onto the runtime the caller is running in.
    pub fn current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Dispatcher for TokioDispatcher {
    fn name(&self) -> &'static str {
        "tokio-blocking"
    }

    fn execute(&self, job: Job) -> Result<(), Job> {
        // A runtime that is shutting down drops the job, which surfaces as
        // a canceled unit on the caller's side.
        drop(self.handle.spawn_blocking(job));
        Ok(())
    }
}
