use crate::{
    error::{MdbxError, MdbxResult, mdbx_result},
    sys::EnvPtr,
};
use std::{
    io, ptr,
    sync::mpsc::{Receiver, SyncSender, sync_channel},
};

/// Name of the thread that owns the engine's writer lock.
pub(crate) const LIFECYCLE_THREAD_NAME: &str = "mdbx-txn-lifecycle";

#[derive(Copy, Clone, Debug)]
pub(crate) struct RawTxPtr(pub(crate) *mut ffi::MDBX_txn);

// SAFETY: the engine is opened with `MDBX_NOTLS` and owner checks disabled,
// so a transaction pointer may be used from any thread.
unsafe impl Send for RawTxPtr {}
unsafe impl Sync for RawTxPtr {}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CommitLatencyPtr(pub(crate) *mut ffi::MDBX_commit_latency);

unsafe impl Send for CommitLatencyPtr {}
unsafe impl Sync for CommitLatencyPtr {}

/// Begin a write transaction.
pub(crate) struct Begin {
    pub(crate) sender: SyncSender<MdbxResult<RawTxPtr>>,
    pub(crate) span: tracing::Span,
}

/// Abort a write transaction.
pub(crate) struct Abort {
    pub(crate) tx: RawTxPtr,
    pub(crate) sender: SyncSender<MdbxResult<bool>>,
    pub(crate) span: tracing::Span,
}

/// Commit a write transaction.
pub(crate) struct Commit {
    pub(crate) tx: RawTxPtr,
    pub(crate) latency: CommitLatencyPtr,
    pub(crate) sender: SyncSender<MdbxResult<bool>>,
    pub(crate) span: tracing::Span,
}

/// Messages sent to the [`LifecycleHandle`].
pub(crate) enum LifecycleEvent {
    Begin(Begin),
    Abort(Abort),
    Commit(Commit),
}

impl From<Begin> for LifecycleEvent {
    fn from(begin: Begin) -> Self {
        Self::Begin(begin)
    }
}

impl From<Abort> for LifecycleEvent {
    fn from(abort: Abort) -> Self {
        Self::Abort(abort)
    }
}

impl From<Commit> for LifecycleEvent {
    fn from(commit: Commit) -> Self {
        Self::Commit(commit)
    }
}

/// Handle to the write-transaction lifecycle thread of one environment.
///
/// Cloned into every open write transaction. The thread exits once the
/// environment and all of its write transactions have dropped their handles.
#[derive(Debug, Clone)]
pub(crate) struct LifecycleHandle {
    sender: SyncSender<LifecycleEvent>,
}

impl LifecycleHandle {
    /// Sends a request to the lifecycle thread and waits for its reply.
    ///
    /// Fails with [`MdbxError::Panic`] if the thread is gone, which only
    /// happens if it panicked.
    fn request<T>(
        &self,
        build: impl FnOnce(SyncSender<MdbxResult<T>>) -> LifecycleEvent,
    ) -> MdbxResult<T> {
        let (tx, rx) = sync_channel(0);
        self.sender.send(build(tx)).map_err(|_| MdbxError::Panic)?;
        rx.recv().map_err(|_| MdbxError::Panic)?
    }

    /// Begins a write transaction on the lifecycle thread.
    pub(crate) fn begin(&self, span: tracing::Span) -> MdbxResult<RawTxPtr> {
        self.request(|sender| Begin { sender, span }.into())
    }

    /// Commits a write transaction on the lifecycle thread.
    pub(crate) fn commit(
        &self,
        tx: RawTxPtr,
        latency: CommitLatencyPtr,
        span: tracing::Span,
    ) -> MdbxResult<bool> {
        self.request(|sender| Commit { tx, latency, sender, span }.into())
    }

    /// Aborts a write transaction on the lifecycle thread.
    pub(crate) fn abort(&self, tx: RawTxPtr, span: tracing::Span) -> MdbxResult<bool> {
        self.request(|sender| Abort { tx, sender, span }.into())
    }
}

impl From<SyncSender<LifecycleEvent>> for LifecycleHandle {
    fn from(sender: SyncSender<LifecycleEvent>) -> Self {
        Self { sender }
    }
}

/// Runs write-transaction begin, commit and abort on one dedicated thread.
///
/// The engine's writer lock is a process-shared mutex that must be released
/// by the thread that acquired it. Everything between begin and commit may
/// run on any thread.
#[derive(Debug)]
pub(crate) struct RwLifecycle {
    env: EnvPtr,
    rx: Receiver<LifecycleEvent>,
}

impl RwLifecycle {
    /// Spawns the lifecycle thread for `env` and returns a handle to it.
    pub(crate) fn spawn(env: EnvPtr) -> io::Result<LifecycleHandle> {
        let (tx, rx) = sync_channel(0);
        Self { env, rx }.start_message_listener()?;
        Ok(tx.into())
    }

    fn handle_begin(&self, Begin { sender, span }: Begin) {
        let _guard = span.entered();
        let mut txn: *mut ffi::MDBX_txn = ptr::null_mut();
        let res = mdbx_result(unsafe {
            ffi::mdbx_txn_begin_ex(
                self.env.0,
                ptr::null_mut(),
                ffi::MDBX_TXN_READWRITE,
                &mut txn,
                ptr::null_mut(),
            )
        })
        .map(|_| RawTxPtr(txn));
        // The requester only goes away if its thread panicked; the engine
        // then still owns the writer lock and nothing can be done about it.
        let _ = sender.send(res);
    }

    fn handle_abort(&self, Abort { tx, sender, span }: Abort) {
        let _guard = span.entered();
        let _ = sender.send(mdbx_result(unsafe { ffi::mdbx_txn_abort(tx.0) }));
    }

    fn handle_commit(&self, Commit { tx, sender, latency, span }: Commit) {
        let _guard = span.entered();
        let _ = sender.send(mdbx_result(unsafe { ffi::mdbx_txn_commit_ex(tx.0, latency.0) }));
    }

    /// Spawns a named [`std::thread`] that serves [`LifecycleEvent`]s until
    /// every [`LifecycleHandle`] is dropped.
    fn start_message_listener(self) -> io::Result<()> {
        let task = move || {
            tracing::trace!(target: "libmdbx", "lifecycle thread started");
            while let Ok(msg) = self.rx.recv() {
                match msg {
                    LifecycleEvent::Begin(begin) => self.handle_begin(begin),
                    LifecycleEvent::Abort(abort) => self.handle_abort(abort),
                    LifecycleEvent::Commit(commit) => self.handle_commit(commit),
                }
            }
            tracing::trace!(target: "libmdbx", "lifecycle thread stopped");
        };
        std::thread::Builder::new().name(LIFECYCLE_THREAD_NAME.to_string()).spawn(task)?;
        Ok(())
    }
}
