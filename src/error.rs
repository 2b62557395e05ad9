use std::{ffi::c_int, io, path::PathBuf, time::Duration};

use crate::tx::TxState;

/// An MDBX result.
pub type MdbxResult<T> = std::result::Result<T, MdbxError>;

/// A result of an environment or transaction operation.
pub type Result<T> = std::result::Result<T, Error>;

/// An error code returned by the MDBX engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MdbxError {
    /// Key/data pair already exists.
    #[error("key/data pair already exists")]
    KeyExist,
    /// No matching key/data pair found.
    #[error("no matching key/data pair found")]
    NotFound,
    /// The cursor is already at the end of data.
    #[error("the cursor is already at the end of data")]
    NoData,
    /// Requested page not found.
    #[error("requested page not found")]
    PageNotFound,
    /// Database is corrupted.
    #[error("database is corrupted")]
    Corrupted,
    /// Fatal environment error.
    #[error("fatal environment error")]
    Panic,
    /// DB version mismatch.
    #[error("DB version mismatch")]
    VersionMismatch,
    /// File is not an MDBX file.
    #[error("file is not an MDBX file")]
    Invalid,
    /// Environment map size limit reached.
    #[error("environment map size limit reached")]
    MapFull,
    /// Too many named databases (`max_dbs` reached).
    #[error("too many DBI-handles (maxdbs reached)")]
    DbsFull,
    /// Too many readers (`max_readers` reached).
    #[error("too many readers (maxreaders reached)")]
    ReadersFull,
    /// Transaction has too many dirty pages.
    #[error("transaction has too many dirty pages (i.e., the transaction is too big)")]
    TxnFull,
    /// Cursor stack limit reached.
    #[error("cursor stack limit reached")]
    CursorFull,
    /// Page has no more space.
    #[error("page has no more space")]
    PageFull,
    /// The mapping could not be extended.
    #[error("database engine was unable to extend mapping")]
    UnableExtendMapSize,
    /// Environment or database is not compatible with the requested operation
    /// or flags.
    #[error("environment or database is not compatible with the requested operation or flags")]
    Incompatible,
    /// Invalid reuse of reader locktable slot.
    #[error("invalid reuse of reader locktable slot")]
    BadRslot,
    /// Transaction is not valid for requested operation.
    #[error("transaction is not valid for requested operation")]
    BadTxn,
    /// Invalid size or alignment of key or data.
    #[error("invalid size or alignment of key or data for the target database")]
    BadValSize,
    /// The specified DBI-handle is invalid.
    #[error("the specified DBI-handle is invalid")]
    BadDbi,
    /// Unexpected internal error.
    #[error("unexpected internal error")]
    Problem,
    /// Another write transaction is running.
    #[error("another write transaction is running")]
    Busy,
    /// The specified key has more than one associated value.
    #[error("the specified key has more than one associated value")]
    Multival,
    /// Wrong signature of a runtime object.
    #[error("wrong signature of a runtime object(s)")]
    BadSignature,
    /// Database should be recovered, but this could only be done for a
    /// writable environment.
    #[error("database should be recovered, but cannot be done in read-only mode")]
    WannaRecovery,
    /// The given key value is mismatched to the current cursor position.
    #[error("the given key value is mismatched to the current cursor position")]
    KeyMismatch,
    /// Database is too large for the current system.
    #[error("database is too large for the current system")]
    TooLarge,
    /// A thread attempted to use a transaction it does not own.
    #[error("a thread attempted to use a transaction it does not own")]
    ThreadMismatch,
    /// Overlapping read and write transactions on the current thread.
    #[error("overlapping read and write transactions for the current thread")]
    TxnOverlapping,
    /// Access denied, e.g. a write to a read-only environment.
    #[error("access denied")]
    Access,
    /// Invalid argument.
    #[error("invalid argument")]
    InvalidArgument,
    /// Read-only file system.
    #[error("read-only file system")]
    ReadOnlyFs,
    /// No such file or directory.
    #[error("no such file or directory")]
    NoFile,
    /// Input/output error.
    #[error("input/output error")]
    Io,
    /// The engine aborted the transaction due to prior errors instead of
    /// committing it.
    #[error("transaction was aborted due to prior errors")]
    BotchedTransaction,
    /// Unknown error code.
    #[error("unknown error code: {0}")]
    Other(i32),
}

impl MdbxError {
    /// Converts a raw error code to an [`MdbxError`].
    pub const fn from_err_code(err_code: c_int) -> Self {
        match err_code {
            ffi::MDBX_KEYEXIST => Self::KeyExist,
            ffi::MDBX_NOTFOUND => Self::NotFound,
            ffi::MDBX_ENODATA => Self::NoData,
            ffi::MDBX_PAGE_NOTFOUND => Self::PageNotFound,
            ffi::MDBX_CORRUPTED => Self::Corrupted,
            ffi::MDBX_PANIC => Self::Panic,
            ffi::MDBX_VERSION_MISMATCH => Self::VersionMismatch,
            ffi::MDBX_INVALID => Self::Invalid,
            ffi::MDBX_MAP_FULL => Self::MapFull,
            ffi::MDBX_DBS_FULL => Self::DbsFull,
            ffi::MDBX_READERS_FULL => Self::ReadersFull,
            ffi::MDBX_TXN_FULL => Self::TxnFull,
            ffi::MDBX_CURSOR_FULL => Self::CursorFull,
            ffi::MDBX_PAGE_FULL => Self::PageFull,
            ffi::MDBX_UNABLE_EXTEND_MAPSIZE => Self::UnableExtendMapSize,
            ffi::MDBX_INCOMPATIBLE => Self::Incompatible,
            ffi::MDBX_BAD_RSLOT => Self::BadRslot,
            ffi::MDBX_BAD_TXN => Self::BadTxn,
            ffi::MDBX_BAD_VALSIZE => Self::BadValSize,
            ffi::MDBX_BAD_DBI => Self::BadDbi,
            ffi::MDBX_PROBLEM => Self::Problem,
            ffi::MDBX_BUSY => Self::Busy,
            ffi::MDBX_EMULTIVAL => Self::Multival,
            ffi::MDBX_EBADSIGN => Self::BadSignature,
            ffi::MDBX_WANNA_RECOVERY => Self::WannaRecovery,
            ffi::MDBX_EKEYMISMATCH => Self::KeyMismatch,
            ffi::MDBX_TOO_LARGE => Self::TooLarge,
            ffi::MDBX_THREAD_MISMATCH => Self::ThreadMismatch,
            ffi::MDBX_TXN_OVERLAPPING => Self::TxnOverlapping,
            ffi::MDBX_EACCESS => Self::Access,
            ffi::MDBX_EINVAL => Self::InvalidArgument,
            ffi::MDBX_EROFS => Self::ReadOnlyFs,
            ffi::MDBX_ENOFILE => Self::NoFile,
            ffi::MDBX_EIO => Self::Io,
            other => Self::Other(other),
        }
    }

    /// Converts an [`MdbxError`] to the raw error code.
    pub const fn to_err_code(&self) -> i32 {
        match self {
            Self::KeyExist => ffi::MDBX_KEYEXIST,
            Self::NotFound => ffi::MDBX_NOTFOUND,
            Self::NoData => ffi::MDBX_ENODATA,
            Self::PageNotFound => ffi::MDBX_PAGE_NOTFOUND,
            Self::Corrupted => ffi::MDBX_CORRUPTED,
            Self::Panic => ffi::MDBX_PANIC,
            Self::VersionMismatch => ffi::MDBX_VERSION_MISMATCH,
            Self::Invalid => ffi::MDBX_INVALID,
            Self::MapFull => ffi::MDBX_MAP_FULL,
            Self::DbsFull => ffi::MDBX_DBS_FULL,
            Self::ReadersFull => ffi::MDBX_READERS_FULL,
            Self::TxnFull => ffi::MDBX_TXN_FULL,
            Self::CursorFull => ffi::MDBX_CURSOR_FULL,
            Self::PageFull => ffi::MDBX_PAGE_FULL,
            Self::UnableExtendMapSize => ffi::MDBX_UNABLE_EXTEND_MAPSIZE,
            Self::Incompatible => ffi::MDBX_INCOMPATIBLE,
            Self::BadRslot => ffi::MDBX_BAD_RSLOT,
            Self::BadTxn => ffi::MDBX_BAD_TXN,
            Self::BadValSize => ffi::MDBX_BAD_VALSIZE,
            Self::BadDbi => ffi::MDBX_BAD_DBI,
            Self::Problem => ffi::MDBX_PROBLEM,
            Self::Busy => ffi::MDBX_BUSY,
            Self::Multival => ffi::MDBX_EMULTIVAL,
            Self::BadSignature => ffi::MDBX_EBADSIGN,
            Self::WannaRecovery => ffi::MDBX_WANNA_RECOVERY,
            Self::KeyMismatch => ffi::MDBX_EKEYMISMATCH,
            Self::TooLarge => ffi::MDBX_TOO_LARGE,
            Self::ThreadMismatch => ffi::MDBX_THREAD_MISMATCH,
            Self::TxnOverlapping => ffi::MDBX_TXN_OVERLAPPING,
            Self::Access => ffi::MDBX_EACCESS,
            Self::InvalidArgument => ffi::MDBX_EINVAL,
            Self::ReadOnlyFs => ffi::MDBX_EROFS,
            Self::NoFile => ffi::MDBX_ENOFILE,
            Self::Io => ffi::MDBX_EIO,
            Self::BotchedTransaction => -96000,
            Self::Other(err_code) => *err_code,
        }
    }
}

/// Maps an MDBX return code to a result.
///
/// `MDBX_SUCCESS` maps to `Ok(false)` and `MDBX_RESULT_TRUE` to `Ok(true)`.
#[inline]
pub(crate) const fn mdbx_result(err_code: c_int) -> MdbxResult<bool> {
    match err_code {
        ffi::MDBX_SUCCESS => Ok(false),
        ffi::MDBX_RESULT_TRUE => Ok(true),
        other => Err(MdbxError::from_err_code(other)),
    }
}

/// The underlying reason an environment operation failed.
#[derive(Debug, thiserror::Error)]
pub enum Cause {
    /// The engine rejected the operation.
    #[error(transparent)]
    Engine(#[from] MdbxError),
    /// A filesystem operation failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The path does not match the requested layout.
    #[error("path {} is not usable: {reason}", path.display())]
    Path {
        /// The offending path.
        path: PathBuf,
        /// Why the path was rejected.
        reason: &'static str,
    },
    /// The configuration cannot be satisfied.
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    /// Another copy of the same environment is running.
    #[error("a copy of this environment is already in progress")]
    CopyInProgress,
    /// The environment is not in a state that permits the operation.
    #[error(transparent)]
    State(#[from] EnvState),
}

/// Why an environment refused an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnvState {
    /// The environment has been closed.
    #[error("environment is closed")]
    Closed,
    /// Transactions are still open against the environment.
    #[error("environment has {user} user-managed and {internal} internally-managed open transactions")]
    TransactionsOpen {
        /// Open user-managed transactions.
        user: usize,
        /// Open internally-managed transactions.
        internal: usize,
    },
}

/// Why a dispatched unit of work did not produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher no longer accepts work.
    #[error("dispatcher `{0}` rejected the work unit")]
    Rejected(&'static str),
    /// The work unit was dropped before it delivered a result.
    #[error("work unit was dropped before completing")]
    Canceled,
}

/// Errors surfaced by environments, transactions and dispatched work.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The environment could not be opened.
    #[error("failed to open environment")]
    EnvironmentOpen(#[source] Cause),
    /// The environment is not in a state that permits the operation.
    #[error(transparent)]
    EnvironmentState(#[from] EnvState),
    /// Flushing or closing the environment failed.
    #[error("environment I/O failed")]
    EnvironmentIo(#[source] Cause),
    /// Copying the environment failed.
    #[error("environment copy failed")]
    EnvironmentCopy(#[source] Cause),
    /// The engine refused to commit the transaction.
    #[error("transaction commit conflicted")]
    TransactionConflict(#[source] MdbxError),
    /// The transaction has already been committed or aborted.
    #[error("transaction is already {0}")]
    TransactionState(TxState),
    /// A transaction begin or sub-database operation failed in the engine.
    #[error("database operation failed")]
    Database(#[source] MdbxError),
    /// A dispatched unit of work did not run to completion.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// A caller-level timeout elapsed before the work unit completed.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Returns the engine error behind this error, if any.
    pub const fn engine_error(&self) -> Option<MdbxError> {
        match self {
            Self::EnvironmentOpen(Cause::Engine(e))
            | Self::EnvironmentIo(Cause::Engine(e))
            | Self::EnvironmentCopy(Cause::Engine(e))
            | Self::TransactionConflict(e)
            | Self::Database(e) => Some(*e),
            _ => None,
        }
    }
}
