use ffi::{MDBX_TXN_RDONLY, MDBX_TXN_READWRITE, MDBX_txn_flags_t};
use std::fmt;

mod private {
    pub trait Sealed {}
    impl Sealed for super::RO {}
    impl Sealed for super::RW {}
}

/// Marker type for read-only transactions.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct RO;

/// Marker type for read-write transactions.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct RW;

/// Marker trait for transaction kinds. Either [`RO`] or [`RW`].
pub trait TransactionKind: private::Sealed + Send + fmt::Debug + 'static {
    #[doc(hidden)]
    const OPEN_FLAGS: MDBX_txn_flags_t;

    /// Convenience flag for distinguishing between read-only and read-write
    /// transactions.
    #[doc(hidden)]
    const IS_READ_ONLY: bool;

    /// Create a new tracing span for a transaction of this kind. The
    /// `txn_id` field is recorded once the engine has assigned it.
    #[doc(hidden)]
    fn new_span(visibility: Visibility) -> tracing::Span {
        tracing::debug_span!(
            target: "libmdbx",
            "mdbx_txn",
            kind = %if Self::IS_READ_ONLY { "ro" } else { "rw" },
            visibility = %visibility,
            txn_id = tracing::field::Empty,
        )
    }
}

impl TransactionKind for RO {
    const OPEN_FLAGS: MDBX_txn_flags_t = MDBX_TXN_RDONLY;
    const IS_READ_ONLY: bool = true;
}

impl TransactionKind for RW {
    const OPEN_FLAGS: MDBX_txn_flags_t = MDBX_TXN_READWRITE;
    const IS_READ_ONLY: bool = false;
}

/// Who is responsible for ending a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Handed to the caller, who must commit or abort it.
    User,
    /// Backs a single dispatched operation and is ended by it.
    Internal,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Internal => "internal",
        })
    }
}

/// Lifecycle state of a transaction.
///
/// `Open` moves to exactly one of the terminal states; there is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxState {
    /// The transaction accepts operations.
    Open,
    /// The transaction was committed.
    Committed,
    /// The transaction was aborted, explicitly or by a failed commit.
    Aborted,
}

impl TxState {
    /// Returns `true` for [`TxState::Committed`] and [`TxState::Aborted`].
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        })
    }
}
