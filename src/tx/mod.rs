//! Transactions, cursors and sub-database handles.
//!
//! A [`Transaction`] is parameterized by its kind, [`RO`] or [`RW`]. Write
//! operations exist only on `Transaction<RW>`.

mod cache;

mod cursor;
pub use cursor::{Cursor, Entry, Iter, ScanPage};

mod database;
pub use database::Database;

mod kind;
pub use kind::{RO, RW, TransactionKind, TxState, Visibility};

mod lat;
pub use lat::CommitLatency;

pub(crate) mod ops;

mod transaction;
pub use transaction::Transaction;
