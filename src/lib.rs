//! Scheduler-driven transactions over an embedded [libmdbx] environment.
//!
//! # Overview
//!
//! [libmdbx] is a memory-mapped key-value store with MVCC snapshots and a
//! single serialized writer. Its calls block: on disk I/O, on reader slots,
//! and on the writer lock. This crate owns the environment lifecycle and
//! moves transaction work off the calling thread onto a [`Dispatcher`], so
//! database operations compose as asynchronous units instead of stalling an
//! event loop.
//!
//! - [`Environment`] - one open engine instance. Built with
//!   [`Environment::builder()`], or [`Environment::tmp()`] for scratch use.
//!   Closed explicitly with [`Environment::close()`].
//! - [`Transaction`] - one begin/commit/abort cycle, of kind [`RO`] or
//!   [`RW`]. Exactly one of [`Transaction::commit()`] or
//!   [`Transaction::abort()`] ends it.
//! - [`Dispatcher`] - where dispatched work runs. Each environment uses its
//!   own [`IoPool`] unless another dispatcher, such as [`TokioDispatcher`], is
//!   configured.
//! - [`Dispatched`] - the handle for a dispatched unit. Await it, block on it
//!   with [`Dispatched::wait()`], or bound it with [`Dispatched::timeout()`].
//!
//! Environments are always opened with `MDBX_NOTLS`: no transaction is tied
//! to the thread that began it, so a transaction may begin on one worker and
//! continue on another.
//!
//! # Quick Start
//!
//! ```no_run
//! use signet_mdbx_dispatch::{ByteUnit, Environment, Result, WriteFlags};
//!
//! # async fn run() -> Result<()> {
//! let env = Environment::builder()
//!     .set_size(ByteUnit::Giga, 1)
//!     .set_max_dbs(4)
//!     .open("/tmp/my_database")?;
//!
//! // Internally-managed: committed if the closure succeeds.
//! env.write(|txn| {
//!     let db = txn.open_db(None)?;
//!     txn.put(db, b"hello", b"world", WriteFlags::empty())
//! })
//! .await?;
//!
//! let value = env
//!     .read(|txn| {
//!         let db = txn.open_db(None)?;
//!         txn.get(db, b"hello")
//!     })
//!     .await?;
//! assert_eq!(value.as_deref(), Some(&b"world"[..]));
//!
//! // User-managed: the caller ends it.
//! let mut txn = env.begin_ro_txn()?;
//! let db = txn.open_db(None)?;
//! let page = txn.scan(db, None, 100)?;
//! txn.commit()?;
//! # let _ = page;
//!
//! env.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Every engine failure is classified into an [`Error`] variant that keeps
//! the engine's [`MdbxError`] as context. Nothing is retried, with two
//! exceptions that wait instead of failing: beginning a write transaction
//! while another writer holds the lock, and beginning a read transaction
//! while the reader table is briefly full.
//!
//! # Logging
//!
//! Events are emitted with [`tracing`] under the `libmdbx` target. Each
//! transaction carries an `mdbx_txn` span with its kind, visibility and id.
//!
//! [libmdbx]: https://github.com/erthink/libmdbx

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub extern crate signet_mdbx_sys as ffi;

pub mod dispatch;
pub use dispatch::{
    CancelToken, Dispatched, Dispatcher, IoPool, IoPoolBuilder, Job, TokioDispatcher,
};

mod error;
pub use error::{Cause, DispatchError, EnvState, Error, MdbxError, MdbxResult, Result};

mod flags;
pub use flags::{ByteUnit, DatabaseFlags, EnvironmentFlags, WriteFlags};

pub mod sys;
pub use sys::{DATA_FILE_NAME, Environment, EnvironmentBuilder, EnvironmentConfig, Info, Stat};

pub mod tx;
pub use tx::{
    CommitLatency, Cursor, Database, RO, RW, ScanPage, Transaction, TransactionKind, TxState,
    Visibility,
};
