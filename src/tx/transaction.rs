use crate::{
    CommitLatency, Cursor, Database, Environment, Stat,
    dispatch::{self, Dispatched},
    error::{Error, MdbxError, Result, mdbx_result},
    flags::{DatabaseFlags, WriteFlags},
    sys::{
        TxnLease,
        txn_manager::{CommitLatencyPtr, RawTxPtr},
    },
    tx::{
        RW, TransactionKind, TxState, Visibility,
        cache::{CachedDb, DbCache, hash_name},
        cursor::{Entry, ScanPage},
        ops,
    },
};
use smallvec::SmallVec;
use std::{
    cell::RefCell,
    ffi::{CStr, c_uint},
    fmt,
    marker::PhantomData,
    mem::size_of,
    ptr,
};
use tracing::{debug, debug_span, instrument, warn};

/// An MDBX transaction.
///
/// A transaction is exclusively owned: it is [`Send`] but not [`Sync`], so it
/// can move to another thread (see [`Transaction::dispatch`]) but is never
/// used from two threads at once.
///
/// It ends with exactly one [`commit`](Self::commit) or
/// [`abort`](Self::abort). Dropping an open transaction aborts it.
pub struct Transaction<K: TransactionKind> {
    txn: RawTxPtr,
    id: u64,
    state: TxState,
    db_cache: RefCell<DbCache>,
    span: tracing::Span,
    lease: TxnLease,
    _marker: PhantomData<fn() -> K>,
}

impl<K: TransactionKind> fmt::Debug for Transaction<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("kind", &if K::IS_READ_ONLY { "ro" } else { "rw" })
            .field("id", &self.id)
            .field("state", &self.state)
            .field("visibility", &self.lease.visibility())
            .finish_non_exhaustive()
    }
}

impl<K: TransactionKind> Transaction<K> {
    pub(crate) fn begin(env: &Environment, visibility: Visibility) -> Result<Self> {
        let lease = env.lease(visibility)?;
        let span = K::new_span(visibility);

        let txn = if K::IS_READ_ONLY {
            ops::begin_ro(lease.env_ptr(), K::OPEN_FLAGS)
        } else {
            ops::begin_rw(lease.lifecycle(), &span)
        }
        .map_err(Error::Database)?;

        let id = unsafe { ffi::mdbx_txn_id(txn.0) };
        span.record("txn_id", id);
        debug!(target: "libmdbx", parent: &span, "transaction started");

        Ok(Self {
            txn,
            id,
            state: TxState::Open,
            db_cache: RefCell::default(),
            span,
            lease,
            _marker: PhantomData,
        })
    }

    /// Returns the raw transaction pointer, or the terminal state.
    #[inline]
    fn ptr(&self) -> Result<*mut ffi::MDBX_txn> {
        match self.state {
            TxState::Open => Ok(self.txn.0),
            state => Err(Error::TransactionState(state)),
        }
    }

    /// Returns the environment this transaction belongs to.
    pub const fn env(&self) -> &Environment {
        self.lease.env()
    }

    /// Returns the transaction id.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the lifecycle state.
    pub const fn state(&self) -> TxState {
        self.state
    }

    /// Returns `true` until the transaction is committed or aborted.
    pub const fn is_open(&self) -> bool {
        matches!(self.state, TxState::Open)
    }

    /// Returns who is responsible for ending this transaction.
    pub const fn visibility(&self) -> Visibility {
        self.lease.visibility()
    }

    /// Returns the tracing span for this transaction.
    pub const fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Commits the transaction.
    ///
    /// Writes become visible to transactions begun afterwards. For a
    /// read-only transaction this releases the reader slot. Any engine
    /// failure leaves the transaction aborted and surfaces as
    /// [`Error::TransactionConflict`]; nothing is retried.
    #[instrument(skip(self), parent = &self.span)]
    pub fn commit(&mut self) -> Result<CommitLatency> {
        let txn = RawTxPtr(self.ptr()?);
        let mut latency = CommitLatency::new();

        let res = if K::IS_READ_ONLY {
            mdbx_result(unsafe { ffi::mdbx_txn_commit_ex(txn.0, latency.mdb_commit_latency()) })
        } else {
            self.lease.lifecycle().commit(
                txn,
                CommitLatencyPtr(latency.mdb_commit_latency()),
                debug_span!(target: "libmdbx", "lifecycle_commit"),
            )
        };

        // The engine ends the transaction whether or not the commit
        // succeeded.
        self.lease.release();
        match res {
            Ok(false) => {
                self.state = TxState::Committed;
                debug!(target: "libmdbx", latency_whole_ms = latency.whole().as_millis(), "committed");
                Ok(latency)
            }
            Ok(true) => {
                self.state = TxState::Aborted;
                warn!(target: "libmdbx", "botched");
                Err(Error::TransactionConflict(MdbxError::BotchedTransaction))
            }
            Err(err) => {
                self.state = TxState::Aborted;
                warn!(target: "libmdbx", %err, "commit failed");
                Err(Error::TransactionConflict(err))
            }
        }
    }

    /// Aborts the transaction, discarding its writes.
    ///
    /// Fails only if the transaction already ended.
    #[instrument(skip(self), parent = &self.span)]
    pub fn abort(&mut self) -> Result<()> {
        self.ptr()?;
        self.abort_inner();
        Ok(())
    }

    fn abort_inner(&mut self) {
        self.state = TxState::Aborted;
        let res = if K::IS_READ_ONLY {
            mdbx_result(unsafe { ffi::mdbx_txn_abort(self.txn.0) })
        } else {
            self.lease
                .lifecycle()
                .abort(self.txn, debug_span!(target: "libmdbx", "lifecycle_abort"))
        };
        self.lease.release();
        match res {
            Ok(_) => debug!(target: "libmdbx", "aborted"),
            Err(err) => warn!(target: "libmdbx", %err, "abort failed"),
        }
    }

    /// Opens a handle to a sub-database, and caches the handle for re-use.
    ///
    /// If `name` is `None`, then the returned handle will be for the default
    /// database. Named sub-databases require
    /// [`EnvironmentBuilder::set_max_dbs`].
    ///
    /// The database name MAY NOT contain the null character.
    ///
    /// [`EnvironmentBuilder::set_max_dbs`]: crate::EnvironmentBuilder::set_max_dbs
    pub fn open_db(&self, name: Option<&str>) -> Result<Database> {
        if let Some(db) = self.db_cache.borrow().read_db(hash_name(name)) {
            return Ok(db);
        }
        self.open_db_with_flags(name, DatabaseFlags::empty())
    }

    /// Raw open with flags. Writes to the cache after opening.
    fn open_db_with_flags(&self, name: Option<&str>, flags: DatabaseFlags) -> Result<Database> {
        let txn = self.ptr()?;

        let mut c_name_buf = SmallVec::<[u8; 32]>::new();
        let c_name = name
            .map(|n| {
                c_name_buf.extend_from_slice(n.as_bytes());
                c_name_buf.push(0);
                CStr::from_bytes_with_nul(&c_name_buf)
                    .map_err(|_| Error::Database(MdbxError::InvalidArgument))
            })
            .transpose()?;
        let name_ptr = c_name.map_or(ptr::null(), CStr::as_ptr);

        let mut dbi: ffi::MDBX_dbi = 0;
        mdbx_result(unsafe { ffi::mdbx_dbi_open(txn, name_ptr, flags.bits(), &mut dbi) })
            .map_err(Error::Database)?;

        // Actual flags may differ from the requested ones for an existing
        // sub-database.
        let mut actual_flags: c_uint = 0;
        let mut _status: c_uint = 0;
        mdbx_result(unsafe { ffi::mdbx_dbi_flags_ex(txn, dbi, &mut actual_flags, &mut _status) })
            .map_err(Error::Database)?;

        let db = Database::new(dbi, DatabaseFlags::from_bits_truncate(actual_flags as _));
        self.db_cache.borrow_mut().write_db(CachedDb::new(name, db));
        Ok(db)
    }

    /// Gets an item from a sub-database.
    ///
    /// Returns a copy of the value, or `None` if the key is absent.
    pub fn get(&self, db: Database, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        let txn = self.ptr()?;
        let key_val = ops::slice_to_val(key.as_ref());
        let mut data_val = ops::empty_val();

        match unsafe { ffi::mdbx_get(txn, db.dbi(), &key_val, &mut data_val) } {
            ffi::MDBX_SUCCESS => Ok(Some(unsafe { ops::val_to_vec(&data_val) })),
            ffi::MDBX_NOTFOUND => Ok(None),
            code => Err(Error::Database(MdbxError::from_err_code(code))),
        }
    }

    /// Retrieves sub-database statistics.
    pub fn db_stat(&self, db: Database) -> Result<Stat> {
        let txn = self.ptr()?;
        let mut stat = Stat::new();
        mdbx_result(unsafe { ffi::mdbx_dbi_stat(txn, db.dbi(), stat.mdb_stat(), size_of::<Stat>()) })
            .map_err(Error::Database)?;
        Ok(stat)
    }

    /// Returns the number of entries in the sub-database.
    pub fn entries(&self, db: Database) -> Result<u64> {
        self.db_stat(db).map(|stat| stat.entries())
    }

    /// Opens a new cursor on the given sub-database.
    pub fn cursor(&self, db: Database) -> Result<Cursor<'_, K>> {
        Cursor::new(self, db, self.ptr()?)
    }

    /// Reads up to `limit` entries in key order, starting at the first key
    /// not less than `start`.
    ///
    /// The returned page carries the entry to resume from, so a long scan can
    /// be split into steps that run on different workers. Fails with
    /// [`MdbxError::InvalidArgument`] if `limit` is zero.
    pub fn scan(&self, db: Database, start: Option<&[u8]>, limit: usize) -> Result<ScanPage> {
        match start {
            Some(key) => self.scan_page(db, Some((key, &[][..])), limit),
            None => self.scan_page(db, None, limit),
        }
    }

    /// Continues a scan at the [`ScanPage::next`] entry of a previous page.
    ///
    /// Resumes at the exact entry, so duplicates of one key may span pages.
    pub fn scan_resume(&self, db: Database, next: &Entry, limit: usize) -> Result<ScanPage> {
        self.scan_page(db, Some((next.0.as_slice(), next.1.as_slice())), limit)
    }

    fn scan_page(
        &self,
        db: Database,
        from: Option<(&[u8], &[u8])>,
        limit: usize,
    ) -> Result<ScanPage> {
        if limit == 0 {
            return Err(Error::Database(MdbxError::InvalidArgument));
        }
        let mut cursor = self.cursor(db)?;
        let mut entry = match from {
            Some((key, value)) => cursor.seek_entry(key, value)?,
            None => cursor.first()?,
        };

        let mut entries = Vec::with_capacity(limit.min(1024));
        while let Some(pair) = entry {
            if entries.len() == limit {
                return Ok(ScanPage { entries, next: Some(pair) });
            }
            entries.push(pair);
            entry = cursor.next()?;
        }
        Ok(ScanPage { entries, next: None })
    }

    /// Moves this transaction onto the environment's dispatcher for one step.
    ///
    /// `f` runs on a worker thread; the transaction is handed back together
    /// with its output. If the unit is rejected or skipped, the transaction
    /// is dropped, which aborts it.
    pub fn dispatch<T, F>(self, f: F) -> Dispatched<(Self, T)>
    where
        T: Send + 'static,
        F: FnOnce(&mut Self) -> T + Send + 'static,
    {
        let dispatcher = self.env().dispatcher().clone();
        let span = self.span.clone();
        let _guard = span.enter();
        dispatch::submit(dispatcher.as_ref(), move |_| {
            let mut txn = self;
            let out = f(&mut txn);
            Ok((txn, out))
        })
    }
}

impl<K: TransactionKind> Drop for Transaction<K> {
    fn drop(&mut self) {
        if self.is_open() {
            let _guard = self.span.clone().entered();
            self.abort_inner();
        }
    }
}

impl Transaction<RW> {
    /// Opens a handle to a sub-database, creating it if necessary.
    ///
    /// If the sub-database already exists, the given flags are added to it.
    /// Creating more named sub-databases than the environment allows fails
    /// with [`MdbxError::DbsFull`].
    pub fn create_db(&self, name: Option<&str>, flags: DatabaseFlags) -> Result<Database> {
        self.open_db_with_flags(name, flags | DatabaseFlags::CREATE)
    }

    /// Stores an item into a sub-database.
    ///
    /// By default an existing value for the key is replaced, or, for
    /// [`DatabaseFlags::DUP_SORT`] sub-databases, another value is added.
    pub fn put(
        &self,
        db: Database,
        key: impl AsRef<[u8]>,
        data: impl AsRef<[u8]>,
        flags: WriteFlags,
    ) -> Result<()> {
        let txn = self.ptr()?;
        let key_val = ops::slice_to_val(key.as_ref());
        let mut data_val = ops::slice_to_val(data.as_ref());
        mdbx_result(unsafe { ffi::mdbx_put(txn, db.dbi(), &key_val, &mut data_val, flags.bits()) })
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Deletes items from a sub-database.
    ///
    /// With `data`, only that value is deleted; otherwise every value of the
    /// key is. Returns `true` if anything was deleted.
    pub fn del(&self, db: Database, key: impl AsRef<[u8]>, data: Option<&[u8]>) -> Result<bool> {
        let txn = self.ptr()?;
        let key_val = ops::slice_to_val(key.as_ref());
        let data_val = data.map(ops::slice_to_val);
        let data_ptr = data_val.as_ref().map_or(ptr::null(), |d| d as *const ffi::MDBX_val);

        match mdbx_result(unsafe { ffi::mdbx_del(txn, db.dbi(), &key_val, data_ptr) }) {
            Ok(_) => Ok(true),
            Err(MdbxError::NotFound) => Ok(false),
            Err(err) => Err(Error::Database(err)),
        }
    }

    /// Empties the given sub-database. All items will be removed.
    pub fn clear_db(&self, db: Database) -> Result<()> {
        let txn = self.ptr()?;
        mdbx_result(unsafe { ffi::mdbx_drop(txn, db.dbi(), false) }).map_err(Error::Database)?;
        Ok(())
    }
}
