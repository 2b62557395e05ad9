use crate::{
    Dispatcher, IoPool, RO, RW, Transaction, TransactionKind, Visibility,
    dispatch::{self, Dispatched},
    error::{Cause, DispatchError, EnvState, Error, MdbxResult, Result, mdbx_result},
    flags::{ByteUnit, EnvironmentFlags},
    sys::txn_manager::{LifecycleHandle, RwLifecycle},
};
use parking_lot::RwLock;
use std::{
    ffi::CString,
    fmt, fs,
    mem::size_of,
    path::{Path, PathBuf},
    ptr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tempfile::TempDir;
use tracing::{debug, instrument, warn};

/// Name of the data file inside an environment directory.
pub const DATA_FILE_NAME: &str = "mdbx.dat";

/// Map size of [`Environment::tmp`].
const TMP_MAP_SIZE: u64 = ByteUnit::Mega.to_bytes(64);

/// Sub-database limit of [`Environment::tmp`].
const TMP_MAX_DBS: usize = 12;

#[derive(Clone, Copy, Debug)]
pub(crate) struct EnvPtr(pub(crate) *mut ffi::MDBX_env);

// SAFETY: the environment is opened with `MDBX_NOTLS`; the engine
// synchronizes access to the handle itself.
unsafe impl Send for EnvPtr {}
unsafe impl Sync for EnvPtr {}

/// An open engine instance and everything that dies with it.
struct OpenEnv {
    ptr: EnvPtr,
    lifecycle: LifecycleHandle,
    tmp: Option<TempDir>,
}

impl OpenEnv {
    /// Closes the engine, then removes the temporary directory if there is
    /// one.
    fn shutdown(self) -> std::result::Result<(), Cause> {
        let Self { ptr, lifecycle, tmp } = self;
        // The lifecycle thread exits once its last handle is gone.
        drop(lifecycle);
        let closed = mdbx_result(unsafe { ffi::mdbx_env_close_ex(ptr.0, false) });
        if let Some(tmp) = tmp {
            tmp.close()?;
        }
        closed?;
        Ok(())
    }
}

/// Resolved configuration of an open [`Environment`].
///
/// Immutable for the life of the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    path: PathBuf,
    map_size: Option<u64>,
    max_dbs: Option<usize>,
    max_readers: Option<usize>,
    flags: EnvironmentFlags,
    temporary: bool,
}

impl EnvironmentConfig {
    /// The environment directory, or the data file for
    /// [`EnvironmentFlags::NO_SUB_DIR`].
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configured map size ceiling, `None` for the engine default.
    pub const fn map_size(&self) -> Option<u64> {
        self.map_size
    }

    /// The configured named sub-database limit.
    pub const fn max_dbs(&self) -> Option<usize> {
        self.max_dbs
    }

    /// The configured reader slot limit.
    pub const fn max_readers(&self) -> Option<usize> {
        self.max_readers
    }

    /// The open flags, without the implied thread-independence mode.
    pub const fn flags(&self) -> EnvironmentFlags {
        self.flags
    }

    /// Returns `true` if the environment lives in a temporary location that
    /// is removed on close.
    pub const fn is_temporary(&self) -> bool {
        self.temporary
    }
}

/// Environment statistics.
///
/// Contains information about the size and layout of an MDBX environment or
/// database.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct Stat(ffi::MDBX_stat);

impl Stat {
    pub(crate) const fn new() -> Self {
        // SAFETY: a plain C struct of integers, all-zero is valid.
        unsafe { Self(std::mem::zeroed()) }
    }

    pub(crate) const fn mdb_stat(&mut self) -> *mut ffi::MDBX_stat {
        &mut self.0
    }

    /// Size of a database page in bytes.
    #[inline]
    pub const fn page_size(&self) -> u32 {
        self.0.ms_psize
    }

    /// Depth (height) of the B-tree.
    #[inline]
    pub const fn depth(&self) -> u32 {
        self.0.ms_depth
    }

    /// Number of internal (non-leaf) pages.
    #[inline]
    pub const fn branch_pages(&self) -> u64 {
        self.0.ms_branch_pages
    }

    /// Number of leaf pages.
    #[inline]
    pub const fn leaf_pages(&self) -> u64 {
        self.0.ms_leaf_pages
    }

    /// Number of overflow pages.
    #[inline]
    pub const fn overflow_pages(&self) -> u64 {
        self.0.ms_overflow_pages
    }

    /// Number of data items.
    #[inline]
    pub const fn entries(&self) -> u64 {
        self.0.ms_entries
    }
}

/// Environment information.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct Info(ffi::MDBX_envinfo);

impl Info {
    /// Size of the memory map in bytes.
    #[inline]
    pub const fn map_size(&self) -> u64 {
        self.0.mi_mapsize
    }

    /// Current size of the data file in bytes.
    #[inline]
    pub const fn file_size(&self) -> u64 {
        self.0.mi_geo.current
    }

    /// Number of the last page in use, free pages included.
    #[inline]
    pub const fn last_pgno(&self) -> u64 {
        self.0.mi_last_pgno
    }

    /// ID of the last committed transaction.
    #[inline]
    pub const fn last_txn_id(&self) -> u64 {
        self.0.mi_recent_txnid
    }

    /// Reader slots in the table.
    #[inline]
    pub const fn max_readers(&self) -> u32 {
        self.0.mi_maxreaders
    }

    /// Reader slots in use.
    #[inline]
    pub const fn num_readers(&self) -> u32 {
        self.0.mi_numreaders
    }

    /// Database page size in bytes.
    #[inline]
    pub const fn page_size(&self) -> u32 {
        self.0.mi_dxb_pagesize
    }
}

/// Builder for an [`Environment`].
///
/// Unset options fall back to engine defaults. Every call to
/// [`build`](Self::build) opens an independent engine instance.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentBuilder {
    path: Option<PathBuf>,
    map_size: Option<u64>,
    max_dbs: Option<usize>,
    max_readers: Option<usize>,
    flags: EnvironmentFlags,
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl EnvironmentBuilder {
    /// Sets the location of the environment. Without a path, a temporary
    /// directory is created and removed again on close.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the map size ceiling as `value` multiples of `unit`.
    pub const fn set_size(&mut self, unit: ByteUnit, value: u64) -> &mut Self {
        self.set_map_size(unit.to_bytes(value))
    }

    /// Sets the map size ceiling in bytes.
    pub const fn set_map_size(&mut self, bytes: u64) -> &mut Self {
        self.map_size = Some(bytes);
        self
    }

    /// Sets the maximum number of named sub-databases.
    ///
    /// Without it, only the unnamed sub-database is usable.
    pub const fn set_max_dbs(&mut self, max_dbs: usize) -> &mut Self {
        self.max_dbs = Some(max_dbs);
        self
    }

    /// Sets the maximum number of concurrent read transactions, process-wide
    /// across all users of the environment.
    pub const fn set_max_readers(&mut self, max_readers: usize) -> &mut Self {
        self.max_readers = Some(max_readers);
        self
    }

    /// Replaces the open flags.
    pub const fn set_flags(&mut self, flags: EnvironmentFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Runs dispatched work on `dispatcher` instead of a private [`IoPool`].
    pub fn set_dispatcher(&mut self, dispatcher: Arc<dyn Dispatcher>) -> &mut Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    const fn with_flag(&mut self, flag: EnvironmentFlags) -> &mut Self {
        self.flags = self.flags.union(flag);
        self
    }

    /// See [`EnvironmentFlags::FIXED_MAP`].
    pub const fn fixed_map(&mut self) -> &mut Self {
        self.with_flag(EnvironmentFlags::FIXED_MAP)
    }

    /// See [`EnvironmentFlags::NO_SUB_DIR`].
    pub const fn no_sub_dir(&mut self) -> &mut Self {
        self.with_flag(EnvironmentFlags::NO_SUB_DIR)
    }

    /// See [`EnvironmentFlags::READ_ONLY`].
    pub const fn read_only(&mut self) -> &mut Self {
        self.with_flag(EnvironmentFlags::READ_ONLY)
    }

    /// See [`EnvironmentFlags::WRITE_MAP`].
    pub const fn write_map(&mut self) -> &mut Self {
        self.with_flag(EnvironmentFlags::WRITE_MAP)
    }

    /// See [`EnvironmentFlags::NO_META_SYNC`].
    pub const fn no_meta_sync(&mut self) -> &mut Self {
        self.with_flag(EnvironmentFlags::NO_META_SYNC)
    }

    /// See [`EnvironmentFlags::NO_SYNC`].
    pub const fn no_sync(&mut self) -> &mut Self {
        self.with_flag(EnvironmentFlags::NO_SYNC)
    }

    /// See [`EnvironmentFlags::MAP_ASYNC`].
    pub const fn map_async(&mut self) -> &mut Self {
        self.with_flag(EnvironmentFlags::MAP_ASYNC)
    }

    /// See [`EnvironmentFlags::NO_LOCK`].
    pub const fn no_lock(&mut self) -> &mut Self {
        self.with_flag(EnvironmentFlags::NO_LOCK)
    }

    /// See [`EnvironmentFlags::NO_READAHEAD`].
    pub const fn no_readahead(&mut self) -> &mut Self {
        self.with_flag(EnvironmentFlags::NO_READAHEAD)
    }

    /// See [`EnvironmentFlags::NO_MEM_INIT`].
    pub const fn no_mem_init(&mut self) -> &mut Self {
        self.with_flag(EnvironmentFlags::NO_MEM_INIT)
    }

    /// Opens the environment at `path`, overriding any configured path.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Environment> {
        let mut builder = self.clone();
        builder.set_path(path.as_ref());
        builder.build()
    }

    /// Opens the environment.
    pub fn build(&self) -> Result<Environment> {
        let flags = self.flags;
        if flags.contains(EnvironmentFlags::FIXED_MAP) && self.map_size.is_none() {
            return Err(Error::EnvironmentOpen(Cause::Config("fixed_map requires a map size")));
        }

        let (path, tmp) = resolve_path(self.path.as_deref(), flags).map_err(Error::EnvironmentOpen)?;
        let ptr = self.open_engine(&path).map_err(Error::EnvironmentOpen)?;
        let lifecycle = match RwLifecycle::spawn(ptr) {
            Ok(lifecycle) => lifecycle,
            Err(err) => {
                unsafe { ffi::mdbx_env_close_ex(ptr.0, false) };
                return Err(Error::EnvironmentOpen(err.into()));
            }
        };

        let dispatcher = self.dispatcher.clone().unwrap_or_else(|| Arc::new(IoPool::new()));
        debug!(
            target: "libmdbx",
            path = %path.display(),
            ?flags,
            dispatcher = dispatcher.name(),
            "environment opened"
        );

        let config = EnvironmentConfig {
            path,
            map_size: self.map_size,
            max_dbs: self.max_dbs,
            max_readers: self.max_readers,
            flags,
            temporary: tmp.is_some(),
        };
        Ok(Environment {
            inner: Arc::new(EnvironmentInner {
                config,
                dispatcher,
                open: RwLock::new(Some(OpenEnv { ptr, lifecycle, tmp })),
                user_txns: AtomicUsize::new(0),
                internal_txns: AtomicUsize::new(0),
                copying: AtomicBool::new(false),
            }),
        })
    }

    /// Creates the engine instance, applies map size, sub-database limit
    /// and reader limit in that order, then opens it at `path`.
    fn open_engine(&self, path: &Path) -> std::result::Result<EnvPtr, Cause> {
        let c_path = path_to_cstring(path)?;
        let mut env: *mut ffi::MDBX_env = ptr::null_mut();
        mdbx_result(unsafe { ffi::mdbx_env_create(&mut env) })?;

        let configure = || -> MdbxResult<()> {
            unsafe {
                if let Some(size) = self.map_size {
                    let upper = isize::try_from(size).unwrap_or(isize::MAX);
                    // -1 keeps the engine default for that parameter.
                    let (lower, now, step) = if self.flags.contains(EnvironmentFlags::FIXED_MAP) {
                        (upper, upper, 0)
                    } else {
                        (-1, -1, -1)
                    };
                    mdbx_result(ffi::mdbx_env_set_geometry(env, lower, now, upper, step, step, -1))?;
                }
                if let Some(max_dbs) = self.max_dbs {
                    mdbx_result(ffi::mdbx_env_set_option(env, ffi::MDBX_opt_max_db, max_dbs as u64))?;
                }
                if let Some(max_readers) = self.max_readers {
                    mdbx_result(ffi::mdbx_env_set_option(
                        env,
                        ffi::MDBX_opt_max_readers,
                        max_readers as u64,
                    ))?;
                }
                mdbx_result(ffi::mdbx_env_open(
                    env,
                    c_path.as_ptr(),
                    self.flags.engine_flags(),
                    0o644,
                ))?;
            }
            Ok(())
        };

        if let Err(err) = configure() {
            unsafe { ffi::mdbx_env_close_ex(env, false) };
            return Err(err.into());
        }
        Ok(EnvPtr(env))
    }
}

fn path_to_cstring(path: &Path) -> std::result::Result<CString, Cause> {
    CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| Cause::Path { path: path.to_path_buf(), reason: "contains a nul byte" })
}

/// Resolves where the engine files live, creating directories as needed.
///
/// Returns the directory (or data file for `NO_SUB_DIR`) and the temporary
/// directory backing it, if any.
fn resolve_path(
    path: Option<&Path>,
    flags: EnvironmentFlags,
) -> std::result::Result<(PathBuf, Option<TempDir>), Cause> {
    let single_file = flags.contains(EnvironmentFlags::NO_SUB_DIR);

    let Some(path) = path else {
        let tmp = tempfile::Builder::new().prefix("mdbx-").tempdir()?;
        let path =
            if single_file { tmp.path().join(DATA_FILE_NAME) } else { tmp.path().to_path_buf() };
        return Ok((path, Some(tmp)));
    };

    let reject = |reason| Cause::Path { path: path.to_path_buf(), reason };
    let read_only = flags.is_read_only();

    if single_file {
        if path.is_dir() {
            return Err(reject("is a directory, expected a data file"));
        }
        let file_name = path.file_name().ok_or_else(|| reject("has no file name"))?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !parent.exists() {
            if read_only {
                return Err(reject("parent directory does not exist"));
            }
            fs::create_dir_all(parent)?;
        }
        Ok((fs::canonicalize(parent)?.join(file_name), None))
    } else {
        if path.exists() && !path.is_dir() {
            return Err(reject("is not a directory"));
        }
        if !path.exists() {
            if read_only {
                return Err(reject("does not exist"));
            }
            fs::create_dir_all(path)?;
        }
        Ok((fs::canonicalize(path)?, None))
    }
}

/// Where a copy of an environment with `flags` is written for `dest`.
fn copy_target(dest: &Path, flags: EnvironmentFlags) -> std::result::Result<PathBuf, Cause> {
    if flags.contains(EnvironmentFlags::NO_SUB_DIR) {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(dest.to_path_buf())
    } else {
        fs::create_dir_all(dest)?;
        Ok(dest.join(DATA_FILE_NAME))
    }
}

struct EnvironmentInner {
    config: EnvironmentConfig,
    dispatcher: Arc<dyn Dispatcher>,
    /// `None` once closed.
    open: RwLock<Option<OpenEnv>>,
    user_txns: AtomicUsize,
    internal_txns: AtomicUsize,
    copying: AtomicBool,
}

impl EnvironmentInner {
    const fn txn_counter(&self, visibility: Visibility) -> &AtomicUsize {
        match visibility {
            Visibility::User => &self.user_txns,
            Visibility::Internal => &self.internal_txns,
        }
    }
}

impl Drop for EnvironmentInner {
    fn drop(&mut self) {
        if let Some(open) = self.open.get_mut().take() {
            warn!(
                target: "libmdbx",
                path = %self.config.path.display(),
                "environment dropped without close; closing it"
            );
            if let Err(err) = open.shutdown() {
                warn!(target: "libmdbx", %err, "failed to close dropped environment");
            }
        }
    }
}

/// A transaction's claim on an open environment.
///
/// Counts as an open transaction until released or dropped, which keeps
/// [`Environment::close`] from pulling the engine out from under it.
pub(crate) struct TxnLease {
    env: Environment,
    ptr: EnvPtr,
    lifecycle: LifecycleHandle,
    visibility: Visibility,
    held: bool,
}

impl TxnLease {
    pub(crate) const fn env(&self) -> &Environment {
        &self.env
    }

    pub(crate) const fn env_ptr(&self) -> EnvPtr {
        self.ptr
    }

    pub(crate) const fn lifecycle(&self) -> &LifecycleHandle {
        &self.lifecycle
    }

    pub(crate) const fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Stops counting the transaction as open. Called once it has ended in
    /// the engine.
    pub(crate) fn release(&mut self) {
        if std::mem::take(&mut self.held) {
            self.env.inner.txn_counter(self.visibility).fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for TxnLease {
    fn drop(&mut self) {
        self.release();
    }
}

struct CopyGuard<'a>(&'a AtomicBool);

impl Drop for CopyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// An environment supports multiple databases, all residing in the same
/// shared-memory map.
///
/// Cloning is cheap and yields another handle to the same engine instance.
/// The engine is closed by [`Environment::close`]; dropping the last handle
/// of an environment that was never closed closes it with a warning.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvironmentInner>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.inner.config)
            .field("dispatcher", &self.inner.dispatcher.name())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Creates a new builder to specify options for opening an MDBX
    /// environment.
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Opens a 64 MiB environment with room for 12 named sub-databases in a
    /// fresh temporary directory.
    pub fn tmp() -> Result<Self> {
        Self::builder()
            .set_size(ByteUnit::Bytes, TMP_MAP_SIZE)
            .set_max_dbs(TMP_MAX_DBS)
            .build()
    }

    /// The resolved configuration.
    pub fn config(&self) -> &EnvironmentConfig {
        &self.inner.config
    }

    /// The environment directory, or the data file for
    /// [`EnvironmentFlags::NO_SUB_DIR`].
    pub fn path(&self) -> &Path {
        self.inner.config.path()
    }

    /// The open flags.
    pub fn flags(&self) -> EnvironmentFlags {
        self.inner.config.flags()
    }

    /// Returns true if the environment was opened as read-only.
    pub fn is_read_only(&self) -> bool {
        self.flags().is_read_only()
    }

    /// The dispatcher that runs this environment's dispatched work.
    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.inner.dispatcher
    }

    /// Returns `true` once [`Environment::close`] has succeeded.
    pub fn is_closed(&self) -> bool {
        self.inner.open.read().is_none()
    }

    /// Number of open transactions of the given visibility.
    pub fn open_transactions(&self, visibility: Visibility) -> usize {
        self.inner.txn_counter(visibility).load(Ordering::Acquire)
    }

    /// Runs `f` against the open engine, failing if the environment is
    /// closed.
    fn with_open<T>(&self, f: impl FnOnce(&OpenEnv) -> Result<T>) -> Result<T> {
        let open = self.inner.open.read();
        let env = open.as_ref().ok_or(EnvState::Closed)?;
        f(env)
    }

    /// Registers a new transaction against the open engine.
    pub(crate) fn lease(&self, visibility: Visibility) -> Result<TxnLease> {
        self.with_open(|env| {
            // Counted under the read lock, so `close` either sees this
            // transaction or runs before it.
            self.inner.txn_counter(visibility).fetch_add(1, Ordering::AcqRel);
            Ok(TxnLease {
                env: self.clone(),
                ptr: env.ptr,
                lifecycle: env.lifecycle.clone(),
                visibility,
                held: true,
            })
        })
    }

    /// Begins a user-managed read-only transaction.
    pub fn begin_ro_txn(&self) -> Result<Transaction<RO>> {
        self.begin_txn(Visibility::User)
    }

    /// Begins a user-managed read-write transaction.
    ///
    /// Blocks while another write transaction is open; writers are
    /// serialized by the engine.
    pub fn begin_rw_txn(&self) -> Result<Transaction<RW>> {
        self.begin_txn(Visibility::User)
    }

    /// Begins a transaction of kind `K`.
    pub(crate) fn begin_txn<K: TransactionKind>(
        &self,
        visibility: Visibility,
    ) -> Result<Transaction<K>> {
        Transaction::begin(self, visibility)
    }

    /// Returns the live size of the memory map in bytes.
    pub fn current_size(&self) -> Result<u64> {
        self.info().map(|info| info.map_size())
    }

    /// Retrieves information about this environment.
    pub fn info(&self) -> Result<Info> {
        self.with_open(|env| {
            let mut info = std::mem::MaybeUninit::<ffi::MDBX_envinfo>::zeroed();
            mdbx_result(unsafe {
                ffi::mdbx_env_info_ex(
                    env.ptr.0,
                    ptr::null(),
                    info.as_mut_ptr(),
                    size_of::<ffi::MDBX_envinfo>(),
                )
            })
            .map_err(|e| Error::EnvironmentIo(e.into()))?;
            // SAFETY: zero-initialized and filled in by the engine.
            Ok(Info(unsafe { info.assume_init() }))
        })
    }

    /// Retrieves statistics about the main database of this environment.
    pub fn stat(&self) -> Result<Stat> {
        self.with_open(|env| {
            let mut stat = Stat::new();
            mdbx_result(unsafe {
                ffi::mdbx_env_stat_ex(env.ptr.0, ptr::null(), stat.mdb_stat(), size_of::<Stat>())
            })
            .map_err(|e| Error::EnvironmentIo(e.into()))?;
            Ok(stat)
        })
    }

    /// Flushes the memory map to durable storage.
    ///
    /// With `force`, the flush happens even if the environment was opened
    /// with [`EnvironmentFlags::NO_SYNC`] or [`EnvironmentFlags::MAP_ASYNC`].
    /// Fails with [`Error::EnvironmentIo`] on a read-only or closed
    /// environment.
    #[instrument(target = "libmdbx", skip(self), fields(path = %self.path().display()))]
    pub fn sync(&self, force: bool) -> Result<()> {
        let open = self.inner.open.read();
        let env = open.as_ref().ok_or_else(|| Error::EnvironmentIo(EnvState::Closed.into()))?;
        mdbx_result(unsafe { ffi::mdbx_env_sync_ex(env.ptr.0, force, false) })
            .map_err(|e| Error::EnvironmentIo(e.into()))?;
        Ok(())
    }

    /// Writes a consistent point-in-time copy of the environment to `dest`.
    ///
    /// `dest` uses the same layout as this environment: a directory that
    /// receives the data file, or the data file itself for
    /// [`EnvironmentFlags::NO_SUB_DIR`]. The data file must not exist yet.
    /// Blocks until the copy is complete.
    pub fn copy(&self, dest: impl AsRef<Path>) -> Result<()> {
        self.copy_with(dest.as_ref(), ffi::MDBX_CP_DEFAULTS)
    }

    /// Like [`Environment::copy`], but omits free pages from the copy.
    pub fn copy_compact(&self, dest: impl AsRef<Path>) -> Result<()> {
        self.copy_with(dest.as_ref(), ffi::MDBX_CP_COMPACT)
    }

    #[instrument(target = "libmdbx", skip(self), fields(dest = %dest.display()))]
    fn copy_with(&self, dest: &Path, flags: ffi::MDBX_copy_flags_t) -> Result<()> {
        self.with_open(|env| {
            if self.inner.copying.swap(true, Ordering::AcqRel) {
                return Err(Error::EnvironmentCopy(Cause::CopyInProgress));
            }
            let _copying = CopyGuard(&self.inner.copying);

            let target = copy_target(dest, self.flags()).map_err(Error::EnvironmentCopy)?;
            let c_target = path_to_cstring(&target).map_err(Error::EnvironmentCopy)?;
            mdbx_result(unsafe { ffi::mdbx_env_copy(env.ptr.0, c_target.as_ptr(), flags) })
                .map_err(|e| Error::EnvironmentCopy(e.into()))?;

            debug!(target: "libmdbx", file = %target.display(), "environment copied");
            Ok(())
        })
    }

    /// Closes the environment and releases the engine.
    ///
    /// Fails with [`Error::EnvironmentState`] while any transaction is open;
    /// the environment stays usable and may be closed again once they end.
    /// A temporary environment's directory is removed.
    #[instrument(target = "libmdbx", skip(self), fields(path = %self.path().display()))]
    pub fn close(&self) -> Result<()> {
        let mut open = self.inner.open.write();
        if open.is_none() {
            return Err(EnvState::Closed.into());
        }

        let user = self.open_transactions(Visibility::User);
        let internal = self.open_transactions(Visibility::Internal);
        if user + internal > 0 {
            debug!(target: "libmdbx", user, internal, "close refused, transactions open");
            return Err(EnvState::TransactionsOpen { user, internal }.into());
        }

        let env = open.take().ok_or(EnvState::Closed)?;
        drop(open);
        env.shutdown().map_err(Error::EnvironmentIo)?;
        debug!(target: "libmdbx", "environment closed");
        Ok(())
    }

    /// Runs `f` in an internally-managed read-only transaction on the
    /// dispatcher.
    ///
    /// The transaction is released when `f` returns. An error from `f` is
    /// delivered through the returned handle.
    pub fn read<T, F>(&self, f: F) -> Dispatched<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<RO>) -> Result<T> + Send + 'static,
    {
        let env = self.clone();
        dispatch::submit(self.inner.dispatcher.as_ref(), move |_| {
            let mut txn = env.begin_txn::<RO>(Visibility::Internal)?;
            let out = f(&txn);
            let released = txn.commit();
            let value = out?;
            released?;
            Ok(value)
        })
    }

    /// Runs `f` in an internally-managed read-write transaction on the
    /// dispatcher.
    ///
    /// The transaction commits if `f` succeeds and aborts if it fails or if
    /// the unit was canceled while `f` ran.
    pub fn write<T, F>(&self, f: F) -> Dispatched<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<RW>) -> Result<T> + Send + 'static,
    {
        let env = self.clone();
        dispatch::submit(self.inner.dispatcher.as_ref(), move |cancel| {
            let mut txn = env.begin_txn::<RW>(Visibility::Internal)?;
            match f(&txn) {
                Ok(value) if !cancel.is_canceled() => {
                    txn.commit()?;
                    Ok(value)
                }
                Ok(_) => {
                    txn.abort()?;
                    debug!(target: "libmdbx", "canceled write aborted");
                    Err(DispatchError::Canceled.into())
                }
                Err(err) => {
                    txn.abort()?;
                    Err(err)
                }
            }
        })
    }

    /// Runs arbitrary environment work on the dispatcher.
    pub fn spawn<T, F>(&self, f: F) -> Dispatched<T>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T> + Send + 'static,
    {
        let env = self.clone();
        dispatch::submit(self.inner.dispatcher.as_ref(), move |_| f(&env))
    }
}
