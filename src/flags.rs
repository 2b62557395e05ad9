use bitflags::bitflags;
use ffi::{
    MDBX_CREATE, MDBX_DUPSORT, MDBX_INTEGERKEY, MDBX_NODUPDATA, MDBX_NOOVERWRITE, MDBX_REVERSEKEY,
    MDBX_APPEND, MDBX_db_flags_t, MDBX_env_flags_t, MDBX_put_flags_t,
};

bitflags! {
    /// Open-time options of an [`Environment`].
    ///
    /// Each bit toggles one engine behavior. The thread-independence mode is
    /// not part of this set: every environment is opened with it.
    ///
    /// [`Environment`]: crate::Environment
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct EnvironmentFlags: u32 {
        /// Pin the map to its configured size so it is never grown or moved.
        /// Requires an explicit map size.
        const FIXED_MAP = 1 << 0;
        /// Store the environment in a single file instead of a directory.
        const NO_SUB_DIR = 1 << 1;
        /// Open the environment read-only.
        const READ_ONLY = 1 << 2;
        /// Use a writable memory map.
        const WRITE_MAP = 1 << 3;
        /// Skip the metadata flush after commit.
        const NO_META_SYNC = 1 << 4;
        /// Skip data flushes after commit.
        const NO_SYNC = 1 << 5;
        /// Flush asynchronously, keeping the last steady commit recoverable.
        const MAP_ASYNC = 1 << 6;
        /// Disable inter-process locking; the environment is used by this
        /// process only.
        const NO_LOCK = 1 << 7;
        /// Disable OS read-ahead on the map.
        const NO_READAHEAD = 1 << 8;
        /// Do not zero-initialize newly allocated pages.
        const NO_MEM_INIT = 1 << 9;
    }
}

impl EnvironmentFlags {
    /// Engine flags for `mdbx_env_open`, always including `MDBX_NOTLS`.
    pub(crate) fn engine_flags(self) -> MDBX_env_flags_t {
        // Never tie transactions to threads, dispatched work resumes on
        // whichever worker picks it up.
        let mut flags: MDBX_env_flags_t = ffi::MDBX_NOTLS;

        if self.contains(Self::NO_SUB_DIR) {
            flags |= ffi::MDBX_NOSUBDIR;
        }
        if self.contains(Self::READ_ONLY) {
            flags |= ffi::MDBX_RDONLY;
        }
        if self.contains(Self::WRITE_MAP) {
            flags |= ffi::MDBX_WRITEMAP;
        }
        if self.contains(Self::NO_META_SYNC) {
            flags |= ffi::MDBX_NOMETASYNC;
        }
        if self.contains(Self::MAP_ASYNC) {
            flags |= ffi::MDBX_SAFE_NOSYNC;
        }
        if self.contains(Self::NO_SYNC) {
            flags |= ffi::MDBX_UTTERLY_NOSYNC;
        }
        if self.contains(Self::NO_LOCK) {
            flags |= ffi::MDBX_EXCLUSIVE;
        }
        if self.contains(Self::NO_READAHEAD) {
            flags |= ffi::MDBX_NORDAHEAD;
        }
        if self.contains(Self::NO_MEM_INIT) {
            flags |= ffi::MDBX_NOMEMINIT;
        }
        flags
    }

    /// Returns `true` if the environment rejects writes.
    pub const fn is_read_only(&self) -> bool {
        self.contains(Self::READ_ONLY)
    }
}

bitflags! {
    /// Sub-database options.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct DatabaseFlags: MDBX_db_flags_t {
        /// Keys are compared in reverse byte order.
        const REVERSE_KEY = MDBX_REVERSEKEY;
        /// Duplicate keys may be stored, sorted by value.
        const DUP_SORT = MDBX_DUPSORT;
        /// Keys are native-endian 4 or 8 byte integers.
        const INTEGER_KEY = MDBX_INTEGERKEY;
        /// Create the sub-database if it does not exist.
        const CREATE = MDBX_CREATE;
    }
}

bitflags! {
    /// Options for [`Transaction::put`].
    ///
    /// [`Transaction::put`]: crate::Transaction::put
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct WriteFlags: MDBX_put_flags_t {
        /// Fail with [`MdbxError::KeyExist`] if the key is already present.
        ///
        /// [`MdbxError::KeyExist`]: crate::MdbxError::KeyExist
        const NO_OVERWRITE = MDBX_NOOVERWRITE;
        /// Fail if the exact key/value pair is already present.
        const NO_DUP_DATA = MDBX_NODUPDATA;
        /// Append the pair at the end of the sub-database. Keys must be
        /// supplied in sorted order.
        const APPEND = MDBX_APPEND;
    }
}

/// Units accepted by [`EnvironmentBuilder::set_size`].
///
/// Multiples are binary: one [`ByteUnit::Mega`] is `1024 * 1024` bytes.
///
/// [`EnvironmentBuilder::set_size`]: crate::EnvironmentBuilder::set_size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteUnit {
    /// Bytes.
    Bytes,
    /// Kibibytes.
    Kilo,
    /// Mebibytes.
    Mega,
    /// Gibibytes.
    Giga,
    /// Tebibytes.
    Tera,
}

impl ByteUnit {
    /// Converts `value` in this unit to bytes, saturating on overflow.
    pub const fn to_bytes(self, value: u64) -> u64 {
        let shift = match self {
            Self::Bytes => 0,
            Self::Kilo => 10,
            Self::Mega => 20,
            Self::Giga => 30,
            Self::Tera => 40,
        };
        if value > (u64::MAX >> shift) { u64::MAX } else { value << shift }
    }
}
