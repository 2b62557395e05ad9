use crate::flags::DatabaseFlags;

/// Handle to a sub-database, valid for the lifetime of its environment.
///
/// A handle opened by a write transaction that created the sub-database only
/// becomes usable by other transactions once that transaction commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Database {
    dbi: ffi::MDBX_dbi,
    flags: DatabaseFlags,
}

impl Database {
    pub(crate) const fn new(dbi: ffi::MDBX_dbi, flags: DatabaseFlags) -> Self {
        Self { dbi, flags }
    }

    /// Returns the engine's handle number.
    pub const fn dbi(&self) -> ffi::MDBX_dbi {
        self.dbi
    }

    /// Returns the flags the sub-database was created with.
    pub const fn flags(&self) -> DatabaseFlags {
        self.flags
    }
}
