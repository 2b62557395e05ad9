use crate::{
    Database, DatabaseFlags, Transaction, TransactionKind,
    error::{Error, MdbxError, MdbxResult, Result, mdbx_result},
    tx::ops,
};
use ffi::{
    MDBX_FIRST, MDBX_GET_BOTH_RANGE, MDBX_GET_CURRENT, MDBX_LAST, MDBX_NEXT, MDBX_NEXT_NODUP, MDBX_PREV,
    MDBX_SET_RANGE,
};
use std::{fmt, ptr};

/// An owned key/value pair copied out of the map.
pub type Entry = (Vec<u8>, Vec<u8>);

/// One step of a [`Transaction::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Entries in key order, duplicates in value order.
    pub entries: Vec<Entry>,
    /// The entry the next page starts at, or `None` once the sub-database
    /// is exhausted. Pass it to [`Transaction::scan_resume`].
    pub next: Option<Entry>,
}

/// A cursor for navigating the items within a database.
///
/// Every positioning call returns a copy of the entry it lands on, or `None`
/// when it runs off the end.
pub struct Cursor<'tx, K>
where
    K: TransactionKind,
{
    txn: &'tx Transaction<K>,
    cursor: *mut ffi::MDBX_cursor,
    db: Database,
}

impl<'tx, K> Cursor<'tx, K>
where
    K: TransactionKind,
{
    pub(crate) fn new(
        txn: &'tx Transaction<K>,
        db: Database,
        txn_ptr: *mut ffi::MDBX_txn,
    ) -> Result<Self> {
        let mut cursor: *mut ffi::MDBX_cursor = ptr::null_mut();
        mdbx_result(unsafe { ffi::mdbx_cursor_open(txn_ptr, db.dbi(), &mut cursor) })
            .map_err(Error::Database)?;
        Ok(Self { txn, cursor, db })
    }

    /// Returns the transaction associated with this cursor.
    pub const fn txn(&self) -> &'tx Transaction<K> {
        self.txn
    }

    /// Returns the database associated with this cursor.
    pub const fn db(&self) -> Database {
        self.db
    }

    fn get(&mut self, key: Option<&[u8]>, op: ffi::MDBX_cursor_op) -> Result<Option<Entry>> {
        self.get_with(key, None, op)
    }

    fn get_with(
        &mut self,
        key: Option<&[u8]>,
        data: Option<&[u8]>,
        op: ffi::MDBX_cursor_op,
    ) -> Result<Option<Entry>> {
        let res: MdbxResult<_> = unsafe { ops::cursor_get(self.cursor, key, data, op) };
        res.map_err(Error::Database)
    }

    /// Position at first key/data item.
    pub fn first(&mut self) -> Result<Option<Entry>> {
        self.get(None, MDBX_FIRST)
    }

    /// Position at last key/data item.
    pub fn last(&mut self) -> Result<Option<Entry>> {
        self.get(None, MDBX_LAST)
    }

    /// Position at next data item.
    pub fn next(&mut self) -> Result<Option<Entry>> {
        self.get(None, MDBX_NEXT)
    }

    /// Position at previous data item.
    pub fn prev(&mut self) -> Result<Option<Entry>> {
        self.get(None, MDBX_PREV)
    }

    /// Return key/data at current cursor position.
    pub fn get_current(&mut self) -> Result<Option<Entry>> {
        self.get(None, MDBX_GET_CURRENT)
    }

    /// Position at first data item of the next key.
    pub fn next_nodup(&mut self) -> Result<Option<Entry>> {
        self.get(None, MDBX_NEXT_NODUP)
    }

    /// Position at first key greater than or equal to specified key.
    pub fn set_range(&mut self, key: &[u8]) -> Result<Option<Entry>> {
        self.get(Some(key), MDBX_SET_RANGE)
    }

    /// Position at `key`, at the first of its values greater than or equal
    /// to `value`. Only meaningful for [`DatabaseFlags::DUP_SORT`].
    ///
    /// [`DatabaseFlags::DUP_SORT`]: crate::DatabaseFlags::DUP_SORT
    pub fn get_both_range(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Entry>> {
        if !self.db.flags().contains(DatabaseFlags::DUP_SORT) {
            return Err(Error::Database(MdbxError::Incompatible));
        }
        self.get_with(Some(key), Some(value), MDBX_GET_BOTH_RANGE)
    }

    /// Position at the first entry not before `(key, value)` in scan order.
    ///
    /// Without duplicates the value is ignored. With duplicates, a key whose
    /// values all sort before `value` is skipped.
    pub(crate) fn seek_entry(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Entry>> {
        if !self.db.flags().contains(DatabaseFlags::DUP_SORT) {
            return self.set_range(key);
        }
        if let Some(entry) = self.get_both_range(key, value)? {
            return Ok(Some(entry));
        }
        match self.set_range(key)? {
            Some((found, _)) if found == key => self.next_nodup(),
            other => Ok(other),
        }
    }

    /// Iterate over database items from the first key.
    pub fn iter_start(&mut self) -> Iter<'_, 'tx, K> {
        let state = match self.first() {
            Ok(Some(first)) => IterState::Init(first),
            Ok(None) => IterState::End,
            Err(err) => IterState::Failed(err),
        };
        Iter { cursor: self, state }
    }

    /// Iterate over database items starting from the given key.
    pub fn iter_from(&mut self, key: &[u8]) -> Iter<'_, 'tx, K> {
        let state = match self.set_range(key) {
            Ok(Some(first)) => IterState::Init(first),
            Ok(None) => IterState::End,
            Err(err) => IterState::Failed(err),
        };
        Iter { cursor: self, state }
    }
}

impl<K> fmt::Debug for Cursor<'_, K>
where
    K: TransactionKind,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").field("db", &self.db).finish_non_exhaustive()
    }
}

impl<K> Drop for Cursor<'_, K>
where
    K: TransactionKind,
{
    fn drop(&mut self) {
        // The borrow keeps the transaction open until after this runs.
        unsafe { ffi::mdbx_cursor_close(self.cursor) };
    }
}

/// Where an [`Iter`] stands.
enum IterState {
    /// A positioning call already produced the first entry.
    Init(Entry),
    Active,
    /// Positioning failed; the error is yielded once.
    Failed(Error),
    End,
}

/// An iterator over the key/value pairs of a sub-database, in key order.
///
/// Stops after the first error.
pub struct Iter<'cur, 'tx, K>
where
    K: TransactionKind,
{
    cursor: &'cur mut Cursor<'tx, K>,
    state: IterState,
}

impl<K> fmt::Debug for Iter<'_, '_, K>
where
    K: TransactionKind,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("cursor", &self.cursor).finish_non_exhaustive()
    }
}

impl<K> Iterator for Iter<'_, '_, K>
where
    K: TransactionKind,
{
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.state, IterState::End) {
            IterState::Init(first) => {
                self.state = IterState::Active;
                Some(Ok(first))
            }
            IterState::Active => match self.cursor.next() {
                Ok(Some(entry)) => {
                    self.state = IterState::Active;
                    Some(Ok(entry))
                }
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            },
            IterState::Failed(err) => Some(Err(err)),
            IterState::End => None,
        }
    }
}
