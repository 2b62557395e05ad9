//! Raw engine calls shared by transactions and cursors.

use crate::{
    error::{MdbxError, MdbxResult, mdbx_result},
    sys::{
        EnvPtr,
        txn_manager::{LifecycleHandle, RawTxPtr},
    },
};
use std::{
    ffi::c_void,
    ptr, slice,
    thread::sleep,
    time::{Duration, Instant},
};

/// How long a read begin waits for a free reader slot.
pub(crate) const READER_SLOT_WAIT: Duration = Duration::from_secs(5);

const MAX_BACKOFF: Duration = Duration::from_millis(250);

/// Capped exponential sleep schedule, starting at one millisecond.
#[derive(Debug)]
struct Backoff(Duration);

impl Backoff {
    const fn new() -> Self {
        Self(Duration::from_millis(1))
    }

    fn snooze(&mut self) {
        sleep(self.0);
        self.0 = (self.0 * 2).min(MAX_BACKOFF);
    }
}

#[inline]
pub(crate) const fn slice_to_val(slice: &[u8]) -> ffi::MDBX_val {
    ffi::MDBX_val { iov_len: slice.len(), iov_base: slice.as_ptr() as *mut c_void }
}

#[inline]
pub(crate) const fn empty_val() -> ffi::MDBX_val {
    ffi::MDBX_val { iov_len: 0, iov_base: ptr::null_mut() }
}

/// Copies the bytes behind `val` out of the map.
///
/// # Safety
///
/// `val` must point into a page of a live transaction.
#[inline]
pub(crate) unsafe fn val_to_vec(val: &ffi::MDBX_val) -> Vec<u8> {
    if val.iov_len == 0 {
        return Vec::new();
    }
    unsafe { slice::from_raw_parts(val.iov_base as *const u8, val.iov_len) }.to_vec()
}

/// Begins a read-only transaction on the calling thread.
///
/// Waits up to [`READER_SLOT_WAIT`] for a reader slot when the table is
/// full.
pub(crate) fn begin_ro(env: EnvPtr, flags: ffi::MDBX_txn_flags_t) -> MdbxResult<RawTxPtr> {
    let deadline = Instant::now() + READER_SLOT_WAIT;
    let mut backoff = Backoff::new();
    loop {
        let mut txn: *mut ffi::MDBX_txn = ptr::null_mut();
        let res = mdbx_result(unsafe {
            ffi::mdbx_txn_begin_ex(env.0, ptr::null_mut(), flags, &mut txn, ptr::null_mut())
        });
        match res {
            Ok(_) => return Ok(RawTxPtr(txn)),
            Err(MdbxError::ReadersFull) if Instant::now() < deadline => {
                tracing::trace!(target: "libmdbx", "reader table full, retrying");
                backoff.snooze();
            }
            Err(e) => return Err(e),
        }
    }
}

/// Begins a read-write transaction on the lifecycle thread.
///
/// Blocks until the writer lock is free. The engine reports
/// [`MdbxError::Busy`] while another write transaction of this process holds
/// it.
pub(crate) fn begin_rw(lifecycle: &LifecycleHandle, span: &tracing::Span) -> MdbxResult<RawTxPtr> {
    let mut warned = false;
    let mut backoff = Backoff::new();
    loop {
        match lifecycle.begin(span.clone()) {
            Err(MdbxError::Busy) => {
                if !warned {
                    warned = true;
                    tracing::warn!(
                        target: "libmdbx",
                        "Process stalled, awaiting read-write transaction lock."
                    );
                }
                backoff.snooze();
            }
            res => return res,
        }
    }
}

/// Reads one entry with a cursor operation and copies it out.
///
/// `data` is only read by operations that match on the value, such as
/// `MDBX_GET_BOTH_RANGE`. Returns `Ok(None)` when the cursor runs off either
/// end.
///
/// # Safety
///
/// `cursor` must be a live cursor of a live transaction.
pub(crate) unsafe fn cursor_get(
    cursor: *mut ffi::MDBX_cursor,
    key: Option<&[u8]>,
    data: Option<&[u8]>,
    op: ffi::MDBX_cursor_op,
) -> MdbxResult<Option<(Vec<u8>, Vec<u8>)>> {
    let mut key_val = key.map_or_else(empty_val, slice_to_val);
    let mut data_val = data.map_or_else(empty_val, slice_to_val);
    match unsafe { ffi::mdbx_cursor_get(cursor, &mut key_val, &mut data_val, op) } {
        ffi::MDBX_SUCCESS => Ok(Some(unsafe { (val_to_vec(&key_val), val_to_vec(&data_val)) })),
        ffi::MDBX_NOTFOUND | ffi::MDBX_ENODATA | ffi::MDBX_RESULT_TRUE => Ok(None),
        code => Err(MdbxError::from_err_code(code)),
    }
}
