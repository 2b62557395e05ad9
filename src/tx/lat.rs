use std::time::Duration;

/// Timings of the stages of one commit.
///
/// The engine reports each stage in 1/65536 of a second. A read-only commit
/// reports zeros.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct CommitLatency(ffi::MDBX_commit_latency);

impl Default for CommitLatency {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitLatency {
    pub(crate) const fn new() -> Self {
        // SAFETY: a plain C struct of integers, all-zero is valid.
        unsafe { Self(std::mem::zeroed()) }
    }

    pub(crate) const fn mdb_commit_latency(&mut self) -> *mut ffi::MDBX_commit_latency {
        &mut self.0
    }

    /// Preparing the commit: merging nested work and updating sub-database
    /// records.
    #[inline]
    pub const fn preparation(&self) -> Duration {
        Self::time_to_duration(self.0.preparation)
    }

    /// Wall-clock time spent updating the free-page list.
    #[inline]
    pub const fn gc_wallclock(&self) -> Duration {
        Self::time_to_duration(self.0.gc_wallclock)
    }

    /// Internal audit, if enabled in the engine build.
    #[inline]
    pub const fn audit(&self) -> Duration {
        Self::time_to_duration(self.0.audit)
    }

    /// Writing dirty pages to the filesystem.
    #[inline]
    pub const fn write(&self) -> Duration {
        Self::time_to_duration(self.0.write)
    }

    /// Flushing written data to durable storage.
    #[inline]
    pub const fn sync(&self) -> Duration {
        Self::time_to_duration(self.0.sync)
    }

    /// Releasing transaction resources.
    #[inline]
    pub const fn ending(&self) -> Duration {
        Self::time_to_duration(self.0.ending)
    }

    /// The whole commit.
    #[inline]
    pub const fn whole(&self) -> Duration {
        Self::time_to_duration(self.0.whole)
    }

    /// CPU time spent updating the free-page list.
    #[inline]
    pub const fn gc_cputime(&self) -> Duration {
        Self::time_to_duration(self.0.gc_cputime)
    }

    #[inline]
    const fn time_to_duration(time: u32) -> Duration {
        Duration::from_nanos(time as u64 * (1_000_000_000 / 65_536))
    }
}
