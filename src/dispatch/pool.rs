use crate::dispatch::{Dispatcher, Job};
use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    fmt, io,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

/// Default name of an [`IoPool`] and prefix of its worker threads.
const DEFAULT_NAME: &str = "mdbx-io";

/// Default idle time after which a worker retires.
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Configuration for an [`IoPool`].
#[derive(Debug, Clone)]
pub struct IoPoolBuilder {
    name: &'static str,
    max_threads: usize,
    keep_alive: Duration,
}

impl Default for IoPoolBuilder {
    fn default() -> Self {
        let cores = thread::available_parallelism().map_or(1, |n| n.get());
        Self { name: DEFAULT_NAME, max_threads: cores * 10, keep_alive: DEFAULT_KEEP_ALIVE }
    }
}

impl IoPoolBuilder {
    /// Sets the pool name, also used as the worker thread prefix.
    pub const fn name(&mut self, name: &'static str) -> &mut Self {
        self.name = name;
        self
    }

    /// Caps the number of live worker threads. Clamped to at least one.
    ///
    /// Jobs that block on each other (a writer stalled on the writer lock
    /// while the step that would release it sits in the queue) can deadlock
    /// a pool whose cap is reached.
    pub const fn max_threads(&mut self, max_threads: usize) -> &mut Self {
        self.max_threads = if max_threads == 0 { 1 } else { max_threads };
        self
    }

    /// Sets how long an idle worker waits for work before it exits.
    pub const fn keep_alive(&mut self, keep_alive: Duration) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Creates the pool. No thread is started until the first job arrives.
    pub fn build(&self) -> IoPool {
        IoPool {
            shared: Arc::new(Shared {
                name: self.name,
                max_threads: self.max_threads,
                keep_alive: self.keep_alive,
                queue: Mutex::new(Queue::default()),
                available: Condvar::new(),
                next_worker: AtomicUsize::new(0),
            }),
        }
    }
}

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    idle: usize,
    threads: usize,
    shutdown: bool,
}

struct Shared {
    name: &'static str,
    max_threads: usize,
    keep_alive: Duration,
    queue: Mutex<Queue>,
    available: Condvar,
    next_worker: AtomicUsize,
}

impl Shared {
    fn spawn_worker(self: &Arc<Self>) -> io::Result<()> {
        let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(self);
        thread::Builder::new()
            .name(format!("{}-{id}", self.name))
            .spawn(move || shared.work())
            .map(drop)
    }

    /// Worker loop: run queued jobs in FIFO order, retire after
    /// `keep_alive` without work or once the pool is shut down and drained.
    fn work(&self) {
        tracing::trace!(target: "libmdbx", pool = self.name, "worker started");
        while let Some(job) = self.next_job() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                let msg = panic
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("<non-string panic payload>");
                tracing::error!(target: "libmdbx", pool = self.name, panic = msg, "work unit panicked");
            }
        }
        tracing::trace!(target: "libmdbx", pool = self.name, "worker retired");
    }

    fn next_job(&self) -> Option<Job> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(job) = queue.jobs.pop_front() {
                return Some(job);
            }
            if queue.shutdown {
                break;
            }
            queue.idle += 1;
            let timed_out = self.available.wait_for(&mut queue, self.keep_alive).timed_out();
            queue.idle -= 1;
            if timed_out && queue.jobs.is_empty() {
                break;
            }
        }
        queue.threads -= 1;
        None
    }
}

/// Elastic pool of named OS threads for blocking engine work.
///
/// A worker is started whenever a job arrives and no idle worker is left to
/// take it, up to the configured cap. Workers exit after an idle keep-alive.
/// Panicking jobs are caught and logged; the worker survives.
///
/// Dropping the pool shuts it down.
pub struct IoPool {
    shared: Arc<Shared>,
}

impl fmt::Debug for IoPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.shared.queue.lock();
        f.debug_struct("IoPool")
            .field("name", &self.shared.name)
            .field("threads", &queue.threads)
            .field("idle", &queue.idle)
            .field("queued", &queue.jobs.len())
            .field("shutdown", &queue.shutdown)
            .finish()
    }
}

impl Default for IoPool {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl IoPool {
    /// Creates a pool with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a builder for a customized pool.
    pub fn builder() -> IoPoolBuilder {
        IoPoolBuilder::default()
    }

    /// Number of live worker threads.
    pub fn threads(&self) -> usize {
        self.shared.queue.lock().threads
    }

    /// Stops accepting work. Already queued jobs still run.
    pub fn shutdown(&self) {
        let mut queue = self.shared.queue.lock();
        if !queue.shutdown {
            queue.shutdown = true;
            tracing::debug!(target: "libmdbx", pool = self.shared.name, queued = queue.jobs.len(), "pool shutting down");
        }
        self.shared.available.notify_all();
    }

    /// Returns `true` once [`IoPool::shutdown`] has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shared.queue.lock().shutdown
    }
}

impl Dispatcher for IoPool {
    fn name(&self) -> &'static str {
        self.shared.name
    }

    fn execute(&self, job: Job) -> Result<(), Job> {
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return Err(job);
        }
        queue.jobs.push_back(job);

        if queue.jobs.len() > queue.idle && queue.threads < self.shared.max_threads {
            queue.threads += 1;
            if let Err(err) = self.shared.spawn_worker() {
                queue.threads -= 1;
                tracing::warn!(target: "libmdbx", pool = self.shared.name, %err, "failed to start worker");
                // Nothing would ever run the job.
                if queue.threads == 0
                    && let Some(job) = queue.jobs.pop_back()
                {
                    return Err(job);
                }
            }
        }
        self.shared.available.notify_one();
        Ok(())
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
