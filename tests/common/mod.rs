//! Common test infrastructure.
#![allow(missing_docs, dead_code, unreachable_pub)]
use signet_mdbx_dispatch::{
    ByteUnit, Dispatcher, Environment, Job, Result, Transaction, RW, WriteFlags,
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tempfile::{TempDir, tempdir};

pub fn key(n: u32) -> Vec<u8> {
    format!("key{n:05}").into_bytes()
}

pub fn data(n: u32) -> Vec<u8> {
    format!("data{n}").into_bytes()
}

/// Opens a fresh environment in its own directory. The directory outlives
/// the environment so reopening and copying can be tested.
pub fn open_env() -> (TempDir, Environment) {
    let dir = tempdir().unwrap();
    let env = Environment::builder()
        .set_size(ByteUnit::Mega, 64)
        .set_max_dbs(4)
        .open(dir.path())
        .unwrap();
    (dir, env)
}

/// Writes `n` entries into the default sub-database.
pub fn fill(env: &Environment, n: u32) {
    let mut txn = env.begin_rw_txn().unwrap();
    write_entries(&txn, n).unwrap();
    txn.commit().unwrap();
}

pub fn write_entries(txn: &Transaction<RW>, n: u32) -> Result<()> {
    let db = txn.open_db(None)?;
    for i in 0..n {
        txn.put(db, key(i), data(i), WriteFlags::empty())?;
    }
    Ok(())
}

/// Reads every entry of the default sub-database.
pub fn dump(env: &Environment) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut txn = env.begin_ro_txn().unwrap();
    let db = txn.open_db(None).unwrap();
    let entries = {
        let mut cursor = txn.cursor(db).unwrap();
        cursor.iter_start().collect::<Result<Vec<_>>>().unwrap()
    };
    txn.commit().unwrap();
    entries
}

/// Runs jobs on fresh threads and counts them.
#[derive(Debug, Default)]
pub struct CountingDispatcher {
    pub jobs: Arc<AtomicUsize>,
}

impl Dispatcher for CountingDispatcher {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn execute(&self, job: Job) -> std::result::Result<(), Job> {
        self.jobs.fetch_add(1, Ordering::SeqCst);
        std::thread::spawn(job);
        Ok(())
    }
}

/// Refuses all work.
#[derive(Debug, Default)]
pub struct ClosedDispatcher;

impl Dispatcher for ClosedDispatcher {
    fn name(&self) -> &'static str {
        "closed"
    }

    fn execute(&self, job: Job) -> std::result::Result<(), Job> {
        Err(job)
    }
}
