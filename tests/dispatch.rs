#![allow(missing_docs)]
mod common;

use common::*;
use signet_mdbx_dispatch::{tx::Entry, *};
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

#[tokio::test]
async fn test_write_then_read() {
    let env = Environment::tmp().unwrap();

    env.write(|txn| write_entries(txn, 10)).await.unwrap();
    let (value, entries) = env
        .read(|txn| {
            let db = txn.open_db(None)?;
            Ok((txn.get(db, key(3))?, txn.entries(db)?))
        })
        .await
        .unwrap();

    assert_eq!(value, Some(data(3)));
    assert_eq!(entries, 10);
    assert_eq!(env.open_transactions(Visibility::Internal), 0);
    env.close().unwrap();
}

#[tokio::test]
async fn test_failed_write_aborts() {
    let env = Environment::tmp().unwrap();

    let err = env
        .write(|txn| {
            write_entries(txn, 10)?;
            Err::<(), _>(Error::Database(MdbxError::Invalid))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Database(MdbxError::Invalid)));

    let entries = env.read(|txn| txn.entries(txn.open_db(None)?)).await.unwrap();
    assert_eq!(entries, 0);
    assert_eq!(env.open_transactions(Visibility::Internal), 0);
}

#[tokio::test]
async fn test_read_errors_are_surfaced() {
    let env = Environment::tmp().unwrap();
    let err = env.read(|txn| txn.open_db(Some("missing"))).await.unwrap_err();
    assert!(matches!(err, Error::Database(MdbxError::NotFound)));
    assert_eq!(env.open_transactions(Visibility::Internal), 0);
}

#[tokio::test]
async fn test_internal_transactions_block_close() {
    let env = Environment::tmp().unwrap();

    let (visibility, internal, closed) = env
        .read(|txn| {
            let env = txn.env();
            Ok((txn.visibility(), env.open_transactions(Visibility::Internal), env.close()))
        })
        .await
        .unwrap();

    assert_eq!(visibility, Visibility::Internal);
    assert_eq!(internal, 1);
    assert!(matches!(
        closed,
        Err(Error::EnvironmentState(EnvState::TransactionsOpen { user: 0, internal: 1 }))
    ));
    env.close().unwrap();
}

#[tokio::test]
async fn test_closed_env_rejects_dispatched_work() {
    let env = Environment::tmp().unwrap();
    env.close().unwrap();
    let err = env.read(|_| Ok(())).await.unwrap_err();
    assert!(matches!(err, Error::EnvironmentState(EnvState::Closed)));
}

#[tokio::test]
async fn test_stepwise_scan_across_workers() {
    let env = Environment::tmp().unwrap();
    fill(&env, 50);

    let mut txn = env.begin_ro_txn().unwrap();
    let db = txn.open_db(None).unwrap();

    let mut seen = Vec::new();
    let mut workers = HashSet::new();
    let mut resume: Option<Entry> = None;
    loop {
        let from = resume.take();
        let (back, (page, worker)) = txn
            .dispatch(move |txn| {
                let worker = thread::current().name().map(str::to_owned);
                let page = match &from {
                    Some(next) => txn.scan_resume(db, next, 7),
                    None => txn.scan(db, None, 7),
                };
                (page, worker)
            })
            .await
            .unwrap();
        txn = back;

        let page = page.unwrap();
        seen.extend(page.entries.into_iter().map(|(k, _)| k));
        workers.insert(worker.unwrap());
        match page.next {
            Some(next) => resume = Some(next),
            None => break,
        }
    }

    assert_eq!(seen, (0..50).map(key).collect::<Vec<_>>());
    assert!(workers.iter().all(|name| name.starts_with("mdbx-io-")), "{workers:?}");

    txn.commit().unwrap();
    env.close().unwrap();
}

#[tokio::test]
async fn test_dispatched_write_transaction() {
    let env = Environment::tmp().unwrap();

    let txn = env.begin_rw_txn().unwrap();
    let (mut txn, res) = txn.dispatch(|txn| write_entries(txn, 5)).await.unwrap();
    res.unwrap();
    txn.commit().unwrap();

    assert_eq!(dump(&env).len(), 5);
}

#[tokio::test]
async fn test_custom_dispatcher() {
    let dispatcher = CountingDispatcher::default();
    let jobs = dispatcher.jobs.clone();
    let env = Environment::builder().set_dispatcher(Arc::new(dispatcher)).build().unwrap();
    assert_eq!(env.dispatcher().name(), "counting");

    env.write(|txn| write_entries(txn, 3)).await.unwrap();
    env.read(|txn| txn.entries(txn.open_db(None)?)).await.unwrap();
    assert_eq!(jobs.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tokio_dispatcher() {
    let env = Environment::builder()
        .set_dispatcher(Arc::new(TokioDispatcher::current().unwrap()))
        .build()
        .unwrap();

    env.write(|txn| write_entries(txn, 20)).await.unwrap();
    let entries = env.read(|txn| txn.entries(txn.open_db(None)?)).await.unwrap();
    assert_eq!(entries, 20);
    env.close().unwrap();
}

#[tokio::test]
async fn test_rejected_by_dispatcher() {
    let env = Environment::builder().set_dispatcher(Arc::new(ClosedDispatcher)).build().unwrap();
    let err = env.write(|txn| write_entries(txn, 1)).await.unwrap_err();
    assert!(matches!(err, Error::Dispatch(DispatchError::Rejected("closed"))));

    // a rejected transaction step aborts the transaction
    let txn = env.begin_rw_txn().unwrap();
    let err = txn.dispatch(|_| ()).await.unwrap_err();
    assert!(matches!(err, Error::Dispatch(DispatchError::Rejected("closed"))));
    assert_eq!(env.open_transactions(Visibility::User), 0);
    env.close().unwrap();
}

#[tokio::test]
async fn test_rejected_after_pool_shutdown() {
    let pool = Arc::new(IoPool::builder().name("test-io").build());
    let env = Environment::builder().set_dispatcher(pool.clone()).build().unwrap();
    env.read(|_| Ok(())).await.unwrap();

    pool.shutdown();
    let err = env.read(|_| Ok(())).await.unwrap_err();
    assert!(matches!(err, Error::Dispatch(DispatchError::Rejected("test-io"))));
}

#[tokio::test]
async fn test_timeout_aborts_write() {
    let env = Environment::tmp().unwrap();

    let err = env
        .write(|txn| {
            let db = txn.open_db(None)?;
            txn.put(db, b"slow", b"value", WriteFlags::empty())?;
            thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .timeout(Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));

    // queues behind the timed-out writer
    env.write(|_| Ok(())).await.unwrap();
    let value = env.read(|txn| txn.get(txn.open_db(None)?, b"slow")).await.unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn test_canceled_unit_is_skipped() {
    let pool = Arc::new(IoPool::builder().max_threads(1).build());
    let env = Environment::builder().set_dispatcher(pool).build().unwrap();

    let (release, blocked) = mpsc::channel::<()>();
    let blocker = env.spawn(move |_| {
        let _ = blocked.recv();
        Ok(())
    });

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    let queued = env.write(move |txn| {
        flag.store(true, Ordering::SeqCst);
        write_entries(txn, 1)
    });
    queued.cancel();
    assert!(queued.cancel_token().is_canceled());

    release.send(()).unwrap();
    blocker.await.unwrap();

    let err = queued.await.unwrap_err();
    assert!(matches!(err, Error::Dispatch(DispatchError::Canceled)));
    assert!(!ran.load(Ordering::SeqCst));
    assert!(dump(&env).is_empty());
}

#[tokio::test]
async fn test_spawn_copy() {
    let (dir, env) = open_env();
    fill(&env, 10);

    let dest = dir.path().join("copy");
    let target = dest.clone();
    env.spawn(move |env| env.copy(&target)).await.unwrap();

    let copy = Environment::builder().open(&dest).unwrap();
    assert_eq!(dump(&copy).len(), 10);
    copy.close().unwrap();
    env.close().unwrap();
}

#[test]
fn test_wait_from_plain_thread() {
    let env = Environment::tmp().unwrap();
    env.write(|txn| write_entries(txn, 4)).wait().unwrap();
    let entries = env.read(|txn| txn.entries(txn.open_db(None)?)).wait().unwrap();
    assert_eq!(entries, 4);
    env.close().unwrap();
}
