//! Property-based tests over arbitrary inputs.
//!
//! The first group only checks that arbitrary inputs do not panic. Errors
//! are acceptable (e.g., `BadValSize`), panics are not. The second group
//! checks results against a model.
#![allow(missing_docs)]

use proptest::prelude::*;
use signet_mdbx_dispatch::{DatabaseFlags, Environment, WriteFlags};
use std::collections::{BTreeMap, BTreeSet};

/// Strategy for generating byte vectors of various sizes (0 to 1KB).
fn arb_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..1024)
}

/// Strategy for keys well below the engine's maximum key size.
fn arb_safe_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for valid database names (alphanumeric + underscore, 1-64 chars).
fn arb_db_name() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,63}"
}

/// Strategy for a small key/value model.
fn arb_model() -> impl Strategy<Value = BTreeMap<Vec<u8>, Vec<u8>>> {
    prop::collection::btree_map(
        prop::collection::vec(any::<u8>(), 1..32),
        prop::collection::vec(any::<u8>(), 0..64),
        0..64,
    )
}

/// Strategy for a dup-sorted model: a few keys, each with several values.
fn arb_dup_model() -> impl Strategy<Value = BTreeMap<Vec<u8>, BTreeSet<Vec<u8>>>> {
    prop::collection::btree_map(
        prop::collection::vec(any::<u8>(), 1..8),
        prop::collection::btree_set(prop::collection::vec(any::<u8>(), 1..16), 1..12),
        0..8,
    )
}

// =============================================================================
// Arbitrary inputs
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Test that put/get with arbitrary key/value does not panic.
    #[test]
    fn put_get_arbitrary_kv(key in arb_bytes(), value in arb_bytes()) {
        let env = Environment::tmp().unwrap();
        let txn = env.begin_rw_txn().unwrap();
        let db = txn.open_db(None).unwrap();

        // Should not panic - may return error for invalid sizes
        let put_result = txn.put(db, &key, &value, WriteFlags::empty());

        // If put succeeded, get should find the value
        if put_result.is_ok() {
            prop_assert_eq!(txn.get(db, &key).unwrap(), Some(value));
        }
    }

    /// Test that del with nonexistent arbitrary key does not panic.
    #[test]
    fn del_nonexistent_key(key in arb_bytes()) {
        let env = Environment::tmp().unwrap();
        let txn = env.begin_rw_txn().unwrap();
        let db = txn.open_db(None).unwrap();

        // Delete on nonexistent key should return Ok(false), not panic
        let result = txn.del(db, &key, None);
        prop_assert!(result.is_ok());
        prop_assert!(!result.unwrap());
    }

    /// Test that get and set_range with arbitrary keys on an empty db do not
    /// panic.
    #[test]
    fn lookups_on_empty_db(key in arb_bytes()) {
        let env = Environment::tmp().unwrap();
        let txn = env.begin_ro_txn().unwrap();
        let db = txn.open_db(None).unwrap();

        prop_assert!(txn.get(db, &key).unwrap().is_none());
        let mut cursor = txn.cursor(db).unwrap();
        prop_assert!(cursor.set_range(&key).unwrap().is_none());
    }

    /// Test that create_db with arbitrary valid names does not panic.
    #[test]
    fn create_db_arbitrary_name(name in arb_db_name()) {
        let env = Environment::tmp().unwrap();
        let mut txn = env.begin_rw_txn().unwrap();

        let db = txn.create_db(Some(name.as_str()), DatabaseFlags::empty()).unwrap();
        prop_assert_eq!(txn.open_db(Some(name.as_str())).unwrap(), db);
        txn.commit().unwrap();
    }

    /// Test that dup-sort puts with arbitrary values do not panic.
    #[test]
    fn dupsort_put_multiple_values(
        key in arb_safe_key(),
        values in prop::collection::vec(arb_safe_key(), 1..10),
    ) {
        let env = Environment::tmp().unwrap();
        let txn = env.begin_rw_txn().unwrap();
        let db = txn.create_db(Some("dups"), DatabaseFlags::DUP_SORT).unwrap();

        for value in &values {
            let _ = txn.put(db, &key, value, WriteFlags::empty());
        }
        let _ = txn.del(db, &key, None);
    }
}

// =============================================================================
// Correctness against a model
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Test that values read back after commit equal what was written.
    #[test]
    fn roundtrip_correctness(model in arb_model()) {
        let env = Environment::tmp().unwrap();

        let mut txn = env.begin_rw_txn().unwrap();
        let db = txn.open_db(None).unwrap();
        for (key, value) in &model {
            txn.put(db, key, value, WriteFlags::empty()).unwrap();
        }
        txn.commit().unwrap();

        let mut txn = env.begin_ro_txn().unwrap();
        for (key, value) in &model {
            let stored = txn.get(db, key).unwrap();
            prop_assert_eq!(stored.as_ref(), Some(value));
        }
        prop_assert_eq!(txn.entries(db).unwrap(), model.len() as u64);
        txn.commit().unwrap();
        env.close().unwrap();
    }

    /// Test that paging through a scan yields every entry in key order,
    /// whatever the page size.
    #[test]
    fn scan_pages_cover_all_entries(model in arb_model(), limit in 1usize..16) {
        let env = Environment::tmp().unwrap();
        let mut txn = env.begin_rw_txn().unwrap();
        let db = txn.open_db(None).unwrap();
        for (key, value) in &model {
            txn.put(db, key, value, WriteFlags::empty()).unwrap();
        }

        let mut page = txn.scan(db, None, limit).unwrap();
        let mut seen = Vec::with_capacity(model.len());
        loop {
            prop_assert!(page.entries.len() <= limit);
            seen.extend(page.entries);
            match page.next {
                Some(next) => page = txn.scan_resume(db, &next, limit).unwrap(),
                None => break,
            }
        }
        txn.commit().unwrap();

        prop_assert_eq!(seen, model.into_iter().collect::<Vec<_>>());
    }

    /// Test that paging through a dup-sorted scan yields every duplicate
    /// exactly once, even when one key has more values than a page holds.
    #[test]
    fn scan_pages_cover_all_duplicates(model in arb_dup_model(), limit in 1usize..8) {
        let env = Environment::tmp().unwrap();
        let mut txn = env.begin_rw_txn().unwrap();
        let db = txn.create_db(Some("dups"), DatabaseFlags::DUP_SORT).unwrap();
        for (key, values) in &model {
            for value in values {
                txn.put(db, key, value, WriteFlags::empty()).unwrap();
            }
        }
        let expected: Vec<_> = model
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.clone(), v.clone())))
            .collect();

        let mut page = txn.scan(db, None, limit).unwrap();
        let mut seen = Vec::with_capacity(expected.len());
        loop {
            prop_assert!(page.entries.len() <= limit);
            prop_assert!(seen.len() <= expected.len());
            seen.extend(page.entries);
            match page.next {
                Some(next) => page = txn.scan_resume(db, &next, limit).unwrap(),
                None => break,
            }
        }
        txn.commit().unwrap();

        prop_assert_eq!(seen, expected);
    }

    /// Test that set_range returns the first key >= search key.
    #[test]
    fn set_range_correctness(model in arb_model(), search in arb_safe_key()) {
        let env = Environment::tmp().unwrap();
        let txn = env.begin_rw_txn().unwrap();
        let db = txn.open_db(None).unwrap();
        for (key, value) in &model {
            txn.put(db, key, value, WriteFlags::empty()).unwrap();
        }

        let expected = model.range(search.clone()..).next().map(|(k, v)| (k.clone(), v.clone()));
        let mut cursor = txn.cursor(db).unwrap();
        prop_assert_eq!(cursor.set_range(&search).unwrap(), expected);
    }
}
