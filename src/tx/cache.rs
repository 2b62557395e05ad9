//! Per-transaction cache of opened [`Database`] handles.

use crate::Database;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};

/// Cached database entry.
///
/// Uses hash-only comparison since 64-bit hash collisions are negligible
/// for practical database counts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CachedDb {
    /// Hash of database name (None hashes distinctly from any string).
    name_hash: u64,
    db: Database,
}

impl CachedDb {
    pub(crate) fn new(name: Option<&str>, db: Database) -> Self {
        Self { name_hash: hash_name(name), db }
    }
}

#[inline]
pub(crate) fn hash_name(name: Option<&str>) -> u64 {
    let mut hasher = std::hash::DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}

/// Inline storage for the common case of fewer than 16 sub-databases.
#[derive(Debug, Default)]
pub(crate) struct DbCache(SmallVec<[CachedDb; 16]>);

impl DbCache {
    pub(crate) fn read_db(&self, name_hash: u64) -> Option<Database> {
        self.0.iter().find(|entry| entry.name_hash == name_hash).map(|entry| entry.db)
    }

    pub(crate) fn write_db(&mut self, db: CachedDb) {
        if self.read_db(db.name_hash).is_none() {
            self.0.push(db);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabaseFlags;

    #[test]
    fn unnamed_and_named_do_not_collide() {
        assert_ne!(hash_name(None), hash_name(Some("")));
        assert_ne!(hash_name(Some("a")), hash_name(Some("b")));
    }

    #[test]
    fn first_write_wins() {
        let mut cache = DbCache::default();
        cache.write_db(CachedDb::new(Some("a"), Database::new(2, DatabaseFlags::empty())));
        cache.write_db(CachedDb::new(Some("a"), Database::new(3, DatabaseFlags::DUP_SORT)));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.read_db(hash_name(Some("a"))).unwrap().dbi(), 2);
        assert!(cache.read_db(hash_name(None)).is_none());
    }
}
