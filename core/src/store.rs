//! Thin record-store layer over sled.
//!
//! Tables are sled trees. Everything above this module speaks in terms of
//! tables, keyed records, prefix scans with offset/limit and counts, so the
//! engine never touches sled's API directly except inside transactions.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

#[derive(Clone)]
pub struct RecordStore {
    db: sled::Db,
}

impl RecordStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "record store opened");
        Ok(Self { db })
    }

    /// In-memory store removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Create-table-if-absent.
    pub fn table(&self, name: &str) -> Result<sled::Tree> {
        Ok(self.db.open_tree(name)?)
    }

    pub fn drop_table(&self, name: &str) -> Result<bool> {
        Ok(self.db.drop_tree(name)?)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.db
            .tree_names()
            .into_iter()
            .map(|n| String::from_utf8_lossy(&n).into_owned())
            .collect()
    }

    /// Monotonic identifier, never repeated within this store.
    pub fn generate_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()?)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Values under `prefix` in key order, skipping `offset` and returning at most `limit`.
pub fn scan_page(tree: &sled::Tree, prefix: &[u8], offset: usize, limit: usize) -> Result<Vec<sled::IVec>> {
    let mut out = Vec::with_capacity(limit.min(1024));
    for item in tree.scan_prefix(prefix).skip(offset).take(limit) {
        let (_key, value) = item?;
        out.push(value);
    }
    Ok(out)
}

pub fn count_prefix(tree: &sled::Tree, prefix: &[u8]) -> Result<usize> {
    let mut n = 0;
    for item in tree.scan_prefix(prefix) {
        item?;
        n += 1;
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pages_are_ordered_and_bounded() {
        let store = RecordStore::temporary().unwrap();
        let t = store.table("t").unwrap();
        for i in 0u64..10 {
            let mut key = b"s/".to_vec();
            key.extend_from_slice(&i.to_be_bytes());
            t.insert(key, encode(&i).unwrap()).unwrap();
        }
        t.insert("other", b"x".to_vec()).unwrap();
        let page = scan_page(&t, b"s/", 3, 4).unwrap();
        let vals: Vec<u64> = page.iter().map(|v| decode(v).unwrap()).collect();
        assert_eq!(vals, vec![3, 4, 5, 6]);
        assert_eq!(count_prefix(&t, b"s/").unwrap(), 10);
        assert!(scan_page(&t, b"s/", 20, 4).unwrap().is_empty());
    }

    #[test]
    fn generated_ids_increase() {
        let store = RecordStore::temporary().unwrap();
        let a = store.generate_id().unwrap();
        let b = store.generate_id().unwrap();
        assert!(b > a);
    }
}
