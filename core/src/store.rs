//! Key-value persistence shared by every index store.
//!
//! Each logical store owns one or more [`Namespace`]s. Keys holding page or
//! word IDs are big-endian `u32`s so a namespace scan comes back in ID order.

use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// page ID -> URL
    PageUrls,
    /// word ID -> stem
    Words,
    /// registry namespace name -> next ID to hand out
    Counters,
    /// word ID -> encoded posting list
    Postings,
    /// page ID -> title, URL, last modified, size, fetch count
    PageMeta,
    /// page ID -> child IDs, keywords, title words, max tf
    Forward,
    /// page ID -> parent IDs (derived)
    Parents,
    /// page ID -> document vector length (derived)
    DocLengths,
    /// page ID -> PageRank score (derived)
    PageRank,
}

impl Namespace {
    pub const ALL: [Namespace; 9] = [
        Namespace::PageUrls,
        Namespace::Words,
        Namespace::Counters,
        Namespace::Postings,
        Namespace::PageMeta,
        Namespace::Forward,
        Namespace::Parents,
        Namespace::DocLengths,
        Namespace::PageRank,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Namespace::PageUrls => "page_urls",
            Namespace::Words => "words",
            Namespace::Counters => "counters",
            Namespace::Postings => "postings",
            Namespace::PageMeta => "page_meta",
            Namespace::Forward => "forward",
            Namespace::Parents => "parents",
            Namespace::DocLengths => "doc_lengths",
            Namespace::PageRank => "page_rank",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type KvPair = (Vec<u8>, Vec<u8>);
pub type KvIter<'a> = Box<dyn Iterator<Item = Result<KvPair>> + 'a>;

/// Durable ordered key-value backend.
pub trait KvStore: Send + Sync {
    fn get(&self, ns: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, ns: Namespace, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, ns: Namespace, key: &[u8]) -> Result<()>;
    /// Every entry of a namespace in key order.
    fn scan_all(&self, ns: Namespace) -> KvIter<'_>;
    /// Drop every entry of a namespace. Used when rebuilding derived stores.
    fn clear(&self, ns: Namespace) -> Result<()>;
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[inline]
pub fn id_key(id: u32) -> [u8; 4] {
    id.to_be_bytes()
}

pub fn decode_id_key(ns: Namespace, key: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = key
        .try_into()
        .map_err(|_| Error::encoding(ns, format!("{key:?}"), "id key is not 4 bytes"))?;
    Ok(u32::from_be_bytes(bytes))
}

pub fn encode_f64(value: f64) -> [u8; 8] {
    value.to_be_bytes()
}

pub fn decode_f64(ns: Namespace, key: u32, bytes: &[u8]) -> Result<f64> {
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::encoding(ns, key, "score is not 8 bytes"))?;
    Ok(f64::from_be_bytes(bytes))
}

/// sled-backed store, one tree per namespace.
pub struct SledStore {
    db: sled::Db,
    trees: HashMap<Namespace, sled::Tree>,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Throwaway database removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let mut trees = HashMap::new();
        for ns in Namespace::ALL {
            trees.insert(ns, db.open_tree(ns.name())?);
        }
        Ok(Self { db, trees })
    }

    fn tree(&self, ns: Namespace) -> &sled::Tree {
        // every namespace is opened in from_db
        &self.trees[&ns]
    }
}

impl KvStore for SledStore {
    fn get(&self, ns: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.tree(ns).get(key)?.map(|v| v.to_vec()))
    }

    fn put(&self, ns: Namespace, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree(ns).insert(key, value)?;
        Ok(())
    }

    fn delete(&self, ns: Namespace, key: &[u8]) -> Result<()> {
        self.tree(ns).remove(key)?;
        Ok(())
    }

    fn scan_all(&self, ns: Namespace) -> KvIter<'_> {
        Box::new(
            self.tree(ns)
                .iter()
                .map(|item| item.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(Error::from)),
        )
    }

    fn clear(&self, ns: Namespace) -> Result<()> {
        self.tree(ns).clear()?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// In-memory store for tests and one-off tooling.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<Namespace, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, ns: Namespace) -> usize {
        self.data.read().get(&ns).map_or(0, |m| m.len())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, ns: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(&ns).and_then(|m| m.get(key).cloned()))
    }

    fn put(&self, ns: Namespace, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().entry(ns).or_default().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, ns: Namespace, key: &[u8]) -> Result<()> {
        if let Some(m) = self.data.write().get_mut(&ns) {
            m.remove(key);
        }
        Ok(())
    }

    fn scan_all(&self, ns: Namespace) -> KvIter<'_> {
        // snapshot so the lock is not held while the caller iterates
        let entries: Vec<KvPair> = self
            .data
            .read()
            .get(&ns)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Box::new(entries.into_iter().map(Ok))
    }

    fn clear(&self, ns: Namespace) -> Result<()> {
        self.data.write().remove(&ns);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KvStore) {
        store.put(Namespace::Words, &id_key(2), b"beta").unwrap();
        store.put(Namespace::Words, &id_key(1), b"alpha").unwrap();
        store.put(Namespace::PageUrls, &id_key(1), b"https://a").unwrap();

        assert_eq!(store.get(Namespace::Words, &id_key(1)).unwrap().as_deref(), Some(&b"alpha"[..]));
        assert!(store.get(Namespace::Words, &id_key(3)).unwrap().is_none());

        let keys: Vec<u32> = store
            .scan_all(Namespace::Words)
            .map(|kv| decode_id_key(Namespace::Words, &kv.unwrap().0).unwrap())
            .collect();
        assert_eq!(keys, vec![1, 2]);

        store.delete(Namespace::Words, &id_key(1)).unwrap();
        assert!(store.get(Namespace::Words, &id_key(1)).unwrap().is_none());

        store.clear(Namespace::Words).unwrap();
        assert_eq!(store.scan_all(Namespace::Words).count(), 0);
        // other namespaces untouched
        assert!(store.get(Namespace::PageUrls, &id_key(1)).unwrap().is_some());
    }

    #[test]
    fn memory_store_namespaces_are_isolated() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn sled_store_namespaces_are_isolated() {
        exercise(&SledStore::temporary().unwrap());
    }

    #[test]
    fn short_id_key_is_an_encoding_error() {
        let err = decode_id_key(Namespace::Postings, &[1, 2]).unwrap_err();
        assert!(err.is_encoding());
    }
}
