//! Stable integer IDs for URLs and stems.
//!
//! Each namespace is persisted as `id -> key` and mirrored in memory as a
//! [`BiMap`]. IDs start at 1, grow monotonically and are never handed out
//! twice: the next value is persisted in [`Namespace::Counters`].

use crate::store::{decode_id_key, id_key, KvStore, Namespace};
use crate::{Error, PageId, Result, WordId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Two-table bidirectional map. Inserts that would map one key to two IDs
/// (or one ID to two keys) are rejected.
#[derive(Debug, Default, Clone)]
pub struct BiMap {
    by_id: HashMap<u32, String>,
    by_key: HashMap<String, u32>,
}

impl BiMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u32, key: &str) -> Result<()> {
        match (self.by_id.get(&id), self.by_key.get(key)) {
            (None, None) => {
                self.by_id.insert(id, key.to_string());
                self.by_key.insert(key.to_string(), id);
                Ok(())
            }
            (Some(existing), Some(&existing_id)) if existing == key && existing_id == id => Ok(()),
            (Some(existing), _) => Err(Error::Registry(format!("id {id} already maps to {existing:?}"))),
            (None, Some(existing_id)) => Err(Error::Registry(format!("{key:?} already has id {existing_id}"))),
        }
    }

    pub fn id_of(&self, key: &str) -> Option<u32> {
        self.by_key.get(key).copied()
    }

    pub fn key_of(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn remove_id(&mut self, id: u32) -> Option<String> {
        let key = self.by_id.remove(&id)?;
        self.by_key.remove(&key);
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_id.iter().map(|(id, key)| (*id, key.as_str()))
    }
}

struct Table {
    map: BiMap,
    next: u32,
}

/// One ID namespace (URLs or stems).
pub struct IdRegistry {
    ns: Namespace,
    store: Arc<dyn KvStore>,
    table: RwLock<Table>,
}

impl IdRegistry {
    /// Replay the persisted `id -> key` entries into memory.
    pub fn load(store: Arc<dyn KvStore>, ns: Namespace) -> Result<Self> {
        let mut map = BiMap::new();
        let mut highest = 0u32;
        for item in store.scan_all(ns) {
            let (k, v) = item?;
            let id = decode_id_key(ns, &k)?;
            let key = String::from_utf8(v).map_err(|e| Error::encoding(ns, id, e))?;
            map.insert(id, &key)?;
            highest = highest.max(id);
        }
        let persisted = match store.get(Namespace::Counters, ns.name().as_bytes())? {
            Some(bytes) => decode_id_key(Namespace::Counters, &bytes)?,
            None => 1,
        };
        let next = persisted.max(highest + 1);
        tracing::debug!(namespace = %ns, entries = map.len(), next, "registry loaded");
        Ok(Self { ns, store, table: RwLock::new(Table { map, next }) })
    }

    /// Look up the ID for `key`, assigning the next one when `create` is set.
    pub fn resolve(&self, key: &str, create: bool) -> Result<Option<u32>> {
        if let Some(id) = self.table.read().map.id_of(key) {
            return Ok(Some(id));
        }
        if !create {
            return Ok(None);
        }
        let mut table = self.table.write();
        // another writer may have won the race between the two locks
        if let Some(id) = table.map.id_of(key) {
            return Ok(Some(id));
        }
        let id = table.next;
        self.store.put(self.ns, &id_key(id), key.as_bytes())?;
        self.store.put(Namespace::Counters, self.ns.name().as_bytes(), &id_key(id + 1))?;
        table.map.insert(id, key)?;
        table.next = id + 1;
        Ok(Some(id))
    }

    pub fn reverse_lookup(&self, id: u32) -> Option<String> {
        self.table.read().map.key_of(id).map(str::to_string)
    }

    /// Forget a mapping. The counter is left alone so the ID is never reused.
    pub fn remove(&self, id: u32) -> Result<Option<String>> {
        let mut table = self.table.write();
        if table.map.key_of(id).is_none() {
            return Ok(None);
        }
        self.store.delete(self.ns, &id_key(id))?;
        Ok(table.map.remove_id(id))
    }

    pub fn len(&self) -> usize {
        self.table.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every `(id, key)` pair, ordered by ID.
    pub fn entries(&self) -> Vec<(u32, String)> {
        let mut out: Vec<(u32, String)> =
            self.table.read().map.iter().map(|(id, k)| (id, k.to_string())).collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }
}

/// URL and stem registries opened together.
pub struct IdentifierRegistry {
    pub pages: IdRegistry,
    pub words: IdRegistry,
}

impl IdentifierRegistry {
    pub fn load(store: Arc<dyn KvStore>) -> Result<Self> {
        Ok(Self {
            pages: IdRegistry::load(store.clone(), Namespace::PageUrls)?,
            words: IdRegistry::load(store, Namespace::Words)?,
        })
    }

    pub fn page_id(&self, url: &str, create: bool) -> Result<Option<PageId>> {
        self.pages.resolve(url, create)
    }

    pub fn word_id(&self, stem: &str, create: bool) -> Result<Option<WordId>> {
        self.words.resolve(stem, create)
    }

    pub fn url(&self, page: PageId) -> Option<String> {
        self.pages.reverse_lookup(page)
    }

    pub fn word(&self, word: WordId) -> Option<String> {
        self.words.reverse_lookup(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn bimap_rejects_conflicting_inserts() {
        let mut m = BiMap::new();
        m.insert(1, "a").unwrap();
        m.insert(1, "a").unwrap();
        assert!(m.insert(1, "b").is_err());
        assert!(m.insert(2, "a").is_err());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn ids_are_sequential_from_one() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let reg = IdRegistry::load(store, Namespace::Words).unwrap();
        assert_eq!(reg.resolve("rain", false).unwrap(), None);
        assert_eq!(reg.resolve("rain", true).unwrap(), Some(1));
        assert_eq!(reg.resolve("bow", true).unwrap(), Some(2));
        assert_eq!(reg.resolve("rain", true).unwrap(), Some(1));
        assert_eq!(reg.reverse_lookup(2).as_deref(), Some("bow"));
    }

    #[test]
    fn reload_resumes_counter_without_reuse() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        {
            let reg = IdRegistry::load(store.clone(), Namespace::Words).unwrap();
            reg.resolve("a", true).unwrap();
            reg.resolve("b", true).unwrap();
            reg.resolve("c", true).unwrap();
            assert_eq!(reg.remove(3).unwrap().as_deref(), Some("c"));
        }
        let reg = IdRegistry::load(store, Namespace::Words).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.resolve("b", false).unwrap(), Some(2));
        assert_eq!(reg.resolve("c", true).unwrap(), Some(4));
    }
}
