use crate::store::{decode_id_key, id_key, KvStore, Namespace};
use crate::{Error, PageId, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What the crawler learned about a page when it last fetched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub title: String,
    pub url: String,
    /// Opaque timestamp as sent by the server (Last-Modified or Date).
    pub last_modified: String,
    pub size: u64,
    pub fetch_count: u32,
}

/// Forward index entry for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardRecord {
    /// Distinct children in link order.
    pub child_ids: Vec<PageId>,
    /// Distinct body stems in first-occurrence order.
    pub keywords: Vec<String>,
    /// Distinct title stems in first-occurrence order.
    pub title_words: Vec<String>,
    pub max_tf: u32,
}

fn get_record<T: DeserializeOwned>(store: &dyn KvStore, ns: Namespace, page: PageId) -> Result<Option<T>> {
    match store.get(ns, &id_key(page))? {
        Some(bytes) => bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| Error::encoding(ns, page, e)),
        None => Ok(None),
    }
}

/// page ID -> [`PageMeta`]. Also tracks how many pages have been fetched,
/// which is the N of every IDF computation.
pub struct PageMetadataStore {
    store: Arc<dyn KvStore>,
    count: AtomicUsize,
}

impl PageMetadataStore {
    pub fn load(store: Arc<dyn KvStore>) -> Result<Self> {
        let mut count = 0usize;
        for item in store.scan_all(Namespace::PageMeta) {
            item?;
            count += 1;
        }
        Ok(Self { store, count: AtomicUsize::new(count) })
    }

    pub fn get(&self, page: PageId) -> Result<Option<PageMeta>> {
        get_record(self.store.as_ref(), Namespace::PageMeta, page)
    }

    pub fn contains(&self, page: PageId) -> Result<bool> {
        Ok(self.store.get(Namespace::PageMeta, &id_key(page))?.is_some())
    }

    pub fn put(&self, page: PageId, meta: &PageMeta) -> Result<()> {
        let existed = self.contains(page)?;
        self.store.put(Namespace::PageMeta, &id_key(page), &bincode::serialize(meta)?)?;
        if !existed {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn delete(&self, page: PageId) -> Result<bool> {
        if !self.contains(page)? {
            return Ok(false);
        }
        self.store.delete(Namespace::PageMeta, &id_key(page))?;
        self.count.fetch_sub(1, Ordering::SeqCst);
        Ok(true)
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// IDs of every fetched page, ascending.
    pub fn page_ids(&self) -> Result<Vec<PageId>> {
        self.store
            .scan_all(Namespace::PageMeta)
            .map(|item| item.and_then(|(k, _)| decode_id_key(Namespace::PageMeta, &k)))
            .collect()
    }
}

/// page ID -> [`ForwardRecord`]. All fields of a page are written together.
pub struct PageIndex {
    store: Arc<dyn KvStore>,
}

impl PageIndex {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn store_page(&self, page: PageId, record: &ForwardRecord) -> Result<()> {
        self.store.put(Namespace::Forward, &id_key(page), &bincode::serialize(record)?)
    }

    pub fn clear_page(&self, page: PageId) -> Result<()> {
        self.store.delete(Namespace::Forward, &id_key(page))
    }

    pub fn get(&self, page: PageId) -> Result<Option<ForwardRecord>> {
        get_record(self.store.as_ref(), Namespace::Forward, page)
    }

    pub fn child_ids(&self, page: PageId) -> Result<Option<Vec<PageId>>> {
        Ok(self.get(page)?.map(|r| r.child_ids))
    }

    pub fn title_words(&self, page: PageId) -> Result<Option<Vec<String>>> {
        Ok(self.get(page)?.map(|r| r.title_words))
    }

    pub fn keywords(&self, page: PageId) -> Result<Option<Vec<String>>> {
        Ok(self.get(page)?.map(|r| r.keywords))
    }

    pub fn max_term_frequency(&self, page: PageId) -> Result<Option<u32>> {
        Ok(self.get(page)?.map(|r| r.max_tf))
    }

    pub fn scan(&self) -> impl Iterator<Item = Result<(PageId, ForwardRecord)>> + '_ {
        self.store.scan_all(Namespace::Forward).map(|item| {
            let (k, v) = item?;
            let page = decode_id_key(Namespace::Forward, &k)?;
            let record = bincode::deserialize(&v).map_err(|e| Error::encoding(Namespace::Forward, page, e))?;
            Ok((page, record))
        })
    }
}

/// Keep the first occurrence of every item.
pub fn dedup_in_order<T: Clone + Eq + std::hash::Hash>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn meta(url: &str) -> PageMeta {
        PageMeta {
            title: "t".into(),
            url: url.into(),
            last_modified: "Mon, 01 Jan 2024 00:00:00 +0000".into(),
            size: 10,
            fetch_count: 1,
        }
    }

    #[test]
    fn count_tracks_inserts_and_deletes() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let pages = PageMetadataStore::load(store.clone()).unwrap();
        pages.put(1, &meta("a")).unwrap();
        pages.put(1, &meta("a")).unwrap();
        pages.put(4, &meta("b")).unwrap();
        assert_eq!(pages.count(), 2);
        assert_eq!(pages.page_ids().unwrap(), vec![1, 4]);
        assert!(pages.delete(1).unwrap());
        assert!(!pages.delete(1).unwrap());
        assert_eq!(pages.count(), 1);

        let reopened = PageMetadataStore::load(store).unwrap();
        assert_eq!(reopened.count(), 1);
    }

    #[test]
    fn forward_record_point_lookups() {
        let index = PageIndex::new(Arc::new(MemoryStore::new()));
        let record = ForwardRecord {
            child_ids: vec![2, 3],
            keywords: vec!["hkust".into(), "rainbow".into()],
            title_words: vec!["charli".into()],
            max_tf: 4,
        };
        index.store_page(1, &record).unwrap();
        assert_eq!(index.child_ids(1).unwrap(), Some(vec![2, 3]));
        assert_eq!(index.max_term_frequency(1).unwrap(), Some(4));
        assert_eq!(index.title_words(9).unwrap(), None);
        index.clear_page(1).unwrap();
        assert!(index.keywords(1).unwrap().is_none());
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        assert_eq!(dedup_in_order(vec![3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }
}
