//! The index as one unit: every store plus the page write protocol.
//!
//! Writers (the crawler) update a page under the write scope; queries hold
//! the read scope, so a reader never sees a page half purged.

use crate::derived::{DocLengthCache, ParentLinkIndex};
use crate::fetch::FetchedPage;
use crate::page::{dedup_in_order, ForwardRecord, PageIndex, PageMeta, PageMetadataStore};
use crate::pagerank::RankStore;
use crate::posting::PostingStore;
use crate::registry::IdentifierRegistry;
use crate::store::{KvStore, MemoryStore, SledStore};
use crate::tokenizer::{keyword_stream, Analyzer, EnglishAnalyzer};
use crate::{Error, PageId, Result, WordId};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Which children of a page to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildFilter {
    All,
    /// Children that have been fetched.
    Indexed,
    /// Children known only as link targets.
    Unindexed,
}

/// Summary of one [`SearchIndex::index_page`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUpdate {
    pub page: PageId,
    pub purged: bool,
    pub keywords: usize,
    pub children: usize,
    pub max_tf: u32,
}

pub struct SearchIndex {
    store: Arc<dyn KvStore>,
    analyzer: Arc<dyn Analyzer>,
    pub registry: IdentifierRegistry,
    pub postings: PostingStore,
    pub forward: PageIndex,
    pub meta: PageMetadataStore,
    pub parents: ParentLinkIndex,
    pub doc_lengths: DocLengthCache,
    pub ranks: RankStore,
    scope: RwLock<()>,
}

impl SearchIndex {
    pub fn open(store: Arc<dyn KvStore>, analyzer: Arc<dyn Analyzer>) -> Result<Self> {
        let index = Self {
            registry: IdentifierRegistry::load(store.clone())?,
            postings: PostingStore::new(store.clone()),
            forward: PageIndex::new(store.clone()),
            meta: PageMetadataStore::load(store.clone())?,
            parents: ParentLinkIndex::new(store.clone()),
            doc_lengths: DocLengthCache::new(store.clone()),
            ranks: RankStore::new(store.clone()),
            store,
            analyzer,
            scope: RwLock::new(()),
        };
        tracing::info!(
            pages = index.meta.count(),
            urls = index.registry.pages.len(),
            words = index.registry.words.len(),
            "index opened"
        );
        Ok(index)
    }

    /// sled database under `path` with the English analyzer.
    pub fn open_dir<P: AsRef<Path>>(path: P) -> Result<Self> {
        std::fs::create_dir_all(path.as_ref())?;
        Self::open(Arc::new(SledStore::open(path)?), Arc::new(EnglishAnalyzer))
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(Arc::new(MemoryStore::new()), Arc::new(EnglishAnalyzer))
    }

    pub fn analyzer(&self) -> &dyn Analyzer {
        self.analyzer.as_ref()
    }

    /// Held by queries for their whole duration.
    pub fn read_scope(&self) -> RwLockReadGuard<'_, ()> {
        self.scope.read()
    }

    /// Number of fetched pages (N in IDF).
    pub fn page_count(&self) -> usize {
        self.meta.count()
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// Write everything the index holds for `page` from a fresh fetch,
    /// replacing whatever an earlier fetch left behind.
    pub fn index_page(&self, page: PageId, url: &str, fetched: &FetchedPage) -> Result<PageUpdate> {
        let _guard = self.scope.write();
        let purged = self.purge(page)?;

        let stems = keyword_stream(self.analyzer(), &fetched.body_text);
        let mut slots: HashMap<&str, usize> = HashMap::new();
        let mut grouped: Vec<(&str, Vec<u32>)> = Vec::new();
        for (pos, stem) in stems.iter().enumerate() {
            let slot = *slots.entry(stem.as_str()).or_insert_with(|| {
                grouped.push((stem.as_str(), Vec::new()));
                grouped.len() - 1
            });
            grouped[slot].1.push(pos as u32);
        }

        let mut max_tf = 0;
        for (stem, positions) in &grouped {
            let word = self
                .registry
                .word_id(stem, true)?
                .ok_or_else(|| Error::Registry(format!("no id assigned to {stem:?}")))?;
            max_tf = max_tf.max(self.postings.append_positions(word, page, positions)?);
        }

        let mut child_ids = Vec::new();
        for link in dedup_in_order(fetched.links.iter().filter(|l| l.as_str() != url)) {
            if let Some(child) = self.registry.page_id(link, true)? {
                child_ids.push(child);
            }
        }

        let fetch_count = self.meta.get(page)?.map_or(0, |m| m.fetch_count);
        self.meta.put(
            page,
            &PageMeta {
                title: fetched.title.trim().to_string(),
                url: url.to_string(),
                last_modified: fetched.last_modified.clone(),
                size: fetched.content_length,
                fetch_count: fetch_count + 1,
            },
        )?;

        let record = ForwardRecord {
            child_ids,
            keywords: grouped.iter().map(|(stem, _)| stem.to_string()).collect(),
            title_words: dedup_in_order(keyword_stream(self.analyzer(), &fetched.title)),
            max_tf,
        };
        self.forward.store_page(page, &record)?;

        Ok(PageUpdate { page, purged, keywords: record.keywords.len(), children: record.child_ids.len(), max_tf })
    }

    /// Remove the page's postings and forward record. Safe to repeat.
    pub fn clear_page(&self, page: PageId) -> Result<bool> {
        let _guard = self.scope.write();
        self.purge(page)
    }

    /// [`clear_page`](Self::clear_page) plus the page's metadata.
    pub fn remove_page(&self, page: PageId) -> Result<bool> {
        let _guard = self.scope.write();
        let purged = self.purge(page)?;
        let deleted = self.meta.delete(page)?;
        Ok(purged || deleted)
    }

    // caller holds the write scope
    fn purge(&self, page: PageId) -> Result<bool> {
        let record = match self.forward.get(page) {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(false),
            Err(e) if e.is_encoding() => {
                tracing::warn!(page, error = %e, "forward record unreadable, purging by scan");
                return self.purge_by_scan(page);
            }
            Err(e) => return Err(e),
        };
        for stem in &record.keywords {
            let Some(word) = self.registry.word_id(stem, false)? else {
                continue;
            };
            self.drop_posting(word, page)?;
        }
        self.forward.clear_page(page)?;
        tracing::debug!(page, keywords = record.keywords.len(), "purged page");
        Ok(true)
    }

    /// Remove `page` from every posting list that mentions it.
    fn purge_by_scan(&self, page: PageId) -> Result<bool> {
        let mut words = Vec::new();
        for item in self.postings.scan() {
            match item {
                Ok((word, list)) if list.frequency(page).is_some() => words.push(word),
                Ok(_) => {}
                Err(e) if e.is_encoding() => tracing::warn!(error = %e, "skipping posting list"),
                Err(e) => return Err(e),
            }
        }
        for word in words {
            self.drop_posting(word, page)?;
        }
        self.forward.clear_page(page)?;
        Ok(true)
    }

    /// A list that no longer decodes is deleted along with its word ID.
    fn drop_posting(&self, word: WordId, page: PageId) -> Result<()> {
        let emptied = match self.postings.remove_page(word, page) {
            Ok(emptied) => emptied,
            Err(e) if e.is_encoding() => {
                tracing::warn!(word, page, error = %e, "discarding corrupt posting list");
                self.postings.discard(word)?;
                true
            }
            Err(e) => return Err(e),
        };
        if emptied {
            self.registry.words.remove(word)?;
        }
        Ok(())
    }

    pub fn child_urls(&self, page: PageId, filter: ChildFilter) -> Result<Vec<String>> {
        let Some(children) = self.forward.child_ids(page)? else {
            return Ok(Vec::new());
        };
        let mut urls = Vec::with_capacity(children.len());
        for child in children {
            let keep = match filter {
                ChildFilter::All => true,
                ChildFilter::Indexed => self.meta.contains(child)?,
                ChildFilter::Unindexed => !self.meta.contains(child)?,
            };
            if !keep {
                continue;
            }
            let url = self
                .registry
                .url(child)
                .ok_or_else(|| Error::Consistency(format!("child {child} of page {page} has no URL")))?;
            urls.push(url);
        }
        Ok(urls)
    }

    pub fn parent_urls(&self, page: PageId) -> Result<Vec<String>> {
        let mut urls = Vec::new();
        for parent in self.parents.get(page)?.unwrap_or_default() {
            if let Some(meta) = self.meta.get(parent)? {
                urls.push(meta.url);
            }
        }
        Ok(urls)
    }

    /// The page's keywords with their frequency, most frequent first.
    pub fn keyword_frequencies(&self, page: PageId) -> Result<Vec<(String, u32)>> {
        let mut out = Vec::new();
        for stem in self.forward.keywords(page)?.unwrap_or_default() {
            let Some(word) = self.registry.word_id(&stem, false)? else {
                continue;
            };
            if let Some(freq) = self.postings.get(word)?.and_then(|l| l.frequency(page)) {
                out.push((stem, freq));
            }
        }
        out.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(out)
    }

    /// Every stem in the vocabulary, sorted.
    pub fn vocabulary(&self) -> Vec<String> {
        let mut words: Vec<String> = self.registry.words.entries().into_iter().map(|(_, w)| w).collect();
        words.sort();
        words
    }

    /// `log2(N / df)`.
    pub fn idf(&self, document_frequency: usize) -> f64 {
        idf(self.page_count(), document_frequency)
    }

    /// Rebuild page -> parents from the forward index. Only fetched children
    /// get entries.
    pub fn derive_parent_links(&self) -> Result<usize> {
        let _guard = self.scope.write();
        let fetched: HashSet<PageId> = self.meta.page_ids()?.into_iter().collect();
        let mut parents: HashMap<PageId, Vec<PageId>> = HashMap::new();
        for item in self.forward.scan() {
            let (page, record) = match item {
                Ok(entry) => entry,
                Err(e) if e.is_encoding() => {
                    tracing::warn!(error = %e, "skipping forward record");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !fetched.contains(&page) {
                continue;
            }
            for child in record.child_ids {
                if fetched.contains(&child) {
                    parents.entry(child).or_default().push(page);
                }
            }
        }
        self.parents.replace_all(&parents)?;
        Ok(parents.len())
    }

    /// Rebuild page -> L2 norm of its term-weight vector.
    pub fn derive_doc_lengths(&self) -> Result<usize> {
        let _guard = self.scope.write();
        let mut max_tf: HashMap<PageId, u32> = HashMap::new();
        for item in self.forward.scan() {
            match item {
                Ok((page, record)) => {
                    max_tf.insert(page, record.max_tf);
                }
                Err(e) if e.is_encoding() => tracing::warn!(error = %e, "skipping forward record"),
                Err(e) => return Err(e),
            }
        }

        let n = self.page_count();
        let mut sums: HashMap<PageId, f64> = max_tf.keys().map(|p| (*p, 0.0)).collect();
        for item in self.postings.scan() {
            let (_, list) = match item {
                Ok(entry) => entry,
                Err(e) if e.is_encoding() => {
                    tracing::warn!(error = %e, "skipping posting list");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let word_idf = idf(n, list.len());
            for (page, positions) in list.iter() {
                let Some(&page_max) = max_tf.get(&page) else {
                    continue;
                };
                let w = term_weight(positions.len() as u32, page_max, word_idf);
                *sums.entry(page).or_insert(0.0) += w * w;
            }
        }

        let lengths: HashMap<PageId, f64> = sums.into_iter().map(|(p, s)| (p, s.sqrt())).collect();
        self.doc_lengths.replace_all(&lengths)?;
        Ok(lengths.len())
    }
}

/// `log2(N / df)`; zero when either side is empty.
pub fn idf(total_pages: usize, document_frequency: usize) -> f64 {
    if total_pages == 0 || document_frequency == 0 {
        return 0.0;
    }
    (total_pages as f64 / document_frequency as f64).log2()
}

/// `(tf / max_tf) * idf`.
pub fn term_weight(freq: u32, max_tf: u32, idf: f64) -> f64 {
    if max_tf == 0 {
        return 0.0;
    }
    (freq as f64 / max_tf as f64) * idf
}
