//! Inverted index: word ID -> posting list.
//!
//! A posting list is persisted as text,
//! `pageID:frequency:pos1,pos2 pageID2:frequency2:pos1,...`,
//! with entries ordered by page ID and positions kept in insertion order.

use crate::store::{id_key, KvStore, Namespace};
use crate::{Error, PageId, Result, WordId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Occurrences of one word, keyed by page. The frequency of a page is the
/// length of its position list, so the two can never disagree in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    entries: BTreeMap<PageId, Vec<u32>>,
}

impl PostingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence and return the page's new frequency.
    pub fn add(&mut self, page: PageId, position: u32) -> u32 {
        let positions = self.entries.entry(page).or_default();
        positions.push(position);
        positions.len() as u32
    }

    /// Append positions for `page`. An empty slice records nothing, so every
    /// stored entry has at least one position.
    pub fn extend(&mut self, page: PageId, positions: &[u32]) -> u32 {
        if positions.is_empty() {
            return self.frequency(page).unwrap_or(0);
        }
        let entry = self.entries.entry(page).or_default();
        entry.extend_from_slice(positions);
        entry.len() as u32
    }

    /// Drop a page's entry. Returns `true` when the list is now empty.
    pub fn remove(&mut self, page: PageId) -> bool {
        self.entries.remove(&page);
        self.entries.is_empty()
    }

    pub fn frequency(&self, page: PageId) -> Option<u32> {
        self.entries.get(&page).map(|p| p.len() as u32)
    }

    pub fn positions(&self, page: PageId) -> Option<&[u32]> {
        self.entries.get(&page).map(Vec::as_slice)
    }

    pub fn pages(&self) -> impl Iterator<Item = PageId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PageId, &[u32])> {
        self.entries.iter().map(|(page, pos)| (*page, pos.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn decode(text: &str) -> std::result::Result<Self, String> {
        let mut entries = BTreeMap::new();
        for chunk in text.split(' ') {
            if chunk.is_empty() {
                continue;
            }
            let mut parts = chunk.split(':');
            let (Some(page), Some(freq), Some(positions), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(format!("entry {chunk:?} is not page:freq:positions"));
            };
            let page: PageId = page.parse().map_err(|_| format!("bad page id in {chunk:?}"))?;
            let freq: usize = freq.parse().map_err(|_| format!("bad frequency in {chunk:?}"))?;
            let positions = positions
                .split(',')
                .map(|p| p.parse::<u32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| format!("bad position in {chunk:?}"))?;
            if positions.len() != freq {
                return Err(format!("page {page}: frequency {freq} but {} positions", positions.len()));
            }
            if entries.insert(page, positions).is_some() {
                return Err(format!("page {page} listed twice"));
            }
        }
        Ok(Self { entries })
    }
}

impl fmt::Display for PostingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (page, positions)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{page}:{}:", positions.len())?;
            for (j, pos) in positions.iter().enumerate() {
                if j > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{pos}")?;
            }
        }
        Ok(())
    }
}

/// Persistent posting lists over [`Namespace::Postings`].
pub struct PostingStore {
    store: Arc<dyn KvStore>,
}

impl PostingStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, word: WordId) -> Result<Option<PostingList>> {
        let Some(bytes) = self.store.get(Namespace::Postings, &id_key(word))? else {
            return Ok(None);
        };
        let text = std::str::from_utf8(&bytes).map_err(|e| Error::encoding(Namespace::Postings, word, e))?;
        PostingList::decode(text)
            .map(Some)
            .map_err(|reason| Error::encoding(Namespace::Postings, word, reason))
    }

    fn put(&self, word: WordId, list: &PostingList) -> Result<()> {
        if list.is_empty() {
            return self.store.delete(Namespace::Postings, &id_key(word));
        }
        self.store.put(Namespace::Postings, &id_key(word), list.encode().as_bytes())
    }

    /// Append one position for `page` and return its updated frequency.
    pub fn add_occurrence(&self, word: WordId, page: PageId, position: u32) -> Result<u32> {
        self.append_positions(word, page, &[position])
    }

    /// Append several positions in one read-modify-write.
    /// A stored list that no longer decodes is replaced.
    pub fn append_positions(&self, word: WordId, page: PageId, positions: &[u32]) -> Result<u32> {
        let mut list = match self.get(word) {
            Ok(list) => list.unwrap_or_default(),
            Err(e) if e.is_encoding() => {
                tracing::warn!(word, error = %e, "replacing corrupt posting list");
                PostingList::new()
            }
            Err(e) => return Err(e),
        };
        let freq = list.extend(page, positions);
        if positions.is_empty() {
            return Ok(freq);
        }
        self.put(word, &list)?;
        Ok(freq)
    }

    /// Remove `page` from the word's list. `true` means the list is gone and
    /// the word ID should be released.
    pub fn remove_page(&self, word: WordId, page: PageId) -> Result<bool> {
        let Some(mut list) = self.get(word)? else {
            return Ok(true);
        };
        let empty = list.remove(page);
        self.put(word, &list)?;
        Ok(empty)
    }

    /// Drop the word's stored list outright.
    pub fn discard(&self, word: WordId) -> Result<()> {
        self.store.delete(Namespace::Postings, &id_key(word))
    }

    pub fn positions(&self, word: WordId, page: PageId) -> Result<Option<Vec<u32>>> {
        Ok(self.get(word)?.and_then(|l| l.positions(page).map(<[u32]>::to_vec)))
    }

    pub fn pages(&self, word: WordId) -> Result<Option<Vec<PageId>>> {
        Ok(self.get(word)?.map(|l| l.pages().collect()))
    }

    pub fn document_frequency(&self, word: WordId) -> Result<usize> {
        Ok(self.get(word)?.map_or(0, |l| l.len()))
    }

    /// Every stored list. Undecodable lists surface as `Err` items so a scan
    /// can skip them and carry on.
    pub fn scan(&self) -> impl Iterator<Item = Result<(WordId, PostingList)>> + '_ {
        self.store.scan_all(Namespace::Postings).map(|item| {
            let (k, v) = item?;
            let word = crate::store::decode_id_key(Namespace::Postings, &k)?;
            let text = std::str::from_utf8(&v).map_err(|e| Error::encoding(Namespace::Postings, word, e))?;
            let list = PostingList::decode(text).map_err(|r| Error::encoding(Namespace::Postings, word, r))?;
            Ok((word, list))
        })
    }
}
