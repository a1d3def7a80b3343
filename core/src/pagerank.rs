//! Link authority by fixed-iteration PageRank.
//!
//! `score(p) = (1 - d) + d * sum(prev(q) / out_degree(q))` over the parents
//! `q` of `p`, Jacobi style: every iteration reads only the previous
//! generation. A parent without recorded children contributes nothing; mass
//! from dangling pages is not redistributed.

use crate::index::SearchIndex;
use crate::store::{decode_f64, decode_id_key, encode_f64, id_key, KvStore, Namespace};
use crate::{PageId, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// page ID -> final PageRank score.
pub struct RankStore {
    store: Arc<dyn KvStore>,
}

impl RankStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, page: PageId) -> Result<Option<f64>> {
        match self.store.get(Namespace::PageRank, &id_key(page))? {
            Some(bytes) => decode_f64(Namespace::PageRank, page, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn replace_all(&self, scores: &HashMap<PageId, f64>) -> Result<()> {
        self.store.clear(Namespace::PageRank)?;
        for (page, score) in scores {
            self.store.put(Namespace::PageRank, &id_key(*page), &encode_f64(*score))?;
        }
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<(PageId, f64)>> {
        self.store
            .scan_all(Namespace::PageRank)
            .map(|item| {
                let (k, v) = item?;
                let page = decode_id_key(Namespace::PageRank, &k)?;
                Ok((page, decode_f64(Namespace::PageRank, page, &v)?))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageRankEngine {
    pub iterations: usize,
    pub damping: f64,
}

impl Default for PageRankEngine {
    fn default() -> Self {
        Self { iterations: 30, damping: 0.85 }
    }
}

impl PageRankEngine {
    pub fn new(iterations: usize, damping: f64) -> Self {
        Self { iterations, damping }
    }

    /// Score every fetched page. Needs parent links derived beforehand.
    pub fn compute(&self, index: &SearchIndex) -> Result<HashMap<PageId, f64>> {
        let pages = index.meta.page_ids()?;
        let mut parents: HashMap<PageId, Vec<PageId>> = HashMap::with_capacity(pages.len());
        let mut out_degree: HashMap<PageId, usize> = HashMap::with_capacity(pages.len());
        for &page in &pages {
            parents.insert(page, index.parents.get(page)?.unwrap_or_default());
            out_degree.insert(page, index.forward.child_ids(page)?.map_or(0, |c| c.len()));
        }

        let mut prev: HashMap<PageId, f64> = pages.iter().map(|p| (*p, 1.0)).collect();
        for iteration in 0..self.iterations {
            let mut next: HashMap<PageId, f64> = HashMap::with_capacity(pages.len());
            for &page in &pages {
                let incoming: f64 = parents[&page]
                    .iter()
                    .filter_map(|q| {
                        let degree = *out_degree.get(q)?;
                        if degree == 0 {
                            return None;
                        }
                        Some(prev.get(q)? / degree as f64)
                    })
                    .sum();
                next.insert(page, (1.0 - self.damping) + self.damping * incoming);
            }
            let delta: f64 = pages.iter().map(|p| (next[p] - prev[p]).abs()).sum();
            tracing::debug!(iteration, delta, "pagerank iteration");
            prev = next;
        }
        Ok(prev)
    }

    /// Compute and persist, replacing any earlier scores.
    pub fn run(&self, index: &SearchIndex) -> Result<HashMap<PageId, f64>> {
        let scores = self.compute(index)?;
        index.ranks.replace_all(&scores)?;
        tracing::info!(pages = scores.len(), iterations = self.iterations, damping = self.damping, "pagerank stored");
        Ok(scores)
    }
}
