//! Query evaluation: cosine similarity over TF-IDF weights, phrase proximity,
//! fusion with PageRank and a title bonus.

use crate::config::RetrievalConfig;
use crate::index::{idf, term_weight, SearchIndex};
use crate::posting::PostingList;
use crate::tokenizer::{parse_query, QueryTerm};
use crate::{Error, PageId, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPage {
    pub page: PageId,
    pub score: f64,
}

/// Smallest positive `later - earlier` over two ascending position lists.
/// `None` when no position of `later` follows one of `earlier`.
pub fn smallest_gap(earlier: &[u32], later: &[u32]) -> Option<u32> {
    let (mut i, mut j) = (0, 0);
    let mut best: Option<u32> = None;
    while i < earlier.len() && j < later.len() {
        let (a, b) = (earlier[i], later[j]);
        if b > a {
            let gap = b - a;
            if best.map_or(true, |g| gap < g) {
                best = Some(gap);
            }
        }
        if a < b {
            i += 1;
        } else {
            j += 1;
        }
    }
    best
}

/// Scores accumulated in first-seen order so equal scores keep discovery order.
#[derive(Default)]
struct Accumulator {
    slots: HashMap<PageId, usize>,
    scores: Vec<(PageId, f64)>,
}

impl Accumulator {
    fn add(&mut self, page: PageId, amount: f64) {
        let scores = &mut self.scores;
        let slot = *self.slots.entry(page).or_insert_with(|| {
            scores.push((page, 0.0));
            scores.len() - 1
        });
        self.scores[slot].1 += amount;
    }
}

/// One query word resolved against the index.
struct LoadedWord {
    list: PostingList,
    idf: f64,
}

pub struct RetrievalEngine {
    index: Arc<SearchIndex>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(index: Arc<SearchIndex>, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    /// Ranked pages for `text`, best first, at most `max_results`.
    pub fn query(&self, text: &str) -> Result<Vec<ScoredPage>> {
        let terms = parse_query(self.index.analyzer(), text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let _scope = self.index.read_scope();

        let (raw, query_len) = self.raw_scores(&terms)?;
        if raw.scores.is_empty() {
            return Ok(Vec::new());
        }

        let query_norm = (query_len as f64).sqrt();
        let mut ranked = Vec::with_capacity(raw.scores.len());
        for (page, raw_score) in raw.scores {
            let doc_len = self
                .index
                .doc_lengths
                .get(page)?
                .ok_or_else(|| Error::Consistency(format!("no document length for page {page}")))?;
            let cosine = if doc_len > 0.0 { raw_score / (doc_len * query_norm) } else { 0.0 };
            let rank = self
                .index
                .ranks
                .get(page)?
                .ok_or_else(|| Error::Consistency(format!("no PageRank score for page {page}")))?;
            let mut score = self.config.cosine_weight * cosine + self.config.rank_weight * rank;

            let titles: HashSet<String> =
                self.index.forward.title_words(page)?.unwrap_or_default().into_iter().collect();
            if terms.iter().any(|t| title_matches(t, &titles)) {
                score += self.config.title_bonus;
            }
            ranked.push(ScoredPage { page, score });
        }

        // stable: ties keep discovery order
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.config.max_results);
        Ok(ranked)
    }

    fn raw_scores(&self, terms: &[QueryTerm]) -> Result<(Accumulator, usize)> {
        let mut acc = Accumulator::default();
        let mut query_len = terms.len();
        let mut max_tf: HashMap<PageId, u32> = HashMap::new();

        for term in terms {
            match term {
                QueryTerm::Word(stem) => {
                    let Some(word) = self.load(stem)? else {
                        continue;
                    };
                    for (page, positions) in word.list.iter() {
                        let page_max = self.max_tf(&mut max_tf, page)?;
                        acc.add(page, term_weight(positions.len() as u32, page_max, word.idf));
                    }
                }
                QueryTerm::Phrase(stems) => {
                    let mut words = Vec::with_capacity(stems.len());
                    for stem in stems {
                        match self.load(stem)? {
                            Some(w) => words.push(w),
                            None => break,
                        }
                    }
                    if words.len() != stems.len() {
                        continue;
                    }
                    query_len += term.width() - 1;

                    let mut candidates: Vec<PageId> = words[0].list.pages().collect();
                    for w in &words[1..] {
                        candidates.retain(|p| w.list.frequency(*p).is_some());
                    }
                    for page in candidates {
                        if !self.phrase_adjacent(&words, page) {
                            continue;
                        }
                        let page_max = self.max_tf(&mut max_tf, page)?;
                        let sum: f64 = words
                            .iter()
                            .map(|w| term_weight(w.list.frequency(page).unwrap_or(0), page_max, w.idf))
                            .sum();
                        acc.add(page, sum);
                    }
                }
            }
        }
        Ok((acc, query_len))
    }

    fn phrase_adjacent(&self, words: &[LoadedWord], page: PageId) -> bool {
        words.windows(2).all(|pair| {
            let earlier = pair[0].list.positions(page).unwrap_or(&[]);
            let later = pair[1].list.positions(page).unwrap_or(&[]);
            smallest_gap(earlier, later).is_some_and(|gap| gap <= self.config.phrase_window)
        })
    }

    /// Resolve a stem to its posting list. Unknown stems and corrupt lists
    /// both yield `None`; the latter is reported.
    fn load(&self, stem: &str) -> Result<Option<LoadedWord>> {
        let Some(word) = self.index.registry.word_id(stem, false)? else {
            return Ok(None);
        };
        match self.index.postings.get(word) {
            Ok(Some(list)) => {
                let idf = idf(self.index.page_count(), list.len());
                Ok(Some(LoadedWord { list, idf }))
            }
            Ok(None) => Ok(None),
            Err(e) if e.is_encoding() => {
                tracing::warn!(stem, error = %e, "excluding corrupt posting list from query");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn max_tf(&self, cache: &mut HashMap<PageId, u32>, page: PageId) -> Result<u32> {
        if let Some(v) = cache.get(&page) {
            return Ok(*v);
        }
        let v = self
            .index
            .forward
            .max_term_frequency(page)?
            .ok_or_else(|| Error::Consistency(format!("page {page} has postings but no forward record")))?;
        cache.insert(page, v);
        Ok(v)
    }
}

fn title_matches(term: &QueryTerm, titles: &HashSet<String>) -> bool {
    match term {
        QueryTerm::Word(stem) => titles.contains(stem),
        QueryTerm::Phrase(stems) => stems.iter().all(|s| titles.contains(s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_positions_have_gap_one() {
        assert_eq!(smallest_gap(&[5], &[6]), Some(1));
    }

    #[test]
    fn distant_positions_exceed_window() {
        assert_eq!(smallest_gap(&[5], &[20]), Some(15));
    }

    #[test]
    fn only_forward_gaps_count() {
        assert_eq!(smallest_gap(&[10], &[3]), None);
        assert_eq!(smallest_gap(&[1, 8, 30], &[4, 9, 31]), Some(1));
        assert_eq!(smallest_gap(&[2], &[2, 5]), Some(3));
    }
}
