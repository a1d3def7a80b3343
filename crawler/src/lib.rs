//! Breadth-first crawl of one web domain into a [`SearchIndex`].
//!
//! Every URL popped from the frontier is classified once per run:
//! ignored, added as a new page, re-indexed because the server reports a
//! newer copy, or bypassed, in which case its stored children are reused and
//! nothing in the index changes.

pub mod fetch;

use search_core::config::CrawlConfig;
use search_core::persist::{load_frontier, save_frontier};
use search_core::{ChildFilter, Error, FetchedPage, Fetcher, PageId, SearchIndex};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    InvalidUrl,
    OffHost,
    Denied,
    NonHtmlExtension,
    /// The request was made but produced no usable HTML page.
    Fetch(String),
}

/// Outcome of classifying one URL.
#[derive(Debug)]
pub enum PageClass {
    Ignore(IgnoreReason),
    AddNew(FetchedPage),
    UpdateStale(PageId, FetchedPage),
    Bypass(PageId),
}

impl PageClass {
    /// Whether a request went out for this URL.
    pub fn was_fetched(&self) -> bool {
        !matches!(
            self,
            PageClass::Ignore(
                IgnoreReason::InvalidUrl | IgnoreReason::OffHost | IgnoreReason::Denied | IgnoreReason::NonHtmlExtension
            )
        )
    }
}

/// Counters for one call to [`Crawler::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub fetched: usize,
    pub added: usize,
    pub updated: usize,
    pub bypassed: usize,
    pub ignored: usize,
    /// Pages dropped because a store call failed.
    pub failed: usize,
    /// URLs left in the frontier when the run stopped.
    pub frontier: usize,
}

pub struct Crawler<'a, F> {
    index: &'a SearchIndex,
    fetcher: &'a F,
    config: &'a CrawlConfig,
    frontier: VecDeque<String>,
    queued: HashSet<String>,
    visited: HashSet<String>,
}

impl<'a, F: Fetcher> Crawler<'a, F> {
    pub fn new<I>(index: &'a SearchIndex, fetcher: &'a F, config: &'a CrawlConfig, frontier: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut crawler = Self {
            index,
            fetcher,
            config,
            frontier: VecDeque::new(),
            queued: HashSet::new(),
            visited: config.deny_urls.iter().cloned().collect(),
        };
        for url in frontier {
            crawler.enqueue(url);
        }
        crawler
    }

    pub fn seeded(index: &'a SearchIndex, fetcher: &'a F, config: &'a CrawlConfig, seed: &str) -> Self {
        Self::new(index, fetcher, config, [seed.to_string()])
    }

    /// Continue from a frontier file written by [`Crawler::checkpoint`].
    pub fn resumed(
        index: &'a SearchIndex,
        fetcher: &'a F,
        config: &'a CrawlConfig,
        path: &Path,
    ) -> anyhow::Result<Self> {
        let frontier = load_frontier(path)?;
        info!(path = %path.display(), urls = frontier.len(), "resuming crawl");
        Ok(Self::new(index, fetcher, config, frontier))
    }

    pub fn frontier(&self) -> impl Iterator<Item = &String> {
        self.frontier.iter()
    }

    fn enqueue(&mut self, url: String) {
        if self.visited.contains(&url) || self.queued.contains(&url) {
            return;
        }
        self.queued.insert(url.clone());
        self.frontier.push_back(url);
    }

    /// Crawl until `budget` pages have been added or updated, or the frontier
    /// runs dry.
    pub async fn run(&mut self, budget: usize) -> CrawlReport {
        let mut report = CrawlReport::default();
        while report.added + report.updated < budget {
            let Some(url) = self.frontier.pop_front() else {
                break;
            };
            self.queued.remove(&url);
            if !self.visited.insert(url.clone()) {
                continue;
            }

            let class = match self.classify(&url).await {
                Ok(class) => class,
                Err(e) => {
                    warn!(url = %url, error = %e, "could not classify page");
                    report.failed += 1;
                    continue;
                }
            };
            if class.was_fetched() {
                report.fetched += 1;
            }
            if let PageClass::Ignore(reason) = &class {
                debug!(url = %url, ?reason, "ignored");
                report.ignored += 1;
                continue;
            }

            match self.apply(&url, class, &mut report) {
                Ok(children) => {
                    for child in children {
                        self.enqueue(child);
                    }
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "skipping page after store failure");
                    report.failed += 1;
                }
            }
        }
        report.frontier = self.frontier.len();
        info!(
            added = report.added,
            updated = report.updated,
            bypassed = report.bypassed,
            ignored = report.ignored,
            failed = report.failed,
            frontier = report.frontier,
            "crawl finished"
        );
        report
    }

    /// Write the remaining frontier, one URL per line.
    pub fn checkpoint(&self, path: &Path) -> anyhow::Result<usize> {
        let n = save_frontier(path, self.frontier.iter())?;
        info!(path = %path.display(), urls = n, "frontier saved");
        Ok(n)
    }

    pub async fn classify(&self, url: &str) -> search_core::Result<PageClass> {
        let Ok(parsed) = Url::parse(url) else {
            return Ok(PageClass::Ignore(IgnoreReason::InvalidUrl));
        };
        if !parsed.host_str().is_some_and(|h| on_host(h, &self.config.target_host)) {
            return Ok(PageClass::Ignore(IgnoreReason::OffHost));
        }
        if self.config.deny_patterns.iter().any(|p| url.contains(p.as_str())) {
            return Ok(PageClass::Ignore(IgnoreReason::Denied));
        }
        if self.config.skip_extensions.iter().any(|ext| url.contains(ext.as_str())) {
            return Ok(PageClass::Ignore(IgnoreReason::NonHtmlExtension));
        }
        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => return Ok(PageClass::Ignore(IgnoreReason::Fetch(e.to_string()))),
        };

        let Some(id) = self.index.registry.page_id(url, false)? else {
            return Ok(PageClass::AddNew(page));
        };
        let Some(stored) = self.index.meta.get(id)? else {
            return Ok(PageClass::AddNew(page));
        };
        let threshold = time::Duration::hours(self.config.staleness_hours);
        if is_stale(&stored.last_modified, &page.last_modified, threshold) {
            Ok(PageClass::UpdateStale(id, page))
        } else {
            Ok(PageClass::Bypass(id))
        }
    }

    /// Write a classified page and return the links to follow from it.
    fn apply(&self, url: &str, class: PageClass, report: &mut CrawlReport) -> search_core::Result<Vec<String>> {
        match class {
            PageClass::AddNew(page) => {
                let id = self
                    .index
                    .registry
                    .page_id(url, true)?
                    .ok_or_else(|| Error::Registry(format!("no id assigned to {url}")))?;
                let update = self.index.index_page(id, url, &page)?;
                debug!(page = id, url, keywords = update.keywords, children = update.children, "added");
                report.added += 1;
                Ok(page.links)
            }
            PageClass::UpdateStale(id, page) => {
                let update = self.index.index_page(id, url, &page)?;
                debug!(page = id, url, keywords = update.keywords, purged = update.purged, "updated");
                report.updated += 1;
                Ok(page.links)
            }
            PageClass::Bypass(id) => {
                report.bypassed += 1;
                self.index.child_urls(id, ChildFilter::All)
            }
            PageClass::Ignore(_) => Ok(Vec::new()),
        }
    }
}

/// Parse an HTTP date. `GMT`/`UTC` are rewritten to a numeric offset first.
/// `host` is the target or one of its subdomains.
pub fn on_host(host: &str, target: &str) -> bool {
    host == target || host.strip_suffix(target).is_some_and(|rest| rest.ends_with('.'))
}

pub fn parse_http_date(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();
    let normalized = match text.strip_suffix(" GMT").or_else(|| text.strip_suffix(" UTC")) {
        Some(rest) => format!("{rest} +0000"),
        None => text.to_string(),
    };
    OffsetDateTime::parse(&normalized, &Rfc2822).ok()
}

/// A stored copy is stale when the fresh timestamp is later by more than
/// `threshold`. Unparseable timestamps fall back to plain inequality.
pub fn is_stale(stored: &str, fresh: &str, threshold: time::Duration) -> bool {
    match (parse_http_date(stored), parse_http_date(fresh)) {
        (Some(old), Some(new)) => new - old > threshold,
        _ => stored != fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_match_is_exact_or_subdomain() {
        assert!(on_host("www.cse.ust.hk", "www.cse.ust.hk"));
        assert!(on_host("cse.ust.hk", "ust.hk"));
        assert!(!on_host("www.cse.ust.hk.attacker.example", "www.cse.ust.hk"));
        assert!(!on_host("evilust.hk", "ust.hk"));
    }

    #[test]
    fn http_dates_parse_with_named_zone() {
        let a = parse_http_date("Mon, 01 Jan 2024 00:00:00 GMT").unwrap();
        let b = parse_http_date("Mon, 01 Jan 2024 08:00:00 +0800").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn staleness_needs_more_than_threshold() {
        let day = time::Duration::hours(24);
        assert!(!is_stale("Mon, 01 Jan 2024 00:00:00 GMT", "Tue, 02 Jan 2024 00:00:00 GMT", day));
        assert!(is_stale("Mon, 01 Jan 2024 00:00:00 GMT", "Tue, 02 Jan 2024 00:00:01 GMT", day));
        // an older copy on the server is never stale
        assert!(!is_stale("Fri, 05 Jan 2024 00:00:00 GMT", "Mon, 01 Jan 2024 00:00:00 GMT", day));
    }

    #[test]
    fn unparseable_dates_compare_as_strings() {
        let day = time::Duration::hours(24);
        assert!(!is_stale("yesterday", "yesterday", day));
        assert!(is_stale("yesterday", "today", day));
    }
}
