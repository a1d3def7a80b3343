use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for every component, read from an optional JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of `db/`, `frontier.txt` and `meta.json`.
    pub data_dir: PathBuf,
    pub crawl: CrawlConfig,
    pub rank: RankConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Only URLs whose host contains this string are crawled.
    pub target_host: String,
    /// URLs containing any of these are ignored (mirror trees, booking systems).
    pub deny_patterns: Vec<String>,
    /// Exact URLs marked visited before the run starts (pages known to trap
    /// the crawler).
    pub deny_urls: Vec<String>,
    /// URL fragments that identify non-HTML resources without a request.
    pub skip_extensions: Vec<String>,
    pub staleness_hours: i64,
    pub user_agent: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    pub iterations: usize,
    pub damping: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_results: usize,
    /// Largest allowed gap between adjacent phrase words.
    pub phrase_window: u32,
    pub cosine_weight: f64,
    pub rank_weight: f64,
    pub title_bonus: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            crawl: CrawlConfig::default(),
            rank: RankConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        let ext = [
            ".bib", ".pdf", ".doc", ".zip", ".scala", ".key", ".rar", ".7z", ".txt", "/files/", ".bat", ".py",
            ".hpp", ".m4a", ".java",
        ];
        Self {
            target_host: "cse.ust.hk".into(),
            deny_patterns: vec![
                "/vislab_homepage/vislab_homepage/".into(),
                "comp151.cse.ust.hk/~dekai/content/".into(),
                "labschedule.cse.ust.hk".into(),
                "booking.cse.ust.hk".into(),
            ],
            deny_urls: [
                "https://home.cse.ust.hk/~rossiter/independent_studies_projects/classifier_reddit_bots/post_title_chart.html",
                "http://home.cse.ust.hk/~rossiter/independent_studies_projects/classifier_reddit_bots/post_title_chart.html",
                "http://www.cse.ust.hk/faculty/rossiter/independent_studies_projects/classifier_reddit_bots/post_title_chart.html",
                "http://www.cse.ust.hk/faculty/rossiter/independent_studies_projects/classifier_reddit_bots/comment_text_chart.html",
                "https://home.cse.ust.hk/~rossiter/independent_studies_projects/classifier_reddit_bots/comment_text_chart.html",
                "http://home.cse.ust.hk/~rossiter/independent_studies_projects/classifier_reddit_bots/comment_text_chart.html",
                "http://home.cse.ust.hk/~twinsen/OurGMM.m",
                "http://home.cse.ust.hk/~skiena/510/schedule",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            skip_extensions: ext.iter().map(|s| s.to_string()).collect(),
            staleness_hours: 24,
            user_agent: "search-engine-rs-bot/0.1 (+https://example.com/bot)".into(),
            timeout_secs: 12,
        }
    }
}

impl Default for RankConfig {
    fn default() -> Self {
        Self { iterations: 30, damping: 0.85 }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { max_results: 50, phrase_window: 3, cosine_weight: 0.7, rank_weight: 0.3, title_bonus: 0.2 }
    }
}

impl EngineConfig {
    /// Read `path` if given, otherwise fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)?;
                serde_json::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", p.display())))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.rank.damping) {
            return Err(Error::Config(format!("damping {} outside [0, 1]", self.rank.damping)));
        }
        if self.retrieval.max_results == 0 {
            return Err(Error::Config("max_results must be positive".into()));
        }
        if self.crawl.staleness_hours < 0 {
            return Err(Error::Config("staleness_hours must not be negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"rank": {"iterations": 5}}"#).unwrap();
        assert_eq!(cfg.rank.iterations, 5);
        assert_eq!(cfg.rank.damping, 0.85);
        assert_eq!(cfg.retrieval.max_results, 50);
        assert_eq!(cfg.crawl.staleness_hours, 24);
    }

    #[test]
    fn rejects_out_of_range_damping() {
        let mut cfg = EngineConfig::default();
        cfg.rank.damping = 1.5;
        assert!(cfg.validate().is_err());
    }
}
