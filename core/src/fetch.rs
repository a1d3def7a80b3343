use thiserror::Error;

/// Everything the index needs from one successful page fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedPage {
    /// Absolute outbound links as extracted, duplicates included.
    pub links: Vec<String>,
    pub title: String,
    pub last_modified: String,
    pub content_length: u64,
    pub body_text: String,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("not an HTML page ({0})")]
    NotHtml(String),
    #[error("body of {0} bytes exceeds the size limit")]
    TooLarge(usize),
    #[error("disallowed by robots.txt")]
    Disallowed,
    #[error("invalid URL {0}")]
    InvalidUrl(String),
}

/// Fetch-and-parse collaborator used by the crawler.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}
