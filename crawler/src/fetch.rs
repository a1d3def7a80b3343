//! HTTP fetcher: robots.txt politeness, HTML parsing, link extraction.

use parking_lot::RwLock;
use reqwest::{header, Client, Url};
use scraper::{Html, Selector};
use search_core::config::CrawlConfig;
use search_core::{FetchError, FetchedPage, Fetcher};
use std::collections::HashMap;
use std::time::Duration;
use time::format_description::well_known::Rfc2822;
use tokio::time::sleep;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
struct Robots {
    allows: Vec<String>,
    disallows: Vec<String>,
    crawl_delay_ms: Option<u64>,
}

pub struct HttpFetcher {
    client: Client,
    user_agent: String,
    robots: RwLock<HashMap<String, Robots>>,
    title: Selector,
    body: Selector,
    anchor: Selector,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            robots: RwLock::new(HashMap::new()),
            title: selector("title")?,
            body: selector("body")?,
            anchor: selector("a[href]")?,
        })
    }

    async fn allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str().map(str::to_string) else {
            return false;
        };
        let cached = self.robots.read().get(&host).cloned();
        let rules = match cached {
            Some(r) => r,
            None => {
                let robots_url = format!("{}://{}/robots.txt", url.scheme(), host);
                let txt = match self.client.get(&robots_url).header(header::USER_AGENT, &self.user_agent).send().await {
                    Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
                    _ => String::new(),
                };
                let parsed = parse_robots(&txt);
                self.robots.write().insert(host, parsed.clone());
                parsed
            }
        };
        path_allowed(url.path(), &rules)
    }

    fn crawl_delay(&self, url: &Url) -> Option<u64> {
        let host = url.host_str()?;
        self.robots.read().get(host).and_then(|r| r.crawl_delay_ms)
    }

    fn parse(&self, base: &Url, html: &str) -> (String, String, Vec<String>) {
        let doc = Html::parse_document(html);
        let title = doc
            .select(&self.title)
            .next()
            .map(|n| n.text().collect::<String>())
            .unwrap_or_default()
            .replace('\n', "");
        let text = doc
            .select(&self.body)
            .next()
            .map(|n| n.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        let mut links = Vec::new();
        for a in doc.select(&self.anchor) {
            let Some(href) = a.value().attr("href") else {
                continue;
            };
            if let Ok(u) = Url::parse(href).or_else(|_| base.join(href)) {
                if u.scheme().starts_with("http") {
                    let link = strip_trailing_junk(&norm(&u));
                    if !link.is_empty() {
                        links.push(link);
                    }
                }
            }
        }
        (title.trim().to_string(), text, links)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if !self.allowed(&parsed).await {
            return Err(FetchError::Disallowed);
        }
        if let Some(delay) = self.crawl_delay(&parsed) {
            sleep(Duration::from_millis(delay)).await;
        }

        let resp = self.client.get(parsed.clone()).send().await.map_err(|e| FetchError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        let content_type = header_str(&resp, header::CONTENT_TYPE).unwrap_or_default();
        if !content_type.contains("html") {
            return Err(FetchError::NotHtml(content_type));
        }
        let last_modified = header_str(&resp, header::LAST_MODIFIED)
            .or_else(|| header_str(&resp, header::DATE))
            .unwrap_or_else(|| time::OffsetDateTime::now_utc().format(&Rfc2822).unwrap_or_default());
        let declared = resp.content_length();

        let bytes = resp.bytes().await.map_err(|e| FetchError::Network(e.to_string()))?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(FetchError::TooLarge(bytes.len()));
        }
        let html = String::from_utf8_lossy(&bytes);
        let (title, body_text, links) = self.parse(&parsed, &html);
        let content_length = declared.unwrap_or_else(|| body_text.chars().filter(|c| *c != '\n').count() as u64);

        Ok(FetchedPage { links, title, last_modified, content_length, body_text })
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Network(format!("selector {css}: {e}")))
}

fn header_str(resp: &reqwest::Response, name: header::HeaderName) -> Option<String> {
    resp.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn norm(u: &Url) -> String {
    let mut s = u.clone();
    s.set_fragment(None);
    s.to_string()
}

/// Drop trailing characters that are not ASCII letters or digits
/// (`/`, `?`, stray punctuation).
pub fn strip_trailing_junk(link: &str) -> String {
    link.trim_end_matches(|c: char| !c.is_ascii_alphanumeric()).to_string()
}

fn parse_robots(txt: &str) -> Robots {
    // minimal parser for the '*' group
    let mut active = false;
    let mut allows = Vec::new();
    let mut disallows = Vec::new();
    let mut crawl_delay_ms: Option<u64> = None;
    for line in txt.lines() {
        let l = line.trim();
        if l.is_empty() || l.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = l.split_once(':') {
            let val = v.trim();
            match k.trim().to_lowercase().as_str() {
                "user-agent" => active = val == "*",
                "allow" if active => allows.push(val.to_string()),
                "disallow" if active && !val.is_empty() => disallows.push(val.to_string()),
                "crawl-delay" if active => {
                    if let Ok(n) = val.parse::<f64>() {
                        crawl_delay_ms = Some((n * 1000.0) as u64);
                    }
                }
                _ => {}
            }
        }
    }
    Robots { allows, disallows, crawl_delay_ms }
}

/// Longest matching Allow beats a shorter Disallow.
fn path_allowed(path: &str, rules: &Robots) -> bool {
    let longest = |patterns: &[String]| patterns.iter().filter(|p| path.starts_with(p.as_str())).map(String::len).max();
    match (longest(&rules.allows), longest(&rules.disallows)) {
        (Some(a), Some(d)) => a >= d,
        (_, None) => true,
        (None, Some(_)) => false,
    }
}
