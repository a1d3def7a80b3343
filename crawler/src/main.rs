use anyhow::{anyhow, Result};
use clap::Parser;
use crawler::fetch::HttpFetcher;
use crawler::{CrawlReport, Crawler};
use search_core::persist::IndexPaths;
use search_core::{EngineConfig, SearchIndex};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl one web domain into the search index")]
struct Cli {
    /// Data directory holding db/ and frontier.txt
    #[arg(long, default_value = "./data")]
    data: PathBuf,
    /// Optional JSON config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Start a fresh crawl from this URL
    #[arg(long, conflicts_with = "resume")]
    seed: Option<String>,
    /// Continue from the saved frontier
    #[arg(long)]
    resume: bool,
    /// Pages to add or update per run
    #[arg(long, default_value_t = 300)]
    budget: usize,
    /// Number of runs; every run after the first resumes from the frontier
    #[arg(long, default_value_t = 1)]
    runs: usize,
    /// Overrides the configured target host
    #[arg(long)]
    host: Option<String>,
    /// Overrides the configured staleness threshold
    #[arg(long)]
    staleness_hours: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.crawl.target_host = host;
    }
    if let Some(hours) = args.staleness_hours {
        config.crawl.staleness_hours = hours;
    }
    config.validate()?;

    let paths = IndexPaths::new(&args.data);
    let frontier_path = paths.frontier();
    if args.seed.is_none() && !args.resume {
        return Err(anyhow!("pass --seed <url> or --resume"));
    }

    let index = SearchIndex::open_dir(paths.db())?;
    let fetcher = HttpFetcher::new(&config.crawl)?;
    let mut total = CrawlReport::default();

    for run in 0..args.runs.max(1) {
        let mut crawler = match (&args.seed, run) {
            (Some(seed), 0) => Crawler::seeded(&index, &fetcher, &config.crawl, seed),
            _ => Crawler::resumed(&index, &fetcher, &config.crawl, &frontier_path)?,
        };
        let report = crawler.run(args.budget).await;
        crawler.checkpoint(&frontier_path)?;
        index.flush()?;
        eprintln!("run {}: {}", run + 1, serde_json::to_string(&report)?);

        total.fetched += report.fetched;
        total.added += report.added;
        total.updated += report.updated;
        total.bypassed += report.bypassed;
        total.ignored += report.ignored;
        total.failed += report.failed;
        total.frontier = report.frontier;
        if report.frontier == 0 {
            break;
        }
    }

    println!("{}", serde_json::to_string_pretty(&total)?);
    Ok(())
}
