use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use search_core::persist::{load_meta, save_meta, IndexPaths, MetaFile};
use search_core::{EngineConfig, PageRankEngine, RetrievalEngine, SearchIndex};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Derive ranking data from a crawled index and query it", long_about = None)]
struct Cli {
    /// Data directory holding db/ and meta.json
    #[arg(long, global = true, default_value = "./data")]
    data: PathBuf,
    /// Optional JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild parent links and document lengths, then write meta.json
    Derive,
    /// Compute and store PageRank scores
    Pagerank {
        #[arg(long)]
        iterations: Option<usize>,
        #[arg(long)]
        damping: Option<f64>,
    },
    /// Run a query and print the ranked pages as JSON
    Query {
        #[arg(long)]
        q: String,
        #[arg(long)]
        k: Option<usize>,
    },
    /// Drop a page from the index
    Remove {
        #[arg(long)]
        url: String,
    },
    /// Print index counters; with --pages, one line per fetched page
    Stats {
        #[arg(long, default_value_t = false)]
        pages: bool,
    },
}

#[derive(Serialize)]
struct QueryHit {
    page: u32,
    score: f64,
    title: String,
    url: String,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let mut config = EngineConfig::load(cli.config.as_deref())?;
    let paths = IndexPaths::new(&cli.data);
    let index = SearchIndex::open_dir(paths.db())?;

    match cli.command {
        Commands::Derive => {
            let parents = index.derive_parent_links()?;
            let lengths = index.derive_doc_lengths()?;
            let meta = MetaFile {
                num_pages: index.page_count(),
                num_words: index.registry.words.len(),
                created_at: time::OffsetDateTime::now_utc()
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_else(|_| "".into()),
                version: 1,
            };
            save_meta(&paths, &meta)?;
            index.flush()?;
            tracing::info!(parents, lengths, pages = meta.num_pages, words = meta.num_words, "derivation complete");
        }
        Commands::Pagerank { iterations, damping } => {
            if let Some(n) = iterations {
                config.rank.iterations = n;
            }
            if let Some(d) = damping {
                config.rank.damping = d;
            }
            config.validate()?;
            let scores = PageRankEngine::new(config.rank.iterations, config.rank.damping).run(&index)?;
            index.flush()?;
            let mut top: Vec<(u32, f64)> = scores.into_iter().collect();
            top.sort_by(|a, b| b.1.total_cmp(&a.1));
            for (page, score) in top.iter().take(10) {
                let url = index.registry.url(*page).unwrap_or_default();
                println!("{score:.6}\t{page}\t{url}");
            }
        }
        Commands::Query { q, k } => {
            if let Some(k) = k {
                config.retrieval.max_results = k;
            }
            config.validate()?;
            let engine = RetrievalEngine::new(Arc::new(index), config.retrieval.clone());
            let mut hits = Vec::new();
            for scored in engine.query(&q)? {
                let meta = engine.index().meta.get(scored.page)?;
                let (title, url) = meta.map(|m| (m.title, m.url)).unwrap_or_default();
                hits.push(QueryHit { page: scored.page, score: scored.score, title, url });
            }
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Commands::Remove { url } => {
            let page = index
                .registry
                .page_id(&url, false)?
                .ok_or_else(|| anyhow!("{url} is not in the index"))?;
            if index.remove_page(page)? {
                index.flush()?;
                println!("removed page {page}; run `indexer derive` and `indexer pagerank` to refresh rankings");
            } else {
                println!("page {page} was never fetched");
            }
        }
        Commands::Stats { pages } => {
            let stats = serde_json::json!({
                "pages": index.page_count(),
                "urls": index.registry.pages.len(),
                "words": index.registry.words.len(),
                "last_derived": load_meta(&paths).ok().map(|m| m.created_at),
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
            if pages {
                for page in index.meta.page_ids()? {
                    let Some(meta) = index.meta.get(page)? else {
                        continue;
                    };
                    let words: Vec<String> = index
                        .keyword_frequencies(page)?
                        .into_iter()
                        .map(|(w, f)| format!("{w} {f}"))
                        .collect();
                    println!("{page}\t{}\t{}\t{}, {}", meta.title, meta.url, meta.last_modified, meta.size);
                    println!("\t{}", words.join("; "));
                }
            }
        }
    }
    Ok(())
}
