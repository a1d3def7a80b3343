//! Storage, indexing and ranking for a single-domain web search engine.
//!
//! The crawler writes pages through [`SearchIndex::index_page`]; the indexer
//! derives parent links, document lengths and PageRank in batch; queries run
//! through [`RetrievalEngine`].

pub mod config;
pub mod derived;
pub mod error;
pub mod fetch;
pub mod index;
pub mod page;
pub mod pagerank;
pub mod persist;
pub mod posting;
pub mod registry;
pub mod retrieval;
pub mod store;
pub mod tokenizer;

pub type PageId = u32;
pub type WordId = u32;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use fetch::{FetchError, FetchedPage, Fetcher};
pub use index::{ChildFilter, SearchIndex};
pub use pagerank::PageRankEngine;
pub use retrieval::{RetrievalEngine, ScoredPage};
