use anyhow::Result;
use axum::Router;
use clap::Parser;
use search_core::persist::IndexPaths;
use search_core::{EngineConfig, SearchIndex};
use server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Data directory holding db/
    #[arg(long, default_value = "./data")]
    data: PathBuf,
    /// Optional JSON config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref())?;
    let index = SearchIndex::open_dir(IndexPaths::new(&args.data).db())?;
    let app: Router = build_app(Arc::new(index), config.retrieval);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
