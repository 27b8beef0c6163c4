use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use search_core::{Stopwords, Tokenizer};
use server::{build_app, AppConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index cache directory
    #[arg(long, default_value = "./cache")]
    cache: PathBuf,
    /// Corpus file used when no cache exists and by POST /index/rebuild
    #[arg(long)]
    corpus: Option<PathBuf>,
    /// Stopword list, one word per line (defaults to the built-in English list)
    #[arg(long)]
    stopwords: Option<PathBuf>,
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
    let tokenizer = match &args.stopwords {
        Some(path) => {
            let list = std::fs::read_to_string(path)
                .with_context(|| format!("reading stopwords from {}", path.display()))?;
            Tokenizer::with_stopwords(Arc::new(Stopwords::parse(&list)))
        }
        None => Tokenizer::english(),
    };
    let config = AppConfig {
        cache: args.cache,
        corpus: args.corpus,
        admin_token: std::env::var("ADMIN_TOKEN").ok(),
    };
    let app: Router = build_app(config, tokenizer)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
