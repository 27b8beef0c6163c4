use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use search_core::corpus::load_path;
use search_core::{Bm25Params, DocId, Document, Error, IndexPaths, SearchEngine, Stopwords, Tokenizer, DEFAULT_SEARCH_LIMIT};
use search_core::scoring::{BM25_B, BM25_K1};
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build a keyword index and query it with TF-IDF and BM25", long_about = None)]
struct Cli {
    /// Index cache directory
    #[arg(long, global = true, default_value = "./cache")]
    cache: PathBuf,
    /// Stopword list, one word per line (defaults to the built-in English list)
    #[arg(long, global = true)]
    stopwords: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a JSON/JSONL corpus file or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
    },
    /// Keyword search, postings order
    Search {
        query: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Term frequency of one term in one document
    Tf { doc_id: DocId, term: String },
    /// Smoothed inverse document frequency of one term
    Idf { term: String },
    /// BM25 inverse document frequency of one term
    Bm25idf { term: String },
    /// Saturated BM25 term frequency of one term in one document
    Bm25tf {
        doc_id: DocId,
        term: String,
        #[arg(long, default_value_t = BM25_K1, allow_negative_numbers = true)]
        k1: f64,
        #[arg(long, default_value_t = BM25_B, allow_negative_numbers = true)]
        b: f64,
    },
    /// BM25 ranked search
    Bm25search {
        query: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match run(cli) {
        Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::CacheNotFound(_))) => {
            tracing::debug!(error = %e, "no usable index");
            eprintln!("Index not found. Please build first.");
            std::process::exit(1);
        }
        other => other,
    }
}

fn run(cli: Cli) -> Result<()> {
    let engine = SearchEngine::new(tokenizer(cli.stopwords.as_deref())?);
    let paths = IndexPaths::new(&cli.cache);

    if !matches!(cli.command, Commands::Build { .. }) {
        engine.load(&paths)?;
    }
    match cli.command {
        Commands::Build { input } => {
            let docs = read_corpus(&input)?;
            engine.build(docs)?;
            engine.save(&paths)?;
            tracing::info!(cache = %cli.cache.display(), "index build complete");
        }
        Commands::Search { query, limit } => {
            println!("Searching for: {query}");
            for (i, doc) in engine.search(&query, limit)?.iter().enumerate() {
                println!("{}. {} : {}", i + 1, doc.title, doc.id);
            }
        }
        Commands::Tf { doc_id, term } => {
            let tf = engine.term_frequency(doc_id, &term)?;
            println!("Term frequency of '{term}' in document '{doc_id}': {tf}");
        }
        Commands::Idf { term } => {
            let idf = engine.idf(&term)?;
            println!("Inverse document frequency of '{term}': {idf:.2}");
        }
        Commands::Bm25idf { term } => {
            let idf = engine.bm25_idf(&term)?;
            println!("BM25 IDF score of '{term}': {idf:.2}");
        }
        Commands::Bm25tf { doc_id, term, k1, b } => {
            let tf = engine.bm25_tf(doc_id, &term, Bm25Params { k1, b })?;
            println!("BM25 TF score of '{term}' in document '{doc_id}': {tf:.2}");
        }
        Commands::Bm25search { query, limit } => {
            let index = engine.snapshot()?;
            for (i, hit) in engine.bm25_search(&query, limit)?.iter().enumerate() {
                let title = index.document(hit.doc_id).map_or("", |d| d.title.as_str());
                println!("{}. ({}) {} - Score: {:.2}", i + 1, hit.doc_id, title, hit.score);
            }
        }
    }
    Ok(())
}

/// Stopwords are read once here and shared by every tokenize call.
fn tokenizer(stopwords: Option<&Path>) -> Result<Tokenizer> {
    let Some(path) = stopwords else {
        return Ok(Tokenizer::english());
    };
    let list = fs::read_to_string(path)
        .with_context(|| format!("reading stopwords from {}", path.display()))?;
    let stopwords = Stopwords::parse(&list);
    tracing::debug!(count = stopwords.len(), path = %path.display(), "loaded stopwords");
    Ok(Tokenizer::with_stopwords(Arc::new(stopwords)))
}

fn read_corpus(input: &Path) -> Result<Vec<Document>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = entry.with_context(|| format!("walking {}", input.display()))?;
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!(Error::CorpusLoad(format!("{} does not exist", input.display())));
    }

    let mut docs = Vec::new();
    for file in &files {
        let batch = load_path(file)?;
        tracing::debug!(file = %file.display(), count = batch.len(), "read corpus file");
        docs.extend(batch);
    }
    tracing::info!(files = files.len(), num_docs = docs.len(), "ingested documents");
    Ok(docs)
}
