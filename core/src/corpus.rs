//! Corpus parsing.
//!
//! Accepts a JSON object holding a `movies` array, a bare JSON array, or
//! JSON Lines. Every entry must carry `id`, `title` and `description`;
//! anything else fails the whole load.

use crate::error::{Error, Result};
use crate::index::Document;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    Array(Vec<serde_json::Value>),
    Movies { movies: Vec<serde_json::Value> },
}

fn to_document(value: serde_json::Value, position: usize) -> Result<Document> {
    serde_json::from_value(value)
        .map_err(|e| Error::CorpusLoad(format!("entry {position}: {e}")))
}

/// Parse a whole JSON document (`{"movies": [...]}` or `[...]`).
pub fn parse_json(text: &str) -> Result<Vec<Document>> {
    let file: CorpusFile = serde_json::from_str(text).map_err(|e| {
        Error::CorpusLoad(format!("expected a `movies` array or a JSON array: {e}"))
    })?;
    let entries = match file {
        CorpusFile::Array(entries) => entries,
        CorpusFile::Movies { movies } => movies,
    };
    entries
        .into_iter()
        .enumerate()
        .map(|(i, v)| to_document(v, i))
        .collect()
}

/// Parse JSON Lines, one document per non-blank line.
pub fn parse_jsonl<R: Read>(reader: R) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.map_err(|e| Error::CorpusLoad(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: Document = serde_json::from_str(&line)
            .map_err(|e| Error::CorpusLoad(format!("line {}: {e}", lineno + 1)))?;
        docs.push(doc);
    }
    Ok(docs)
}

/// Read one corpus file; `.jsonl` is parsed as JSON Lines, anything else as JSON.
pub fn load_path(path: &Path) -> Result<Vec<Document>> {
    let unreadable = |e: std::io::Error| Error::CorpusLoad(format!("{}: {e}", path.display()));
    let in_file = |e: Error| match e {
        Error::CorpusLoad(msg) => Error::CorpusLoad(format!("{}: {msg}", path.display())),
        other => other,
    };
    if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let f = File::open(path).map_err(unreadable)?;
        parse_jsonl(f).map_err(in_file)
    } else {
        let text = fs::read_to_string(path).map_err(unreadable)?;
        parse_json(&text).map_err(in_file)
    }
}
