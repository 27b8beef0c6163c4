//! Keyword search over a small document corpus.
//!
//! [`Tokenizer`] normalizes text into terms, [`Index::build`] turns a corpus
//! into postings, term-frequency and document-length tables,
//! [`persist`] saves and loads those tables as one unit, [`scoring`] holds
//! TF / IDF / BM25, and [`SearchEngine`] ties them together behind the
//! [`Retriever`] contract.

pub mod corpus;
pub mod error;
pub mod index;
pub mod persist;
pub mod query;
pub mod scoring;
pub mod tokenizer;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use index::{DocId, Document, Index};
pub use persist::{load_index, save_index, IndexPaths};
pub use query::{Hit, IndexState, Retriever, SearchEngine, DEFAULT_SEARCH_LIMIT};
pub use scoring::Bm25Params;
pub use tokenizer::{Stem, Stopwords, Tokenizer};
