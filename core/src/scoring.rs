//! TF, IDF and Okapi BM25 over a built [`Index`].
//!
//! Everything here takes already-normalized terms; raw-text entry points
//! live on [`crate::query::SearchEngine`]. None of these functions produce
//! NaN: parameters are checked with [`Bm25Params::validate`], a zero term
//! frequency short-circuits to 0 and an empty corpus uses a
//! length-normalization factor of 1.

use crate::error::{Error, Result};
use crate::index::{DocId, Index};

pub const BM25_K1: f64 = 1.5;
pub const BM25_B: f64 = 0.75;

/// BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization strength, 0 disables it.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: BM25_K1, b: BM25_B }
    }
}

impl Bm25Params {
    /// `k1` must be finite and non-negative, `b` within `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if !(self.k1.is_finite() && self.k1 >= 0.0) {
            return Err(Error::InvalidParams(format!("k1 must be a finite number >= 0, got {}", self.k1)));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(Error::InvalidParams(format!("b must be within [0, 1], got {}", self.b)));
        }
        Ok(())
    }
}

/// Occurrences of `term` in `doc_id`; 0 if the document lacks it.
pub fn term_frequency(index: &Index, doc_id: DocId, term: &str) -> Result<u32> {
    if !index.docmap.contains_key(&doc_id) {
        return Err(Error::MissingDocument(doc_id));
    }
    Ok(index
        .term_frequencies
        .get(&doc_id)
        .and_then(|counts| counts.get(term))
        .copied()
        .unwrap_or(0))
}

/// Smoothed IDF: `ln((N + 1) / (df + 1))`.
pub fn idf(index: &Index, term: &str) -> f64 {
    let n = index.num_docs() as f64;
    let df = index.doc_frequency(term) as f64;
    ((n + 1.0) / (df + 1.0)).ln()
}

/// BM25 IDF: `ln((N - df + 0.5) / (df + 0.5) + 1)`.
pub fn bm25_idf(index: &Index, term: &str) -> f64 {
    let n = index.num_docs() as f64;
    let df = index.doc_frequency(term) as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// `1 - b + b * len / avg_len`, or 1 when there is no average to divide by.
fn length_norm(doc_len: u32, avg_len: f64, b: f64) -> f64 {
    if avg_len <= 0.0 {
        return 1.0;
    }
    1.0 - b + b * (f64::from(doc_len) / avg_len)
}

/// Saturated BM25 term frequency given the precomputed corpus average.
/// `params` must already be validated.
fn saturate(tf: u32, doc_len: u32, avg_len: f64, params: Bm25Params) -> f64 {
    if tf == 0 {
        return 0.0;
    }
    let tf = f64::from(tf);
    let norm = length_norm(doc_len, avg_len, params.b);
    tf * (params.k1 + 1.0) / (tf + params.k1 * norm)
}

/// BM25 TF: `tf * (k1 + 1) / (tf + k1 * norm)`.
pub fn bm25_tf(index: &Index, doc_id: DocId, term: &str, params: Bm25Params) -> Result<f64> {
    params.validate()?;
    let tf = term_frequency(index, doc_id, term)?;
    let len = index.doc_length(doc_id)?;
    Ok(saturate(tf, len, index.avg_doc_length(), params))
}

pub fn bm25_score(index: &Index, doc_id: DocId, term: &str, params: Bm25Params) -> Result<f64> {
    Ok(bm25_tf(index, doc_id, term, params)? * bm25_idf(index, term))
}

/// Per-query BM25 scorer. Caches the corpus average length and the IDF of
/// each query term so a query costs one pass over the candidates.
pub(crate) struct QueryScorer<'a> {
    index: &'a Index,
    params: Bm25Params,
    avg_len: f64,
    terms: Vec<(&'a str, f64)>,
}

impl<'a> QueryScorer<'a> {
    pub(crate) fn new(index: &'a Index, terms: &'a [String], params: Bm25Params) -> Self {
        let terms = terms.iter().map(|t| (t.as_str(), bm25_idf(index, t))).collect();
        Self { index, params, avg_len: index.avg_doc_length(), terms }
    }

    /// Sum of BM25 scores of every query term for `doc_id`.
    pub(crate) fn score(&self, doc_id: DocId) -> f64 {
        let counts = self.index.term_frequencies.get(&doc_id);
        let len = self.index.doc_lengths.get(&doc_id).copied().unwrap_or(0);
        self.terms
            .iter()
            .map(|(term, idf)| {
                let tf = counts.and_then(|c| c.get(*term)).copied().unwrap_or(0);
                saturate(tf, len, self.avg_len, self.params) * idf
            })
            .sum()
    }
}
