//! Keyword and BM25 retrieval, and the [`SearchEngine`] that owns the live
//! index snapshot.

use crate::error::{Error, Result};
use crate::index::{DocId, Document, Index};
use crate::persist::{load_index, save_index, IndexPaths};
use crate::scoring::{self, Bm25Params, QueryScorer};
use crate::tokenizer::Tokenizer;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const DEFAULT_SEARCH_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub doc_id: DocId,
    pub score: f64,
}

/// Ranked retrieval. Lexical and embedding backends are interchangeable
/// behind this trait.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Hit>>;
}

/// Walk each term's postings in query order and collect documents until
/// `limit` is reached.
///
/// A document matching several query terms is returned once per matching
/// term; there is no cross-term deduplication.
pub fn keyword_search<'a>(index: &'a Index, terms: &[String], limit: usize) -> Vec<&'a Document> {
    let mut results = Vec::new();
    if limit == 0 {
        return results;
    }
    'terms: for term in terms {
        for doc_id in index.documents(term) {
            if let Some(doc) = index.document(doc_id) {
                results.push(doc);
                if results.len() == limit {
                    break 'terms;
                }
            }
        }
    }
    results
}

fn rank(hits: &mut [Hit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
}

/// Score every document in the corpus. Reference for [`bm25_rank`].
#[cfg(test)]
pub(crate) fn bm25_rank_exhaustive(index: &Index, terms: &[String], limit: usize, params: Bm25Params) -> Vec<Hit> {
    let scorer = QueryScorer::new(index, terms, params);
    let mut hits: Vec<Hit> = index
        .doc_ids()
        .into_iter()
        .map(|doc_id| Hit { doc_id, score: scorer.score(doc_id) })
        .collect();
    rank(&mut hits);
    hits.truncate(limit);
    hits
}

/// Top `limit` documents by summed BM25 score, ties by ascending id.
///
/// Only documents in the union of the query terms' postings are scored.
/// Every other document scores exactly 0, so when fewer than `limit`
/// candidates exist the rest are filled from the remaining documents in
/// id order. The result length is `min(limit, N)`, as if every document
/// had been scored.
///
/// With validated parameters every candidate scores strictly above 0, which
/// is what makes the padding order-preserving.
pub fn bm25_rank(index: &Index, terms: &[String], limit: usize, params: Bm25Params) -> Result<Vec<Hit>> {
    params.validate()?;
    if limit == 0 || index.is_empty() {
        return Ok(Vec::new());
    }
    let candidates: BTreeSet<DocId> = terms.iter().flat_map(|t| index.documents(t)).collect();
    let scorer = QueryScorer::new(index, terms, params);
    let mut hits: Vec<Hit> = candidates
        .iter()
        .map(|&doc_id| Hit { doc_id, score: scorer.score(doc_id) })
        .collect();
    rank(&mut hits);
    hits.truncate(limit);
    if hits.len() < limit {
        let fill = limit - hits.len();
        hits.extend(
            index
                .doc_ids()
                .into_iter()
                .filter(|id| !candidates.contains(id))
                .take(fill)
                .map(|doc_id| Hit { doc_id, score: 0.0 }),
        );
    }
    Ok(hits)
}

/// Where the engine's index came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Uninitialized,
    Built,
    Persisted,
    Loaded,
}

struct Snapshot {
    state: IndexState,
    index: Option<Arc<Index>>,
}

/// Owns the tokenizer and the current index snapshot.
///
/// Queries clone the snapshot `Arc` and score without holding the lock, so
/// a rebuild or reload swaps in a new index without disturbing readers.
/// Saves through one engine run one at a time.
pub struct SearchEngine {
    tokenizer: Tokenizer,
    params: Bm25Params,
    current: RwLock<Snapshot>,
    save_lock: Mutex<()>,
}

impl SearchEngine {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            params: Bm25Params::default(),
            current: RwLock::new(Snapshot { state: IndexState::Uninitialized, index: None }),
            save_lock: Mutex::new(()),
        }
    }

    /// Default BM25 parameters for [`SearchEngine::bm25_search`].
    pub fn with_params(mut self, params: Bm25Params) -> Result<Self> {
        params.validate()?;
        self.params = params;
        Ok(self)
    }

    pub fn tokenizer(&self) -> &Tokenizer { &self.tokenizer }

    pub fn params(&self) -> Bm25Params { self.params }

    pub fn state(&self) -> IndexState { self.current.read().state }

    fn install(&self, index: Index, state: IndexState) -> Arc<Index> {
        let index = Arc::new(index);
        let mut current = self.current.write();
        current.index = Some(Arc::clone(&index));
        current.state = state;
        index
    }

    /// The live index, or `CacheNotFound` if nothing has been built or loaded.
    pub fn snapshot(&self) -> Result<Arc<Index>> {
        self.current
            .read()
            .index
            .clone()
            .ok_or_else(|| Error::cache_not_found("no index built or loaded; build it first"))
    }

    /// Build from a full corpus and make it the live snapshot. On error the
    /// previous snapshot stays live.
    pub fn build<I>(&self, documents: I) -> Result<Arc<Index>>
    where
        I: IntoIterator<Item = Document>,
    {
        let index = Index::build(documents, &self.tokenizer)?;
        Ok(self.install(index, IndexState::Built))
    }

    /// Persist the live snapshot. The index written is the one live when the
    /// save lock was taken; the state only becomes `Persisted` if that index
    /// is still live afterwards.
    pub fn save(&self, paths: &IndexPaths) -> Result<()> {
        let _guard = self.save_lock.lock();
        let index = self.snapshot()?;
        save_index(paths, &index)?;
        let mut current = self.current.write();
        if current.index.as_ref().is_some_and(|live| Arc::ptr_eq(live, &index)) {
            current.state = IndexState::Persisted;
        }
        Ok(())
    }

    pub fn load(&self, paths: &IndexPaths) -> Result<Arc<Index>> {
        let index = load_index(paths)?;
        Ok(self.install(index, IndexState::Loaded))
    }

    pub fn term_frequency(&self, doc_id: DocId, term: &str) -> Result<u32> {
        let index = self.snapshot()?;
        let term = self.tokenizer.single_term(term)?;
        scoring::term_frequency(&index, doc_id, &term)
    }

    pub fn idf(&self, term: &str) -> Result<f64> {
        let index = self.snapshot()?;
        let term = self.tokenizer.single_term(term)?;
        Ok(scoring::idf(&index, &term))
    }

    pub fn bm25_idf(&self, term: &str) -> Result<f64> {
        let index = self.snapshot()?;
        let term = self.tokenizer.single_term(term)?;
        Ok(scoring::bm25_idf(&index, &term))
    }

    pub fn bm25_tf(&self, doc_id: DocId, term: &str, params: Bm25Params) -> Result<f64> {
        let index = self.snapshot()?;
        let term = self.tokenizer.single_term(term)?;
        scoring::bm25_tf(&index, doc_id, &term, params)
    }

    pub fn bm25_score(&self, doc_id: DocId, term: &str) -> Result<f64> {
        let index = self.snapshot()?;
        let term = self.tokenizer.single_term(term)?;
        scoring::bm25_score(&index, doc_id, &term, self.params)
    }

    /// Plain keyword search, see [`keyword_search`].
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Document>> {
        let index = self.snapshot()?;
        let terms = self.tokenizer.tokenize(query);
        Ok(keyword_search(&index, &terms, limit).into_iter().cloned().collect())
    }

    pub fn bm25_search(&self, query: &str, limit: usize) -> Result<Vec<Hit>> {
        self.bm25_search_with(query, limit, self.params)
    }

    pub fn bm25_search_with(&self, query: &str, limit: usize, params: Bm25Params) -> Result<Vec<Hit>> {
        let index = self.snapshot()?;
        let terms = self.tokenizer.tokenize(query);
        bm25_rank(&index, &terms, limit, params)
    }
}

impl Retriever for SearchEngine {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Hit>> {
        self.bm25_search(query, k)
    }
}
