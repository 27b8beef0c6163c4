use crate::DocId;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by index building, persistence and scoring.
///
/// A term that is absent from the index is never an error; it simply
/// contributes nothing to a result.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The corpus was unreadable or malformed. Nothing was built.
    #[error("corpus load error: {0}")]
    CorpusLoad(String),
    /// No usable cache (or no index at all): the caller should rebuild.
    #[error("index not found: {0}")]
    CacheNotFound(String),
    /// A single-term API received something other than one indexable word.
    #[error("expected a single term, got {0:?}")]
    InvalidTermQuery(String),
    /// BM25 parameters outside `k1 >= 0`, `0 <= b <= 1`.
    #[error("invalid BM25 parameters: {0}")]
    InvalidParams(String),
    #[error("document {0} is not in the index")]
    MissingDocument(DocId),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn cache_not_found(reason: impl Into<String>) -> Self {
        Error::CacheNotFound(reason.into())
    }
}
