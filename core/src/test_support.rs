//! Shared fixtures for unit and property tests.

use crate::index::{DocId, Document};
use crate::tokenizer::{NoStem, Stopwords, Tokenizer};
use proptest::prelude::*;
use std::sync::Arc;

/// Up to 25 documents over a five-letter vocabulary, with sparse ids so
/// id order and position order differ from map order. Some are empty.
pub(crate) fn corpus() -> impl Strategy<Value = Vec<Document>> {
    prop::collection::vec(prop::collection::vec("[a-e]{1,3}", 0..12), 0..25).prop_map(|docs| {
        docs.into_iter()
            .enumerate()
            .map(|(i, words)| Document::new(i as DocId * 3 + 1, "", words.join(" ")))
            .collect()
    })
}

/// No stopwords, no stemming: generated words are terms as-is.
pub(crate) fn plain_tokenizer() -> Tokenizer {
    Tokenizer::new(Arc::new(Stopwords::default()), Arc::new(NoStem))
}
