use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub type DocId = u32;

/// A corpus entry. All three fields are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub description: String,
}

impl Document {
    pub fn new(id: DocId, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { id, title: title.into(), description: description.into() }
    }

    /// Text that gets indexed: title and description joined by a space.
    pub fn indexed_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// term -> ids of documents containing it, ascending.
pub type PostingsList = HashMap<String, BTreeSet<DocId>>;
/// doc id -> (term -> count).
pub type TermFrequencyTable = HashMap<DocId, HashMap<String, u32>>;
/// doc id -> number of terms after normalization.
pub type DocumentLengthTable = HashMap<DocId, u32>;
pub type DocumentMap = HashMap<DocId, Document>;

/// The four index structures. Built wholesale, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub postings: PostingsList,
    pub docmap: DocumentMap,
    pub term_frequencies: TermFrequencyTable,
    pub doc_lengths: DocumentLengthTable,
}

impl Index {
    pub fn new() -> Self { Self::default() }

    /// Build from a full corpus scan. A duplicated id fails the whole build.
    pub fn build<I>(documents: I, tokenizer: &Tokenizer) -> Result<Self>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut index = Index::new();
        for doc in documents {
            index.add_document(doc, tokenizer)?;
        }
        tracing::info!(
            num_docs = index.num_docs(),
            num_terms = index.num_terms(),
            "built index"
        );
        Ok(index)
    }

    fn add_document(&mut self, doc: Document, tokenizer: &Tokenizer) -> Result<()> {
        if self.docmap.contains_key(&doc.id) {
            return Err(Error::CorpusLoad(format!("duplicate document id {}", doc.id)));
        }
        let terms = tokenizer.tokenize(&doc.indexed_text());
        let counts = self.term_frequencies.entry(doc.id).or_default();
        for term in &terms {
            *counts.entry(term.clone()).or_insert(0) += 1;
            self.postings.entry(term.clone()).or_default().insert(doc.id);
        }
        self.doc_lengths.insert(doc.id, terms.len() as u32);
        self.docmap.insert(doc.id, doc);
        Ok(())
    }

    pub fn num_docs(&self) -> usize { self.docmap.len() }

    pub fn num_terms(&self) -> usize { self.postings.len() }

    pub fn is_empty(&self) -> bool { self.docmap.is_empty() }

    pub fn document(&self, doc_id: DocId) -> Option<&Document> {
        self.docmap.get(&doc_id)
    }

    /// Ids of documents containing `term`, ascending. Unknown terms yield nothing.
    pub fn documents(&self, term: &str) -> impl Iterator<Item = DocId> + '_ {
        self.postings.get(term).into_iter().flat_map(|ids| ids.iter().copied())
    }

    pub fn doc_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, BTreeSet::len)
    }

    pub fn doc_length(&self, doc_id: DocId) -> Result<u32> {
        self.doc_lengths.get(&doc_id).copied().ok_or(Error::MissingDocument(doc_id))
    }

    /// Mean document length, 0.0 for an empty index.
    pub fn avg_doc_length(&self) -> f64 {
        if self.doc_lengths.is_empty() {
            return 0.0;
        }
        let total: u64 = self.doc_lengths.values().map(|&l| u64::from(l)).sum();
        total as f64 / self.doc_lengths.len() as f64
    }

    /// All document ids, ascending.
    pub fn doc_ids(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self.docmap.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Check that the four structures agree with each other. Returns a
    /// description of the first violation found.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.docmap.len() != self.doc_lengths.len() {
            return Err(format!(
                "docmap has {} documents, doc_lengths has {}",
                self.docmap.len(),
                self.doc_lengths.len()
            ));
        }
        for (id, doc) in &self.docmap {
            if doc.id != *id {
                return Err(format!("docmap key {id} holds document {}", doc.id));
            }
            if !self.doc_lengths.contains_key(id) {
                return Err(format!("document {id} has no length"));
            }
        }
        for (id, counts) in &self.term_frequencies {
            if !self.docmap.contains_key(id) {
                return Err(format!("term frequencies reference unknown document {id}"));
            }
            let mut total: u64 = 0;
            for (term, &count) in counts {
                if count == 0 {
                    continue;
                }
                total += u64::from(count);
                if !self.postings.get(term).is_some_and(|ids| ids.contains(id)) {
                    return Err(format!("term {term:?} counted in document {id} but not posted"));
                }
            }
            if total != u64::from(self.doc_lengths[id]) {
                return Err(format!(
                    "document {id} has length {} but {total} counted terms",
                    self.doc_lengths[id]
                ));
            }
        }
        for (id, &len) in &self.doc_lengths {
            if len > 0 && !self.term_frequencies.contains_key(id) {
                return Err(format!("document {id} has length {len} but no term counts"));
            }
        }
        for (term, ids) in &self.postings {
            if ids.is_empty() {
                return Err(format!("term {term:?} has an empty postings set"));
            }
            for id in ids {
                let count = self
                    .term_frequencies
                    .get(id)
                    .and_then(|counts| counts.get(term))
                    .copied()
                    .unwrap_or(0);
                if count == 0 {
                    return Err(format!("term {term:?} posted for document {id} with no count"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{corpus, plain_tokenizer};
    use proptest::prelude::*;

    fn movies() -> Vec<Document> {
        vec![
            Document::new(1, "The Matrix", "a hacker discovers reality is simulated"),
            Document::new(2, "The Notebook", "two lovers reunite"),
        ]
    }

    #[test]
    fn build_records_all_four_structures() {
        let index = Index::build(movies(), &Tokenizer::english()).unwrap();
        assert_eq!(index.num_docs(), 2);
        assert_eq!(index.documents("matrix").collect::<Vec<_>>(), vec![1]);
        assert_eq!(index.term_frequencies[&1]["matrix"], 1);
        assert_eq!(index.doc_length(2).unwrap(), 4);
        assert_eq!(index.document(2).unwrap().title, "The Notebook");
        index.validate().unwrap();
    }

    #[test]
    fn term_counts_sum_to_length() {
        let docs = vec![Document::new(7, "Run run RUN", "runners running")];
        let index = Index::build(docs, &Tokenizer::english()).unwrap();
        let total: u32 = index.term_frequencies[&7].values().sum();
        assert_eq!(total, index.doc_length(7).unwrap());
        assert_eq!(index.doc_frequency("run"), 1);
    }

    #[test]
    fn duplicate_ids_fail_the_build() {
        let docs = vec![Document::new(1, "a", "b"), Document::new(1, "c", "d")];
        let err = Index::build(docs, &Tokenizer::english()).unwrap_err();
        assert!(matches!(err, Error::CorpusLoad(_)));
    }

    #[test]
    fn build_is_order_independent() {
        let t = Tokenizer::english();
        let mut reversed = movies();
        reversed.reverse();
        assert_eq!(Index::build(movies(), &t).unwrap(), Index::build(reversed, &t).unwrap());
    }

    #[test]
    fn empty_corpus_and_stopword_only_documents() {
        let t = Tokenizer::english();
        let empty = Index::build(Vec::new(), &t).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.avg_doc_length(), 0.0);

        let index = Index::build(vec![Document::new(3, "The", "of the")], &t).unwrap();
        assert_eq!(index.doc_length(3).unwrap(), 0);
        index.validate().unwrap();
    }

    #[test]
    fn validate_catches_tampering() {
        let mut index = Index::build(movies(), &Tokenizer::english()).unwrap();
        index.doc_lengths.insert(1, 99);
        assert!(index.validate().is_err());

        let mut index = Index::build(movies(), &Tokenizer::english()).unwrap();
        index.postings.get_mut("matrix").unwrap().insert(2);
        assert!(index.validate().is_err());

        let mut index = Index::build(movies(), &Tokenizer::english()).unwrap();
        index.docmap.remove(&2);
        assert!(index.validate().is_err());
    }

    proptest! {
        #[test]
        fn postings_are_strictly_ascending_and_complete(docs in corpus()) {
            let index = Index::build(docs, &plain_tokenizer()).unwrap();
            prop_assert!(index.validate().is_ok());
            for term in index.postings.keys() {
                let ids: Vec<DocId> = index.documents(term).collect();
                prop_assert!(!ids.is_empty());
                for pair in ids.windows(2) {
                    prop_assert!(pair[0] < pair[1], "{:?}: {:?}", term, ids);
                }
                prop_assert_eq!(ids.len(), index.doc_frequency(term));
            }
        }
    }
}
