use crate::error::{Error, Result};
use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

lazy_static! {
    static ref ENGLISH_STOPWORDS: Arc<Stopwords> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        Arc::new(Stopwords::from_words(words.iter().copied()))
    };
    static ref ENGLISH_STEMMER: Arc<dyn Stem> = Arc::new(Stemmer::create(Algorithm::English));
}

/// Lowercase and drop ASCII punctuation. Applied to raw text and to stopword entries alike.
fn clean(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect()
}

/// A stemming algorithm, injected into the [`Tokenizer`].
pub trait Stem: Send + Sync {
    fn stem<'a>(&self, word: &'a str) -> Cow<'a, str>;
}

impl Stem for Stemmer {
    fn stem<'a>(&self, word: &'a str) -> Cow<'a, str> {
        Stemmer::stem(self, word)
    }
}

/// Leaves words untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStem;

impl Stem for NoStem {
    fn stem<'a>(&self, word: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(word)
    }
}

/// Immutable stopword set. Entries are normalized the same way tokens are,
/// so `aren't` in the list filters the token `arent`.
#[derive(Debug, Clone, Default)]
pub struct Stopwords {
    words: HashSet<String>,
}

impl Stopwords {
    pub fn from_words<'a, I: IntoIterator<Item = &'a str>>(words: I) -> Self {
        let words = words
            .into_iter()
            .map(clean)
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    /// Parse a flat list, one word per line. Blank lines are ignored.
    pub fn parse(list: &str) -> Self {
        Self::from_words(list.lines())
    }

    /// Built-in English list, shared process-wide.
    pub fn english() -> Arc<Self> {
        Arc::clone(&ENGLISH_STOPWORDS)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Canonical text normalizer. Every term stored in or looked up from an
/// index comes out of [`Tokenizer::tokenize`] or [`Tokenizer::single_term`].
///
/// Cloning is cheap: the stopword set and stemmer are shared.
#[derive(Clone)]
pub struct Tokenizer {
    stopwords: Arc<Stopwords>,
    stemmer: Arc<dyn Stem>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::english()
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("stopwords", &self.stopwords.len())
            .finish_non_exhaustive()
    }
}

impl Tokenizer {
    pub fn new(stopwords: Arc<Stopwords>, stemmer: Arc<dyn Stem>) -> Self {
        Self { stopwords, stemmer }
    }

    /// Built-in English stopwords with the English (Porter2) stemmer.
    pub fn english() -> Self {
        Self::new(Stopwords::english(), Arc::clone(&ENGLISH_STEMMER))
    }

    /// Caller-supplied stopwords with the English stemmer.
    pub fn with_stopwords(stopwords: Arc<Stopwords>) -> Self {
        Self::new(stopwords, Arc::clone(&ENGLISH_STEMMER))
    }

    /// Lowercase, strip punctuation, split on whitespace, drop stopwords, stem.
    /// Order and duplicates are preserved.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        clean(text)
            .split_whitespace()
            .filter(|token| !self.stopwords.contains(token))
            .map(|token| self.stemmer.stem(token).into_owned())
            .collect()
    }

    /// The term of a one-word query. A phrase is rejected even when all but
    /// one of its words are stopwords, and so is a lone stopword.
    pub fn single_term(&self, text: &str) -> Result<String> {
        let cleaned = clean(text);
        let mut words = cleaned.split_whitespace();
        match (words.next(), words.next()) {
            (Some(word), None) if !self.stopwords.contains(word) => Ok(self.stemmer.stem(word).into_owned()),
            _ => Err(Error::InvalidTermQuery(text.to_string())),
        }
    }
}
