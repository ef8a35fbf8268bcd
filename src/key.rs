use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// The identity of one feature
///
/// Two keys are equal when their words, tags and lookahead words are equal.
/// The threshold is metadata carried along for feature selection and takes
/// no part in equality or hashing.
#[derive(Debug, Clone)]
pub struct Key {
    words: Vec<String>,
    tags: Vec<String>,
    lookahead: Vec<String>,
    threshold: u32,
}

impl Key {
    /// Create a key without lookahead words
    pub fn new<W, T>(words: W, tags: T, threshold: u32) -> Self
    where
        W: IntoIterator,
        W::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self::with_lookahead(words, tags, Vec::<String>::new(), threshold)
    }

    /// Create a key that also matches on the following word(s)
    pub fn with_lookahead<W, T, L>(words: W, tags: T, lookahead: L, threshold: u32) -> Self
    where
        W: IntoIterator,
        W::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
            tags: tags.into_iter().map(Into::into).collect(),
            lookahead: lookahead.into_iter().map(Into::into).collect(),
            threshold,
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn lookahead(&self) -> &[String] {
        &self.lookahead
    }

    /// Minimum occurrence count for the feature to be retained
    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words && self.tags == other.tags && self.lookahead == other.lookahead
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.words.hash(state);
        self.tags.hash(state);
        self.lookahead.hash(state);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "words: {:?}, tags: {:?}, lookahead: {:?}",
            self.words, self.tags, self.lookahead
        )
    }
}

/// One decoding or training context
///
/// `words` and `tags` hold the last `L` words and tags; the rightmost tag is
/// the one being predicted. `lookahead` is the word that follows the window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct History {
    words: Vec<String>,
    tags: Vec<String>,
    lookahead: Option<String>,
}

impl History {
    /// Build a history from parallel `words` and `tags`
    ///
    /// Returns [`Error::Configuration`] when the two lengths differ.
    pub fn new(words: Vec<String>, tags: Vec<String>, lookahead: Option<String>) -> Result<Self> {
        if words.len() != tags.len() {
            return Err(Error::config(format!(
                "history has {} words but {} tags",
                words.len(),
                tags.len()
            )));
        }
        Ok(Self::from_parallel(words, tags, lookahead))
    }

    /// Caller guarantees `words.len() == tags.len()`
    pub(crate) fn from_parallel(
        words: Vec<String>,
        tags: Vec<String>,
        lookahead: Option<String>,
    ) -> Self {
        Self {
            words,
            tags,
            lookahead,
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn lookahead(&self) -> Option<&str> {
        self.lookahead.as_deref()
    }

    /// Window length `L`
    pub fn len(&self) -> usize {
        self.words.len().max(self.tags.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The word whose tag is being predicted
    pub fn current_word(&self) -> Option<&str> {
        self.words.last().map(String::as_str)
    }

    /// The tag being predicted
    pub fn current_tag(&self) -> Option<&str> {
        self.tags.last().map(String::as_str)
    }

    /// The same context with the current tag replaced by `tag`
    pub fn with_current_tag(&self, tag: &str) -> History {
        let mut tags = self.tags.clone();
        if let Some(last) = tags.last_mut() {
            *last = tag.to_string();
        }
        History {
            words: self.words.clone(),
            tags,
            lookahead: self.lookahead.clone(),
        }
    }
}
