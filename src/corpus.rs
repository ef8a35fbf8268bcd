//! Tagged corpus reading and history generation
//!
//! A corpus holds one sentence per line, each token written as `word_tag`.
//! Sentences are padded with start and end symbols before being cut into
//! [`History`] windows.

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::Path;

use bstr::ByteSlice;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};
use crate::key::History;

/// Word and tag used to pad the beginning of a sentence
pub const START_SYMBOL: &str = "<s>";
/// Word and tag used to pad the end of a sentence
pub const END_SYMBOL: &str = "</s>";

/// The tag vocabulary together with the padding symbols
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<String>,
}

impl TagSet {
    /// Create a tag set; tags are de-duplicated and sorted
    pub fn new<I, S>(tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        if tags.is_empty() {
            return Err(Error::config("tag vocabulary must not be empty"));
        }
        if tags.contains(START_SYMBOL) || tags.contains(END_SYMBOL) {
            return Err(Error::config(format!(
                "tags {} and {} are reserved",
                START_SYMBOL, END_SYMBOL
            )));
        }
        Ok(Self {
            tags: tags.into_iter().collect(),
        })
    }

    /// The real tags, excluding the padding symbols
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.binary_search_by(|t| t.as_str().cmp(tag)).is_ok()
    }

    pub fn start_symbol(&self) -> &'static str {
        START_SYMBOL
    }

    pub fn end_symbol(&self) -> &'static str {
        END_SYMBOL
    }
}

/// A tagged sentence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    words: Vec<String>,
    tags: Vec<String>,
}

impl Sentence {
    pub fn new(words: Vec<String>, tags: Vec<String>) -> Result<Self> {
        if words.len() != tags.len() {
            return Err(Error::config("words and tags must have the same length"));
        }
        Ok(Self { words, tags })
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn push(&mut self, word: &str, tag: &str) {
        self.words.push(word.to_string());
        self.tags.push(tag.to_string());
    }

    /// One history per token: `window` words and tags ending at the token,
    /// plus the following word
    pub fn histories(&self, window: usize) -> Vec<History> {
        let pad = window.saturating_sub(1);
        let padded = |items: &[String]| -> Vec<String> {
            let mut out = Vec::with_capacity(items.len() + window);
            out.extend(std::iter::repeat(START_SYMBOL.to_string()).take(pad));
            out.extend(items.iter().cloned());
            out.push(END_SYMBOL.to_string());
            out
        };
        let words = padded(&self.words);
        let tags = padded(&self.tags);
        (0..self.len())
            .map(|i| {
                History::from_parallel(
                    words[i..i + window].to_vec(),
                    tags[i..i + window].to_vec(),
                    Some(words[i + window].clone()),
                )
            })
            .collect()
    }
}

fn malformed(line: usize, message: String) -> Error {
    Error::MalformedInput { line, message }
}

/// A tagged training corpus
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    sentences: Vec<Sentence>,
}

impl Corpus {
    pub fn from_sentences(sentences: Vec<Sentence>) -> Self {
        Self {
            sentences: sentences.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    /// Parse `word_tag` tokens, one sentence per line
    ///
    /// The tag is whatever follows the last `_` of a token. Blank lines are
    /// skipped.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut sentences = Vec::new();
        for (index, line) in data.lines().enumerate() {
            let line_no = index + 1;
            let line = line
                .to_str()
                .map_err(|_| malformed(line_no, "invalid UTF-8".to_string()))?;
            let mut sentence = Sentence::default();
            for token in line.split_whitespace() {
                let (word, tag) = token.rsplit_once('_').ok_or_else(|| {
                    malformed(line_no, format!("token {:?} has no `_tag` suffix", token))
                })?;
                if tag.is_empty() {
                    return Err(malformed(line_no, format!("token {:?} has an empty tag", token)));
                }
                if tag == START_SYMBOL || tag == END_SYMBOL {
                    return Err(malformed(
                        line_no,
                        format!("token {:?} uses a reserved tag", token),
                    ));
                }
                sentence.push(word, tag);
            }
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
        }
        Ok(Self { sentences })
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::parse(&data)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path)?;
        Self::parse(&data)
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Every distinct tag in the corpus
    pub fn tag_set(&self) -> Result<TagSet> {
        TagSet::new(self.sentences.iter().flat_map(|s| s.tags.iter().cloned()))
    }

    fn check_window(window: usize) -> Result<()> {
        if window == 0 {
            return Err(Error::config("window size must be at least 1"));
        }
        Ok(())
    }

    /// Histories of every sentence, in corpus order
    pub fn histories(&self, window: usize) -> Result<Vec<History>> {
        Self::check_window(window)?;
        Ok(self
            .sentences
            .iter()
            .flat_map(|s| s.histories(window))
            .collect())
    }

    /// Histories of `lines` sentences drawn without replacement
    pub fn sample_histories<R: Rng + ?Sized>(
        &self,
        window: usize,
        lines: usize,
        rng: &mut R,
    ) -> Result<Vec<History>> {
        Self::check_window(window)?;
        Ok(self
            .sentences
            .choose_multiple(rng, lines.min(self.sentences.len()))
            .flat_map(|s| s.histories(window))
            .collect())
    }

    /// Histories of sentences `start`, `start + step`, ... wrapping around the corpus
    pub fn stride_histories(
        &self,
        window: usize,
        start: usize,
        step: usize,
        lines: usize,
    ) -> Result<Vec<History>> {
        Self::check_window(window)?;
        if self.sentences.is_empty() {
            return Ok(Vec::new());
        }
        let n = self.sentences.len();
        Ok((0..lines)
            .map(|k| (start + k * step) % n)
            .flat_map(|i| self.sentences[i].histories(window))
            .collect())
    }
}
