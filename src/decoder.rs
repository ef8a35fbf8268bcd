use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::FeatureCatalog;
use crate::corpus::{TagSet, END_SYMBOL, START_SYMBOL};
use crate::error::{Error, Result};
use crate::key::History;
use crate::train::logsumexp;
use crate::vectorizer::HistoryVectorizer;

/// Default number of states kept per position
pub const DEFAULT_BEAM_SIZE: usize = 5;

/// A partial tag sequence in the beam
#[derive(Debug, Clone)]
struct Node {
    /// The trailing `L-1` tags
    state: Vec<String>,
    /// Sum of log transition probabilities so far
    score: f64,
    /// Index of the predecessor in the previous beam
    prev: usize,
    /// Tag emitted at this position
    tag: String,
}

/// Beam-pruned Viterbi decoder over trailing-tag states
///
/// Transition probabilities are the locally-normalized softmax of the
/// feature scores of each candidate tag given the previous `L-1` tags, the
/// last `L` words and the next word.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    vectorizer: HistoryVectorizer<'a>,
    weights: Arc<[f64]>,
    tags: TagSet,
    beam_size: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(catalog: &'a FeatureCatalog, weights: Arc<[f64]>, tags: TagSet) -> Result<Self> {
        if weights.len() != catalog.len() {
            return Err(Error::config(format!(
                "expected {} weights, got {}",
                catalog.len(),
                weights.len()
            )));
        }
        Ok(Self {
            vectorizer: HistoryVectorizer::new(catalog),
            weights,
            tags,
            beam_size: DEFAULT_BEAM_SIZE,
        })
    }

    /// Set the number of states kept per position (builder pattern)
    pub fn with_beam_size(mut self, beam_size: usize) -> Result<Self> {
        if beam_size == 0 {
            return Err(Error::config("beam size must be at least 1"));
        }
        self.beam_size = beam_size;
        Ok(self)
    }

    pub fn beam_size(&self) -> usize {
        self.beam_size
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    fn window(&self) -> usize {
        self.vectorizer.catalog().window()
    }

    /// Locally-normalized distribution over `candidates` for the current tag
    ///
    /// `context_tags` are the previous `L-1` tags, `words` the last `L`
    /// words ending at the current one, `lookahead` the following word.
    pub fn transition_probabilities<S: AsRef<str>>(
        &self,
        context_tags: &[S],
        words: &[S],
        lookahead: Option<&str>,
        candidates: &[S],
    ) -> Result<Vec<f64>> {
        let window = self.window();
        if words.len() != window || context_tags.len() + 1 != window {
            return Err(Error::config(format!(
                "expected {} words and {} context tags for window {}, got {} and {}",
                window,
                window - 1,
                window,
                words.len(),
                context_tags.len()
            )));
        }
        let log_probs = self.log_transition_probabilities(
            &owned(context_tags),
            &owned(words),
            lookahead,
            candidates,
        );
        Ok(log_probs.into_iter().map(f64::exp).collect())
    }

    fn log_transition_probabilities<S: AsRef<str>>(
        &self,
        context_tags: &[String],
        words: &[String],
        lookahead: Option<&str>,
        candidates: &[S],
    ) -> Vec<f64> {
        let Some(first) = candidates.first() else {
            return Vec::new();
        };
        let mut tags = context_tags.to_vec();
        tags.push(first.as_ref().to_string());
        let history = History::from_parallel(words.to_vec(), tags, lookahead.map(str::to_string));
        let scores: Vec<f64> = self
            .vectorizer
            .vectorize_alternatives(&history, candidates)
            .iter()
            .map(|v| v.dot(&self.weights))
            .collect();
        let log_z = logsumexp(&scores);
        scores.into_iter().map(|s| s - log_z).collect()
    }

    /// Words padded with `L-1` start symbols and two end symbols
    fn pad<S: AsRef<str>>(&self, words: &[S]) -> Vec<String> {
        let pad = self.window() - 1;
        let mut padded = Vec::with_capacity(words.len() + pad + 2);
        padded.extend(std::iter::repeat(START_SYMBOL.to_string()).take(pad));
        padded.extend(words.iter().map(|w| w.as_ref().to_string()));
        padded.push(END_SYMBOL.to_string());
        padded.push(END_SYMBOL.to_string());
        padded
    }

    /// Most probable tag sequence for `words` under the beam
    pub fn decode<S: AsRef<str>>(&self, words: &[S]) -> Result<Vec<String>> {
        if words.is_empty() {
            return Ok(Vec::new());
        }
        let window = self.window();
        let n = words.len();
        let padded = self.pad(words);
        let mut beams: Vec<Vec<Node>> = Vec::with_capacity(n + 2);
        beams.push(vec![Node {
            state: vec![START_SYMBOL.to_string(); window - 1],
            score: 0.0,
            prev: 0,
            tag: START_SYMBOL.to_string(),
        }]);

        for t in 0..=n {
            let context_words = &padded[t..t + window];
            let lookahead = padded[t + window].as_str();
            // Only the end symbol may follow the last word
            let candidates: Vec<&str> = if t < n {
                self.tags.tags().iter().map(String::as_str).collect()
            } else {
                vec![END_SYMBOL]
            };
            let previous = &beams[beams.len() - 1];

            let mut next: Vec<Node> = Vec::new();
            let mut positions: HashMap<Vec<String>, usize> = HashMap::new();
            for (i, node) in previous.iter().enumerate() {
                let log_probs = self.log_transition_probabilities(
                    &node.state,
                    context_words,
                    Some(lookahead),
                    &candidates,
                );
                for (&tag, log_p) in candidates.iter().zip(log_probs) {
                    let score = node.score + log_p;
                    let mut state = node.state.clone();
                    if !state.is_empty() {
                        state.remove(0);
                        state.push(tag.to_string());
                    }
                    match positions.get(&state) {
                        Some(&j) => {
                            if score > next[j].score {
                                next[j] = Node {
                                    state,
                                    score,
                                    prev: i,
                                    tag: tag.to_string(),
                                };
                            }
                        }
                        None => {
                            positions.insert(state.clone(), next.len());
                            next.push(Node {
                                state,
                                score,
                                prev: i,
                                tag: tag.to_string(),
                            });
                        }
                    }
                }
            }

            // Stable: equal scores keep first-seen order
            next.sort_by(|a, b| b.score.total_cmp(&a.score));
            next.truncate(self.beam_size);
            beams.push(next);
        }

        // Backtrack from the best final state, skipping the end symbol
        let mut tags = Vec::with_capacity(n);
        let mut index = 0;
        for beam in beams.iter().skip(1).rev() {
            let node = &beam[index];
            tags.push(node.tag.clone());
            index = node.prev;
        }
        tags.reverse();
        tags.truncate(n);
        Ok(tags)
    }

    /// Sum of log transition probabilities of `tags` for `words`
    ///
    /// The end-of-sentence transition always has probability one, so it is
    /// left out.
    pub fn log_probability<S: AsRef<str>>(&self, words: &[S], tags: &[S]) -> Result<f64> {
        if words.len() != tags.len() {
            return Err(Error::config("words and tags must have the same length"));
        }
        let window = self.window();
        let padded = self.pad(words);
        let mut state = vec![START_SYMBOL.to_string(); window - 1];
        let mut total = 0.0;
        for (t, tag) in tags.iter().enumerate() {
            let tag = tag.as_ref();
            let candidates = self.tags.tags();
            let position = candidates
                .iter()
                .position(|c| c == tag)
                .ok_or_else(|| Error::config(format!("unknown tag {:?}", tag)))?;
            let log_probs = self.log_transition_probabilities(
                &state,
                &padded[t..t + window],
                Some(padded[t + window].as_str()),
                candidates,
            );
            total += log_probs[position];
            if !state.is_empty() {
                state.remove(0);
                state.push(tag.to_string());
            }
        }
        Ok(total)
    }
}

fn owned<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    items.iter().map(|s| s.as_ref().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogConfig;
    use crate::corpus::Corpus;
    use crate::feature::Thresholds;

    fn fixture(window: usize) -> (FeatureCatalog, TagSet) {
        let corpus = Corpus::parse(b"A_N b_V\nb_V A_N\n").unwrap();
        let histories = corpus.histories(window).unwrap();
        let config = CatalogConfig::new(window).with_thresholds(Thresholds::accept_all());
        (
            FeatureCatalog::build(&histories, config).unwrap(),
            corpus.tag_set().unwrap(),
        )
    }

    #[test]
    fn test_weight_length_mismatch() {
        let (catalog, tags) = fixture(2);
        let weights: Arc<[f64]> = Arc::from(vec![0.0; catalog.len() + 1]);
        assert!(matches!(
            Decoder::new(&catalog, weights, tags),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_beam_is_rejected() {
        let (catalog, tags) = fixture(2);
        let weights: Arc<[f64]> = Arc::from(vec![0.0; catalog.len()]);
        let decoder = Decoder::new(&catalog, weights, tags).unwrap();
        assert_eq!(decoder.beam_size(), DEFAULT_BEAM_SIZE);
        assert!(matches!(
            decoder.with_beam_size(0),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_sentence() {
        let (catalog, tags) = fixture(2);
        let weights: Arc<[f64]> = Arc::from(vec![0.0; catalog.len()]);
        let decoder = Decoder::new(&catalog, weights, tags).unwrap();
        let words: [&str; 0] = [];
        assert!(decoder.decode(&words).unwrap().is_empty());
    }

    #[test]
    fn test_window_one() {
        let (catalog, tags) = fixture(1);
        let weights: Arc<[f64]> = Arc::from(vec![0.0; catalog.len()]);
        let decoder = Decoder::new(&catalog, weights, tags).unwrap();
        let tags = decoder.decode(&["A", "b", "A"]).unwrap();
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn test_zero_weights_are_uniform() {
        let (catalog, tags) = fixture(2);
        let weights: Arc<[f64]> = Arc::from(vec![0.0; catalog.len()]);
        let decoder = Decoder::new(&catalog, weights, tags).unwrap();
        let probs = decoder
            .transition_probabilities(&["N"], &["A", "b"], Some("</s>"), &["N", "V"])
            .unwrap();
        assert_eq!(probs.len(), 2);
        for p in probs {
            assert!((p - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_transition_context_must_match_window() {
        let (catalog, tags) = fixture(2);
        let weights: Arc<[f64]> = Arc::from(vec![0.0; catalog.len()]);
        let decoder = Decoder::new(&catalog, weights, tags).unwrap();
        let result = decoder.transition_probabilities(&["N", "V"], &["A", "b"], None, &["N"]);
        assert!(matches!(result, Err(Error::Configuration(_))));
        let result = decoder.transition_probabilities(&["N"], &["b"], None, &["N"]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
