//! Feature extraction rules
//!
//! Every rule is a pure function from a [`History`] to zero or more
//! [`Key`]s. The rules run in a fixed order, which fixes the order in which
//! the catalog hands out feature indices.

use bitflags::bitflags;

use crate::key::{History, Key};

/// Longest prefix/suffix turned into a feature
pub const MAX_AFFIX_LENGTH: usize = 4;

// Marker words contain a space, which never occurs inside a corpus token.
const INITIAL_CAPITAL: &str = "SHAPE initial-capital";
const ALL_CAPITALS: &str = "SHAPE all-capitals";
const HAS_DIGIT: &str = "SHAPE has-digit";
const NUMERIC: &str = "SHAPE numeric";
const ALPHANUMERIC: &str = "SHAPE alphanumeric";
const HAS_PUNCTUATION: &str = "SHAPE has-punctuation";

bitflags! {
    /// Orthographic properties of a word
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WordShape: u8 {
        /// First character is uppercase
        const INITIAL_CAPITAL = 0x01;
        /// At least one uppercase and no lowercase character
        const ALL_CAPITALS = 0x02;
        /// Contains a decimal digit
        const HAS_DIGIT = 0x04;
        /// Parses as a number: sign, digits, fraction, exponent
        const NUMERIC = 0x08;
        /// Non-empty and alphanumeric throughout
        const ALPHANUMERIC = 0x10;
        /// Contains a character that is neither a word character nor whitespace
        const HAS_PUNCTUATION = 0x20;
    }
}

impl WordShape {
    pub fn of(word: &str) -> Self {
        let mut shape = WordShape::empty();
        if word.chars().next().map_or(false, char::is_uppercase) {
            shape |= WordShape::INITIAL_CAPITAL;
        }
        if word.chars().any(char::is_uppercase) && !word.chars().any(char::is_lowercase) {
            shape |= WordShape::ALL_CAPITALS;
        }
        if word.chars().any(|c| c.is_ascii_digit()) {
            shape |= WordShape::HAS_DIGIT;
        }
        if is_number(word) {
            shape |= WordShape::NUMERIC;
        }
        if !word.is_empty() && word.chars().all(char::is_alphanumeric) {
            shape |= WordShape::ALPHANUMERIC;
        }
        if word
            .chars()
            .any(|c| !(c.is_alphanumeric() || c == '_' || c.is_whitespace()))
        {
            shape |= WordShape::HAS_PUNCTUATION;
        }
        shape
    }
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// `[-+]?(\d+([.,]\d*)?|[.,]\d+)([eE][-+]?\d+)?`, matched against the whole word
fn is_number(word: &str) -> bool {
    let bytes = word.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let int_digits = count_digits(&bytes[i..]);
    i += int_digits;
    if int_digits > 0 {
        if matches!(bytes.get(i), Some(b'.' | b',')) {
            i += 1;
            i += count_digits(&bytes[i..]);
        }
    } else {
        if !matches!(bytes.get(i), Some(b'.' | b',')) {
            return false;
        }
        i += 1;
        let frac_digits = count_digits(&bytes[i..]);
        if frac_digits == 0 {
            return false;
        }
        i += frac_digits;
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let exp_digits = count_digits(&bytes[i..]);
        if exp_digits == 0 {
            return false;
        }
        i += exp_digits;
    }
    i == bytes.len()
}

/// A threshold as a polynomial in a rule's length parameter
///
/// `threshold(n) = max(1, Σ c_i·n^i)`, truncated to an integer.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    /// Coefficients in ascending order of power
    pub fn new<C: Into<Vec<f64>>>(coefficients: C) -> Self {
        Self {
            coefficients: coefficients.into(),
        }
    }

    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn threshold(&self, length: usize) -> u32 {
        let n = length as f64;
        let total: f64 = self
            .coefficients
            .iter()
            .enumerate()
            .map(|(power, c)| c * n.powi(power as i32))
            .sum();
        total.max(1.0) as u32
    }
}

/// Per-rule threshold functions
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub capitalization: Polynomial,
    pub prefix: Polynomial,
    pub suffix: Polynomial,
    pub character_class: Polynomial,
    pub ngram: Polynomial,
    pub ngram_tags: Polynomial,
    pub lookahead: Polynomial,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            capitalization: Polynomial::constant(10.0),
            prefix: Polynomial::new(vec![38.0, -9.0]),
            suffix: Polynomial::new(vec![38.0, -9.0]),
            character_class: Polynomial::constant(10.0),
            ngram: Polynomial::new(vec![15.0, -7.0, 1.0]),
            ngram_tags: Polynomial::new(vec![15.0, -7.0, 1.0]),
            lookahead: Polynomial::constant(5.0),
        }
    }
}

impl Thresholds {
    /// Thresholds that keep every feature seen at least once
    pub fn accept_all() -> Self {
        let one = Polynomial::constant(1.0);
        Self {
            capitalization: one.clone(),
            prefix: one.clone(),
            suffix: one.clone(),
            character_class: one.clone(),
            ngram: one.clone(),
            ngram_tags: one.clone(),
            lookahead: one,
        }
    }
}

type Rule = fn(&History, &Thresholds, &mut Vec<Key>);

/// The extraction rules, in index-assignment order
const RULES: [(&str, Rule); 5] = [
    ("capitalization", capitalization),
    ("affix", affixes),
    ("character-class", character_class),
    ("n-gram", ngrams),
    ("lookahead", lookahead),
];

fn capitalization(history: &History, thresholds: &Thresholds, keys: &mut Vec<Key>) {
    let (Some(word), Some(tag)) = (history.current_word(), history.current_tag()) else {
        return;
    };
    let shape = WordShape::of(word);
    let threshold = thresholds.capitalization.threshold(1);
    if shape.contains(WordShape::INITIAL_CAPITAL) {
        keys.push(Key::new([INITIAL_CAPITAL], [tag], threshold));
    }
    if shape.contains(WordShape::ALL_CAPITALS) {
        keys.push(Key::new([ALL_CAPITALS], [tag], threshold));
    }
}

fn affixes(history: &History, thresholds: &Thresholds, keys: &mut Vec<Key>) {
    let (Some(word), Some(tag)) = (history.current_word(), history.current_tag()) else {
        return;
    };
    let chars: Vec<char> = word.chars().collect();
    let max_length = chars.len().min(MAX_AFFIX_LENGTH);
    for length in 1..=max_length {
        let prefix: String = chars[..length].iter().collect();
        keys.push(Key::new(
            [format!("PREFIX {}", prefix)],
            [tag],
            thresholds.prefix.threshold(length),
        ));
    }
    for length in 1..=max_length {
        let suffix: String = chars[chars.len() - length..].iter().collect();
        keys.push(Key::new(
            [format!("SUFFIX {}", suffix)],
            [tag],
            thresholds.suffix.threshold(length),
        ));
    }
}

fn character_class(history: &History, thresholds: &Thresholds, keys: &mut Vec<Key>) {
    let (Some(word), Some(tag)) = (history.current_word(), history.current_tag()) else {
        return;
    };
    let shape = WordShape::of(word);
    let threshold = thresholds.character_class.threshold(1);
    for (flag, marker) in [
        (WordShape::HAS_DIGIT, HAS_DIGIT),
        (WordShape::NUMERIC, NUMERIC),
        (WordShape::ALPHANUMERIC, ALPHANUMERIC),
        (WordShape::HAS_PUNCTUATION, HAS_PUNCTUATION),
    ] {
        if shape.contains(flag) {
            keys.push(Key::new([marker], [tag], threshold));
        }
    }
}

fn ngrams(history: &History, thresholds: &Thresholds, keys: &mut Vec<Key>) {
    let words = history.words();
    let tags = history.tags();
    for n in 1..=history.len() {
        let window_words = &words[words.len().saturating_sub(n)..];
        let window_tags = &tags[tags.len().saturating_sub(n)..];
        let threshold = thresholds.ngram.threshold(n);
        keys.push(Key::new(
            window_words.iter().cloned(),
            window_tags.iter().cloned(),
            threshold,
        ));
        // Tag context without the word that triggers it
        let leading_words = &window_words[..window_words.len().saturating_sub(1)];
        keys.push(Key::new(
            leading_words.iter().cloned(),
            window_tags.iter().cloned(),
            threshold,
        ));
        keys.push(Key::new(
            Vec::<String>::new(),
            window_tags.iter().cloned(),
            thresholds.ngram_tags.threshold(n),
        ));
    }
}

fn lookahead(history: &History, thresholds: &Thresholds, keys: &mut Vec<Key>) {
    let (Some(word), Some(tag), Some(next)) = (
        history.current_word(),
        history.current_tag(),
        history.lookahead(),
    ) else {
        return;
    };
    let threshold = thresholds.lookahead.threshold(1);
    keys.push(Key::with_lookahead([word], [tag], [next], threshold));
    keys.push(Key::with_lookahead(
        Vec::<String>::new(),
        [tag],
        [next],
        threshold,
    ));
}

/// Runs the fixed list of extraction rules over histories
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    thresholds: Thresholds,
}

impl FeatureExtractor {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Append the keys of every rule to `keys`, in rule order
    pub fn extract_into(&self, history: &History, keys: &mut Vec<Key>) {
        for (_name, rule) in RULES.iter() {
            rule(history, &self.thresholds, keys);
        }
    }

    pub fn extract(&self, history: &History) -> Vec<Key> {
        let mut keys = Vec::new();
        self.extract_into(history, &mut keys);
        keys
    }

    /// Names of the rules in the order they run
    pub fn rule_names() -> impl Iterator<Item = &'static str> {
        RULES.iter().map(|(name, _)| *name)
    }
}
