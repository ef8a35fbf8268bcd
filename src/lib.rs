//! Maximum-Entropy Markov Model (MEMM) part-of-speech tagger
//!
//! This library provides feature extraction, mini-batch L-BFGS training and
//! beam-pruned Viterbi decoding for MEMM taggers.
//!
//! # Examples
//!
//! ## Training
//!
//! ```no_run
//! use memm::train::{Trainer, TrainerParams};
//! use memm::{store, CatalogConfig, Corpus, FeatureCatalog};
//!
//! let corpus = Corpus::open("train.txt")?;
//! let histories = corpus.histories(2)?;
//! let catalog = FeatureCatalog::build(&histories, CatalogConfig::new(2))?;
//! let tags = corpus.tag_set()?;
//!
//! let mut trainer = Trainer::new(&catalog, tags.clone(), TrainerParams::default())?
//!     .with_max_iterations(10)?;
//! trainer.train(&corpus)?;
//!
//! store::write_catalog("model.features", &catalog, &tags)?;
//! store::write_weights("model.weights", &trainer.weights())?;
//! # Ok::<(), memm::Error>(())
//! ```
//!
//! ## Tagging
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use memm::{store, Decoder};
//!
//! let (catalog, tags) = store::read_catalog("model.features")?;
//! let weights = store::read_weights("model.weights")?;
//! let decoder = Decoder::new(&catalog, Arc::from(weights), tags)?.with_beam_size(5)?;
//!
//! let result = decoder.decode(&["The", "dog", "barks"])?;
//! # Ok::<(), memm::Error>(())
//! ```

mod catalog;
mod corpus;
mod decoder;
mod dictionary;
mod error;
mod feature;
mod key;
mod vectorizer;

/// Reading and writing feature tables and weights
pub mod store;
/// Objective and trainer
pub mod train;

// Re-export main types
pub use self::catalog::{CatalogConfig, FeatureCatalog};
pub use self::corpus::{Corpus, Sentence, TagSet, END_SYMBOL, START_SYMBOL};
pub use self::decoder::{Decoder, DEFAULT_BEAM_SIZE};
pub use self::dictionary::Dictionary;
pub use self::error::{Error, Result};
pub use self::feature::{FeatureExtractor, Polynomial, Thresholds, WordShape, MAX_AFFIX_LENGTH};
pub use self::key::{History, Key};
pub use self::vectorizer::{FeatureVector, HistoryVectorizer};

// Re-export training types for convenience
pub use self::train::{Control, IterationReport, Sampling, Trainer, TrainerParams};
