use std::collections::HashMap;

use log::info;

use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::feature::{FeatureExtractor, Thresholds};
use crate::key::{History, Key};

/// Settings fixed when a catalog is built
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConfig {
    /// Number of words/tags in a history (`L`)
    pub window: usize,
    /// Per-rule minimum occurrence counts
    pub thresholds: Thresholds,
}

impl CatalogConfig {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            thresholds: Thresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

/// The set of retained features and their dense indices
///
/// Built once from training histories (or rebuilt from a persisted table)
/// and read-only afterwards.
#[derive(Debug, Clone)]
pub struct FeatureCatalog {
    window: usize,
    extractor: FeatureExtractor,
    /// Retained keys, by feature index
    keys: Vec<Key>,
    /// Occurrence count of each retained key
    counts: Vec<u64>,
    index: HashMap<Key, usize>,
}

impl FeatureCatalog {
    /// Count every key the extraction rules emit over `histories` and keep
    /// those whose count reaches their threshold.
    ///
    /// Surviving keys are indexed in the order they were first emitted.
    pub fn build<'a, I>(histories: I, config: CatalogConfig) -> Result<Self>
    where
        I: IntoIterator<Item = &'a History>,
    {
        if config.window == 0 {
            return Err(Error::config("window size must be at least 1"));
        }
        let extractor = FeatureExtractor::new(config.thresholds);

        // Count feature occurrences
        let mut seen: Dictionary<Key> = Dictionary::new();
        let mut counts: Vec<u64> = Vec::new();
        let mut buffer = Vec::new();
        let mut num_histories = 0usize;
        for history in histories {
            if history.len() != config.window {
                return Err(Error::config(format!(
                    "history of length {} does not match the window {}",
                    history.len(),
                    config.window
                )));
            }
            num_histories += 1;
            buffer.clear();
            extractor.extract_into(history, &mut buffer);
            for key in buffer.drain(..) {
                let id = seen.insert_owned(key);
                if id == counts.len() {
                    counts.push(0);
                }
                counts[id] += 1;
            }
        }

        // Build feature list
        let mut keys = Vec::new();
        let mut kept_counts = Vec::new();
        let mut index = HashMap::new();
        for (key, id) in seen.iter() {
            let count = counts[id];
            if count >= u64::from(key.threshold()) {
                index.insert(key.clone(), keys.len());
                keys.push(key.clone());
                kept_counts.push(count);
            }
        }

        info!(
            "feature catalog: {} histories, {} candidate keys, {} features (window: {})",
            num_histories,
            seen.len(),
            keys.len(),
            config.window
        );

        Ok(Self {
            window: config.window,
            extractor,
            keys,
            counts: kept_counts,
            index,
        })
    }

    /// Rebuild a catalog from persisted `(key, index)` records
    ///
    /// The indices must be exactly `0..entries.len()`, each used once.
    /// Occurrence counts are not persisted and read back as zero.
    pub fn from_entries<I>(window: usize, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Key, usize)>,
    {
        if window == 0 {
            return Err(Error::config("window size must be at least 1"));
        }
        let mut slots: Vec<Option<Key>> = Vec::new();
        for (key, id) in entries {
            if id >= slots.len() {
                slots.resize(id + 1, None);
            }
            if slots[id].replace(key).is_some() {
                return Err(Error::store(format!("feature index {} assigned twice", id)));
            }
        }
        let mut keys = Vec::with_capacity(slots.len());
        let mut index = HashMap::with_capacity(slots.len());
        for (id, slot) in slots.into_iter().enumerate() {
            let key = slot.ok_or_else(|| Error::store(format!("feature index {} is missing", id)))?;
            if index.insert(key.clone(), id).is_some() {
                return Err(Error::store(format!("duplicate key for feature index {}", id)));
            }
            keys.push(key);
        }
        let counts = vec![0; keys.len()];
        Ok(Self {
            window,
            extractor: FeatureExtractor::default(),
            keys,
            counts,
            index,
        })
    }

    /// Number of retained features
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn index_of(&self, key: &Key) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn key(&self, index: usize) -> Option<&Key> {
        self.keys.get(index)
    }

    /// Occurrence count of a feature during the build
    pub fn count(&self, index: usize) -> Option<u64> {
        self.counts.get(index).copied()
    }

    /// Iterate over `(key, index)` in index order
    pub fn iter(&self) -> impl Iterator<Item = (&Key, usize)> + '_ {
        self.keys.iter().enumerate().map(|(id, key)| (key, id))
    }

    pub(crate) fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }
}
