use crate::catalog::FeatureCatalog;
use crate::key::{History, Key};

/// A binary sparse feature vector
///
/// Holds the sorted, de-duplicated indices of the features that fire; every
/// listed feature has value 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FeatureVector {
    indices: Vec<usize>,
    dimension: usize,
}

impl FeatureVector {
    pub fn new(mut indices: Vec<usize>, dimension: usize) -> Self {
        indices.sort_unstable();
        indices.dedup();
        debug_assert!(indices.last().map_or(true, |&i| i < dimension));
        Self { indices, dimension }
    }

    /// Indices of the non-zero entries, ascending
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of non-zero entries
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Length of the dense vector this represents
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// `w·v`
    #[inline]
    pub fn dot(&self, weights: &[f64]) -> f64 {
        self.indices.iter().map(|&i| weights[i]).sum()
    }

    /// `out += scale·v`
    #[inline]
    pub fn add_to(&self, out: &mut [f64], scale: f64) {
        for &i in &self.indices {
            out[i] += scale;
        }
    }

    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.dimension];
        self.add_to(&mut dense, 1.0);
        dense
    }
}

/// Maps histories onto the index space of a [`FeatureCatalog`]
#[derive(Debug, Clone, Copy)]
pub struct HistoryVectorizer<'a> {
    catalog: &'a FeatureCatalog,
}

impl<'a> HistoryVectorizer<'a> {
    pub fn new(catalog: &'a FeatureCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &'a FeatureCatalog {
        self.catalog
    }

    /// Number of features, the dimension of every produced vector
    pub fn dimension(&self) -> usize {
        self.catalog.len()
    }

    /// Run the extraction rules over `history` and keep the keys the
    /// catalog knows; unknown keys are skipped.
    pub fn vectorize(&self, history: &History) -> FeatureVector {
        let mut keys: Vec<Key> = Vec::new();
        self.catalog.extractor().extract_into(history, &mut keys);
        let indices = keys
            .iter()
            .filter_map(|key| self.catalog.index_of(key))
            .collect();
        FeatureVector::new(indices, self.catalog.len())
    }

    /// One vector per candidate tag substituted for the current tag
    pub fn vectorize_alternatives<S: AsRef<str>>(
        &self,
        history: &History,
        tags: &[S],
    ) -> Vec<FeatureVector> {
        tags.iter()
            .map(|tag| self.vectorize(&history.with_current_tag(tag.as_ref())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogConfig;
    use crate::corpus::Corpus;
    use crate::feature::Thresholds;

    fn catalog() -> (FeatureCatalog, Vec<History>) {
        let corpus = Corpus::parse(b"The_DT dog_NN barks_VBZ\nA_DT cat_NN sleeps_VBZ\n").unwrap();
        let histories = corpus.histories(2).unwrap();
        let config = CatalogConfig::new(2).with_thresholds(Thresholds::accept_all());
        (FeatureCatalog::build(&histories, config).unwrap(), histories)
    }

    #[test]
    fn test_vectorize_is_deterministic() {
        let (catalog, histories) = catalog();
        let vectorizer = HistoryVectorizer::new(&catalog);
        for history in &histories {
            let a = vectorizer.vectorize(history);
            let b = vectorizer.vectorize(history);
            assert_eq!(a, b);
            assert!(a.nnz() > 0);
            assert!(a.indices().windows(2).all(|w| w[0] < w[1]));
            assert_eq!(a.dimension(), catalog.len());
        }
    }

    #[test]
    fn test_unknown_keys_are_skipped() {
        let (catalog, _) = catalog();
        let vectorizer = HistoryVectorizer::new(&catalog);
        let unseen = History::new(
            vec!["zebra".into(), "qux".into()],
            vec!["ZZ".into(), "YY".into()],
            None,
        )
        .unwrap();
        assert_eq!(vectorizer.vectorize(&unseen).nnz(), 0);
    }

    #[test]
    fn test_feature_vector_ops() {
        let v = FeatureVector::new(vec![3, 1, 3], 4);
        assert_eq!(v.indices(), [1, 3]);
        assert_eq!(v.dot(&[1.0, 2.0, 4.0, 8.0]), 10.0);
        assert_eq!(v.to_dense(), vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_alternatives() {
        let (catalog, histories) = catalog();
        let vectorizer = HistoryVectorizer::new(&catalog);
        let alternatives = vectorizer.vectorize_alternatives(&histories[1], &["DT", "NN", "VBZ"]);
        assert_eq!(alternatives.len(), 3);
        assert_eq!(alternatives[1], vectorizer.vectorize(&histories[1]));
    }
}
