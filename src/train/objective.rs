use crate::corpus::TagSet;
use crate::error::{Error, Result};
use crate::key::History;
use crate::vectorizer::{FeatureVector, HistoryVectorizer};

/// Log-sum-exp trick for numerical stability.
///
/// Computes log(sum(exp(values))) in a numerically stable way.
/// Returns NEG_INFINITY for empty arrays or arrays where all values are NEG_INFINITY.
pub fn logsumexp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    let max_val = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max_val.is_infinite() {
        return max_val;
    }
    let sum: f64 = values.iter().map(|&v| (v - max_val).exp()).sum();
    max_val + sum.ln()
}

/// Locally-normalized probabilities `exp(s_k) / Σ exp(s_j)`, with the
/// maximum score subtracted before exponentiation
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let log_z = logsumexp(scores);
    scores.iter().map(|&s| (s - log_z).exp()).collect()
}

/// The negated, L2-regularized conditional log-likelihood of a batch
///
/// For histories `h_i` with observed vectors `v_i` and one altered vector
/// `v_i,y` per tag `y`:
///
/// ```text
/// f(w)  = −Σ_i w·v_i + Σ_i log Σ_y exp(w·v_i,y) + (λ/2)‖w‖²
/// ∇f(w) = −Σ_i v_i + Σ_i Σ_y p_i,y v_i,y + λw
/// ```
///
/// where `p_i,y` is the softmax of `w·v_i,y` over `y`.
#[derive(Debug, Clone)]
pub struct Objective {
    /// Altered vectors, one row of candidates per history
    alternatives: Vec<Vec<FeatureVector>>,
    /// Σ_i v_i
    empirical: Vec<f64>,
    regularization: f64,
}

impl Objective {
    pub fn new(
        histories: &[History],
        vectorizer: &HistoryVectorizer<'_>,
        tags: &TagSet,
        regularization: f64,
    ) -> Self {
        let dimension = vectorizer.dimension();
        let mut empirical = vec![0.0; dimension];
        let mut alternatives = Vec::with_capacity(histories.len());
        for history in histories {
            vectorizer.vectorize(history).add_to(&mut empirical, 1.0);
            alternatives.push(vectorizer.vectorize_alternatives(history, tags.tags()));
        }
        Self {
            alternatives,
            empirical,
            regularization,
        }
    }

    /// Number of histories in the batch
    pub fn len(&self) -> usize {
        self.alternatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.empirical.len()
    }

    /// Empirical feature counts `Σ_i v_i`
    pub fn empirical_counts(&self) -> &[f64] {
        &self.empirical
    }

    /// Objective value at `weights`; the gradient is written to `gradient`
    pub fn evaluate(&self, weights: &[f64], gradient: &mut [f64]) -> Result<f64> {
        debug_assert_eq!(weights.len(), self.dimension());
        debug_assert_eq!(gradient.len(), self.dimension());

        // Gradient starts from the negated empirical counts
        for (g, &e) in gradient.iter_mut().zip(&self.empirical) {
            *g = -e;
        }
        let mut loss: f64 = -weights
            .iter()
            .zip(&self.empirical)
            .map(|(w, e)| w * e)
            .sum::<f64>();

        // Model expectations
        let mut scores = Vec::new();
        for candidates in &self.alternatives {
            scores.clear();
            scores.extend(candidates.iter().map(|v| v.dot(weights)));
            let log_z = logsumexp(&scores);
            loss += log_z;
            for (v, &s) in candidates.iter().zip(&scores) {
                v.add_to(gradient, (s - log_z).exp());
            }
        }

        // L2 regularization
        if self.regularization > 0.0 {
            let mut norm2 = 0.0;
            for (g, &w) in gradient.iter_mut().zip(weights) {
                *g += self.regularization * w;
                norm2 += w * w;
            }
            loss += 0.5 * self.regularization * norm2;
        }

        if !loss.is_finite() {
            return Err(Error::NumericInstability(format!(
                "objective evaluated to {}",
                loss
            )));
        }
        if gradient.iter().any(|g| !g.is_finite()) {
            return Err(Error::NumericInstability(
                "gradient has a non-finite component".to_string(),
            ));
        }
        Ok(loss)
    }

    /// Objective value only
    pub fn value(&self, weights: &[f64]) -> Result<f64> {
        let mut gradient = vec![0.0; self.dimension()];
        self.evaluate(weights, &mut gradient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogConfig, FeatureCatalog};
    use crate::corpus::Corpus;
    use crate::feature::Thresholds;

    fn fixture() -> (FeatureCatalog, Vec<History>, TagSet) {
        let corpus = Corpus::parse(
            b"The_DT dog_NN barks_VBZ\nA_DT cat_NN sleeps_VBZ\nDogs_NNS bark_VBP\n",
        )
        .unwrap();
        let histories = corpus.histories(2).unwrap();
        let config = CatalogConfig::new(2).with_thresholds(Thresholds::accept_all());
        let catalog = FeatureCatalog::build(&histories, config).unwrap();
        (catalog, histories, corpus.tag_set().unwrap())
    }

    #[test]
    fn test_logsumexp() {
        assert!((logsumexp(&[0.0, 0.0]) - 2f64.ln()).abs() < 1e-12);
        // No overflow for large scores
        let v = logsumexp(&[1000.0, 1000.0]);
        assert!((v - (1000.0 + 2f64.ln())).abs() < 1e-9);
        assert_eq!(logsumexp(&[]), f64::NEG_INFINITY);
        let p = softmax(&[800.0, 0.0, -800.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_zero_weights_value() {
        let (catalog, histories, tags) = fixture();
        let vectorizer = HistoryVectorizer::new(&catalog);
        let objective = Objective::new(&histories, &vectorizer, &tags, 0.5);
        let weights = vec![0.0; catalog.len()];
        // Every candidate is equally likely: each history contributes log |Y|
        let expected = histories.len() as f64 * (tags.len() as f64).ln();
        assert!((objective.value(&weights).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let (catalog, histories, tags) = fixture();
        let vectorizer = HistoryVectorizer::new(&catalog);
        let objective = Objective::new(&histories, &vectorizer, &tags, 0.3);
        let weights: Vec<f64> = (0..catalog.len())
            .map(|i| ((i * 7919) % 13) as f64 / 13.0 - 0.5)
            .collect();
        let mut gradient = vec![0.0; catalog.len()];
        objective.evaluate(&weights, &mut gradient).unwrap();

        let h = 1e-6;
        for i in (0..catalog.len()).step_by(3) {
            let mut plus = weights.clone();
            plus[i] += h;
            let mut minus = weights.clone();
            minus[i] -= h;
            let numeric =
                (objective.value(&plus).unwrap() - objective.value(&minus).unwrap()) / (2.0 * h);
            assert!(
                (numeric - gradient[i]).abs() < 1e-5,
                "feature {}: numeric {} vs analytic {}",
                i,
                numeric,
                gradient[i]
            );
        }
    }

    #[test]
    fn test_large_weights_stay_finite() {
        let (catalog, histories, tags) = fixture();
        let vectorizer = HistoryVectorizer::new(&catalog);
        let objective = Objective::new(&histories, &vectorizer, &tags, 0.0);
        let weights = vec![500.0; catalog.len()];
        let mut gradient = vec![0.0; catalog.len()];
        let value = objective.evaluate(&weights, &mut gradient).unwrap();
        assert!(value.is_finite());
        assert!(gradient.iter().all(|g| g.is_finite()));
    }
}
