use std::sync::Arc;

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::lbfgs::{self, InnerRun, LineSearchAlgorithm};
use super::objective::Objective;
use crate::catalog::FeatureCatalog;
use crate::corpus::{Corpus, TagSet};
use crate::error::{Error, Result};
use crate::vectorizer::HistoryVectorizer;

/// How each outer iteration picks its sentences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sampling {
    /// `batch_size` sentences drawn at random, without replacement
    #[default]
    Random,
    /// Every sentence, every iteration
    Full,
}

/// Verdict returned by the checkpoint hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

/// Summary of one outer iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    /// 1-based outer iteration number
    pub iteration: usize,
    /// Number of histories in the batch
    pub histories: usize,
    /// Negated regularized log-likelihood at the new weights
    pub objective: f64,
    /// Euclidean norm of its gradient
    pub gradient_norm: f64,
}

/// Training parameters.
#[derive(Debug, Clone)]
pub struct TrainerParams {
    regularization: f64,
    max_iterations: usize,
    batch_size: usize,
    batch_growth: f64,
    max_batch_size: usize,
    inner_iteration_scale: f64,
    epsilon: f64,
    sampling: Sampling,
    init_std_dev: f64,
    seed: Option<u64>,
    linesearch: LineSearchAlgorithm,
    max_linesearch: usize,
}

impl Default for TrainerParams {
    fn default() -> Self {
        Self {
            regularization: 0.5,
            max_iterations: 30,
            batch_size: 200,
            batch_growth: 1.5,
            max_batch_size: 500,
            inner_iteration_scale: 10.0,
            epsilon: 0.0,
            sampling: Sampling::Random,
            init_std_dev: 0.5,
            seed: None,
            linesearch: LineSearchAlgorithm::default(),
            max_linesearch: 20,
        }
    }
}

impl TrainerParams {
    pub fn regularization(&self) -> f64 {
        self.regularization
    }

    /// Set the L2 regularization coefficient (λ)
    pub fn set_regularization(&mut self, regularization: f64) -> Result<()> {
        if !(regularization >= 0.0) {
            return Err(Error::config("regularization must be non-negative"));
        }
        self.regularization = regularization;
        Ok(())
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Set the number of outer (batch) iterations
    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<()> {
        if max_iterations < 1 {
            return Err(Error::config("max_iterations must be at least 1"));
        }
        self.max_iterations = max_iterations;
        Ok(())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Set the initial number of sentences per batch
    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<()> {
        if batch_size < 1 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn batch_growth(&self) -> f64 {
        self.batch_growth
    }

    pub fn set_batch_growth(&mut self, batch_growth: f64) -> Result<()> {
        if !(batch_growth >= 1.0) || !batch_growth.is_finite() {
            return Err(Error::config("batch_growth must be at least 1"));
        }
        self.batch_growth = batch_growth;
        Ok(())
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn set_max_batch_size(&mut self, max_batch_size: usize) -> Result<()> {
        if max_batch_size < 1 {
            return Err(Error::config("max_batch_size must be at least 1"));
        }
        self.max_batch_size = max_batch_size;
        Ok(())
    }

    pub fn inner_iteration_scale(&self) -> f64 {
        self.inner_iteration_scale
    }

    /// Set the scale of the inner L-BFGS iteration cap, `⌊scale·√batch⌋`
    pub fn set_inner_iteration_scale(&mut self, scale: f64) -> Result<()> {
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(Error::config("inner_iteration_scale must be positive"));
        }
        self.inner_iteration_scale = scale;
        Ok(())
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Stop once the gradient norm falls below `epsilon`; 0 disables the test
    pub fn set_epsilon(&mut self, epsilon: f64) -> Result<()> {
        if !(epsilon >= 0.0) {
            return Err(Error::config("epsilon must be non-negative"));
        }
        self.epsilon = epsilon;
        Ok(())
    }

    pub fn sampling(&self) -> Sampling {
        self.sampling
    }

    pub fn set_sampling(&mut self, sampling: Sampling) {
        self.sampling = sampling;
    }

    pub fn init_std_dev(&self) -> f64 {
        self.init_std_dev
    }

    /// Standard deviation of the random-normal initial weights
    pub fn set_init_std_dev(&mut self, std_dev: f64) -> Result<()> {
        if !(std_dev >= 0.0) || !std_dev.is_finite() {
            return Err(Error::config("init_std_dev must be non-negative"));
        }
        self.init_std_dev = std_dev;
        Ok(())
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Seed for initialization and sampling; read when the trainer is created
    pub fn set_seed(&mut self, seed: Option<u64>) {
        self.seed = seed;
    }

    pub fn linesearch(&self) -> LineSearchAlgorithm {
        self.linesearch
    }

    pub fn set_linesearch(&mut self, linesearch: LineSearchAlgorithm) {
        self.linesearch = linesearch;
    }

    pub fn max_linesearch(&self) -> usize {
        self.max_linesearch
    }

    pub fn set_max_linesearch(&mut self, max_linesearch: usize) -> Result<()> {
        if max_linesearch == 0 {
            return Err(Error::config("max_linesearch must be positive"));
        }
        self.max_linesearch = max_linesearch;
        Ok(())
    }

    /// Inner L-BFGS iteration cap for a batch of `lines` sentences
    pub fn inner_iterations(&self, lines: usize) -> usize {
        ((self.inner_iteration_scale * (lines as f64).sqrt()) as usize).max(1)
    }

    fn grow_batch(&self, batch_size: usize) -> usize {
        ((batch_size as f64 * self.batch_growth) as usize)
            .min(self.max_batch_size)
            .max(1)
    }
}

/// Mini-batch L-BFGS trainer for the maximum-entropy model
#[derive(Debug)]
pub struct Trainer<'a> {
    catalog: &'a FeatureCatalog,
    tags: TagSet,
    params: TrainerParams,
    weights: Arc<[f64]>,
    rng: StdRng,
}

impl<'a> Trainer<'a> {
    /// Create a trainer with random-normal initial weights
    pub fn new(catalog: &'a FeatureCatalog, tags: TagSet, params: TrainerParams) -> Result<Self> {
        let mut rng = make_rng(params.seed);
        let weights = random_weights(catalog.len(), params.init_std_dev, &mut rng)?;
        Self::from_parts(catalog, tags, params, weights, rng)
    }

    /// Create a trainer that resumes from previously saved weights
    pub fn with_weights(
        catalog: &'a FeatureCatalog,
        tags: TagSet,
        params: TrainerParams,
        weights: Vec<f64>,
    ) -> Result<Self> {
        let rng = make_rng(params.seed);
        Self::from_parts(catalog, tags, params, weights, rng)
    }

    fn from_parts(
        catalog: &'a FeatureCatalog,
        tags: TagSet,
        params: TrainerParams,
        weights: Vec<f64>,
        rng: StdRng,
    ) -> Result<Self> {
        if catalog.is_empty() {
            return Err(Error::config("feature catalog is empty"));
        }
        if weights.len() != catalog.len() {
            return Err(Error::config(format!(
                "expected {} weights, got {}",
                catalog.len(),
                weights.len()
            )));
        }
        info!("trainer: {} features, {} tags", catalog.len(), tags.len());
        Ok(Self {
            catalog,
            tags,
            params,
            weights: Arc::from(weights),
            rng,
        })
    }

    /// Get training parameters
    pub fn params(&self) -> &TrainerParams {
        &self.params
    }

    /// Get training parameters for mutation
    pub fn params_mut(&mut self) -> &mut TrainerParams {
        &mut self.params
    }

    /// Set L2 regularization coefficient (builder pattern)
    pub fn with_regularization(mut self, regularization: f64) -> Result<Self> {
        self.params.set_regularization(regularization)?;
        Ok(self)
    }

    /// Set number of outer iterations (builder pattern)
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Result<Self> {
        self.params.set_max_iterations(max_iterations)?;
        Ok(self)
    }

    /// Set initial batch size (builder pattern)
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        self.params.set_batch_size(batch_size)?;
        Ok(self)
    }

    /// Set convergence epsilon (builder pattern)
    pub fn with_epsilon(mut self, epsilon: f64) -> Result<Self> {
        self.params.set_epsilon(epsilon)?;
        Ok(self)
    }

    /// Set batch sampling (builder pattern)
    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.params.set_sampling(sampling);
        self
    }

    pub fn catalog(&self) -> &'a FeatureCatalog {
        self.catalog
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Snapshot of the current weights
    pub fn weights(&self) -> Arc<[f64]> {
        Arc::clone(&self.weights)
    }

    /// Train without a checkpoint hook
    pub fn train(&mut self, corpus: &Corpus) -> Result<Vec<IterationReport>> {
        self.train_with(corpus, |_, _| Ok(Control::Continue))
    }

    /// Train, calling `on_iteration` with the report and the new weights
    /// after every outer iteration
    pub fn train_with<F>(
        &mut self,
        corpus: &Corpus,
        mut on_iteration: F,
    ) -> Result<Vec<IterationReport>>
    where
        F: FnMut(&IterationReport, &[f64]) -> Result<Control>,
    {
        if corpus.is_empty() {
            return Err(Error::config("no training data"));
        }

        let window = self.catalog.window();
        let vectorizer = HistoryVectorizer::new(self.catalog);
        let mut batch_size = self.params.batch_size.min(self.params.max_batch_size);
        let mut reports = Vec::with_capacity(self.params.max_iterations);

        for iteration in 1..=self.params.max_iterations {
            // Select batch
            let (histories, lines) = match self.params.sampling {
                Sampling::Random => {
                    let lines = batch_size.min(corpus.len());
                    (corpus.sample_histories(window, lines, &mut self.rng)?, lines)
                }
                Sampling::Full => (corpus.histories(window)?, corpus.len()),
            };
            let objective =
                Objective::new(&histories, &vectorizer, &self.tags, self.params.regularization);

            // Optimize from the current weights
            let mut weights = self.weights.to_vec();
            let run = InnerRun {
                max_iterations: self.params.inner_iterations(lines),
                linesearch: self.params.linesearch,
                max_linesearch: self.params.max_linesearch,
            };
            lbfgs::minimize(&objective, &mut weights, run)?;

            let mut gradient = vec![0.0; weights.len()];
            let value = objective.evaluate(&weights, &mut gradient)?;
            let gradient_norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();

            let report = IterationReport {
                iteration,
                histories: objective.len(),
                objective: value,
                gradient_norm,
            };
            info!(
                "iteration {}: histories = {}, objective = {:.6}, ||g|| = {:.6}",
                iteration, report.histories, value, gradient_norm
            );
            self.weights = Arc::from(weights);
            reports.push(report);

            if on_iteration(&report, &self.weights[..])? == Control::Stop {
                info!("training stopped after iteration {}", iteration);
                break;
            }
            if gradient_norm < self.params.epsilon {
                info!("converged: ||g|| = {:.6} < {}", gradient_norm, self.params.epsilon);
                break;
            }
            batch_size = self.params.grow_batch(batch_size);
        }

        Ok(reports)
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// `n` weights drawn from N(0, std_dev²)
pub(crate) fn random_weights<R: Rng + ?Sized>(
    n: usize,
    std_dev: f64,
    rng: &mut R,
) -> Result<Vec<f64>> {
    let normal = Normal::new(0.0, std_dev)
        .map_err(|e| Error::config(format!("invalid standard deviation {}: {}", std_dev, e)))?;
    Ok((0..n).map(|_| normal.sample(rng)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = TrainerParams::default();
        assert_eq!(params.regularization(), 0.5);
        assert_eq!(params.max_iterations(), 30);
        assert_eq!(params.batch_size(), 200);
        assert_eq!(params.max_batch_size(), 500);
        assert_eq!(params.sampling(), Sampling::Random);
        assert_eq!(params.seed(), None);
    }

    #[test]
    fn test_inner_iterations() {
        let params = TrainerParams::default();
        assert_eq!(params.inner_iterations(100), 100);
        assert_eq!(params.inner_iterations(0), 1);
        let mut params = TrainerParams::default();
        params.set_inner_iteration_scale(0.01).unwrap();
        assert_eq!(params.inner_iterations(4), 1);
    }

    #[test]
    fn test_batch_growth() {
        let params = TrainerParams::default();
        assert_eq!(params.grow_batch(200), 300);
        assert_eq!(params.grow_batch(300), 450);
        assert_eq!(params.grow_batch(450), 500);
        assert_eq!(params.grow_batch(500), 500);
    }

    #[test]
    fn test_random_weights_are_seeded() {
        let a = random_weights(16, 0.5, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = random_weights(16, 0.5, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().any(|&w| w != 0.0));
        let zeros = random_weights(4, 0.0, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(zeros, vec![0.0; 4]);
    }
}
