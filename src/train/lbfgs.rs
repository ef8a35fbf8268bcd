use log::{debug, warn};

use super::objective::Objective;
use crate::error::{Error, Result};

/// Step-length search used inside each inner run of the MEMM trainer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineSearchAlgorithm {
    /// More and Thuente's interpolating search
    #[default]
    MoreThuente,
    /// Backtrack until sufficient decrease holds
    BacktrackingArmijo,
    /// Backtrack until the weak curvature condition also holds
    BacktrackingWolfe,
    /// Backtrack until the strong curvature condition also holds
    BacktrackingStrongWolfe,
}

impl LineSearchAlgorithm {
    /// Name understood by `liblbfgs`
    fn as_str(self) -> &'static str {
        match self {
            Self::MoreThuente => "MoreThuente",
            Self::BacktrackingArmijo => "BacktrackingArmijo",
            Self::BacktrackingWolfe => "BacktrackingWolfe",
            Self::BacktrackingStrongWolfe => "BacktrackingStrongWolfe",
        }
    }
}

/// Settings for a single inner L-BFGS run
#[derive(Debug, Clone, Copy)]
pub(crate) struct InnerRun {
    pub max_iterations: usize,
    pub linesearch: LineSearchAlgorithm,
    pub max_linesearch: usize,
}

/// Minimize `objective` starting from `weights`, updating them in place.
///
/// Numeric instability aborts training. Any other optimizer failure (a
/// line search that cannot make progress near an optimum, for instance) is
/// logged and the last accepted point is kept.
pub(crate) fn minimize(objective: &Objective, weights: &mut [f64], run: InnerRun) -> Result<()> {
    let evaluate = |x: &[f64], gx: &mut [f64]| -> Result<f64, anyhow::Error> {
        Ok(objective.evaluate(x, gx)?)
    };

    let progress = |prgr: &liblbfgs::Progress| -> bool {
        debug!(
            "  lbfgs {}: f = {:.6}, ||x|| = {:.6}, ||g|| = {:.6}",
            prgr.niter, prgr.fx, prgr.xnorm, prgr.gnorm
        );
        false // continue optimization
    };

    let result = liblbfgs::lbfgs()
        .with_max_iterations(run.max_iterations)
        .with_epsilon(1e-5)
        .with_max_linesearch(run.max_linesearch)
        .with_linesearch_algorithm(run.linesearch.as_str())
        .minimize(&mut *weights, evaluate, progress);

    match result {
        Ok(report) => {
            debug!("  lbfgs finished: f = {:.6}", report.fx);
            Ok(())
        }
        Err(err) => {
            if let Some(Error::NumericInstability(message)) = err.downcast_ref::<Error>() {
                return Err(Error::NumericInstability(message.clone()));
            }
            if weights.iter().any(|w| !w.is_finite()) {
                return Err(Error::Optimizer(err.to_string()));
            }
            warn!("L-BFGS stopped early, keeping last point: {}", err);
            Ok(())
        }
    }
}
