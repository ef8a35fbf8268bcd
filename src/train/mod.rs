mod lbfgs;
mod objective;
mod trainer;

pub use self::lbfgs::LineSearchAlgorithm;
pub use self::objective::{logsumexp, softmax, Objective};
pub use self::trainer::{Control, IterationReport, Sampling, Trainer, TrainerParams};
pub(crate) use self::trainer::random_weights;
