use std::io;

use thiserror::Error;

/// Errors raised while building, training or applying a tagger.
///
/// A feature that is missing from the catalog is not an error: the
/// vectorizer simply leaves it out.
#[derive(Debug, Error)]
pub enum Error {
    /// Corpus text that does not follow the `word_tag word_tag ...` format
    #[error("malformed input at line {line}: {message}")]
    MalformedInput { line: usize, message: String },
    /// Invalid parameters, empty tag vocabulary, zero-length window, ...
    #[error("{0}")]
    Configuration(String),
    /// A non-finite objective value or gradient
    #[error("numeric instability: {0}")]
    NumericInstability(String),
    /// A persisted feature table or weight file that cannot be decoded
    #[error("invalid store: {0}")]
    InvalidStore(String),
    /// The quasi-Newton optimizer failed in a way that cannot be recovered
    #[error("optimizer error: {0}")]
    Optimizer(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn config<S: Into<String>>(message: S) -> Self {
        Error::Configuration(message.into())
    }

    pub(crate) fn store<S: Into<String>>(message: S) -> Self {
        Error::InvalidStore(message.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
