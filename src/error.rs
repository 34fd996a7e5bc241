use core::fmt;

use crate::hierarchy::ValidationReport;

/// Result alias for `multiscale`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by ingestion, configuration and export.
///
/// The modelling algorithms themselves never fail on a structurally valid
/// dataset; everything recoverable is caught before they run.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input was empty.
    EmptyInput,

    /// Invalid number of clusters requested.
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: String,
    },

    /// One or more problems found while validating input; every violation is listed.
    Validation(ValidationReport),

    /// The model could not be serialized.
    Serialization(String),

    /// Generic error with message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::InvalidClusterCount { requested, n_items } => {
                write!(
                    f,
                    "not enough data ({requested} initial states were requested, {n_items} rows are available)"
                )
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::Validation(report) => write!(f, "validation failed:\n{report}"),
            Error::Serialization(msg) => write!(f, "serialization failed: {msg}"),
            Error::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
