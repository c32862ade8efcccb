//! Error type shared by the model, the samplers and the diagnostics.

use thiserror::Error;

/// Everything that can go wrong in this crate.
///
/// Rejecting a Metropolis proposal is not an error: a candidate with an invalid
/// log-posterior is simply not accepted. Errors are reserved for malformed
/// configuration, invalid starting points and statistics that are undefined
/// for the data they were handed.
#[derive(Debug, Error)]
pub enum McmcError {
    /// A parameter vector outside the model's domain reached a place where it
    /// cannot be rejected, e.g. the initial state of a sampler.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Sampler settings that make a run meaningless (zero steps, non-positive
    /// proposal scale, ...). Raised before any sampling happens.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Chains handed to a multi-chain diagnostic differ in shape.
    #[error("chain {index} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Not enough chains or samples to compute a statistic.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A chain without variance, for which the requested statistic is undefined.
    #[error("degenerate chain: {0}")]
    DegenerateChain(String),

    /// An argument to a diagnostic or helper is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Observations that cannot be used by the model.
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_mismatch_message_names_chain() {
        let err = McmcError::ShapeMismatch {
            index: 2,
            expected: (100, 2),
            found: (99, 2),
        };
        assert_eq!(
            err.to_string(),
            "chain 2 has shape (99, 2), expected (100, 2)"
        );
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv");
        let err: McmcError = io.into();
        assert!(matches!(err, McmcError::Io(_)));
    }
}
