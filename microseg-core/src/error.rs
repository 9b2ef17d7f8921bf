//! Error types for microseg-core.

use thiserror::Error;

/// Result type alias for segmentation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for segmentation operations.
///
/// Every variant is a configuration error: the engine fails fast and produces
/// no partial output. Degenerate clusterings and inapplicable criteria are not
/// errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The input map set holds no samples.
    #[error("input contains no samples")]
    EmptyInput,

    /// Requested cluster range is not usable.
    #[error("invalid cluster range: {min}..={max}")]
    InvalidClusterRange { min: usize, max: usize },

    /// Clamping the cluster range against the sample count left nothing to sweep.
    #[error("cluster range {min}..={max} is empty for {samples} samples")]
    EmptySweep {
        min: usize,
        max: usize,
        samples: usize,
    },

    /// Epoch lengths do not add up to the number of samples.
    #[error("epoch lengths sum to {epochs}, expected {samples}")]
    EpochMismatch { epochs: usize, samples: usize },

    /// Two map sets (or a map set and coordinates) disagree on dimension.
    #[error("dimension mismatch ({context}): expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: &'static str,
    },

    /// An ordering mode needs electrode or solution point coordinates.
    #[error("ordering by {0} requires coordinates")]
    MissingCoordinates(&'static str),

    /// Any other inconsistent parameter.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// The progress callback asked to stop.
    #[error("segmentation aborted after {completed} of {total} cluster counts")]
    Aborted { completed: usize, total: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::InvalidClusterRange { min: 6, max: 2 };
        assert_eq!(err.to_string(), "invalid cluster range: 6..=2");

        let err = Error::DimensionMismatch {
            expected: 8,
            actual: 7,
            context: "reference templates",
        };
        assert!(err.to_string().contains("reference templates"));
    }
}
