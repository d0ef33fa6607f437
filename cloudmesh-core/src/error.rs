//! Error types for cloudmesh

use thiserror::Error;

/// Main error type for cloudmesh operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Fewer points than the operation needs; reported before any work starts
    #[error("Insufficient points: need at least {required}, got {actual}")]
    InsufficientPoints { required: usize, actual: usize },

    /// Neighbor count outside `1..point_count`
    #[error("Invalid k: {k} (must satisfy 1 <= k < {point_count})")]
    InvalidK { k: usize, point_count: usize },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    /// Meshing produced nothing worth returning
    #[error("Empty result: {0}")]
    EmptyResult(String),

    /// The external reconstruction engine failed or returned malformed buffers
    #[error("Reconstruction failed: {0}")]
    ReconstructionFailed(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for cloudmesh operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::InsufficientPoints { required: 2, actual: 1 };
        assert_eq!(err.to_string(), "Insufficient points: need at least 2, got 1");

        let err = Error::InvalidK { k: 5, point_count: 3 };
        assert!(err.to_string().contains("k: 5"));

        let err = Error::ReconstructionFailed("solver diverged".to_string());
        assert!(err.to_string().ends_with("solver diverged"));
    }
}
