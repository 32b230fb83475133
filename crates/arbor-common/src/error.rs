//! Error types for Arbor.

use thiserror::Error;

/// Result type alias using ArborError.
pub type Result<T> = std::result::Result<T, ArborError>;

/// Errors that can occur in Arbor operations.
///
/// Expected-absence outcomes (key not found, duplicate insert) are never
/// errors; they are reported through the boolean payload of `Result<bool>`.
/// The variants here cover construction misuse and internal invariant
/// violations only.
#[derive(Debug, Error)]
pub enum ArborError {
    // Construction errors
    #[error("invalid minimum degree: {t} (must be >= 2)")]
    InvalidDegree { t: usize },

    #[error("configuration error: {0}")]
    ConfigError(String),

    // Internal invariant violations
    #[error("tree corrupted: {0}")]
    TreeCorrupted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_degree_display() {
        let err = ArborError::InvalidDegree { t: 1 };
        assert_eq!(
            err.to_string(),
            "invalid minimum degree: 1 (must be >= 2)"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ArborError::ConfigError("initial_nodes must be non-zero".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: initial_nodes must be non-zero"
        );
    }

    #[test]
    fn test_tree_corrupted_display() {
        let err = ArborError::TreeCorrupted("internal node with 3 keys, 2 children".to_string());
        assert_eq!(
            err.to_string(),
            "tree corrupted: internal node with 3 keys, 2 children"
        );
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(ArborError::TreeCorrupted("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ArborError>();
    }
}
