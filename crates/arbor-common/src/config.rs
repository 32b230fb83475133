//! Configuration structures for Arbor indexes.

use crate::error::{ArborError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for an index instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Minimum degree `t` for the multiway engines (B-Tree, B+-Tree).
    /// Each non-root node holds between `t - 1` and `2t - 1` keys.
    /// Ignored by the binary engines.
    pub min_degree: usize,
    /// Initial arena capacity in nodes (pre-allocation hint).
    pub initial_nodes: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            min_degree: 2,
            initial_nodes: 64, // covers small trees without reallocation
        }
    }
}

impl IndexConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.min_degree < 2 {
            return Err(ArborError::InvalidDegree { t: self.min_degree });
        }
        if self.initial_nodes == 0 {
            return Err(ArborError::ConfigError(
                "initial_nodes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the maximum number of keys per multiway node.
    pub fn max_keys(&self) -> usize {
        2 * self.min_degree - 1
    }

    /// Returns the maximum number of children per multiway node.
    pub fn max_children(&self) -> usize {
        2 * self.min_degree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.min_degree, 2);
        assert_eq!(config.initial_nodes, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_custom() {
        let config = IndexConfig {
            min_degree: 8,
            initial_nodes: 1024,
        };
        assert_eq!(config.min_degree, 8);
        assert_eq!(config.max_keys(), 15);
        assert_eq!(config.max_children(), 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_degree_below_two() {
        for t in [0, 1] {
            let config = IndexConfig {
                min_degree: t,
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert!(matches!(err, ArborError::InvalidDegree { t: got } if got == t));
        }
    }

    #[test]
    fn test_config_rejects_zero_capacity() {
        let config = IndexConfig {
            initial_nodes: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ArborError::ConfigError(_)));
    }

    #[test]
    fn test_max_keys_default() {
        let config = IndexConfig::default();
        // t = 2: between 1 and 3 keys per non-root node
        assert_eq!(config.max_keys(), 3);
        assert_eq!(config.max_children(), 4);
    }

    #[test]
    fn test_config_clone() {
        let config1 = IndexConfig::default();
        let config2 = config1.clone();
        assert_eq!(config1.min_degree, config2.min_degree);
        assert_eq!(config1.initial_nodes, config2.initial_nodes);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let original = IndexConfig {
            min_degree: 4,
            initial_nodes: 256,
        };
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: IndexConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.min_degree, deserialized.min_degree);
        assert_eq!(original.initial_nodes, deserialized.initial_nodes);
    }
}
