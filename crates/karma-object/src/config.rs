//! Object core configuration
//!
//! Loaded from TOML, e.g.
//!
//! ```toml
//! arena-element-size = 128
//! arena-element-count = 4096
//! duplicate-resolution = "first-found"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default size of one arena element in bytes
pub const DEFAULT_ARENA_ELEMENT_SIZE: usize = 64;

/// Default number of arena elements
pub const DEFAULT_ARENA_ELEMENT_COUNT: usize = 1024;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// How a scoped name lookup resolves several matching objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateResolution {
    /// Return the earliest registered match
    #[default]
    FirstFound,
    /// Return the most recently registered match
    MostRecent,
}

/// Configuration for an [`ObjectContext`](crate::ObjectContext)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ObjectConfig {
    /// Size of one arena element in bytes (multiple of 16)
    pub arena_element_size: usize,

    /// Number of elements the arena is sized for
    pub arena_element_count: usize,

    /// Resolution policy for ambiguous name lookups
    pub duplicate_resolution: DuplicateResolution,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            arena_element_size: DEFAULT_ARENA_ELEMENT_SIZE,
            arena_element_count: DEFAULT_ARENA_ELEMENT_COUNT,
            duplicate_resolution: DuplicateResolution::FirstFound,
        }
    }
}

impl ObjectConfig {
    /// Parse a configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ObjectConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arena_element_size == 0 || self.arena_element_size % 16 != 0 {
            return Err(ConfigError::ValidationError(format!(
                "arena-element-size must be a positive multiple of 16, got {}",
                self.arena_element_size
            )));
        }

        if self
            .arena_element_size
            .checked_mul(self.arena_element_count)
            .is_none()
        {
            return Err(ConfigError::ValidationError(format!(
                "arena of {} x {} bytes overflows",
                self.arena_element_count, self.arena_element_size
            )));
        }

        Ok(())
    }

    /// Total arena size in bytes
    pub fn arena_bytes(&self) -> usize {
        self.arena_element_size * self.arena_element_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObjectConfig::default();
        assert_eq!(config.arena_bytes(), 64 * 1024);
        assert_eq!(config.duplicate_resolution, DuplicateResolution::FirstFound);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let config = ObjectConfig::from_str(
            r#"
            arena-element-size = 128
            arena-element-count = 16
            duplicate-resolution = "most-recent"
            "#,
        )
        .unwrap();

        assert_eq!(config.arena_element_size, 128);
        assert_eq!(config.arena_element_count, 16);
        assert_eq!(config.duplicate_resolution, DuplicateResolution::MostRecent);
    }

    #[test]
    fn test_parse_partial_config_uses_defaults() {
        let config = ObjectConfig::from_str("arena-element-count = 8").unwrap();
        assert_eq!(config.arena_element_size, DEFAULT_ARENA_ELEMENT_SIZE);
        assert_eq!(config.arena_element_count, 8);
    }

    #[test]
    fn test_reject_unaligned_element_size() {
        let result = ObjectConfig::from_str("arena-element-size = 24");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_reject_bad_toml() {
        let result = ObjectConfig::from_str("arena-element-size = \"big\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = ObjectConfig {
            arena_element_size: 32,
            arena_element_count: 2,
            duplicate_resolution: DuplicateResolution::MostRecent,
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(ObjectConfig::from_str(&text).unwrap(), config);
    }
}
