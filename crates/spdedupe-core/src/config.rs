//! Scanner configuration types.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Configuration for scanning a site.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct ScannerConfig {
    /// Maximum number of non-empty pages fetched for a single directory.
    #[builder(default = "10_000")]
    pub max_pages_per_directory: u32,

    /// Number of drives enumerated concurrently.
    #[builder(default = "1")]
    pub drive_concurrency: usize,

    /// Number of files between progress updates.
    #[builder(default = "500")]
    pub progress_interval: u64,
}

impl ScannerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_pages_per_directory == Some(0) {
            return Err("max_pages_per_directory must be greater than zero".to_string());
        }
        if self.drive_concurrency == Some(0) {
            return Err("drive_concurrency must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl ScannerConfig {
    /// Create a new scanner config builder.
    pub fn builder() -> ScannerConfigBuilder {
        ScannerConfigBuilder::default()
    }

    /// Check the config values loaded from a file or the environment.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_pages_per_directory == 0 {
            return Err("max_pages_per_directory must be greater than zero".to_string());
        }
        if self.drive_concurrency == 0 {
            return Err("drive_concurrency must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_pages_per_directory: 10_000,
            drive_concurrency: 1,
            progress_interval: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ScannerConfig::builder()
            .max_pages_per_directory(25u32)
            .drive_concurrency(4usize)
            .build()
            .unwrap();

        assert_eq!(config.max_pages_per_directory, 25);
        assert_eq!(config.drive_concurrency, 4);
        assert_eq!(config.progress_interval, 500);
    }

    #[test]
    fn test_config_defaults() {
        let config = ScannerConfig::default();
        assert_eq!(config.max_pages_per_directory, 10_000);
        assert_eq!(config.drive_concurrency, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_page_cap_rejected() {
        let result = ScannerConfig::builder()
            .max_pages_per_directory(0u32)
            .build();
        assert!(result.is_err());

        let config = ScannerConfig {
            drive_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
