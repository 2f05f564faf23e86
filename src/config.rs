//! Application configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::fuzzer::{ClaimValueMode, FuzzTarget};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Case generation and scheduling
    pub fuzzer: FuzzerConfig,

    /// How fuzzed requests are sent
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzerConfig {
    /// Maximum concurrent requests
    pub max_concurrent: usize,

    /// Delay between requests in milliseconds
    pub delay_ms: u64,

    /// Stop after this many cases (unbounded when unset)
    pub max_cases: Option<usize>,

    /// How payloads become claim values
    pub claim_value_mode: ClaimValueMode,

    /// Length variance threshold for marking interesting (percentage)
    pub length_variance_threshold: f64,

    /// Targets to fuzz (`header:alg`, `payload:sub`, `signature`); empty means all
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Scheme used when the request target is relative
    pub scheme: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Follow redirects
    pub follow_redirects: bool,

    /// Maximum redirect depth
    pub max_redirects: usize,

    /// Maximum response body size to capture (bytes)
    pub max_response_size: usize,

    /// User agent used when the request has none
    pub user_agent: String,

    /// Accept invalid TLS certificates (test environments)
    pub accept_invalid_certs: bool,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            delay_ms: 0,
            max_cases: None,
            claim_value_mode: ClaimValueMode::String,
            length_variance_threshold: 10.0,
            targets: Vec::new(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            timeout_secs: 30,
            follow_redirects: false,
            max_redirects: 10,
            max_response_size: 10 * 1024 * 1024, // 10MB
            user_agent: format!("jwtfuzz/{}", env!("CARGO_PKG_VERSION")),
            accept_invalid_certs: false,
        }
    }
}

impl FuzzerConfig {
    /// Parsed target selection
    pub fn target_selection(&self) -> Result<Vec<FuzzTarget>, ConfigError> {
        self.targets
            .iter()
            .map(|t| {
                t.parse().map_err(|e: crate::fuzzer::ParseTargetError| ConfigError::ValidationError {
                    field: "fuzzer.targets".to_string(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::ReadError {
                path: config_path.display().to_string(),
                source,
            })?;

            let config: Config =
                toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

            tracing::info!("Loaded configuration from {:?}", config_path);
            Ok(config)
        } else if path.is_some() {
            Err(ConfigError::ReadError {
                path: config_path.display().to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }
            .into())
        } else {
            tracing::info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Check values that would make a run meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fuzzer.max_concurrent == 0 {
            return Err(ConfigError::ValidationError {
                field: "fuzzer.max_concurrent".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.dispatch.timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                field: "dispatch.timeout_secs".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if !matches!(self.dispatch.scheme.as_str(), "http" | "https") {
            return Err(ConfigError::ValidationError {
                field: "dispatch.scheme".to_string(),
                reason: format!("'{}' is not http or https", self.dispatch.scheme),
            });
        }

        self.fuzzer.target_selection()?;
        Ok(())
    }

    /// Get default configuration file path
    fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "jwtfuzz", "jwtfuzz")
            .context("Failed to determine config directory")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get data directory path
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "jwtfuzz", "jwtfuzz")
            .context("Failed to determine data directory")?;

        Ok(dirs.data_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fuzzer.max_concurrent, 10);
        assert_eq!(config.fuzzer.claim_value_mode, ClaimValueMode::String);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.fuzzer.max_cases = Some(50);
        config.fuzzer.claim_value_mode = ClaimValueMode::Json;
        config.fuzzer.targets = vec!["header:alg".to_string()];
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fuzzer]\nclaim_value_mode = \"json\"\n").unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.fuzzer.claim_value_mode, ClaimValueMode::Json);
        assert_eq!(loaded.dispatch, DispatchConfig::default());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.fuzzer.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.dispatch.scheme = "ftp".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fuzzer.targets = vec!["cookie:x".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fuzzer.targets"));
    }
}
