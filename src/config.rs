//! YAML + environment configuration loading for the identification pipeline.
//!
//! Mirrors the teacher's `UcfpConfig`: one YAML file carrying a section per
//! stage, each with `serde(default = ...)` fields and its own `validate()`,
//! plus environment overrides layered on top via the `config` crate's
//! `Environment` source (prefix `STASH_IDENTIFY__`, `__` as the nesting
//! separator).

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("validation error: {0}")]
    Validation(String),
}

/// One configured stash-box endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    pub api_key: String,
}

/// Retry policy for transient remote failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl RetryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be >= 1".into(),
            ));
        }
        if self.initial_backoff_ms == 0 {
            return Err(ConfigError::Validation(
                "retry.initial_backoff_ms must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_backoff_ms(),
        }
    }
}

/// Top-level identification pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyConfig {
    /// Configured stash-box endpoints, keyed by a short local name.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,

    /// Bound on fingerprints per `find_scenes_by_full_fingerprints` call.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Hamming-distance threshold for perceptual-hash matches.
    #[serde(default = "default_perceptual_threshold")]
    pub perceptual_threshold: u32,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl IdentifyConfig {
    /// Load from a YAML file, then apply `STASH_IDENTIFY__`-prefixed
    /// environment overrides (e.g. `STASH_IDENTIFY__CHUNK_SIZE=50`).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let loaded = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix("STASH_IDENTIFY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let parsed: IdentifyConfig = loaded.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Validation("chunk_size must be >= 1".into()));
        }
        if self.chunk_size > crate::stashbox::MAX_FINGERPRINT_BATCH {
            return Err(ConfigError::Validation(format!(
                "chunk_size must be <= {}",
                crate::stashbox::MAX_FINGERPRINT_BATCH
            )));
        }
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "connect_timeout_secs and request_timeout_secs must be >= 1".into(),
            ));
        }
        self.retry.validate()?;
        Ok(())
    }
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            chunk_size: default_chunk_size(),
            perceptual_threshold: default_perceptual_threshold(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_chunk_size() -> usize {
    100
}
fn default_perceptual_threshold() -> u32 {
    crate::similarity::DEFAULT_THRESHOLD
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    250
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_defaults_when_sections_are_absent() {
        let yaml = "endpoints: []\n";
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = IdentifyConfig::load(file.path()).unwrap();
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.perceptual_threshold, 4);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let yaml = "endpoints: []\nchunk_size: 0\n";
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let err = IdentifyConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_chunk_size_above_batch_bound() {
        let yaml = "endpoints: []\nchunk_size: 500\n";
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let err = IdentifyConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn parses_endpoints() {
        let yaml = r#"
endpoints:
  - url: "https://stashdb.org/graphql"
    api_key: "secret"
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = IdentifyConfig::load(file.path()).unwrap();
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.endpoints[0].url, "https://stashdb.org/graphql");
    }
}
