//! Engine configuration
//!
//! Deployment defaults and validation thresholds. Loaded from a JSON file
//! or taken from [`EngineConfig::default`]; absent keys keep their defaults.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use tokenforge_core::deployment::NetworkEnvironment;

/// Configuration for the token engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Chain a deployment targets when the caller names none
    pub default_network: String,
    pub default_environment: NetworkEnvironment,
    /// Whether `deploy` may proceed past blocking findings on request
    pub allow_validation_override: bool,
    /// Royalty percentage above which the gate warns
    pub royalty_warning_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_network: "ethereum".to_string(),
            default_environment: NetworkEnvironment::Testnet,
            allow_validation_override: true,
            royalty_warning_threshold: 10.0,
        }
    }
}

impl EngineConfig {
    /// Read a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid engine config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        if !config.royalty_warning_threshold.is_finite() || config.royalty_warning_threshold < 0.0 {
            anyhow::bail!(
                "royalty_warning_threshold must be a non-negative number, got {}",
                config.royalty_warning_threshold
            );
        }
        Ok(config)
    }

    /// Strict settings for tests: no validation override
    pub fn for_testing() -> Self {
        Self {
            allow_validation_override: false,
            ..Self::default()
        }
    }
}
