//! Configuration Management
//!
//! Handles persistent configuration storage for armtree.

use crate::arm::auth;
use crate::arm::http::DEFAULT_ENDPOINT;
use crate::resource::DEFAULT_MAX_DEPTH;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Subscription used for provider listings
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Resource-manager endpoint (sovereign clouds, test servers)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Maximum ancestor depth before resolution is aborted
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("armtree").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Parse a config document, falling back to defaults when malformed
    pub fn parse(content: &str) -> Self {
        serde_json::from_str(content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed config: {}", e);
            Self::default()
        })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config {}", path.display()))?;

        Ok(())
    }

    /// Get effective subscription (config > environment > CLI profile)
    pub fn effective_subscription(&self) -> String {
        self.subscription_id
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(auth::get_default_subscription)
            .unwrap_or_default()
    }

    pub fn effective_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    pub fn effective_max_depth(&self) -> usize {
        self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
    }

    pub fn effective_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Set subscription and save
    pub fn set_subscription(&mut self, subscription_id: &str) -> Result<()> {
        if !auth::validate_subscription_id(subscription_id) {
            bail!("'{}' is not a subscription id", subscription_id);
        }
        self.subscription_id = Some(subscription_id.to_string());
        self.save()
    }
}
