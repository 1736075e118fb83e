//! Azure Authentication
//!
//! Bearer tokens come from `AZURE_ACCESS_TOKEN` when set, otherwise from the
//! Azure CLI (`az account get-access-token`). The ambient default
//! subscription is read from the environment or the CLI profile.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Audience requested from the Azure CLI
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";

/// Refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// TTL used when the token source does not report an expiry
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
enum TokenSource {
    Fixed(String),
    AzureCli,
}

/// Credentials holder with token caching
#[derive(Clone)]
pub struct ArmCredentials {
    source: TokenSource,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Output of `az account get-access-token -o json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    #[serde(default, rename = "expires_on")]
    expires_on: Option<i64>,
}

impl ArmCredentials {
    /// `AZURE_ACCESS_TOKEN` if present, Azure CLI otherwise
    pub fn from_env() -> Self {
        match std::env::var("AZURE_ACCESS_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Self::fixed(token.trim()),
            _ => Self {
                source: TokenSource::AzureCli,
                token_cache: Arc::new(RwLock::new(None)),
            },
        }
    }

    /// Always hand out `token`
    pub fn fixed(token: &str) -> Self {
        Self {
            source: TokenSource::Fixed(token.to_string()),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get an access token for API calls
    pub async fn get_token(&self) -> Result<String> {
        if let TokenSource::Fixed(ref token) = self.source {
            return Ok(token.clone());
        }

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let (token, ttl) = fetch_cli_token().await?;
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }

        tracing::debug!("New token cached, expires in ~{} minutes", ttl.as_secs() / 60);

        Ok(token)
    }
}

async fn fetch_cli_token() -> Result<(String, Duration)> {
    let output = tokio::process::Command::new("az")
        .args([
            "account",
            "get-access-token",
            "--resource",
            MANAGEMENT_RESOURCE,
            "--output",
            "json",
        ])
        .output()
        .await
        .context("Failed to run the Azure CLI. Install it or set AZURE_ACCESS_TOKEN")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "Failed to get access token. Run 'az login' ({})",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let parsed: CliToken =
        serde_json::from_slice(&output.stdout).context("Failed to parse Azure CLI token output")?;

    let ttl = parsed
        .expires_on
        .and_then(|epoch| chrono::DateTime::from_timestamp(epoch, 0))
        .and_then(|expiry| (expiry - chrono::Utc::now()).to_std().ok())
        .unwrap_or(DEFAULT_TOKEN_TTL);

    Ok((parsed.access_token, ttl))
}

/// Get the Azure CLI configuration directory
pub fn get_azure_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("AZURE_CONFIG_DIR") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|p| p.join(".azure"))
}

/// Subscription ids are GUIDs
pub fn validate_subscription_id(subscription: &str) -> bool {
    uuid::Uuid::try_parse(subscription).is_ok()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureProfile {
    #[serde(default)]
    subscriptions: Vec<ProfileSubscription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileSubscription {
    id: String,
    #[serde(default)]
    is_default: bool,
}

/// Default subscription from a CLI profile document
pub fn default_subscription_from_profile(content: &str) -> Option<String> {
    // The CLI writes the profile with a byte-order mark
    let content = content.trim_start_matches('\u{feff}');
    let profile: AzureProfile = serde_json::from_str(content).ok()?;

    profile
        .subscriptions
        .into_iter()
        .find(|s| s.is_default)
        .map(|s| s.id)
        .filter(|id| validate_subscription_id(id))
}

/// Read the ambient default subscription
pub fn get_default_subscription() -> Option<String> {
    if let Ok(subscription) = std::env::var("AZURE_SUBSCRIPTION_ID") {
        if validate_subscription_id(&subscription) {
            return Some(subscription);
        }
        tracing::warn!("Invalid subscription id format in AZURE_SUBSCRIPTION_ID");
    }

    let profile_path = get_azure_config_dir()?.join("azureProfile.json");
    let content = std::fs::read_to_string(&profile_path).ok()?;
    default_subscription_from_profile(&content)
}
