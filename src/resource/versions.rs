//! Provider API-version cache
//!
//! Maps `<namespace>/<resourceType>` onto the newest "latest" and "stable"
//! API versions reported by the provider listing of a subscription.

use crate::arm::{ArmClient, RestClient};
use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

/// api-version used for the provider listing itself
pub const PROVIDERS_API_VERSION: &str = "2021-04-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Release {
    /// Newest `YYYY-MM-DD` version
    Stable,
    /// Newest version of any form, previews included
    Latest,
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Release::Stable => write!(f, "stable"),
            Release::Latest => write!(f, "latest"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderVersionEntry {
    pub provider: String,
    pub resource_type: String,
    /// `provider/resource_type`
    #[serde(rename = "type")]
    pub type_name: String,
    pub api_version: String,
    pub release: Release,
}

fn stable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}$")
            .unwrap_or_else(|e| panic!("Invalid stable version pattern: {}", e))
    })
}

/// True for plain date versions such as `2021-04-01`
pub fn is_stable_version(version: &str) -> bool {
    stable_pattern().is_match(version)
}

/// Pick the version for `release` out of everything a resource type offers
pub fn select_version<'a>(versions: &[&'a str], release: Release) -> Option<&'a str> {
    versions
        .iter()
        .copied()
        .filter(|v| release == Release::Latest || is_stable_version(v))
        .max()
}

/// Append-only between full clears
#[derive(Debug, Default)]
pub struct ProviderVersionCache {
    entries: Vec<ProviderVersionEntry>,
}

impl ProviderVersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row for `type_name` and `release`, never touches the network
    pub fn search(&self, type_name: &str, release: Release) -> Option<&ProviderVersionEntry> {
        self.entries
            .iter()
            .find(|e| e.release == release && e.type_name.eq_ignore_ascii_case(type_name))
    }

    /// Any row for `type_name`, stable preferred
    pub fn search_type(&self, type_name: &str) -> Option<&ProviderVersionEntry> {
        self.search(type_name, Release::Stable)
            .or_else(|| self.search(type_name, Release::Latest))
    }

    pub fn search_all(&self) -> &[ProviderVersionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replace the whole cache with the rows derived from a provider listing
    pub fn rebuild_from(&mut self, listing: &Value) {
        self.clear();

        let providers = listing
            .get("value")
            .and_then(|v| v.as_array())
            .map(|a| a.as_slice())
            .unwrap_or_default();

        for provider in providers {
            let Some(namespace) = provider.get("namespace").and_then(|v| v.as_str()) else {
                continue;
            };
            let resource_types = provider
                .get("resourceTypes")
                .and_then(|v| v.as_array())
                .map(|a| a.as_slice())
                .unwrap_or_default();

            for resource_type in resource_types {
                let Some(name) = resource_type.get("resourceType").and_then(|v| v.as_str())
                else {
                    continue;
                };
                let versions: Vec<&str> = resource_type
                    .get("apiVersions")
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
                    .unwrap_or_default();

                for release in [Release::Latest, Release::Stable] {
                    if let Some(version) = select_version(&versions, release) {
                        self.insert(namespace, name, version, release);
                    }
                }
            }
        }

        tracing::debug!("Provider version cache rebuilt with {} rows", self.entries.len());
    }

    fn insert(&mut self, provider: &str, resource_type: &str, api_version: &str, release: Release) {
        let type_name = format!("{}/{}", provider, resource_type);
        if self.search(&type_name, release).is_some() {
            return;
        }
        self.entries.push(ProviderVersionEntry {
            provider: provider.to_string(),
            resource_type: resource_type.to_string(),
            type_name,
            api_version: api_version.to_string(),
            release,
        });
    }

    /// Clear and rebuild from one provider listing of `subscription_id`
    pub async fn refresh<C: RestClient>(
        &mut self,
        client: &ArmClient<C>,
        subscription_id: &str,
    ) -> Result<()> {
        if subscription_id.is_empty() {
            return Err(anyhow!("No subscription available to list providers"));
        }

        tracing::info!("Refreshing provider versions from subscription {}", subscription_id);

        let path = format!(
            "/subscriptions/{}/providers?api-version={}",
            subscription_id, PROVIDERS_API_VERSION
        );
        let listing = client.get(&path).await?;
        self.rebuild_from(&listing);
        Ok(())
    }

    /// Version for `type_name`; a miss triggers exactly one refresh against
    /// the ambient subscription. Empty when still unknown.
    pub async fn get_version<C: RestClient>(
        &mut self,
        client: &ArmClient<C>,
        ambient_subscription: &str,
        type_name: &str,
        release: Release,
    ) -> String {
        if let Some(entry) = self.search(type_name, release) {
            return entry.api_version.clone();
        }

        if let Err(e) = self.refresh(client, ambient_subscription).await {
            tracing::warn!("Provider version refresh failed: {:#}", e);
        }

        match self.search(type_name, release) {
            Some(entry) => entry.api_version.clone(),
            None => {
                tracing::warn!("No {} api-version known for '{}'", release, type_name);
                String::new()
            }
        }
    }

    /// `?api-version=<stable version>`
    pub async fn version_params<C: RestClient>(
        &mut self,
        client: &ArmClient<C>,
        ambient_subscription: &str,
        type_name: &str,
    ) -> String {
        let version = self
            .get_version(client, ambient_subscription, type_name, Release::Stable)
            .await;
        format!("?api-version={}", version)
    }
}
