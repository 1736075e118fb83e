//! HTTP transport for resource-manager REST calls

use super::auth::ArmCredentials;
use super::client::{RestClient, RestResponse};
use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Public cloud resource-manager endpoint
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and drops control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// reqwest-backed [`RestClient`]
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
    endpoint: Url,
    credentials: ArmCredentials,
}

impl ArmHttpClient {
    /// Create a new HTTP client against `endpoint`
    pub fn new(endpoint: &str, credentials: ArmCredentials, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid resource-manager endpoint '{}'", endpoint))?;

        let client = Client::builder()
            .user_agent(concat!("armtree/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            credentials,
        })
    }

    /// Resolve a request path against the endpoint. Absolute URLs (paging
    /// links) are used as given.
    fn url_for(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path).with_context(|| format!("Invalid URL '{}'", path));
        }
        self.endpoint
            .join(path)
            .with_context(|| format!("Invalid request path '{}'", path))
    }
}

impl RestClient for ArmHttpClient {
    async fn get(&self, path: &str) -> Result<RestResponse> {
        let url = self.url_for(path)?;
        let token = self.credentials.get_token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        Ok(RestResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Format an API error for display
pub fn format_arm_error(error: &anyhow::Error) -> String {
    if let Some(arm) = error.downcast_ref::<super::ArmError>() {
        if let Some(status) = arm.status() {
            match status {
                401 => return "Authentication failed. Run 'az login'.".to_string(),
                403 => {
                    return "Permission denied. Check your role assignments.".to_string();
                }
                404 => return "Resource not found.".to_string(),
                429 => return "Rate limit exceeded. Please try again later.".to_string(),
                400 => return "Invalid request. Check your parameters.".to_string(),
                500 | 503 => {
                    return "Resource manager temporarily unavailable. Please try again."
                        .to_string();
                }
                _ => {}
            }
        }
        return arm.to_string();
    }

    let error_str = format!("{:#}", error);
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(120)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::ArmError;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let out = sanitize_for_log(&body);
        assert!(out.starts_with(&"x".repeat(200)));
        assert!(out.contains("500 bytes total"));
    }

    #[test]
    fn test_url_for_relative_and_absolute() {
        let client = ArmHttpClient::new(
            "https://management.azure.com",
            ArmCredentials::fixed("t"),
            Duration::from_secs(5),
        )
        .unwrap();

        let rel = client
            .url_for("/subscriptions/s1/providers?api-version=2021-04-01")
            .unwrap();
        assert_eq!(
            rel.as_str(),
            "https://management.azure.com/subscriptions/s1/providers?api-version=2021-04-01"
        );

        let abs = client.url_for("https://other.example/page2").unwrap();
        assert_eq!(abs.host_str(), Some("other.example"));
    }

    #[test]
    fn test_format_arm_error_maps_status() {
        let err: anyhow::Error = ArmError::Request {
            status: 403,
            code: "AuthorizationFailed".to_string(),
            message: "denied".to_string(),
        }
        .into();
        assert!(format_arm_error(&err).starts_with("Permission denied"));
    }
}
