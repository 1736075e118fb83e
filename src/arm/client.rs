//! ARM Client
//!
//! The [`RestClient`] trait is the transport seam: it issues one GET and hands
//! back status, content type and body. [`ArmClient`] layers the
//! resource-manager conventions on top of it (exact-200 success, backend error
//! payloads, `nextLink` paging).

use super::error::ArmError;
use super::http::sanitize_for_log;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;

/// Raw answer of a GET
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl RestResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            content_type: Some("application/json; charset=utf-8".to_string()),
            body: body.to_string(),
        }
    }
}

/// Transport used by the resolver. `path` is either relative to the
/// configured endpoint (`/subscriptions/...?api-version=...`) or an absolute
/// URL as returned in `nextLink`.
pub trait RestClient: Send + Sync {
    fn get(&self, path: &str) -> impl Future<Output = Result<RestResponse>> + Send;
}

/// Resource-manager client over any transport
pub struct ArmClient<C> {
    rest: C,
}

impl<C: RestClient> ArmClient<C> {
    pub fn new(rest: C) -> Self {
        Self { rest }
    }

    pub fn rest(&self) -> &C {
        &self.rest
    }

    /// GET a single document
    pub async fn get(&self, path: &str) -> Result<Value> {
        tracing::debug!("GET {}", path);

        let response = self
            .rest
            .get(path)
            .await
            .with_context(|| format!("Failed to send request to {}", path))?;

        if response.status != 200 {
            let (code, message) = extract_backend_error(&response.body);
            tracing::error!(
                "API error: {} {} - {}",
                response.status,
                code,
                sanitize_for_log(&message)
            );
            return Err(ArmError::Request {
                status: response.status,
                code,
                message,
            }
            .into());
        }

        let content_type = response.content_type.as_deref().unwrap_or_default();
        if !content_type.to_ascii_lowercase().contains("json") {
            tracing::error!("Unexpected content type '{}' for {}", content_type, path);
            return Err(ArmError::UnsupportedContentType {
                path: path.to_string(),
                content_type: content_type.to_string(),
            }
            .into());
        }

        serde_json::from_str(&response.body).context("Failed to parse response JSON")
    }

    /// GET a collection, following `nextLink` until the backend stops
    /// returning one. A link that was already fetched is an error.
    pub async fn list(&self, path: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut next: Option<String> = Some(path.to_string());

        while let Some(page_path) = next.take() {
            if !visited.insert(page_path.clone()) {
                tracing::error!("Paging of {} revisited {}", path, page_path);
                return Err(anyhow!(
                    "Paging of '{}' returned an already visited nextLink '{}'",
                    path,
                    page_path
                ));
            }
            let page = self.get(&page_path).await?;
            items.extend(extract_items(&page));
            next = page
                .get("nextLink")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string());
        }

        Ok(items)
    }
}

/// Items of a collection document. A bare array is accepted as well as the
/// usual `{ "value": [...] }` envelope.
pub fn extract_items(response: &Value) -> Vec<Value> {
    if let Some(arr) = response.as_array() {
        return arr.clone();
    }
    response
        .get("value")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Pull `error.code` / `error.message` out of a backend error payload
fn extract_backend_error(body: &str) -> (String, String) {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let code = error
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown")
        .to_string();
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| body.to_string());

    (code, message)
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory transport for unit tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeRest {
        routes: Mutex<HashMap<String, RestResponse>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRest {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a 200 JSON answer for `path` (query string ignored)
        pub fn ok(self, path: &str, body: Value) -> Self {
            self.raw(path, RestResponse::json(200, &body))
        }

        pub fn status(self, path: &str, status: u16, body: Value) -> Self {
            self.raw(path, RestResponse::json(status, &body))
        }

        pub fn raw(self, path: &str, response: RestResponse) -> Self {
            self.replace(path, response);
            self
        }

        /// Swap the answer for `path` on a backend already in use
        pub fn replace(&self, path: &str, response: RestResponse) {
            if let Ok(mut routes) = self.routes.lock() {
                routes.insert(path.to_string(), response);
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        pub fn call_count(&self) -> usize {
            self.calls().len()
        }
    }

    impl RestClient for FakeRest {
        async fn get(&self, path: &str) -> Result<RestResponse> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(path.to_string());
            }
            let key = path.split('?').next().unwrap_or(path);
            let route = self
                .routes
                .lock()
                .ok()
                .and_then(|routes| routes.get(key).cloned());
            Ok(route.unwrap_or_else(|| {
                RestResponse::json(
                    404,
                    &serde_json::json!({
                        "error": {"code": "NotFound", "message": format!("no route for {}", key)}
                    }),
                )
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeRest;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_surfaces_backend_error() {
        let rest = FakeRest::new().status(
            "/subscriptions/s1",
            403,
            json!({"error": {"code": "AuthorizationFailed", "message": "denied"}}),
        );
        let client = ArmClient::new(rest);

        let err = client.get("/subscriptions/s1?api-version=2022-12-01").await.unwrap_err();
        match err.downcast_ref::<ArmError>() {
            Some(ArmError::Request { status, code, message }) => {
                assert_eq!(*status, 403);
                assert_eq!(code, "AuthorizationFailed");
                assert_eq!(message, "denied");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_rejects_non_json_content() {
        let rest = FakeRest::new().raw(
            "/subscriptions/s1",
            RestResponse {
                status: 200,
                content_type: Some("text/html".to_string()),
                body: "<html></html>".to_string(),
            },
        );
        let client = ArmClient::new(rest);

        let err = client.get("/subscriptions/s1").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArmError>(),
            Some(ArmError::UnsupportedContentType { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_follows_next_link() {
        let rest = FakeRest::new()
            .ok(
                "/subscriptions/s1/resourceGroups",
                json!({"value": [{"id": "a"}], "nextLink": "/page2"}),
            )
            .ok("/page2", json!({"value": [{"id": "b"}, {"id": "c"}]}));
        let client = ArmClient::new(rest);

        let items = client.list("/subscriptions/s1/resourceGroups").await.unwrap();
        let ids: Vec<_> = items.iter().filter_map(|i| i["id"].as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(client.rest().call_count(), 2);
    }

    #[tokio::test]
    async fn test_list_stops_on_repeated_next_link() {
        let rest = FakeRest::new()
            .ok(
                "/subscriptions/s1/resourceGroups",
                json!({"value": [{"id": "a"}], "nextLink": "/page2"}),
            )
            .ok("/page2", json!({"value": [{"id": "b"}], "nextLink": "/page2"}));
        let client = ArmClient::new(rest);

        let err = client.list("/subscriptions/s1/resourceGroups").await.unwrap_err();
        assert!(err.to_string().contains("/page2"));
        assert_eq!(client.rest().call_count(), 2);
    }

    #[test]
    fn test_extract_backend_error_without_envelope() {
        let (code, message) = extract_backend_error("gateway timeout");
        assert_eq!(code, "Unknown");
        assert_eq!(message, "gateway timeout");
    }
}
