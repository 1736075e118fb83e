//! Resolved resource nodes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload fields copied onto the node itself; everything else lands in
/// `extended_properties`
pub const DEFAULT_FIELDS: &[&str] = &["id", "type", "name", "properties"];

/// Summary of a child or descendant as reported by a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildSummary {
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub properties: Value,
}

impl From<&Value> for ChildSummary {
    fn from(value: &Value) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            name: text("name"),
            id: text("id"),
            resource_type: text("type"),
            properties: value.get("properties").cloned().unwrap_or(Value::Null),
        }
    }
}

impl ChildSummary {
    /// `properties.parent.id`, as reported in management-group descendant listings
    pub fn declared_parent(&self) -> Option<&str> {
        self.properties
            .get("parent")
            .and_then(|p| p.get("id"))
            .and_then(|v| v.as_str())
    }
}

/// A fully resolved node. Relationships are ids, looked up through the
/// node cache.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub properties: Value,
    pub extended_properties: Map<String, Value>,
    pub provider: String,
    pub children: Vec<ChildSummary>,
    pub linked_resources: Vec<ChildSummary>,
    pub parent: String,
    /// Root-most first
    pub parents: Vec<String>,
    pub parent_path: String,
    pub resource_path: String,
}

impl ResourceNode {
    /// Default fields of a payload. `name_field` selects where the name is
    /// read from (`displayName` for subscriptions).
    pub fn from_payload(payload: &Value, name_field: &str, fallback_type: &str) -> Self {
        let text = |key: &str| payload.get(key).and_then(|v| v.as_str()).map(str::to_string);

        let extended_properties = payload
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter(|(k, _)| !DEFAULT_FIELDS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: text("id").unwrap_or_default(),
            resource_type: text("type")
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| fallback_type.to_string()),
            name: text(name_field).or_else(|| text("name")).unwrap_or_default(),
            properties: payload.get("properties").cloned().unwrap_or(Value::Null),
            extended_properties,
            ..Default::default()
        }
    }

    pub fn has_child(&self, id: &str) -> bool {
        self.children.iter().any(|c| c.id.eq_ignore_ascii_case(id))
    }

    pub fn has_linked(&self, id: &str) -> bool {
        self.linked_resources
            .iter()
            .any(|c| c.id.eq_ignore_ascii_case(id))
    }

    /// `properties.displayName`, falling back to the name
    pub fn display_name(&self) -> &str {
        self.properties
            .get("displayName")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.name)
    }
}

/// Value at a key path, as a string
pub fn value_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |current, key| current.get(*key))
        .and_then(|v| v.as_str())
}
