use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use shelf_storage::TransportError;
use thiserror::Error;

use crate::property::{PropertyType, PropertyValue, Schema};

/// Property name to typed value.
pub type Properties = BTreeMap<String, PropertyValue>;

/// One remote record as returned by the API.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePage {
    pub id: String,
    pub properties: Properties,
}

impl RemotePage {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Decodes `{"id": ..., "properties": {...}}`; undecodable properties are
    /// dropped.
    pub fn from_json(body: &Value) -> Option<Self> {
        let id = body.get("id").and_then(Value::as_str)?;
        let properties = body
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .filter_map(|(name, value)| {
                        PropertyValue::decode(value).map(|v| (name.clone(), v))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            id: shelf_core::normalize_record_id(id),
            properties,
        })
    }
}

/// Exact-match filter on one property.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    pub property: String,
    pub ptype: PropertyType,
    pub equals: String,
}

impl QueryFilter {
    pub fn encode(&self) -> Value {
        let mut filter = serde_json::Map::new();
        filter.insert("property".into(), json!(self.property));
        filter.insert(self.ptype.tag().into(), json!({ "equals": self.equals }));
        Value::Object(filter)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub records: Vec<RemotePage>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// Result of a remote update. Anything other than success or a confirmed
/// missing record is `Error`, and is never retried within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    Ok,
    NotFound,
    Error(String),
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected remote response: {0}")]
    Decode(String),
}

/// Typed record database the engine synchronizes against.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn schema(&self) -> Result<Schema, RemoteError>;

    async fn query(
        &self,
        filter: Option<&QueryFilter>,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<QueryPage, RemoteError>;

    async fn get_record(&self, id: &str) -> Result<Option<RemotePage>, RemoteError>;

    async fn create_record(&self, properties: &Properties) -> Result<String, RemoteError>;

    async fn update_record(&self, id: &str, properties: &Properties) -> UpdateStatus;
}

pub fn encode_properties(properties: &Properties) -> Value {
    Value::Object(
        properties
            .iter()
            .map(|(name, value)| (name.clone(), value.encode()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_uses_type_tag_as_key() {
        let filter = QueryFilter {
            property: "GitHub".into(),
            ptype: PropertyType::Url,
            equals: "https://github.com/a/b".into(),
        };
        assert_eq!(
            filter.encode(),
            json!({"property": "GitHub", "url": {"equals": "https://github.com/a/b"}})
        );
    }

    #[test]
    fn pages_decode_with_normalized_ids() {
        let page = RemotePage::from_json(&json!({
            "id": "0F1E2D3C4B5A69788796A5B4C3D2E1F0",
            "properties": {
                "Name": {"type": "title", "title": [{"plain_text": "fd"}]},
                "Rollup": {"type": "rollup", "rollup": {}}
            }
        }))
        .expect("page");
        assert_eq!(page.id, "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0");
        assert_eq!(page.properties.len(), 1);
        assert_eq!(page.property("Name").map(|v| v.as_text()), Some("fd".into()));
    }
}
