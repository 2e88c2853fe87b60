use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use shelf_storage::{HttpResponse, HttpTransport, TransportError};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::api::{
    encode_properties, Properties, QueryFilter, QueryPage, RemoteApi, RemoteError, RemotePage,
    UpdateStatus,
};
use crate::property::{parse_schema, Schema};

pub const NOTION_VERSION: &str = "2022-06-28";
pub const DEFAULT_API_BASE: &str = "https://api.notion.com";
pub const MAX_PAGE_SIZE: usize = 100;

/// HTTP implementation of [`RemoteApi`] against a Notion-style database.
#[derive(Debug)]
pub struct NotionClient {
    http: HttpTransport,
    token: String,
    database_id: String,
    base_url: String,
    schema: OnceCell<Schema>,
}

impl NotionClient {
    pub fn new(
        http: HttpTransport,
        token: impl Into<String>,
        database_id: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token: token.into(),
            database_id: database_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            schema: OnceCell::new(),
        }
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<HttpResponse, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        self.http
            .execute(method.as_str(), &url, |client| {
                let request = client
                    .request(method.clone(), &url)
                    .bearer_auth(&self.token)
                    .header("Notion-Version", NOTION_VERSION);
                match &body {
                    Some(body) => request.json(body),
                    None => request,
                }
            })
            .await
    }

    async fn fetch_schema(&self) -> Result<Schema, RemoteError> {
        let path = format!("/v1/databases/{}", self.database_id);
        let response = self.call(Method::GET, &path, None).await?;
        let body = success_json(response)?;
        let schema = parse_schema(&body);
        debug!(properties = schema.len(), "fetched remote schema");
        Ok(schema)
    }
}

fn status_error(response: &HttpResponse) -> RemoteError {
    let mut body = response.text();
    body.truncate(body.char_indices().nth(200).map(|(i, _)| i).unwrap_or(body.len()));
    RemoteError::Status {
        status: response.status,
        body,
    }
}

fn success_json(response: HttpResponse) -> Result<Value, RemoteError> {
    if !response.is_success() {
        return Err(status_error(&response));
    }
    response
        .json::<Value>()
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

#[async_trait]
impl RemoteApi for NotionClient {
    async fn schema(&self) -> Result<Schema, RemoteError> {
        self.schema
            .get_or_try_init(|| self.fetch_schema())
            .await
            .cloned()
    }

    async fn query(
        &self,
        filter: Option<&QueryFilter>,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<QueryPage, RemoteError> {
        let mut body = json!({ "page_size": page_size.clamp(1, MAX_PAGE_SIZE) });
        if let Some(cursor) = cursor {
            body["start_cursor"] = json!(cursor);
        }
        if let Some(filter) = filter {
            body["filter"] = filter.encode();
        }
        let path = format!("/v1/databases/{}/query", self.database_id);
        let response = self.call(Method::POST, &path, Some(body)).await?;
        let body = success_json(response)?;

        let results = body
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| RemoteError::Decode("query response without results".into()))?;
        Ok(QueryPage {
            records: results.iter().filter_map(RemotePage::from_json).collect(),
            has_more: body.get("has_more").and_then(Value::as_bool).unwrap_or(false),
            next_cursor: body
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn get_record(&self, id: &str) -> Result<Option<RemotePage>, RemoteError> {
        let response = self.call(Method::GET, &format!("/v1/pages/{id}"), None).await?;
        if response.status == 404 {
            return Ok(None);
        }
        let body = success_json(response)?;
        RemotePage::from_json(&body)
            .map(Some)
            .ok_or_else(|| RemoteError::Decode("page response without id".into()))
    }

    async fn create_record(&self, properties: &Properties) -> Result<String, RemoteError> {
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": encode_properties(properties),
        });
        let response = self.call(Method::POST, "/v1/pages", Some(body)).await?;
        let body = success_json(response)?;
        body.get("id")
            .and_then(Value::as_str)
            .map(shelf_core::normalize_record_id)
            .ok_or_else(|| RemoteError::Decode("create response without id".into()))
    }

    async fn update_record(&self, id: &str, properties: &Properties) -> UpdateStatus {
        let body = json!({ "properties": encode_properties(properties) });
        match self
            .call(Method::PATCH, &format!("/v1/pages/{id}"), Some(body))
            .await
        {
            Ok(response) if response.is_success() => UpdateStatus::Ok,
            Ok(response) if response.status == 404 => UpdateStatus::NotFound,
            Ok(response) => UpdateStatus::Error(status_error(&response).to_string()),
            Err(err) => UpdateStatus::Error(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{PropertyType, PropertyValue};
    use mockito::{Matcher, Server};
    use shelf_storage::HttpClientConfig;
    use std::time::Duration;

    const DB: &str = "0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0";

    fn client(server: &Server) -> NotionClient {
        let http = HttpTransport::new(HttpClientConfig {
            timeout: Duration::from_secs(5),
            user_agent: None,
            proxy: None,
            direct_fallback: false,
        })
        .expect("client");
        NotionClient::new(http, "secret", DB, server.url())
    }

    #[tokio::test]
    async fn schema_is_fetched_once() {
        let mut server = Server::new_async().await;
        let schema = server
            .mock("GET", format!("/v1/databases/{DB}").as_str())
            .match_header("authorization", "Bearer secret")
            .match_header("notion-version", NOTION_VERSION)
            .with_status(200)
            .with_body(
                r#"{"properties":{"Name":{"type":"title"},"GitHub":{"type":"url"},"People":{"type":"people"}}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let notion = client(&server);
        let first = notion.schema().await.expect("schema");
        let second = notion.schema().await.expect("cached");
        assert_eq!(first, second);
        assert_eq!(first.get("GitHub"), Some(&PropertyType::Url));
        assert!(!first.contains_key("People"));
        schema.assert_async().await;
    }

    #[tokio::test]
    async fn query_pages_through_cursor() {
        let mut server = Server::new_async().await;
        let page = server
            .mock("POST", format!("/v1/databases/{DB}/query").as_str())
            .match_body(Matcher::PartialJson(json!({ "page_size": 100, "start_cursor": "c1" })))
            .with_status(200)
            .with_body(
                r#"{"results":[{"id":"00112233445566778899aabbccddeeff","properties":{"GitHub":{"type":"url","url":"https://github.com/sharkdp/fd"}}}],"has_more":true,"next_cursor":"c2"}"#,
            )
            .create_async()
            .await;

        let notion = client(&server);
        let result = notion.query(None, 500, Some("c1")).await.expect("query");
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].id, "00112233-4455-6677-8899-aabbccddeeff");
        assert_eq!(
            result.records[0].property("GitHub"),
            Some(&PropertyValue::Url("https://github.com/sharkdp/fd".into()))
        );
        assert!(result.has_more);
        assert_eq!(result.next_cursor.as_deref(), Some("c2"));
        page.assert_async().await;
    }

    #[tokio::test]
    async fn update_statuses_map_to_outcomes() {
        let mut server = Server::new_async().await;
        server
            .mock("PATCH", "/v1/pages/gone")
            .with_status(404)
            .with_body(r#"{"object":"error","status":404}"#)
            .create_async()
            .await;
        server
            .mock("PATCH", "/v1/pages/flaky")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;
        server
            .mock("PATCH", "/v1/pages/fine")
            .with_status(200)
            .with_body(r#"{"id":"fine"}"#)
            .create_async()
            .await;

        let notion = client(&server);
        let props = Properties::new();
        assert_eq!(notion.update_record("gone", &props).await, UpdateStatus::NotFound);
        assert!(matches!(
            notion.update_record("flaky", &props).await,
            UpdateStatus::Error(message) if message.contains("502")
        ));
        assert_eq!(notion.update_record("fine", &props).await, UpdateStatus::Ok);
    }

    #[tokio::test]
    async fn create_sends_parent_and_returns_normalized_id() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/v1/pages")
            .match_body(Matcher::PartialJson(json!({ "parent": { "database_id": DB } })))
            .with_status(200)
            .with_body(r#"{"id":"FFEEDDCCBBAA99887766554433221100"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/v1/pages/missing")
            .with_status(404)
            .create_async()
            .await;

        let notion = client(&server);
        let mut props = Properties::new();
        props.insert("Name".into(), PropertyValue::Title("fd".into()));
        let id = notion.create_record(&props).await.expect("create");
        assert_eq!(id, "ffeeddcc-bbaa-9988-7766-554433221100");
        assert_eq!(notion.get_record("missing").await.expect("get"), None);
        create.assert_async().await;
    }
}
