//! Pinecone REST client
//!
//! Control-plane calls go to the global API host, data-plane calls go to the
//! index host copied from the Pinecone console.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PineconeSettings;
use crate::error::{CodeBlueError, Result};
use crate::index::{IndexDescription, IndexEntry, IndexHandle, IndexMatch, IndexService};

const API_VERSION: &str = "2024-07";
const SERVICE: &str = "pinecone";

#[derive(Serialize)]
struct UpsertRequest<'a> {
  vectors: &'a [IndexEntry],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
  #[serde(default)]
  upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
  vector: &'a [f32],
  top_k: usize,
  include_metadata: bool,
  include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
  #[serde(default)]
  matches: Vec<IndexMatch>,
}

#[derive(Deserialize)]
struct ListIndexesResponse {
  #[serde(default)]
  indexes: Vec<IndexDescription>,
}

fn auth_headers(api_key: &str) -> Result<HeaderMap> {
  let key = HeaderValue::from_str(api_key)
    .map_err(|_| CodeBlueError::configuration("Pinecone API key contains invalid characters"))?;

  let mut headers = HeaderMap::new();
  headers.insert("Api-Key", key);
  headers.insert("X-Pinecone-API-Version", HeaderValue::from_static(API_VERSION));
  Ok(headers)
}

async fn send(request: RequestBuilder, action: &str) -> Result<Response> {
  let response = request
    .send()
    .await
    .map_err(|e| CodeBlueError::service(SERVICE, format!("{action}: {e}")))?;

  if !response.status().is_success() {
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();
    return Err(CodeBlueError::service(SERVICE, format!("{action}: HTTP {status}: {error_text}")));
  }
  Ok(response)
}

fn normalize_host(host: &str) -> String {
  let host = host.trim().trim_end_matches('/');
  if host.starts_with("http://") || host.starts_with("https://") {
    host.to_string()
  } else {
    format!("https://{host}")
  }
}

/// Pinecone control plane
pub struct PineconeService {
  client: Client,
  control_url: String,
  api_key: String,
}

impl PineconeService {
  pub fn new(client: Client, settings: &PineconeSettings) -> Self {
    Self {
      client,
      control_url: settings.control_url.as_str().trim_end_matches('/').to_string(),
      api_key: settings.api_key.clone(),
    }
  }
}

#[async_trait]
impl IndexService for PineconeService {
  async fn authenticate(&self) -> Result<()> {
    if self.api_key.trim().is_empty() {
      return Err(CodeBlueError::configuration("Pinecone API key is empty"));
    }
    auth_headers(&self.api_key).map(|_| ())
  }

  async fn list_indexes(&self) -> Result<Vec<IndexDescription>> {
    let url = format!("{}/indexes", self.control_url);
    let request = self.client.get(&url).headers(auth_headers(&self.api_key)?);
    let response = send(request, "list indexes").await?;

    let body: ListIndexesResponse = response
      .json()
      .await
      .map_err(|e| CodeBlueError::service(SERVICE, format!("invalid index list: {e}")))?;
    Ok(body.indexes)
  }

  async fn open_index(&self, name: &str, host: &str) -> Result<Arc<dyn IndexHandle>> {
    let host = normalize_host(host);
    debug!("Opening index {name} at {host}");
    Ok(Arc::new(PineconeIndex {
      client: self.client.clone(),
      host,
      headers: auth_headers(&self.api_key)?,
    }))
  }
}

/// Pinecone data plane for one index
pub struct PineconeIndex {
  client: Client,
  host: String,
  headers: HeaderMap,
}

#[async_trait]
impl IndexHandle for PineconeIndex {
  async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize> {
    let url = format!("{}/vectors/upsert", self.host);
    let request = self
      .client
      .post(&url)
      .headers(self.headers.clone())
      .json(&UpsertRequest { vectors: entries });
    let response = send(request, "upsert").await?;

    let body: UpsertResponse = response
      .json()
      .await
      .map_err(|e| CodeBlueError::service(SERVICE, format!("invalid upsert response: {e}")))?;
    Ok(body.upserted_count)
  }

  async fn query(
    &self,
    vector: &[f32],
    top_k: usize,
    include_metadata: bool,
  ) -> Result<Vec<IndexMatch>> {
    let url = format!("{}/query", self.host);
    let request = self.client.post(&url).headers(self.headers.clone()).json(&QueryRequest {
      vector,
      top_k,
      include_metadata,
      include_values: false,
    });
    let response = send(request, "query").await?;

    let body: QueryResponse = response
      .json()
      .await
      .map_err(|e| CodeBlueError::service(SERVICE, format!("invalid query response: {e}")))?;
    Ok(body.matches)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dataset::{FieldValue, Record};
  use mockito::{Matcher, Server};
  use url::Url;

  fn settings(control_url: &str) -> PineconeSettings {
    PineconeSettings {
      api_key: "pc-test".to_string(),
      control_url: Url::parse(control_url).unwrap(),
      index_name: "icu-records".to_string(),
      host: Url::parse(control_url).unwrap(),
    }
  }

  #[test]
  fn test_host_without_scheme_defaults_to_https() {
    assert_eq!(normalize_host("icu-abc.svc.pinecone.io/"), "https://icu-abc.svc.pinecone.io");
    assert_eq!(normalize_host("http://localhost:5080"), "http://localhost:5080");
  }

  #[tokio::test]
  async fn test_list_indexes_sends_api_key() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("GET", "/indexes")
      .match_header("api-key", "pc-test")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(
        r#"{"indexes":[{"name":"icu-records","dimension":1536,"metric":"cosine","host":"icu-records-abc.svc.pinecone.io"}]}"#,
      )
      .create_async()
      .await;

    let service = PineconeService::new(Client::new(), &settings(&server.url()));
    let indexes = service.list_indexes().await.unwrap();

    mock.assert_async().await;
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name, "icu-records");
    assert_eq!(indexes[0].dimension, Some(1536));
  }

  #[tokio::test]
  async fn test_upsert_wire_format() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("POST", "/vectors/upsert")
      .match_body(Matcher::Json(serde_json::json!({
        "vectors": [{ "id": "icustays_0", "values": [0.5, 0.25], "metadata": { "pid": 1.0 } }]
      })))
      .with_status(200)
      .with_body(r#"{"upsertedCount":1}"#)
      .create_async()
      .await;

    let service = PineconeService::new(Client::new(), &settings(&server.url()));
    let index = service.open_index("icu-records", &server.url()).await.unwrap();
    let entry = IndexEntry {
      id: "icustays_0".to_string(),
      values: vec![0.5, 0.25],
      metadata: Record::new().with("pid", FieldValue::Number(1.0)),
    };

    assert_eq!(index.upsert(&[entry]).await.unwrap(), 1);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_query_returns_matches_in_service_order() {
    let mut server = Server::new_async().await;
    let _mock = server
      .mock("POST", "/query")
      .match_body(Matcher::PartialJson(serde_json::json!({"topK": 2, "includeMetadata": true})))
      .with_status(200)
      .with_body(
        r#"{"matches":[
          {"id":"rec_7","score":0.91,"metadata":{"pid":7}},
          {"id":"rec_2","score":0.84,"metadata":{"pid":2}}
        ],"namespace":""}"#,
      )
      .create_async()
      .await;

    let service = PineconeService::new(Client::new(), &settings(&server.url()));
    let index = service.open_index("icu-records", &server.url()).await.unwrap();
    let matches = index.query(&[0.0, 1.0], 2, true).await.unwrap();

    let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["rec_7", "rec_2"]);
    assert_eq!(
      matches[0].metadata.as_ref().and_then(|m| m.get("pid")),
      Some(&FieldValue::Number(7.0))
    );
  }

  #[tokio::test]
  async fn test_unauthorized_is_a_service_error() {
    let mut server = Server::new_async().await;
    let _mock = server.mock("GET", "/indexes").with_status(401).create_async().await;

    let service = PineconeService::new(Client::new(), &settings(&server.url()));
    let err = service.list_indexes().await.unwrap_err();
    assert!(err.is_transient());
    assert!(err.to_string().contains("401"));
  }
}
