use std::future::Future;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Result, ViewerError};
use crate::graph::{GraphPayload, LinkKind, Node, NodeKind};

pub const DEFAULT_PRUNE_DEPTH: u32 = 3;
pub const DEFAULT_PATH_MAX_LENGTH: u32 = 5;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SubgraphOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relationship_types: Vec<LinkKind>,
    pub include_errors: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub node_types: Vec<NodeKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Svg,
    Png,
    Json,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportArtifact {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Contract with the analysis service. Results carrying an `error` field come back as
/// [`ViewerError::Backend`].
pub trait GraphService: Send + Sync + 'static {
    fn fetch_graph(&self) -> impl Future<Output = Result<GraphPayload>> + Send;

    fn fetch_graph_stats(&self) -> impl Future<Output = Result<Value>> + Send;

    /// Returns the backend's `success` flag.
    fn clear_graph(&self) -> impl Future<Output = Result<bool>> + Send;

    fn prune_tree(
        &self,
        node_id: &str,
        depth: u32,
    ) -> impl Future<Output = Result<GraphPayload>> + Send;

    fn fetch_subgraph(
        &self,
        node_id: &str,
        options: &SubgraphOptions,
    ) -> impl Future<Output = Result<GraphPayload>> + Send;

    fn find_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_length: u32,
    ) -> impl Future<Output = Result<Vec<Vec<String>>>> + Send;

    fn search_nodes(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> impl Future<Output = Result<Vec<Node>>> + Send;

    fn fetch_node_details(&self, node_id: &str) -> impl Future<Output = Result<Value>> + Send;

    fn export_graph(
        &self,
        format: ExportFormat,
    ) -> impl Future<Output = Result<ExportArtifact>> + Send;
}

#[derive(Clone)]
pub struct HttpGraphService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGraphService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "backend request");
        self.http.request(method, url)
    }

    async fn json(&self, builder: RequestBuilder) -> Result<Value> {
        let response = builder.send().await?;
        read_json(response).await
    }
}

async fn read_json(response: Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await?;
    let value = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));

    if !status.is_success() {
        let message = error_message(&value).unwrap_or_else(|| status.to_string());
        return Err(ViewerError::Backend(message));
    }
    check_error(value)
}

/// Extracts `error` (or FastAPI's `detail`) from an error body.
fn error_message(value: &Value) -> Option<String> {
    let field = value.get("error").or_else(|| value.get("detail"))?;
    match field {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

/// Turns a successful-status body that still carries an `error` field into an error.
pub(crate) fn check_error(value: Value) -> Result<Value> {
    match value.get("error") {
        None | Some(Value::Null) => Ok(value),
        Some(_) => Err(ViewerError::Backend(
            error_message(&value).unwrap_or_default(),
        )),
    }
}

/// Accepts either a bare array or an object wrapping it under `key`.
fn unwrap_list(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut object) => object.remove(key).unwrap_or(Value::Array(Vec::new())),
        other => other,
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|error| ViewerError::Protocol(error.to_string()))
}

impl GraphService for HttpGraphService {
    async fn fetch_graph(&self) -> Result<GraphPayload> {
        let value = self.json(self.request(Method::GET, "/api/graph")).await?;
        decode(value)
    }

    async fn fetch_graph_stats(&self) -> Result<Value> {
        self.json(self.request(Method::GET, "/api/graph/stats")).await
    }

    async fn clear_graph(&self) -> Result<bool> {
        let value = self
            .json(self.request(Method::DELETE, "/api/graph/clear"))
            .await?;
        Ok(value.get("success").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn prune_tree(&self, node_id: &str, depth: u32) -> Result<GraphPayload> {
        let body = json!({ "node_id": node_id, "depth": depth });
        let value = self
            .json(self.request(Method::POST, "/api/graph/prune").json(&body))
            .await?;
        decode(value)
    }

    async fn fetch_subgraph(&self, node_id: &str, options: &SubgraphOptions) -> Result<GraphPayload> {
        let body = json!({ "node_id": node_id, "options": options });
        let value = self
            .json(self.request(Method::POST, "/api/graph/subgraph").json(&body))
            .await?;
        decode(value)
    }

    async fn find_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_length: u32,
    ) -> Result<Vec<Vec<String>>> {
        let body = json!({
            "source_id": source_id,
            "target_id": target_id,
            "max_length": max_length,
        });
        let value = self
            .json(self.request(Method::POST, "/api/graph/paths").json(&body))
            .await?;
        decode(unwrap_list(value, "paths"))
    }

    async fn search_nodes(&self, query: &str, filters: &SearchFilters) -> Result<Vec<Node>> {
        let body = json!({ "query": query, "filters": filters });
        let value = self
            .json(self.request(Method::POST, "/api/graph/search").json(&body))
            .await?;
        decode(unwrap_list(value, "nodes"))
    }

    async fn fetch_node_details(&self, node_id: &str) -> Result<Value> {
        let path = format!("/api/graph/node/{node_id}");
        self.json(self.request(Method::GET, &path)).await
    }

    async fn export_graph(&self, format: ExportFormat) -> Result<ExportArtifact> {
        let response = self
            .request(Method::GET, "/api/graph/export")
            .query(&[("format", format.as_str())])
            .send()
            .await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        if !response.status().is_success()
            || content_type
                .as_deref()
                .is_some_and(|kind| kind.starts_with("application/json") && format != ExportFormat::Json)
        {
            read_json(response).await?;
            return Err(ViewerError::Backend(format!(
                "export returned no {} artifact",
                format.as_str()
            )));
        }

        let bytes = response.bytes().await?.to_vec();
        Ok(ExportArtifact {
            content_type,
            bytes,
        })
    }
}
