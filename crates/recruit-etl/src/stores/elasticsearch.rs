//! Search sink backed by the Elasticsearch `_bulk` API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{IndexDocument, SearchIndex};
use crate::error::{EtlError, EtlResult};

/// Bulk-index client for one cluster
pub struct ElasticsearchIndex {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

impl ElasticsearchIndex {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> EtlResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EtlError::load_from("Failed to build search client", e))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn bulk_url(&self) -> String {
        format!("{}/_bulk", self.base_url)
    }
}

/// NDJSON body: an `index` action line followed by the source line, per document
fn bulk_body(index: &str, documents: &[IndexDocument]) -> EtlResult<String> {
    let mut body = String::new();
    for doc in documents {
        let action = json!({ "index": { "_index": index, "_id": doc.id } });
        body.push_str(&action.to_string());
        body.push('\n');
        let source = serde_json::to_string(&doc.body)
            .map_err(|e| EtlError::load_from("Failed to encode search document", e))?;
        body.push_str(&source);
        body.push('\n');
    }
    Ok(body)
}

/// First per-item failure reported by a bulk response
fn first_item_error(items: &[serde_json::Value]) -> Option<String> {
    items.iter().find_map(|item| {
        let result = item.as_object()?.values().next()?;
        let error = result.get("error")?;
        let id = result.get("_id").and_then(|v| v.as_str()).unwrap_or("?");
        let reason = error
            .get("reason")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        Some(format!("document {}: {}", id, reason))
    })
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn bulk_index(&self, index: &str, documents: Vec<IndexDocument>) -> EtlResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let body = bulk_body(index, &documents)?;
        let response = self
            .client
            .post(self.bulk_url())
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| EtlError::load_from("Bulk index request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EtlError::load(format!(
                "Bulk index rejected with status {}: {}",
                status, text
            )));
        }

        let parsed: BulkResponse = response
            .json()
            .await
            .map_err(|e| EtlError::load_from("Malformed bulk index response", e))?;

        if parsed.errors {
            let detail = first_item_error(&parsed.items).unwrap_or_else(|| "unknown item error".to_string());
            warn!(index, documents = documents.len(), %detail, "Bulk index reported item errors");
            return Err(EtlError::load(format!("Bulk index had item errors: {}", detail)));
        }

        debug!(index, documents = documents.len(), "Bulk indexed documents");
        Ok(documents.len())
    }
}
