use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{clamp_score, RetrievalPort, RetrievedDocument};
use crate::config::{RequestConfig, RetrievalConfig};
use crate::error::{RetrievalError, RetrievalResult};

/// HTTP client for the document store's `/query` endpoint
#[derive(Clone)]
pub struct HttpRetrievalClient {
    client: Client,
    base_url: String,
    collection: String,
    timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    collection: &'a str,
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<RawResult>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    text: String,
    score: Option<f64>,
    metadata: Option<Map<String, Value>>,
}

impl From<RawResult> for RetrievedDocument {
    fn from(raw: RawResult) -> Self {
        Self {
            text: raw.text,
            score: clamp_score(raw.score.unwrap_or(0.0)),
            metadata: raw.metadata.unwrap_or_default(),
        }
    }
}

impl HttpRetrievalClient {
    /// Create a new retrieval client
    pub fn new(config: &RetrievalConfig, request_config: &RequestConfig) -> RetrievalResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(|e| RetrievalError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            timeout_ms: request_config.timeout_ms,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RetrievalPort for HttpRetrievalClient {
    async fn query(&self, text: &str, top_k: usize) -> RetrievalResult<Vec<RetrievedDocument>> {
        let start = Instant::now();
        let body = QueryBody {
            collection: &self.collection,
            query: text,
            top_k,
        };

        debug!(collection = %self.collection, top_k, "Querying document store");

        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    RetrievalError::Connection {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let parsed: QueryResponse =
            response
                .json()
                .await
                .map_err(|e| RetrievalError::InvalidResponse {
                    message: e.to_string(),
                })?;

        let documents: Vec<RetrievedDocument> =
            parsed.results.into_iter().map(Into::into).collect();

        info!(
            num_documents = documents.len(),
            latency_ms = start.elapsed().as_millis(),
            "Retrieval completed"
        );

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_result_defaults() {
        let raw: RawResult = serde_json::from_str(r#"{"text":"t"}"#).unwrap();
        let doc: RetrievedDocument = raw.into();
        assert_eq!(doc.score, 0.0);
        assert!(doc.metadata.is_empty());
    }

    #[test]
    fn test_raw_result_clamps_score() {
        let raw: RawResult =
            serde_json::from_str(r#"{"text":"t","score":3.5,"metadata":{"page":2}}"#).unwrap();
        let doc: RetrievedDocument = raw.into();
        assert_eq!(doc.score, 1.0);
        assert_eq!(doc.metadata["page"], 2);
    }

    #[test]
    fn test_query_body_shape() {
        let body = QueryBody {
            collection: "course_materials",
            query: "bst",
            top_k: 3,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["collection"], "course_materials");
        assert_eq!(json["query"], "bst");
        assert_eq!(json["top_k"], 3);
    }
}
