//! Retrieval port: ranked document lookup.
//!
//! [`HttpRetrievalClient`] talks to the course-material vector store over HTTP.

mod client;

pub use client::HttpRetrievalClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RetrievalResult;

/// A retrieved text span with its relevance score and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub text: String,
    /// Relevance in `[0, 1]`.
    pub score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RetrievedDocument {
    /// Create a document, clamping the score into `[0, 1]`.
    pub fn new(text: impl Into<String>, score: f64) -> Self {
        Self {
            text: text.into(),
            score: clamp_score(score),
            metadata: Map::new(),
        }
    }

    /// Attach a metadata field
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub(crate) fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Document lookup capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RetrievalPort: Send + Sync {
    /// Return up to `top_k` documents ranked by relevance to `text`.
    async fn query(&self, text: &str, top_k: usize) -> RetrievalResult<Vec<RetrievedDocument>>;
}
