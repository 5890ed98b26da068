//! Server module for the JSON-RPC surface.
//!
//! This module provides:
//! - A line-delimited JSON-RPC 2.0 server over stdio
//! - Method routing and parameter handling
//! - Shared application state wiring the ports into the workflows

mod handlers;
mod rpc;

pub use handlers::*;
pub use rpc::*;

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::completion::{CompletionPort, LlamaCppClient};
use crate::config::Config;
use crate::error::{AppResult, WorkflowResult};
use crate::retrieval::{HttpRetrievalClient, RetrievalPort};
use crate::store::{ConversationStore, InMemoryConversationStore};
use crate::tutoring::TutorService;
use crate::workflow::{ComparisonResult, CorrectionLoop};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Self-correcting retrieval workflow.
    pub correction_loop: CorrectionLoop,
    /// Phase-aware tutoring workflow.
    pub tutor: TutorService,
}

impl AppState {
    /// Wire the workflows to the given ports and store.
    pub fn new(
        config: Config,
        completion: Arc<dyn CompletionPort>,
        retrieval: Arc<dyn RetrievalPort>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let correction_loop = CorrectionLoop::new(
            completion.clone(),
            retrieval,
            config.workflow.clone(),
            config.retrieval.top_k,
        );
        let tutor = TutorService::new(completion, store, &config.workflow);

        Self {
            config,
            correction_loop,
            tutor,
        }
    }

    /// Build the production wiring: llama.cpp completions, HTTP retrieval and
    /// an in-memory conversation store.
    pub fn from_config(config: Config) -> AppResult<Self> {
        info!(
            llm_base_url = %config.llm.base_url,
            model = %config.llm.model_name,
            retrieval_base_url = %config.retrieval.base_url,
            collection = %config.retrieval.collection,
            "AppState initializing"
        );

        let completion = LlamaCppClient::new(&config.llm, config.request.clone())?;
        let retrieval = HttpRetrievalClient::new(&config.retrieval, &config.request)?;

        Ok(Self::new(
            config,
            Arc::new(completion),
            Arc::new(retrieval),
            Arc::new(InMemoryConversationStore::new()),
        ))
    }

    /// Answer `question` with single-pass retrieval and with the correction
    /// loop, side by side.
    pub async fn compare(&self, question: &str) -> WorkflowResult<ComparisonResult> {
        let start = Instant::now();
        let simple = self.correction_loop.simple_query(question).await?;
        let agentic = self.correction_loop.query(question, None).await?;

        info!(
            agentic_path = %agentic.workflow_path,
            rewrites_used = agentic.rewrites_used,
            latency_ms = start.elapsed().as_millis(),
            "Comparison completed"
        );

        Ok(ComparisonResult {
            question: question.to_string(),
            simple_answer: simple.answer,
            simple_num_sources: simple.num_sources,
            agentic_answer: agentic.answer,
            agentic_num_sources: agentic.num_sources,
            agentic_workflow_path: agentic.workflow_path,
            agentic_rewrites_used: agentic.rewrites_used,
        })
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
