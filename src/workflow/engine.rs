use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::state::{CorrectionState, QueryResult, RelevanceDecision, WorkflowNode};
use crate::completion::{CompletionPort, CompletionRequest};
use crate::config::WorkflowConfig;
use crate::error::{WorkflowError, WorkflowResult};
use crate::prompts;
use crate::retrieval::RetrievalPort;
use crate::stream::{EventEmitter, EventStream, MetadataEvent, NodeStatus};

/// Self-correcting retrieval-augmented generation.
///
/// `retrieve → grade → (generate | rewrite → retrieve → …)`. Every port
/// failure degrades to a safe default inside the node that saw it, so a run
/// always ends in `generate`.
#[derive(Clone)]
pub struct CorrectionLoop {
    completion: Arc<dyn CompletionPort>,
    retrieval: Arc<dyn RetrievalPort>,
    config: WorkflowConfig,
    top_k: usize,
}

/// Decide where to go after grading.
///
/// Irrelevant documents lead to a rewrite until `max_retries` rewrites have
/// been attempted. Failed rewrites count as attempts here so that a dead
/// completion server cannot keep the loop alive.
pub fn route_after_grade(state: &CorrectionState) -> WorkflowNode {
    if state.relevance_decision != Some(RelevanceDecision::Irrelevant) {
        return WorkflowNode::Generate;
    }
    if state.retry_count >= state.max_retries || state.rewrite_attempts() >= state.max_retries {
        return WorkflowNode::Generate;
    }
    WorkflowNode::Rewrite
}

impl CorrectionLoop {
    pub fn new(
        completion: Arc<dyn CompletionPort>,
        retrieval: Arc<dyn RetrievalPort>,
        config: WorkflowConfig,
        top_k: usize,
    ) -> Self {
        Self {
            completion,
            retrieval,
            config,
            top_k,
        }
    }

    /// Rewrite bound used when the caller does not pass one.
    pub fn default_max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Run the full loop and return the assembled result.
    pub async fn query(&self, question: &str, max_retries: Option<u32>) -> WorkflowResult<QueryResult> {
        let start = Instant::now();
        let state = self.prepare(question, max_retries)?;
        let span = info_span!("correction_loop", run_id = %state.run_id);

        let state = self.run(state, None).instrument(span).await?;

        info!(
            workflow_path = %state.path_string(),
            rewrites_used = state.retry_count,
            max_retries = state.max_retries,
            latency_ms = start.elapsed().as_millis(),
            "Correction loop completed"
        );

        Ok(state.into_result(self.config.source_preview_chars))
    }

    /// Run the loop in the background, streaming its progress.
    ///
    /// Validation failures produce a single `error` event.
    pub fn query_stream(&self, question: impl Into<String>, max_retries: Option<u32>) -> EventStream {
        let (emitter, stream) = EventEmitter::channel(self.config.stream_buffer);
        let engine = self.clone();
        let question = question.into();

        tokio::spawn(async move {
            if let Err(e) = engine.drive_stream(&question, max_retries, emitter).await {
                debug!(error = %e, "Streaming query stopped early");
            }
        });

        stream
    }

    /// Single-pass retrieval and generation, without grading or rewriting.
    pub async fn simple_query(&self, question: &str) -> WorkflowResult<QueryResult> {
        let mut state = self.prepare(question, Some(0))?;
        let span = info_span!("simple_rag", run_id = %state.run_id);

        async {
            self.retrieve(&mut state).await;
            self.generate(&mut state, None).await
        }
        .instrument(span)
        .await?;

        Ok(state.into_result(self.config.source_preview_chars))
    }

    fn prepare(&self, question: &str, max_retries: Option<u32>) -> WorkflowResult<CorrectionState> {
        if question.trim().is_empty() {
            return Err(WorkflowError::validation("question", "Question cannot be empty"));
        }
        Ok(CorrectionState::new(
            question,
            max_retries.unwrap_or(self.config.max_retries),
        ))
    }

    async fn drive_stream(
        &self,
        question: &str,
        max_retries: Option<u32>,
        emitter: EventEmitter,
    ) -> WorkflowResult<()> {
        let state = match self.prepare(question, max_retries) {
            Ok(state) => state,
            Err(e) => return emitter.error(e.to_string()).await,
        };
        let span = info_span!("correction_loop", run_id = %state.run_id, streaming = true);

        let state = self.run(state, Some(&emitter)).instrument(span).await?;
        emitter
            .complete(state.into_result(self.config.source_preview_chars))
            .await
    }

    /// Drive the graph to completion.
    ///
    /// The only error is [`WorkflowError::Cancelled`], raised when a
    /// streaming consumer goes away.
    pub async fn run(
        &self,
        mut state: CorrectionState,
        emitter: Option<&EventEmitter>,
    ) -> WorkflowResult<CorrectionState> {
        let mut node = WorkflowNode::Retrieve;

        loop {
            if let Some(emitter) = emitter {
                emitter.workflow(node.as_str(), NodeStatus::Start).await?;
            }

            let next = match node {
                WorkflowNode::Retrieve => {
                    self.retrieve(&mut state).await;
                    notify(
                        emitter,
                        MetadataEvent::RetrievalComplete {
                            num_documents: state.documents().len(),
                        },
                    )
                    .await?;
                    Some(WorkflowNode::Grade)
                }
                WorkflowNode::Grade => {
                    self.grade(&mut state).await;
                    if let Some(decision) = state.relevance_decision {
                        notify(
                            emitter,
                            MetadataEvent::GradingComplete {
                                decision: decision.as_str().to_string(),
                            },
                        )
                        .await?;
                    }
                    Some(route_after_grade(&state))
                }
                WorkflowNode::Rewrite => {
                    if let Some(rewritten) = self.rewrite(&mut state).await {
                        notify(
                            emitter,
                            MetadataEvent::QueryRewritten {
                                original: state.question().to_string(),
                                rewritten,
                            },
                        )
                        .await?;
                    }
                    Some(WorkflowNode::Retrieve)
                }
                WorkflowNode::Generate => {
                    self.generate(&mut state, emitter).await?;
                    None
                }
            };

            if let Some(emitter) = emitter {
                emitter.workflow(node.as_str(), NodeStatus::End).await?;
            }

            match next {
                Some(n) => {
                    debug!(from = %node, to = %n, "Transition");
                    node = n;
                }
                None => return Ok(state),
            }
        }
    }

    async fn retrieve(&self, state: &mut CorrectionState) {
        state.workflow_path.push(WorkflowNode::Retrieve);
        let query = state.active_question().to_string();

        match self.retrieval.query(&query, self.top_k).await {
            Ok(documents) => {
                info!(num_documents = documents.len(), "Retrieved documents");
                state.set_documents(documents);
            }
            Err(e) => {
                error!(error = %e, "Retrieval failed, continuing with no documents");
                state.set_documents(Vec::new());
            }
        }
    }

    async fn grade(&self, state: &mut CorrectionState) {
        state.workflow_path.push(WorkflowNode::Grade);

        if state.documents().is_empty() {
            warn!("No documents to grade");
            state.relevance_decision = Some(RelevanceDecision::Irrelevant);
            return;
        }

        let prompt = prompts::grading_prompt(
            state.active_question(),
            &state.document_texts(),
            self.config.grade_preview_chars,
        );

        let decision = match self.completion.complete(CompletionRequest::new(prompt)).await {
            Ok(verdict) if verdict.to_lowercase().contains("yes") => RelevanceDecision::Relevant,
            Ok(_) => RelevanceDecision::Irrelevant,
            Err(e) => {
                error!(error = %e, "Grading failed, treating documents as relevant");
                RelevanceDecision::Relevant
            }
        };

        info!(decision = decision.as_str(), "Graded documents");
        state.relevance_decision = Some(decision);
    }

    /// Returns the new question when the rewrite succeeded.
    async fn rewrite(&self, state: &mut CorrectionState) -> Option<String> {
        state.workflow_path.push(WorkflowNode::Rewrite);
        info!(
            attempt = state.retry_count + 1,
            max_retries = state.max_retries,
            "Rewriting query"
        );

        let prompt = prompts::rewrite_prompt(state.question());

        match self.completion.complete(CompletionRequest::new(prompt)).await {
            Ok(text) => {
                let rewritten = text.trim().to_string();
                debug!(rewritten = %rewritten, "Query rewritten");
                state.record_rewrite(rewritten.clone());
                Some(rewritten)
            }
            Err(e) => {
                error!(error = %e, "Rewrite failed, keeping current question");
                None
            }
        }
    }

    async fn generate(
        &self,
        state: &mut CorrectionState,
        emitter: Option<&EventEmitter>,
    ) -> WorkflowResult<()> {
        state.workflow_path.push(WorkflowNode::Generate);

        let prompt = prompts::generation_prompt(state.active_question(), &state.document_texts());
        state.last_prompt = prompt.clone();
        let request = CompletionRequest::new(prompt);

        let outcome = match emitter {
            Some(emitter) => self.generate_streaming(request, emitter).await?,
            None => self
                .completion
                .complete(request)
                .await
                .map_err(|e| e.to_string()),
        };

        match outcome {
            Ok(text) => {
                state.generation = text.trim().to_string();
                info!(chars = state.generation.len(), "Generated answer");
            }
            Err(reason) => {
                error!(error = %reason, "Generation failed");
                state.generation = prompts::generation_apology(&reason);
                notify(emitter, MetadataEvent::GenerationFailed { reason }).await?;
            }
        }

        Ok(())
    }

    /// Forward fragments as `token` events. The outer error is only
    /// cancellation; the inner one is the completion failure reason.
    async fn generate_streaming(
        &self,
        request: CompletionRequest,
        emitter: &EventEmitter,
    ) -> WorkflowResult<Result<String, String>> {
        let mut fragments = match self.completion.complete_stream(request).await {
            Ok(stream) => stream,
            Err(e) => return Ok(Err(e.to_string())),
        };

        let mut text = String::new();
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(fragment) => {
                    emitter.token(fragment.as_str()).await?;
                    text.push_str(&fragment);
                }
                Err(e) => return Ok(Err(e.to_string())),
            }
        }

        Ok(Ok(text))
    }
}

async fn notify(emitter: Option<&EventEmitter>, event: MetadataEvent) -> WorkflowResult<()> {
    match emitter {
        Some(emitter) => emitter.metadata(event).await,
        None => Ok(()),
    }
}
