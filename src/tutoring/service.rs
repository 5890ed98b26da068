use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{PhaseNodes, PhaseRouter, StateSnapshot, TutoringPhase};
use crate::completion::CompletionPort;
use crate::config::WorkflowConfig;
use crate::error::{AppError, AppResult, StoreError, WorkflowError};
use crate::prompts;
use crate::store::ConversationStore;
use crate::stream::{EventEmitter, EventStream, MetadataEvent, NodeStatus};

/// Responses shorter than this are logged as suspicious.
const MIN_RESPONSE_CHARS: usize = 20;

/// Fragments that usually mean the model rambled into a template.
const INCOMPLETE_RESPONSE_PATTERNS: &[&str] = &[
    "Remember, the goal is",
    "Good luck",
    "Your task is",
    "Question 1:",
    "Answer:",
    "Response:",
];

/// Result of one tutoring turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub answer: String,
    pub current_phase: TutoringPhase,
    pub phase_summary: String,
    pub phase_history: Vec<TutoringPhase>,
    pub problem_statement: Option<String>,
    /// The student message this turn answered.
    pub question: String,
}

/// Phase-aware tutoring over a conversation store.
///
/// Turns for the same conversation are serialized; different conversations
/// proceed concurrently.
#[derive(Clone)]
pub struct TutorService {
    store: Arc<dyn ConversationStore>,
    router: PhaseRouter,
    nodes: PhaseNodes,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    stream_buffer: usize,
}

impl TutorService {
    pub fn new(
        completion: Arc<dyn CompletionPort>,
        store: Arc<dyn ConversationStore>,
        config: &WorkflowConfig,
    ) -> Self {
        Self {
            store,
            router: PhaseRouter::new(completion.clone()),
            nodes: PhaseNodes::new(completion, config.problem_statement_min_chars),
            locks: Arc::new(Mutex::new(HashMap::new())),
            stream_buffer: config.stream_buffer,
        }
    }

    /// Route `message`, run the matching phase handler and commit the result.
    pub async fn handle_turn(&self, conversation_id: &str, message: &str) -> AppResult<TurnResult> {
        self.turn(conversation_id, message, None).await
    }

    /// Same as [`handle_turn`](Self::handle_turn), reported as events.
    pub fn handle_turn_stream(
        &self,
        conversation_id: impl Into<String>,
        message: impl Into<String>,
    ) -> EventStream {
        let (emitter, stream) = EventEmitter::channel(self.stream_buffer);
        let service = self.clone();
        let conversation_id = conversation_id.into();
        let message = message.into();

        tokio::spawn(async move {
            let outcome = service
                .turn(&conversation_id, &message, Some(&emitter))
                .await;

            let sent = match outcome {
                Ok(result) => emitter.complete(result).await,
                Err(AppError::Workflow(WorkflowError::Cancelled)) => Err(WorkflowError::Cancelled),
                Err(e) => emitter.error(e.to_string()).await,
            };

            if let Err(e) = sent {
                debug!(conversation_id = %conversation_id, error = %e, "Turn stream stopped early");
            }
        });

        stream
    }

    pub async fn get_state(&self, conversation_id: &str) -> AppResult<StateSnapshot> {
        match self.store.get(conversation_id).await? {
            Some(state) => Ok(state.snapshot()),
            None => Err(StoreError::NotFound {
                conversation_id: conversation_id.to_string(),
            }
            .into()),
        }
    }

    /// Forget a conversation so the next message starts fresh.
    pub async fn delete_state(&self, conversation_id: &str) -> AppResult<()> {
        let lock = self.conversation_lock(conversation_id).await;
        let guard = lock.lock().await;
        let deleted = self.store.delete(conversation_id).await;
        drop(guard);
        self.release_lock(conversation_id, lock).await;

        if !deleted? {
            return Err(StoreError::NotFound {
                conversation_id: conversation_id.to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Snapshots of every stored conversation, ordered by id.
    pub async fn list_states(&self) -> AppResult<Vec<StateSnapshot>> {
        let mut snapshots: Vec<StateSnapshot> = self
            .store
            .list_all()
            .await?
            .values()
            .map(|state| state.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        Ok(snapshots)
    }

    pub async fn conversation_count(&self) -> AppResult<usize> {
        Ok(self.store.conversation_count().await?)
    }

    async fn conversation_lock(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(conversation_id.to_string()).or_default().clone()
    }

    /// Drop the map entry once no other task holds or waits on `lock`.
    ///
    /// Clones are only handed out under the map lock, so the count cannot
    /// grow while it is held here.
    async fn release_lock(&self, conversation_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(conversation_id);
        }
    }

    async fn turn(
        &self,
        conversation_id: &str,
        message: &str,
        emitter: Option<&EventEmitter>,
    ) -> AppResult<TurnResult> {
        if conversation_id.trim().is_empty() {
            return Err(
                WorkflowError::validation("conversation_id", "Conversation id cannot be empty")
                    .into(),
            );
        }
        if message.trim().is_empty() {
            return Err(WorkflowError::validation("message", "Message cannot be empty").into());
        }

        let lock = self.conversation_lock(conversation_id).await;
        let guard = lock.lock().await;
        let outcome = self.locked_turn(conversation_id, message, emitter).await;
        drop(guard);
        self.release_lock(conversation_id, lock).await;
        outcome
    }

    async fn locked_turn(
        &self,
        conversation_id: &str,
        message: &str,
        emitter: Option<&EventEmitter>,
    ) -> AppResult<TurnResult> {
        let start = Instant::now();
        let state = self.store.get_or_create(conversation_id).await?;
        let previous_phase = state.current_phase;

        if let Some(emitter) = emitter {
            if state.phase_history.is_empty() {
                emitter
                    .metadata(MetadataEvent::PhaseChange {
                        phase: TutoringPhase::Initial,
                        message: TutoringPhase::Initial.summary().to_string(),
                    })
                    .await?;
            }
        }

        let decision = self.router.route(&state, message).await;

        if let Some(emitter) = emitter {
            emitter
                .workflow(decision.phase.label(), NodeStatus::Start)
                .await?;
        }

        // The store only sees the new state once the handler has succeeded.
        let outcome = self.nodes.run(decision.phase, &state, message).await;
        let (answer, state) = match outcome {
            Ok(output) => {
                self.store.commit(output.state.clone()).await?;
                (output.response, output.state)
            }
            Err(e) => {
                error!(
                    conversation_id = %conversation_id,
                    phase = %decision.phase,
                    error = %e,
                    "Phase handler failed, state left unchanged"
                );
                (prompts::generation_apology(&e.to_string()), state)
            }
        };

        if let Some(emitter) = emitter {
            emitter
                .workflow(decision.phase.label(), NodeStatus::End)
                .await?;
            emitter.token(answer.as_str()).await?;
            if state.current_phase != previous_phase {
                emitter
                    .metadata(MetadataEvent::PhaseChange {
                        phase: state.current_phase,
                        message: state.current_phase.summary().to_string(),
                    })
                    .await?;
            }
        }

        check_response_quality(conversation_id, &answer);

        info!(
            conversation_id = %conversation_id,
            from = %previous_phase,
            to = %state.current_phase,
            turns = state.phase_history.len(),
            latency_ms = start.elapsed().as_millis(),
            "Tutoring turn completed"
        );

        Ok(TurnResult {
            answer,
            current_phase: state.current_phase,
            phase_summary: state.current_phase.summary().to_string(),
            phase_history: state.phase_history,
            problem_statement: state.problem_statement,
            question: message.to_string(),
        })
    }
}

fn check_response_quality(conversation_id: &str, answer: &str) {
    if answer.chars().count() < MIN_RESPONSE_CHARS {
        warn!(
            conversation_id = %conversation_id,
            chars = answer.chars().count(),
            "Suspiciously short tutoring response"
        );
    }
    if let Some(pattern) = INCOMPLETE_RESPONSE_PATTERNS
        .iter()
        .find(|pattern| answer.contains(*pattern))
    {
        warn!(
            conversation_id = %conversation_id,
            pattern = %pattern,
            "Tutoring response looks incomplete"
        );
    }
}
