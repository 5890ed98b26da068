//! Conversation state store.
//!
//! [`ConversationStore`] is the only shared mutable resource in the tutoring
//! flow. Handlers receive copies of [`TutoringState`] and hand back a
//! replacement, which the store commits atomically per conversation.

mod memory;

pub use memory::InMemoryConversationStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;

use crate::error::StoreResult;
use crate::tutoring::{TutoringPhase, TutoringState};

/// Named-field update merged into an existing state.
///
/// `problem_statement: Some(None)` clears the statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub current_phase: Option<TutoringPhase>,
    pub problem_statement: Option<Option<String>>,
    pub last_user_message: Option<String>,
    pub last_ai_response: Option<String>,
    pub phase_history: Option<Vec<TutoringPhase>>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phase(mut self, phase: TutoringPhase) -> Self {
        self.current_phase = Some(phase);
        self
    }

    pub fn with_problem_statement(mut self, statement: Option<String>) -> Self {
        self.problem_statement = Some(statement);
        self
    }

    pub fn with_last_user_message(mut self, message: impl Into<String>) -> Self {
        self.last_user_message = Some(message.into());
        self
    }

    pub fn with_last_ai_response(mut self, response: impl Into<String>) -> Self {
        self.last_ai_response = Some(response.into());
        self
    }

    pub fn with_phase_history(mut self, history: Vec<TutoringPhase>) -> Self {
        self.phase_history = Some(history);
        self
    }

    /// Build an update from loosely-typed fields.
    ///
    /// Unknown names and values of the wrong shape are skipped with a
    /// warning rather than rejected.
    pub fn from_json(fields: &Map<String, Value>) -> Self {
        let mut update = Self::default();

        for (key, value) in fields {
            let applied = match key.as_str() {
                "current_phase" => serde_json::from_value(value.clone())
                    .map(|phase| update.current_phase = Some(phase))
                    .is_ok(),
                "problem_statement" => match value {
                    Value::Null => {
                        update.problem_statement = Some(None);
                        true
                    }
                    Value::String(s) => {
                        update.problem_statement = Some(Some(s.clone()));
                        true
                    }
                    _ => false,
                },
                "last_user_message" => value
                    .as_str()
                    .map(|s| update.last_user_message = Some(s.to_string()))
                    .is_some(),
                "last_ai_response" => value
                    .as_str()
                    .map(|s| update.last_ai_response = Some(s.to_string()))
                    .is_some(),
                "phase_history" => serde_json::from_value(value.clone())
                    .map(|history| update.phase_history = Some(history))
                    .is_ok(),
                _ => {
                    warn!(field = %key, "Ignoring unknown state field");
                    continue;
                }
            };

            if !applied {
                warn!(field = %key, "Ignoring state field with invalid value");
            }
        }

        update
    }

    /// Merge into `state`, leaving unset fields untouched.
    pub fn apply(self, state: &mut TutoringState) {
        if let Some(phase) = self.current_phase {
            state.current_phase = phase;
        }
        if let Some(statement) = self.problem_statement {
            state.problem_statement = statement;
        }
        if let Some(message) = self.last_user_message {
            state.last_user_message = Some(message);
        }
        if let Some(response) = self.last_ai_response {
            state.last_ai_response = Some(response);
        }
        if let Some(history) = self.phase_history {
            state.phase_history = history;
        }
        state.updated_at = chrono::Utc::now();
    }
}

/// Keyed registry of conversation states.
///
/// Implementations must make each operation atomic for a single key.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Return the state for `id`, creating a fresh INITIAL state if absent.
    async fn get_or_create(&self, id: &str) -> StoreResult<TutoringState>;

    /// Merge `update` into the state for `id`, creating it if absent.
    async fn update(&self, id: &str, update: StateUpdate) -> StoreResult<TutoringState>;

    /// Replace the whole state for its conversation id.
    async fn commit(&self, state: TutoringState) -> StoreResult<()>;

    async fn get(&self, id: &str) -> StoreResult<Option<TutoringState>>;

    /// Returns `false` if nothing was stored under `id`.
    async fn delete(&self, id: &str) -> StoreResult<bool>;

    async fn list_all(&self) -> StoreResult<HashMap<String, TutoringState>>;

    async fn clear_all(&self) -> StoreResult<()>;

    async fn conversation_count(&self) -> StoreResult<usize>;
}
