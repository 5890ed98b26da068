use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TutoringPhase;

/// Pedagogical state of one conversation, persisted across turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutoringState {
    pub conversation_id: String,
    pub current_phase: TutoringPhase,
    /// Inferred once, then kept unless explicitly cleared.
    pub problem_statement: Option<String>,
    pub last_user_message: Option<String>,
    pub last_ai_response: Option<String>,
    /// One entry per completed turn, in order.
    pub phase_history: Vec<TutoringPhase>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TutoringState {
    /// State of a brand-new conversation.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            current_phase: TutoringPhase::Initial,
            problem_statement: None,
            last_user_message: None,
            last_ai_response: None,
            phase_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// No turn has completed and no problem is known yet.
    pub fn is_new_conversation(&self) -> bool {
        self.problem_statement.is_none() && self.phase_history.is_empty()
    }

    /// Copy of this state after a turn handled in `phase`.
    pub fn after_turn(&self, phase: TutoringPhase, message: &str, response: &str) -> Self {
        let mut next = self.clone();
        next.current_phase = phase;
        next.last_user_message = Some(message.to_string());
        next.last_ai_response = Some(response.to_string());
        next.phase_history.push(phase);
        next.updated_at = Utc::now();
        next
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            conversation_id: self.conversation_id.clone(),
            current_phase: self.current_phase,
            phase_summary: self.current_phase.summary().to_string(),
            phase_history: self.phase_history.clone(),
            problem_statement: self.problem_statement.clone(),
            last_user_message: self.last_user_message.clone(),
            last_ai_response: self.last_ai_response.clone(),
        }
    }
}

/// Read-only view of a conversation for introspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub conversation_id: String,
    pub current_phase: TutoringPhase,
    pub phase_summary: String,
    pub phase_history: Vec<TutoringPhase>,
    pub problem_statement: Option<String>,
    pub last_user_message: Option<String>,
    pub last_ai_response: Option<String>,
}
