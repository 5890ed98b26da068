use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{TutoringPhase, TutoringState};
use crate::completion::{CompletionPort, CompletionRequest};
use crate::error::CompletionResult;
use crate::prompts;

/// Leading acknowledgements dropped before echoing a debugging message.
const ACKNOWLEDGEMENTS: &[&str] = &["yes.", "yeah.", "ok.", "okay.", "sure."];

/// Response text and the state to commit after one phase handler
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseOutput {
    pub response: String,
    pub state: TutoringState,
}

/// The five single-turn phase handlers.
///
/// Each handler records its own phase as the one entered, whatever phase
/// the router asked for.
#[derive(Clone)]
pub struct PhaseNodes {
    completion: Arc<dyn CompletionPort>,
    problem_statement_min_chars: usize,
}

impl PhaseNodes {
    pub fn new(completion: Arc<dyn CompletionPort>, problem_statement_min_chars: usize) -> Self {
        Self {
            completion,
            problem_statement_min_chars,
        }
    }

    /// Run the handler for `phase`.
    pub async fn run(
        &self,
        phase: TutoringPhase,
        state: &TutoringState,
        message: &str,
    ) -> CompletionResult<PhaseOutput> {
        let start = Instant::now();

        let output = match phase {
            TutoringPhase::Initial => self.initial(state, message).await?,
            TutoringPhase::Explanation => self.explanation(state, message).await?,
            TutoringPhase::Implementation => self.implementation(state, message).await?,
            TutoringPhase::Debugging => self.debugging(state, message),
            TutoringPhase::Reflection => self.reflection(state, message).await?,
        };

        info!(
            conversation_id = %state.conversation_id,
            phase = %phase,
            latency_ms = start.elapsed().as_millis(),
            "Phase handler completed"
        );

        Ok(output)
    }

    pub async fn initial(&self, state: &TutoringState, message: &str) -> CompletionResult<PhaseOutput> {
        let response = self.ask(prompts::initial_prompt(message)).await?;
        let mut next = state.after_turn(TutoringPhase::Initial, message, &response);

        let trimmed = message.trim();
        if next.problem_statement.is_none()
            && trimmed.chars().count() > self.problem_statement_min_chars
        {
            debug!(conversation_id = %state.conversation_id, "Inferred problem statement");
            next.problem_statement = Some(trimmed.to_string());
        }

        Ok(PhaseOutput {
            response,
            state: next,
        })
    }

    pub async fn explanation(
        &self,
        state: &TutoringState,
        message: &str,
    ) -> CompletionResult<PhaseOutput> {
        let prompt = prompts::explanation_prompt(state.problem_statement.as_deref(), message);
        let response = self.ask(prompt).await?;
        Ok(PhaseOutput {
            state: state.after_turn(TutoringPhase::Explanation, message, &response),
            response,
        })
    }

    pub async fn implementation(
        &self,
        state: &TutoringState,
        message: &str,
    ) -> CompletionResult<PhaseOutput> {
        let prompt = prompts::implementation_prompt(state.problem_statement.as_deref(), message);
        let response = self.ask(prompt).await?;
        Ok(PhaseOutput {
            state: state.after_turn(TutoringPhase::Implementation, message, &response),
            response,
        })
    }

    /// Template response; the model is not consulted.
    pub fn debugging(&self, state: &TutoringState, message: &str) -> PhaseOutput {
        let response = prompts::debugging_response(strip_acknowledgement(message));
        PhaseOutput {
            state: state.after_turn(TutoringPhase::Debugging, message, &response),
            response,
        }
    }

    pub async fn reflection(
        &self,
        state: &TutoringState,
        message: &str,
    ) -> CompletionResult<PhaseOutput> {
        let prompt = prompts::reflection_prompt(state.problem_statement.as_deref(), message);
        let response = self.ask(prompt).await?;
        Ok(PhaseOutput {
            state: state.after_turn(TutoringPhase::Reflection, message, &response),
            response,
        })
    }

    async fn ask(&self, prompt: String) -> CompletionResult<String> {
        let text = self.completion.complete(CompletionRequest::new(prompt)).await?;
        Ok(text.trim().to_string())
    }
}

/// Drop a leading "ok." / "yes." style acknowledgement.
fn strip_acknowledgement(message: &str) -> &str {
    let lowered = message.to_lowercase();
    if ACKNOWLEDGEMENTS.iter().any(|ack| lowered.starts_with(ack)) {
        if let Some((_, rest)) = message.split_once('.') {
            return rest.trim();
        }
    }
    message
}
