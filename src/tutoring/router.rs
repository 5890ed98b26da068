use std::sync::Arc;
use tracing::{error, info, warn};

use super::{TutoringPhase, TutoringState};
use crate::completion::{CompletionPort, CompletionRequest};
use crate::prompts;

const DEBUGGING_KEYWORDS: &[&str] = &[
    "error",
    "bug",
    "doesn't work",
    "wrong",
    "exception",
    "infinite loop",
    "loop",
    "terminate",
];

/// Debugging cue that yields to an explicit confusion keyword.
const WEAK_DEBUGGING_KEYWORDS: &[&str] = &["stuck"];

const REFLECTION_KEYWORDS: &[&str] = &["done", "finished", "completed", "what's next", "works", "solved"];

const CONFUSION_KEYWORDS: &[&str] = &[
    "not sure",
    "don't know",
    "confused",
    "lost",
    "help",
    "don't understand",
];

const IMPLEMENTATION_KEYWORDS: &[&str] = &["implement", "code", "method", "function", "write"];

const EXPLANATION_KEYWORDS: &[&str] = &["explain", "understand", "break down"];

const NEW_TOPIC_KEYWORDS: &[&str] = &["start", "new problem", "different", "another"];

/// Where a routing decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingSource {
    Classifier,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingDecision {
    pub phase: TutoringPhase,
    pub source: RoutingSource,
}

/// Picks the next tutoring phase for a message.
///
/// The model is asked first; anything that is not exactly one of the five
/// labels goes through [`fallback_phase`].
#[derive(Clone)]
pub struct PhaseRouter {
    completion: Arc<dyn CompletionPort>,
}

impl PhaseRouter {
    pub fn new(completion: Arc<dyn CompletionPort>) -> Self {
        Self { completion }
    }

    pub async fn route(&self, state: &TutoringState, message: &str) -> RoutingDecision {
        let prompt = prompts::router_prompt(
            state.current_phase.as_str(),
            message,
            state.problem_statement.as_deref(),
        );

        // A failed call is read as "stay where we are".
        let attempted = match self.completion.complete(CompletionRequest::new(prompt)).await {
            Ok(text) => text,
            Err(e) => {
                error!(
                    conversation_id = %state.conversation_id,
                    error = %e,
                    "Phase classification failed"
                );
                state.current_phase.label().to_string()
            }
        };

        let decision = match parse_phase_label(&attempted) {
            Some(phase) => RoutingDecision {
                phase,
                source: RoutingSource::Classifier,
            },
            None => {
                warn!(
                    conversation_id = %state.conversation_id,
                    output = %attempted.trim(),
                    "Invalid classifier output, using keyword fallback"
                );
                RoutingDecision {
                    phase: fallback_phase(state, message),
                    source: RoutingSource::Fallback,
                }
            }
        };

        info!(
            conversation_id = %state.conversation_id,
            from = %state.current_phase,
            to = %decision.phase,
            source = ?decision.source,
            "Routed message"
        );

        decision
    }
}

/// Read a classifier answer: trimmed, upper-cased, exact label match.
pub fn parse_phase_label(output: &str) -> Option<TutoringPhase> {
    TutoringPhase::from_label(&output.trim().to_uppercase())
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

/// Deterministic keyword routing, checked in priority order.
///
/// Confusion is checked before implementation, so "implement X but I'm
/// confused" lands in EXPLANATION.
pub fn fallback_phase(state: &TutoringState, message: &str) -> TutoringPhase {
    let text = message.to_lowercase();

    let confused = contains_any(&text, CONFUSION_KEYWORDS);

    if contains_any(&text, DEBUGGING_KEYWORDS)
        || (contains_any(&text, WEAK_DEBUGGING_KEYWORDS) && !confused)
    {
        TutoringPhase::Debugging
    } else if contains_any(&text, REFLECTION_KEYWORDS) {
        TutoringPhase::Reflection
    } else if state.is_new_conversation() {
        TutoringPhase::Initial
    } else if confused {
        TutoringPhase::Explanation
    } else if contains_any(&text, IMPLEMENTATION_KEYWORDS) {
        TutoringPhase::Implementation
    } else if contains_any(&text, EXPLANATION_KEYWORDS) {
        TutoringPhase::Explanation
    } else if contains_any(&text, NEW_TOPIC_KEYWORDS) {
        TutoringPhase::Initial
    } else {
        state.current_phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::MockCompletionPort;
    use crate::error::CompletionError;

    fn ongoing(phase: TutoringPhase) -> TutoringState {
        let mut state = TutoringState::new("c1");
        state.current_phase = phase;
        state.problem_statement = Some("Implement a binary search tree".to_string());
        state.phase_history = vec![TutoringPhase::Initial];
        state
    }

    fn router_returning(output: &'static str) -> PhaseRouter {
        let mut completion = MockCompletionPort::new();
        completion
            .expect_complete()
            .returning(move |_| Ok(output.to_string()));
        PhaseRouter::new(Arc::new(completion))
    }

    #[test]
    fn test_parse_phase_label() {
        assert_eq!(parse_phase_label(" debugging \n"), Some(TutoringPhase::Debugging));
        assert_eq!(parse_phase_label("REFLECTION"), Some(TutoringPhase::Reflection));
        assert_eq!(parse_phase_label("DEBUGGING."), None);
        assert_eq!(parse_phase_label("I think EXPLANATION"), None);
    }

    #[test]
    fn test_confusion_beats_implementation() {
        let state = ongoing(TutoringPhase::Initial);
        assert_eq!(
            fallback_phase(
                &state,
                "I'm stuck implementing a BST but I don't understand recursion"
            ),
            TutoringPhase::Explanation
        );
        assert_eq!(
            fallback_phase(&state, "I'm trying to implement X but I'm confused"),
            TutoringPhase::Explanation
        );
    }

    #[test]
    fn test_stuck_alone_is_debugging() {
        let state = ongoing(TutoringPhase::Implementation);
        assert_eq!(
            fallback_phase(&state, "I'm stuck on the insert step"),
            TutoringPhase::Debugging
        );
    }

    #[test]
    fn test_debugging_has_top_priority() {
        let state = TutoringState::new("fresh");
        assert_eq!(
            fallback_phase(&state, "I'm confused, it throws an exception"),
            TutoringPhase::Debugging
        );
        assert_eq!(
            fallback_phase(&state, "My loop never ends and I'm done"),
            TutoringPhase::Debugging
        );
    }

    #[test]
    fn test_reflection_before_first_turn_rule() {
        let state = TutoringState::new("fresh");
        assert_eq!(fallback_phase(&state, "I solved it!"), TutoringPhase::Reflection);
    }

    #[test]
    fn test_first_turn_goes_to_initial() {
        let state = TutoringState::new("fresh");
        assert_eq!(
            fallback_phase(&state, "Can you help me write a function?"),
            TutoringPhase::Initial
        );
    }

    #[test]
    fn test_remaining_rules_in_order() {
        let state = ongoing(TutoringPhase::Explanation);
        assert_eq!(
            fallback_phase(&state, "Let me write the insert method"),
            TutoringPhase::Implementation
        );
        assert_eq!(
            fallback_phase(&state, "Can you break down recursion?"),
            TutoringPhase::Explanation
        );
        assert_eq!(
            fallback_phase(&state, "Let's try a different one"),
            TutoringPhase::Initial
        );
        assert_eq!(fallback_phase(&state, "Hmm, okay."), TutoringPhase::Explanation);
    }

    #[tokio::test]
    async fn test_route_uses_valid_classifier_output() {
        let router = router_returning("  implementation\n");
        let decision = router
            .route(&ongoing(TutoringPhase::Explanation), "anything")
            .await;
        assert_eq!(decision.phase, TutoringPhase::Implementation);
        assert_eq!(decision.source, RoutingSource::Classifier);
    }

    #[tokio::test]
    async fn test_route_invalid_output_first_turn_is_initial() {
        let router = router_returning("PLANNING");
        let decision = router
            .route(&TutoringState::new("fresh"), "I need help with linked lists")
            .await;
        assert_eq!(decision.phase, TutoringPhase::Initial);
        assert_eq!(decision.source, RoutingSource::Fallback);
    }

    #[tokio::test]
    async fn test_route_invalid_output_prefers_confusion() {
        let router = router_returning("The student seems confused.");
        let decision = router
            .route(
                &ongoing(TutoringPhase::Initial),
                "I'm stuck implementing a BST but I don't understand recursion",
            )
            .await;
        assert_eq!(decision.phase, TutoringPhase::Explanation);
    }

    #[tokio::test]
    async fn test_route_failure_keeps_current_phase() {
        let mut completion = MockCompletionPort::new();
        completion.expect_complete().returning(|_| {
            Err(CompletionError::Connection {
                message: "refused".to_string(),
            })
        });
        let router = PhaseRouter::new(Arc::new(completion));

        let decision = router
            .route(&ongoing(TutoringPhase::Implementation), "there's a bug")
            .await;
        assert_eq!(decision.phase, TutoringPhase::Implementation);
        assert_eq!(decision.source, RoutingSource::Classifier);
    }
}
