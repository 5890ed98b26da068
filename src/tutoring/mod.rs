//! Phase-aware Socratic tutoring.
//!
//! Each turn is classified by the [`PhaseRouter`], handled by one of the
//! [`PhaseNodes`], and committed to the conversation store by the
//! [`TutorService`].

mod nodes;
mod phase;
mod router;
mod service;
mod state;

pub use nodes::{PhaseNodes, PhaseOutput};
pub use phase::TutoringPhase;
pub use router::{fallback_phase, parse_phase_label, PhaseRouter, RoutingDecision, RoutingSource};
pub use service::{TurnResult, TutorService};
pub use state::{StateSnapshot, TutoringState};
