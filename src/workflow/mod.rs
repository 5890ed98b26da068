//! Correction-loop engine for retrieval-augmented answers.
//!
//! A run retrieves documents, asks the model to grade them, rewrites the
//! question while they look irrelevant (bounded by `max_retries`), and
//! finally generates an answer grounded in whatever was retrieved last.

mod engine;
mod state;

pub use engine::{route_after_grade, CorrectionLoop};
pub use state::{
    ComparisonResult, CorrectionState, QueryResult, RelevanceDecision, Source, WorkflowNode,
    PATH_SEPARATOR,
};
