use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::prompts::preview;
use crate::retrieval::RetrievedDocument;

/// Separator used when rendering a workflow path.
pub const PATH_SEPARATOR: &str = " → ";

/// Nodes of the correction loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowNode {
    Retrieve,
    Grade,
    Rewrite,
    Generate,
}

impl WorkflowNode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowNode::Retrieve => "retrieve",
            WorkflowNode::Grade => "grade",
            WorkflowNode::Rewrite => "rewrite",
            WorkflowNode::Generate => "generate",
        }
    }
}

impl std::fmt::Display for WorkflowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the grading step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceDecision {
    Relevant,
    Irrelevant,
}

impl RelevanceDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelevanceDecision::Relevant => "relevant",
            RelevanceDecision::Irrelevant => "irrelevant",
        }
    }
}

/// State threaded through one run of the correction loop.
///
/// Documents are kept as one list of [`RetrievedDocument`]s, so texts,
/// scores and metadata can never drift out of step.
#[derive(Debug, Clone)]
pub struct CorrectionState {
    pub run_id: Uuid,
    question: String,
    rewritten_question: Option<String>,
    documents: Vec<RetrievedDocument>,
    pub generation: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub relevance_decision: Option<RelevanceDecision>,
    pub workflow_path: Vec<WorkflowNode>,
    pub last_prompt: String,
}

impl CorrectionState {
    /// Fresh state for one query
    pub fn new(question: impl Into<String>, max_retries: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            question: question.into(),
            rewritten_question: None,
            documents: Vec::new(),
            generation: String::new(),
            retry_count: 0,
            max_retries,
            relevance_decision: None,
            workflow_path: Vec::new(),
            last_prompt: String::new(),
        }
    }

    /// The question as asked.
    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn rewritten_question(&self) -> Option<&str> {
        self.rewritten_question.as_deref()
    }

    /// The rewritten question when present, else the original.
    pub fn active_question(&self) -> &str {
        self.rewritten_question.as_deref().unwrap_or(&self.question)
    }

    /// Record a successful rewrite. A rewrite is never cleared.
    pub fn record_rewrite(&mut self, rewritten: impl Into<String>) {
        self.rewritten_question = Some(rewritten.into());
        self.retry_count += 1;
    }

    pub fn documents(&self) -> &[RetrievedDocument] {
        &self.documents
    }

    pub fn set_documents(&mut self, documents: Vec<RetrievedDocument>) {
        self.documents = documents;
    }

    pub fn document_texts(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.text.as_str()).collect()
    }

    pub fn document_scores(&self) -> Vec<f64> {
        self.documents.iter().map(|d| d.score).collect()
    }

    pub fn document_metadata(&self) -> Vec<&Map<String, Value>> {
        self.documents.iter().map(|d| &d.metadata).collect()
    }

    /// Times the rewrite node has been entered, successful or not.
    pub fn rewrite_attempts(&self) -> u32 {
        self.workflow_path
            .iter()
            .filter(|node| **node == WorkflowNode::Rewrite)
            .count() as u32
    }

    /// Render the visited nodes joined with " → ".
    pub fn path_string(&self) -> String {
        self.workflow_path
            .iter()
            .map(WorkflowNode::as_str)
            .collect::<Vec<_>>()
            .join(PATH_SEPARATOR)
    }

    /// Assemble the caller-facing result.
    pub fn into_result(self, source_preview_chars: usize) -> QueryResult {
        let workflow_path = self.path_string();
        let sources = self
            .documents
            .iter()
            .map(|doc| Source::from_document(doc, source_preview_chars))
            .collect::<Vec<_>>();

        QueryResult {
            answer: self.generation,
            num_sources: sources.len(),
            sources,
            question: self.question,
            workflow_path,
            rewrites_used: self.retry_count,
            was_rewritten: self.rewritten_question.is_some(),
            last_prompt: self.last_prompt,
        }
    }
}

/// A retrieved document as shown to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub text: String,
    pub score: f64,
    pub metadata: Map<String, Value>,
}

impl Source {
    /// Truncate the document text for display, marking cuts with "...".
    pub fn from_document(doc: &RetrievedDocument, max_chars: usize) -> Self {
        let cut = preview(&doc.text, max_chars);
        let text = if cut.len() < doc.text.len() {
            format!("{}...", cut)
        } else {
            doc.text.clone()
        };

        Self {
            text,
            score: doc.score,
            metadata: doc.metadata.clone(),
        }
    }
}

/// Result of a correction-loop (or single-pass) query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<Source>,
    pub question: String,
    pub num_sources: usize,
    pub workflow_path: String,
    pub rewrites_used: u32,
    pub was_rewritten: bool,
    pub last_prompt: String,
}

/// Side-by-side answers from single-pass retrieval and the correction loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub question: String,
    pub simple_answer: String,
    pub simple_num_sources: usize,
    pub agentic_answer: String,
    pub agentic_num_sources: usize,
    pub agentic_workflow_path: String,
    pub agentic_rewrites_used: u32,
}
