//! Command-line entry points.
//!
//! With no subcommand the binary serves JSON-RPC over stdio. The other
//! subcommands run one workflow call and print the result.

use clap::{Parser, Subcommand};
use futures_util::StreamExt;

use crate::server::{RpcServer, SharedState};
use crate::stream::{CompletionPayload, EventStream, MetadataEvent, NodeStatus, StreamEvent};
use crate::tutoring::TurnResult;
use crate::workflow::{ComparisonResult, QueryResult};

/// Orchestration core for the AI mentor tutoring backend.
#[derive(Parser, Debug)]
#[command(name = "ai-mentor", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve JSON-RPC requests over stdin/stdout
    Serve,

    /// Answer a question from the course materials
    Ask {
        question: String,

        /// Bound on query rewrites for this question
        #[arg(long)]
        max_retries: Option<u32>,

        /// Print workflow events as they happen
        #[arg(long)]
        stream: bool,

        /// Skip grading and rewriting
        #[arg(long, conflicts_with = "stream")]
        simple: bool,
    },

    /// Answer a question with and without self-correction
    Compare { question: String },

    /// Send one message to a tutoring conversation
    Tutor {
        message: String,

        /// Conversation to continue (created if unknown)
        #[arg(long, default_value = "cli")]
        conversation: String,

        /// Print workflow events as they happen
        #[arg(long)]
        stream: bool,
    },

    /// Show the stored state of a tutoring conversation
    State {
        #[arg(long, default_value = "cli")]
        conversation: String,
    },
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    pub message: String,
}

impl CliResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a CLI command against the application state.
pub async fn execute_command(command: Commands, state: &SharedState) -> CliResult {
    match command {
        Commands::Serve => match RpcServer::new(state.clone()).run().await {
            Ok(()) => CliResult::success(""),
            Err(e) => CliResult::error(format!("Server error: {}", e)),
        },
        Commands::Ask {
            question,
            stream: true,
            max_retries,
            ..
        } => {
            let events = state.correction_loop.query_stream(question, max_retries);
            render_stream(events).await
        }
        Commands::Ask {
            question,
            simple: true,
            ..
        } => match state.correction_loop.simple_query(&question).await {
            Ok(result) => CliResult::success(format_query_result(&result)),
            Err(e) => CliResult::error(e.to_string()),
        },
        Commands::Ask {
            question,
            max_retries,
            ..
        } => match state.correction_loop.query(&question, max_retries).await {
            Ok(result) => CliResult::success(format_query_result(&result)),
            Err(e) => CliResult::error(e.to_string()),
        },
        Commands::Compare { question } => match state.compare(&question).await {
            Ok(result) => CliResult::success(format_comparison(&result)),
            Err(e) => CliResult::error(e.to_string()),
        },
        Commands::Tutor {
            message,
            conversation,
            stream: true,
        } => render_stream(state.tutor.handle_turn_stream(conversation, message)).await,
        Commands::Tutor {
            message,
            conversation,
            stream: false,
        } => match state.tutor.handle_turn(&conversation, &message).await {
            Ok(result) => CliResult::success(format_turn_result(&result)),
            Err(e) => CliResult::error(e.to_string()),
        },
        Commands::State { conversation } => match state.tutor.get_state(&conversation).await {
            Ok(snapshot) => match serde_json::to_string_pretty(&snapshot) {
                Ok(json) => CliResult::success(json),
                Err(e) => CliResult::error(e.to_string()),
            },
            Err(e) => CliResult::error(e.to_string()),
        },
    }
}

async fn render_stream(mut events: EventStream) -> CliResult {
    let mut output = String::new();

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Complete(payload) => {
                output.push_str("\n\n");
                output.push_str(&match payload {
                    CompletionPayload::Query(result) => format_query_result(&result),
                    CompletionPayload::Turn(result) => format_turn_result(&result),
                });
                return CliResult::success(output);
            }
            StreamEvent::Error { message } => return CliResult::error(message),
            event => output.push_str(&format_event(&event)),
        }
    }

    CliResult::error("Stream ended without a result")
}

/// One-line rendering of a non-terminal event.
pub fn format_event(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Workflow { node, status } => {
            let status = match status {
                NodeStatus::Start => "start",
                NodeStatus::End => "end",
            };
            format!("[{}:{}]\n", node, status)
        }
        StreamEvent::Token { content } => content.clone(),
        StreamEvent::Metadata(meta) => match meta {
            MetadataEvent::RetrievalComplete { num_documents } => {
                format!("  retrieved {} document(s)\n", num_documents)
            }
            MetadataEvent::GradingComplete { decision } => format!("  graded: {}\n", decision),
            MetadataEvent::QueryRewritten { rewritten, .. } => {
                format!("  rewritten: {}\n", rewritten)
            }
            MetadataEvent::PhaseChange { message, .. } => format!("  {}\n", message),
            MetadataEvent::GenerationFailed { reason } => {
                format!("  generation failed: {}\n", reason)
            }
        },
        StreamEvent::Complete(_) | StreamEvent::Error { .. } => String::new(),
    }
}

pub fn format_query_result(result: &QueryResult) -> String {
    let mut output = format!(
        "Answer: {}\n\nWorkflow: {}\nRewrites used: {}\n",
        result.answer, result.workflow_path, result.rewrites_used
    );

    if result.sources.is_empty() {
        output.push_str("Sources: none\n");
    } else {
        output.push_str(&format!("Sources ({}):\n", result.num_sources));
        for (i, source) in result.sources.iter().enumerate() {
            output.push_str(&format!(
                "  [{}] (score {:.2}) {}\n",
                i + 1,
                source.score,
                source.text
            ));
        }
    }

    output
}

pub fn format_comparison(result: &ComparisonResult) -> String {
    format!(
        "Question: {}\n\nSimple ({} source(s)):\n{}\n\nSelf-correcting ({} source(s), {} rewrite(s), {}):\n{}\n",
        result.question,
        result.simple_num_sources,
        result.simple_answer,
        result.agentic_num_sources,
        result.agentic_rewrites_used,
        result.agentic_workflow_path,
        result.agentic_answer
    )
}

pub fn format_turn_result(result: &TurnResult) -> String {
    format!(
        "[{}] {}\n\n{}\n",
        result.current_phase.label(),
        result.phase_summary,
        result.answer
    )
}
