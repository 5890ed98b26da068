//! # AI Mentor Core
//!
//! Workflow orchestration for a programming-tutor backend. Two workflows
//! share one completion model:
//!
//! - **Self-correcting retrieval**: retrieve course material, grade its
//!   relevance, rewrite the question when it misses, and generate a grounded
//!   answer. The rewrite loop is bounded.
//! - **Phase-aware tutoring**: classify each student message into one of five
//!   Socratic phases, answer in that phase's voice, and keep per-conversation
//!   state between turns.
//!
//! Both can run to completion or stream their progress as typed events.
//!
//! ## Architecture
//!
//! ```text
//! JSON-RPC client → RpcServer (stdio) → CorrectionLoop / TutorService
//!                                              ↓              ↓
//!                              CompletionPort (llama.cpp)  ConversationStore
//!                              RetrievalPort (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ai_mentor_core::{AppState, Config, RpcServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = Arc::new(AppState::from_config(config)?);
//!     RpcServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

/// Command-line entry points.
pub mod cli;
/// Completion port and the llama.cpp adapter.
pub mod completion;
/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Prompt templates for every model call.
pub mod prompts;
/// Retrieval port and the HTTP document-store adapter.
pub mod retrieval;
/// JSON-RPC server and request handling.
pub mod server;
/// Conversation state storage.
pub mod store;
/// Streaming event vocabulary and emitter.
pub mod stream;
/// Phase-aware tutoring workflow.
pub mod tutoring;
/// Self-correcting retrieval workflow.
pub mod workflow;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, RpcServer, SharedState};
