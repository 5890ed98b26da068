//! Completion port: text generation behind a narrow request/response contract.
//!
//! [`CompletionPort`] is what every workflow node talks to. [`LlamaCppClient`]
//! is the production adapter for an OpenAI-style `/v1/completions` endpoint
//! (llama.cpp server).

mod client;
mod sse;
mod types;

pub use client::LlamaCppClient;
pub use types::*;

use std::pin::Pin;

use async_trait::async_trait;

use crate::error::CompletionResult;

/// A boxed async stream, used for incremental completion output.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Stream of generated text fragments in production order.
pub type FragmentStream = BoxStream<'static, CompletionResult<String>>;

/// Text generation capability.
///
/// Callers treat implementations as unreliable oracles: every error is
/// expected to be handled by the calling node with a safe default.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionPort: Send + Sync {
    /// Generate the full completion for `request`.
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<String>;

    /// Generate the completion as a stream of fragments.
    async fn complete_stream(&self, request: CompletionRequest)
        -> CompletionResult<FragmentStream>;
}
