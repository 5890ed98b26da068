//! Streaming event vocabulary and the emitter that sequences it.
//!
//! One session produces `workflow`, `token` and `metadata` events in
//! production order, then exactly one terminal `complete` or `error`.
//! The terminal methods consume the [`EventEmitter`], so a second terminal
//! event cannot be sent.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::completion::BoxStream;
use crate::error::{WorkflowError, WorkflowResult};
use crate::tutoring::{TurnResult, TutoringPhase};
use crate::workflow::QueryResult;

/// Ordered stream of events for one session.
pub type EventStream = BoxStream<'static, StreamEvent>;

/// Progress marker for a workflow node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Start,
    End,
}

/// One event in a streamed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Workflow { node: String, status: NodeStatus },
    Token { content: String },
    Metadata(MetadataEvent),
    Complete(CompletionPayload),
    Error { message: String },
}

impl StreamEvent {
    /// Whether this event ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete(_) | StreamEvent::Error { .. })
    }
}

/// Structured side-channel notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MetadataEvent {
    RetrievalComplete { num_documents: usize },
    GradingComplete { decision: String },
    QueryRewritten { original: String, rewritten: String },
    PhaseChange { phase: TutoringPhase, message: String },
    GenerationFailed { reason: String },
}

/// Payload of the terminal `complete` event; same shape as the
/// non-streaming result of the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompletionPayload {
    Query(Box<QueryResult>),
    Turn(Box<TurnResult>),
}

impl From<QueryResult> for CompletionPayload {
    fn from(result: QueryResult) -> Self {
        CompletionPayload::Query(Box::new(result))
    }
}

impl From<TurnResult> for CompletionPayload {
    fn from(result: TurnResult) -> Self {
        CompletionPayload::Turn(Box::new(result))
    }
}

/// Sending half of an event session
#[derive(Debug)]
pub struct EventEmitter {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventEmitter {
    /// Create an emitter and the stream its events arrive on.
    pub fn channel(buffer: usize) -> (Self, EventStream) {
        let (tx, mut rx) = mpsc::channel(buffer.max(1));

        let stream = async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        };

        let stream: EventStream = Box::pin(stream);
        (Self { tx }, stream)
    }

    /// A node was entered or left.
    pub async fn workflow(&self, node: &str, status: NodeStatus) -> WorkflowResult<()> {
        self.send(StreamEvent::Workflow {
            node: node.to_string(),
            status,
        })
        .await
    }

    /// A generated answer fragment.
    pub async fn token(&self, content: impl Into<String>) -> WorkflowResult<()> {
        self.send(StreamEvent::Token {
            content: content.into(),
        })
        .await
    }

    pub async fn metadata(&self, event: MetadataEvent) -> WorkflowResult<()> {
        self.send(StreamEvent::Metadata(event)).await
    }

    /// Finish the session with its result.
    pub async fn complete(self, payload: impl Into<CompletionPayload>) -> WorkflowResult<()> {
        self.send(StreamEvent::Complete(payload.into())).await
    }

    /// Finish the session with an error.
    pub async fn error(self, message: impl Into<String>) -> WorkflowResult<()> {
        self.send(StreamEvent::Error {
            message: message.into(),
        })
        .await
    }

    async fn send(&self, event: StreamEvent) -> WorkflowResult<()> {
        self.tx.send(event).await.map_err(|_| {
            debug!("Event consumer dropped the stream");
            WorkflowError::Cancelled
        })
    }
}
