use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("RPC protocol error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Completion port errors.
///
/// The variants are the failure categories callers need to tell apart:
/// connection failure, timeout, non-2xx status and malformed payload.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Failed to connect to completion server: {message}")]
    Connection { message: String },

    #[error("Completion request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Completion server returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed completion response: {message}")]
    InvalidResponse { message: String },
}

/// Retrieval port errors
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Failed to connect to document store: {message}")]
    Connection { message: String },

    #[error("Retrieval request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Document store returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed retrieval response: {message}")]
    InvalidResponse { message: String },
}

/// Conversation state store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation not found: {conversation_id}")]
    NotFound { conversation_id: String },
}

/// Errors that stop a workflow before it produces a result
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Workflow cancelled: event consumer went away")]
    Cancelled,
}

/// JSON-RPC surface errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("Invalid parameters for {method}: {message}")]
    InvalidParameters { method: String, message: String },

    #[error("Conversation not found: {conversation_id}")]
    NotFound { conversation_id: String },

    #[error("Execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Shorthand for a validation failure on `field`.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        WorkflowError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<AppError> for RpcError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Store(StoreError::NotFound { conversation_id }) => {
                RpcError::NotFound { conversation_id }
            }
            other => RpcError::ExecutionFailed {
                message: other.to_string(),
            },
        }
    }
}

impl From<WorkflowError> for RpcError {
    fn from(err: WorkflowError) -> Self {
        RpcError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for completion port calls
pub type CompletionResult<T> = Result<T, CompletionError>;

/// Result type alias for retrieval port calls
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Result type alias for state store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for workflow entry points
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Result type alias for RPC handlers
pub type RpcResult<T> = Result<T, RpcError>;
