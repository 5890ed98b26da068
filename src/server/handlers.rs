use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::SharedState;
use crate::error::{AppError, RpcError, RpcResult, WorkflowError};
use crate::stream::EventStream;

/// Methods answered with a sequence of `stream/event` notifications.
pub const STREAMING_METHODS: &[&str] = &["rag/query_stream", "tutor/turn_stream"];

/// Methods answered with a single response.
pub const METHODS: &[&str] = &[
    "rag/query",
    "rag/simple",
    "rag/compare",
    "tutor/turn",
    "tutor/state/get",
    "tutor/state/delete",
    "tutor/state/list",
];

/// Parameters for `rag/query` and `rag/query_stream`
#[derive(Debug, Clone, Deserialize)]
pub struct QueryParams {
    pub question: String,
    /// Overrides the configured loop bound for this request.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Parameters for `rag/simple` and `rag/compare`
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionParams {
    pub question: String,
}

/// Parameters for `tutor/turn` and `tutor/turn_stream`
#[derive(Debug, Clone, Deserialize)]
pub struct TurnParams {
    pub conversation_id: String,
    pub message: String,
}

/// Parameters for the `tutor/state/*` methods that name a conversation
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationParams {
    pub conversation_id: String,
}

/// Whether `method` streams its result.
pub fn is_streaming_method(method: &str) -> bool {
    STREAMING_METHODS.contains(&method)
}

/// Route a single-response method call to its handler
pub async fn handle_method(
    state: &SharedState,
    method: &str,
    params: Option<Value>,
) -> RpcResult<Value> {
    info!(method = %method, "Routing method call");

    match method {
        "rag/query" => handle_query(state, params).await,
        "rag/simple" => handle_simple(state, params).await,
        "rag/compare" => handle_compare(state, params).await,
        "tutor/turn" => handle_turn(state, params).await,
        "tutor/state/get" => handle_state_get(state, params).await,
        "tutor/state/delete" => handle_state_delete(state, params).await,
        "tutor/state/list" => handle_state_list(state).await,
        _ => Err(RpcError::UnknownMethod {
            method: method.to_string(),
        }),
    }
}

/// Open the event stream for a streaming method.
///
/// Parameter errors are reported before any event is produced.
pub fn handle_stream_method(
    state: &SharedState,
    method: &str,
    params: Option<Value>,
) -> RpcResult<EventStream> {
    info!(method = %method, "Opening event stream");

    match method {
        "rag/query_stream" => {
            let params: QueryParams = parse_arguments(method, params)?;
            Ok(state
                .correction_loop
                .query_stream(params.question, params.max_retries))
        }
        "tutor/turn_stream" => {
            let params: TurnParams = parse_arguments(method, params)?;
            Ok(state
                .tutor
                .handle_turn_stream(params.conversation_id, params.message))
        }
        _ => Err(RpcError::UnknownMethod {
            method: method.to_string(),
        }),
    }
}

async fn handle_query(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    execute_handler("rag/query", params, |p: QueryParams| async move {
        state.correction_loop.query(&p.question, p.max_retries).await
    })
    .await
}

async fn handle_simple(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    execute_handler("rag/simple", params, |p: QuestionParams| async move {
        state.correction_loop.simple_query(&p.question).await
    })
    .await
}

async fn handle_compare(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    execute_handler("rag/compare", params, |p: QuestionParams| async move {
        state.compare(&p.question).await
    })
    .await
}

async fn handle_turn(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    execute_handler("tutor/turn", params, |p: TurnParams| async move {
        state.tutor.handle_turn(&p.conversation_id, &p.message).await
    })
    .await
}

async fn handle_state_get(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    execute_handler("tutor/state/get", params, |p: ConversationParams| async move {
        state.tutor.get_state(&p.conversation_id).await
    })
    .await
}

async fn handle_state_delete(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    execute_handler("tutor/state/delete", params, |p: ConversationParams| async move {
        state.tutor.delete_state(&p.conversation_id).await?;
        Ok::<_, AppError>(json!({
            "conversation_id": p.conversation_id,
            "deleted": true,
        }))
    })
    .await
}

async fn handle_state_list(state: &SharedState) -> RpcResult<Value> {
    let conversations = state.tutor.list_states().await.map_err(RpcError::from)?;
    Ok(json!({
        "count": conversations.len(),
        "conversations": conversations,
    }))
}

/// Parse method parameters into a typed struct.
fn parse_arguments<T: serde::de::DeserializeOwned>(
    method: &str,
    params: Option<Value>,
) -> RpcResult<T> {
    match params {
        Some(args) => serde_json::from_value(args).map_err(|e| RpcError::InvalidParameters {
            method: method.to_string(),
            message: e.to_string(),
        }),
        None => Err(RpcError::InvalidParameters {
            method: method.to_string(),
            message: "Missing params".to_string(),
        }),
    }
}

/// Parse parameters, run the operation and serialize its result.
///
/// Validation failures surface as invalid parameters and missing
/// conversations as not-found; everything else is an execution failure.
async fn execute_handler<P, R, E, F, Fut>(
    method: &str,
    params: Option<Value>,
    operation: F,
) -> RpcResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: Into<AppError>,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(method, params)?;

    let result = operation(params)
        .await
        .map_err(|e| execution_error(method, e.into()))?;

    serde_json::to_value(result).map_err(RpcError::Json)
}

fn execution_error(method: &str, err: AppError) -> RpcError {
    match err {
        AppError::Workflow(e @ WorkflowError::Validation { .. }) => RpcError::InvalidParameters {
            method: method.to_string(),
            message: e.to_string(),
        },
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionRequest, MockCompletionPort};
    use crate::config::Config;
    use crate::retrieval::{MockRetrievalPort, RetrievedDocument};
    use crate::server::AppState;
    use crate::store::InMemoryConversationStore;
    use futures_util::StreamExt;
    use std::sync::Arc;

    fn is_router(req: &CompletionRequest) -> bool {
        req.prompt.starts_with("You are an intelligent routing system")
    }

    fn is_grader(req: &CompletionRequest) -> bool {
        req.prompt.starts_with("You are a grading assistant")
    }

    fn create_test_state() -> SharedState {
        let mut retrieval = MockRetrievalPort::new();
        retrieval
            .expect_query()
            .returning(|_, _| Ok(vec![RetrievedDocument::new("Queues are FIFO.", 0.8)]));

        let mut completion = MockCompletionPort::new();
        completion
            .expect_complete()
            .withf(is_grader)
            .returning(|_| Ok("yes".to_string()));
        completion
            .expect_complete()
            .withf(is_router)
            .returning(|_| Ok("INITIAL".to_string()));
        completion
            .expect_complete()
            .withf(|req| !is_router(req) && !is_grader(req))
            .returning(|_| Ok("A queue is first-in, first-out.".to_string()));
        completion.expect_complete_stream().returning(|_| {
            let stream: crate::completion::FragmentStream = Box::pin(futures_util::stream::iter(
                vec![Ok("A queue ".to_string()), Ok("is FIFO.".to_string())],
            ));
            Ok(stream)
        });

        Arc::new(AppState::new(
            Config::default(),
            Arc::new(completion),
            Arc::new(retrieval),
            Arc::new(InMemoryConversationStore::new()),
        ))
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestParams {
        content: String,
        value: i32,
    }

    #[test]
    fn test_parse_arguments_success() {
        let params: TestParams =
            parse_arguments("test/method", Some(json!({"content": "x", "value": 42}))).unwrap();
        assert_eq!(
            params,
            TestParams {
                content: "x".to_string(),
                value: 42
            }
        );
    }

    #[test]
    fn test_parse_arguments_missing_params() {
        let err = parse_arguments::<TestParams>("test/method", None).unwrap_err();
        assert!(matches!(err, RpcError::InvalidParameters { .. }));
        assert!(err.to_string().contains("Missing params"));
        assert!(err.to_string().contains("test/method"));
    }

    #[test]
    fn test_parse_arguments_wrong_shape() {
        let err =
            parse_arguments::<TestParams>("test/method", Some(json!({"content": 1}))).unwrap_err();
        assert!(matches!(err, RpcError::InvalidParameters { .. }));
    }

    #[test]
    fn test_streaming_method_lookup() {
        assert!(is_streaming_method("rag/query_stream"));
        assert!(is_streaming_method("tutor/turn_stream"));
        assert!(!is_streaming_method("rag/query"));
        assert!(METHODS.iter().all(|m| !is_streaming_method(m)));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let state = create_test_state();
        let err = handle_method(&state, "rag/unknown", None).await.unwrap_err();
        assert!(matches!(err, RpcError::UnknownMethod { .. }));
    }

    #[tokio::test]
    async fn test_rag_query_returns_result() {
        let state = create_test_state();
        let value = handle_method(
            &state,
            "rag/query",
            Some(json!({"question": "What is a queue?"})),
        )
        .await
        .unwrap();

        assert_eq!(value["answer"], "A queue is first-in, first-out.");
        assert_eq!(value["workflow_path"], "retrieve → grade → generate");
        assert_eq!(value["num_sources"], 1);
        assert_eq!(value["was_rewritten"], false);
    }

    #[tokio::test]
    async fn test_empty_question_is_invalid_params() {
        let state = create_test_state();
        let err = handle_method(&state, "rag/query", Some(json!({"question": "  "})))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::InvalidParameters { .. }));
    }

    #[tokio::test]
    async fn test_tutor_turn_then_state_lifecycle() {
        let state = create_test_state();

        let turn = handle_method(
            &state,
            "tutor/turn",
            Some(json!({"conversation_id": "c1", "message": "I need help with queues"})),
        )
        .await
        .unwrap();
        assert_eq!(turn["current_phase"], "initial");

        let snapshot = handle_method(
            &state,
            "tutor/state/get",
            Some(json!({"conversation_id": "c1"})),
        )
        .await
        .unwrap();
        assert_eq!(snapshot["conversation_id"], "c1");

        let listed = handle_method(&state, "tutor/state/list", None).await.unwrap();
        assert_eq!(listed["count"], 1);

        let deleted = handle_method(
            &state,
            "tutor/state/delete",
            Some(json!({"conversation_id": "c1"})),
        )
        .await
        .unwrap();
        assert_eq!(deleted["deleted"], true);

        let err = handle_method(
            &state,
            "tutor/state/get",
            Some(json!({"conversation_id": "c1"})),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RpcError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_unknown_conversation_is_not_found() {
        let state = create_test_state();
        let err = handle_method(
            &state,
            "tutor/state/delete",
            Some(json!({"conversation_id": "ghost"})),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RpcError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_stream_method_requires_params() {
        let state = create_test_state();
        let result = handle_stream_method(&state, "rag/query_stream", None);
        assert!(matches!(result, Err(RpcError::InvalidParameters { .. })));
    }

    #[tokio::test]
    async fn test_query_stream_ends_with_complete() {
        let state = create_test_state();
        let stream = handle_stream_method(
            &state,
            "rag/query_stream",
            Some(json!({"question": "What is a queue?"})),
        )
        .unwrap();

        let events: Vec<_> = stream.collect().await;
        let last = events.last().unwrap();
        assert!(last.is_terminal());
        assert!(matches!(last, crate::stream::StreamEvent::Complete(_)));
    }
}
