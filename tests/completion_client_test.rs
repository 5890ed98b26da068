//! Integration tests for the llama.cpp completion client
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use futures_util::StreamExt;
use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use ai_mentor_core::completion::{CompletionPort, CompletionRequest, LlamaCppClient};
use ai_mentor_core::config::{LlmConfig, RequestConfig};
use ai_mentor_core::error::CompletionError;

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str, max_retries: u32, timeout_ms: u64) -> LlamaCppClient {
    let config = LlmConfig {
        base_url: base_url.to_string(),
        ..LlmConfig::default()
    };

    let request_config = RequestConfig {
        timeout_ms,
        max_retries,
        retry_delay_ms: 10,
    };

    LlamaCppClient::new(&config, request_config).expect("Failed to create client")
}

fn completion_body(text: &str) -> serde_json::Value {
    json!({
        "choices": [{"text": text, "finish_reason": "stop"}],
        "model": "mistral",
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

#[cfg(test)]
mod complete_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_completion() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .and(header("Content-Type", "application/json"))
            .and(body_partial_json(json!({
                "prompt": "What is a stack?",
                "max_tokens": 512,
                "stream": false,
                "stop": ["\n\n"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("A LIFO list.")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, 5000);
        let result = client
            .complete(CompletionRequest::new("What is a stack?"))
            .await;

        assert_eq!(result.unwrap(), "A LIFO list.");
    }

    #[tokio::test]
    async fn test_request_overrides_are_sent() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .and(body_partial_json(json!({"max_tokens": 10, "stop": ["###"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("yes")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, 5000);
        let request = CompletionRequest::new("grade this")
            .with_max_tokens(10)
            .with_stop(vec!["###".to_string()]);

        assert_eq!(client.complete(request).await.unwrap(), "yes");
    }

    #[tokio::test]
    async fn test_client_error_status_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad prompt"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 3, 5000);
        let result = client.complete(CompletionRequest::new("x")).await;

        match result {
            Err(CompletionError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad prompt");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_succeeds() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ready")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2, 5000);
        let result = client.complete(CompletionRequest::new("x")).await;

        assert_eq!(result.unwrap(), "ready");
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_last_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2, 5000);
        let result = client.complete(CompletionRequest::new("x")).await;

        assert!(matches!(result, Err(CompletionError::Api { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_missing_choices_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, 5000);
        let result = client.complete(CompletionRequest::new("x")).await;

        assert!(matches!(result, Err(CompletionError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, 5000);
        let result = client.complete(CompletionRequest::new("x")).await;

        assert!(matches!(result, Err(CompletionError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body("late"))
                    .set_delay(Duration::from_millis(1000)),
            )
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, 100);
        let result = client.complete(CompletionRequest::new("x")).await;

        assert!(matches!(
            result,
            Err(CompletionError::Timeout { timeout_ms: 100 })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let client = create_test_client("http://127.0.0.1:1", 0, 2000);
        let result = client.complete(CompletionRequest::new("x")).await;

        assert!(matches!(result, Err(CompletionError::Connection { .. })));
    }
}

#[cfg(test)]
mod stream_tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// True once the request headers and the declared body have arrived.
    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    /// Serve one chunked SSE response, writing `body` as two separate chunks.
    async fn serve_split_body(body: &'static [u8], split: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request_complete(&request) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      content-type: text/event-stream\r\n\
                      transfer-encoding: chunked\r\n\
                      connection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for piece in [&body[..split], &body[split..]] {
                socket
                    .write_all(format!("{:x}\r\n", piece.len()).as_bytes())
                    .await
                    .unwrap();
                socket.write_all(piece).await.unwrap();
                socket.write_all(b"\r\n").await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_stream_keeps_multibyte_text_split_across_chunks() {
        let body: &'static [u8] =
            "data: {\"choices\":[{\"text\":\"café → ok\"}]}\n\ndata: [DONE]\n\n".as_bytes();
        // Cut between the two bytes of 'é'.
        let split = body.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let base_url = serve_split_body(body, split).await;
        let client = create_test_client(&base_url, 0, 5000);
        let stream = match client.complete_stream(CompletionRequest::new("hi")).await {
            Ok(stream) => stream,
            Err(e) => panic!("stream should open: {}", e),
        };

        let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(fragments, vec!["café → ok".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_yields_fragments_until_done() {
        let mock_server = MockServer::start().await;

        let body = concat!(
            "data: {\"choices\":[{\"text\":\"Hel\"}]}\n\n",
            "data: {\"choices\":[{\"text\":\"\"}]}\n\n",
            "data: {\"choices\":[{\"text\":\"lo\"}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"text\":\"ignored\"}]}\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, 5000);
        let stream = match client.complete_stream(CompletionRequest::new("hi")).await {
            Ok(stream) => stream,
            Err(e) => panic!("stream should open: {}", e),
        };

        let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(fragments, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_without_done_marker_flushes_at_eof() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "data: {\"choices\":[{\"text\":\"only\"}]}",
                "text/event-stream",
            ))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, 5000);
        let stream = match client.complete_stream(CompletionRequest::new("hi")).await {
            Ok(stream) => stream,
            Err(e) => panic!("stream should open: {}", e),
        };

        let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(fragments, vec!["only".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_malformed_chunk_ends_with_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "data: {\"choices\":[{\"text\":\"ok\"}]}\n\ndata: {broken\n\n",
                "text/event-stream",
            ))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0, 5000);
        let stream = match client.complete_stream(CompletionRequest::new("hi")).await {
            Ok(stream) => stream,
            Err(e) => panic!("stream should open: {}", e),
        };

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "ok");
        assert!(matches!(
            items[1],
            Err(CompletionError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_stream_error_status_fails_to_open() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2, 5000);
        let result = client.complete_stream(CompletionRequest::new("hi")).await;

        assert!(matches!(
            result,
            Err(CompletionError::Api { status: 503, .. })
        ));
    }
}
