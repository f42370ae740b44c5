//! Integration tests for the Langbase completion client
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use multihop_reasoning::config::{LangbaseConfig, RequestConfig};
use multihop_reasoning::error::LangbaseError;
use multihop_reasoning::langbase::{CompletionService, LangbaseClient, Message, PipeRequest};

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str, max_retries: u32) -> LangbaseClient {
    let config = LangbaseConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
    };

    let request_config = RequestConfig {
        timeout_ms: 2000,
        max_retries,
        retry_delay_ms: 10,
    };

    LangbaseClient::new(&config, request_config, "multihop-fallback-v1")
        .expect("Failed to create client")
}

fn success_body(completion: &str) -> serde_json::Value {
    json!({
        "success": true,
        "completion": completion,
        "threadId": "thread-123",
        "raw": {
            "model": "gpt-4o-mini",
            "usage": {
                "prompt_tokens": 100,
                "completion_tokens": 20,
                "total_tokens": 120
            }
        }
    })
}

#[cfg(test)]
mod pipe_call_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_pipe_call() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(header("Authorization", "Bearer test-api-key"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Ulm")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let request = PipeRequest::new("test-pipe", vec![Message::user("Where?")]);
        let response = client.call_pipe(request).await.unwrap();

        assert!(response.success);
        assert_eq!(response.completion, "Ulm");
        assert_eq!(response.thread_id, Some("thread-123".to_string()));
        let usage = response.raw.unwrap().usage.unwrap();
        assert_eq!(usage.total_tokens, Some(120));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "Missing required field: messages" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 3);
        let request = PipeRequest::new("test-pipe", vec![]);
        let err = client.call_pipe(request).await.unwrap_err();

        match err {
            LangbaseError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("Missing required field"));
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2);
        let request = PipeRequest::new("test-pipe", vec![Message::user("Where?")]);
        let err = client.call_pipe(request).await.unwrap_err();

        match err {
            LangbaseError::Unavailable { retries, message } => {
                assert_eq!(retries, 3);
                assert!(message.contains("503"));
            }
            other => panic!("Expected Unavailable error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_recovers_on_retry() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Warsaw")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 1);
        let request = PipeRequest::new("test-pipe", vec![Message::user("Where?")]);
        let response = client.call_pipe(request).await.unwrap();
        assert_eq!(response.completion, "Warsaw");
    }

    #[tokio::test]
    async fn test_success_false_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "completion": ""
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let request = PipeRequest::new("test-pipe", vec![Message::user("Where?")]);
        let err = client.call_pipe(request).await.unwrap_err();

        // exhausted retries wrap the last failure
        assert!(err.to_string().contains("success=false"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let request = PipeRequest::new("test-pipe", vec![Message::user("Where?")]);
        let err = client.call_pipe(request).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse response"));
    }
}

#[cfg(test)]
mod completion_tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_sends_system_and_user_messages() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(body_partial_json(json!({
                "name": "multihop-fallback-v1",
                "stream": false,
                "messages": [
                    { "role": "system", "content": "system prompt" },
                    { "role": "user", "content": "Question: Where?" }
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(success_body(r#"{"answer": "Ulm", "confidence": 0.5}"#)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let completion = client
            .complete("system prompt", "Question: Where?")
            .await
            .unwrap();
        assert_eq!(completion, r#"{"answer": "Ulm", "confidence": 0.5}"#);
    }
}
